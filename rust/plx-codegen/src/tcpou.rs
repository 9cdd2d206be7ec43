//! Skeletal Beckhoff TcPOU emitter: one document per POU with the
//! textual declaration part and an ST implementation. Inheritance is
//! carried natively via EXTENDS; object ids derive from the POU name so
//! repeated emission is stable.

use crate::st;
use crate::{unsupported, xml_escape, VendorDocument, VendorEmitter, VendorTarget};
use plx_compiler::CompileErrors;
use plx_core::pou::Pou;
use plx_core::project::Project;
use std::fmt::Write;
use uuid::Uuid;

pub struct TcPouEmitter;

impl VendorEmitter for TcPouEmitter {
    fn target(&self) -> VendorTarget {
        VendorTarget::BeckhoffTwinCat
    }

    fn emit(&self, project: &Project) -> Result<Vec<VendorDocument>, CompileErrors> {
        let mut documents = Vec::new();
        for pou in &project.pous {
            if pou.chart().is_some() {
                return Err(unsupported(
                    self.target(),
                    format!("the chart body of '{}'", pou.name),
                ));
            }
            documents.push(emit_pou(pou));
        }
        Ok(documents)
    }
}

fn object_id(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn emit_pou(pou: &Pou) -> VendorDocument {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<TcPlcObject Version=\"1.1.0.1\" ProductVersion=\"3.1.4024.0\">\n");
    let _ = writeln!(
        xml,
        "  <POU Name=\"{}\" Id=\"{{{}}}\">",
        xml_escape(&pou.name),
        object_id(&pou.name)
    );
    xml.push_str("    <Declaration><![CDATA[");
    xml.push_str(&st::render_declaration(pou));
    xml.push_str("]]></Declaration>\n");
    xml.push_str("    <Implementation>\n      <ST><![CDATA[");
    if let Some(stmts) = pou.statements() {
        xml.push_str(&st::render_stmts(stmts, 0));
    }
    xml.push_str("]]></ST>\n    </Implementation>\n");
    for method in &pou.methods {
        let _ = writeln!(
            xml,
            "    <Method Name=\"{}\" Id=\"{{{}}}\">",
            xml_escape(&method.name),
            object_id(&format!("{}.{}", pou.name, method.name))
        );
        xml.push_str("      <Declaration><![CDATA[");
        xml.push_str(&st::render_declaration(method));
        xml.push_str("]]></Declaration>\n");
        xml.push_str("      <Implementation>\n        <ST><![CDATA[");
        if let Some(stmts) = method.statements() {
            xml.push_str(&st::render_stmts(stmts, 0));
        }
        xml.push_str("]]></ST>\n      </Implementation>\n    </Method>\n");
    }
    xml.push_str("  </POU>\n</TcPlcObject>\n");
    VendorDocument {
        file_name: format!("{}.TcPOU", pou.name),
        xml,
    }
}
