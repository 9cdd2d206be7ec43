//! Skeletal Siemens SimaticML emitter: one `Document` with a
//! `SW.Blocks.*` element per POU, interface sections per declaration
//! block, and a structured-text network source.

use crate::st;
use crate::{unsupported, xml_escape, VendorDocument, VendorEmitter, VendorTarget};
use plx_compiler::CompileErrors;
use plx_core::pou::{BlockRole, Pou, PouKind};
use plx_core::project::Project;
use std::fmt::Write;

pub struct SimaticEmitter;

impl VendorEmitter for SimaticEmitter {
    fn target(&self) -> VendorTarget {
        VendorTarget::SiemensSimaticMl
    }

    fn emit(&self, project: &Project) -> Result<Vec<VendorDocument>, CompileErrors> {
        for pou in &project.pous {
            if pou.parent.is_some() {
                return Err(unsupported(
                    self.target(),
                    format!("EXTENDS on '{}'; flatten before emission", pou.name),
                ));
            }
            if pou.chart().is_some() {
                return Err(unsupported(
                    self.target(),
                    format!("the chart body of '{}'", pou.name),
                ));
            }
        }

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Document>\n");
        xml.push_str("  <Engineering version=\"V17\"/>\n");
        for pou in &project.pous {
            emit_block(pou, &mut xml);
        }
        xml.push_str("</Document>\n");
        Ok(vec![VendorDocument {
            file_name: format!("{}.xml", project.name),
            xml,
        }])
    }
}

fn section_name(role: BlockRole) -> &'static str {
    match role {
        BlockRole::Input => "Input",
        BlockRole::Output => "Output",
        BlockRole::InOut => "InOut",
        BlockRole::Local => "Static",
        BlockRole::Temp => "Temp",
        BlockRole::Constant => "Constant",
    }
}

fn emit_block(pou: &Pou, xml: &mut String) {
    let element = match pou.kind {
        PouKind::Function { .. } => "SW.Blocks.FC",
        _ => "SW.Blocks.FB",
    };
    let _ = writeln!(xml, "  <{} Name=\"{}\">", element, xml_escape(&pou.name));
    xml.push_str("    <AttributeList>\n      <Interface>\n        <Sections>\n");
    for block in &pou.blocks {
        let _ = writeln!(
            xml,
            "          <Section Name=\"{}\">",
            section_name(block.role)
        );
        for decl in &block.vars {
            let initial = decl
                .initial
                .as_ref()
                .map(|v| format!(" StartValue=\"{}\"", xml_escape(&v.to_string())))
                .unwrap_or_default();
            let _ = writeln!(
                xml,
                "            <Member Name=\"{}\" Datatype=\"{}\"{}/>",
                xml_escape(&decl.name),
                xml_escape(&decl.ty.to_string()),
                initial
            );
        }
        xml.push_str("          </Section>\n");
    }
    xml.push_str("        </Sections>\n      </Interface>\n    </AttributeList>\n");
    xml.push_str("    <ObjectList>\n      <SW.Blocks.CompileUnit ProgrammingLanguage=\"SCL\">\n");
    xml.push_str("        <StructuredText>\n");
    if let Some(stmts) = pou.statements() {
        for line in st::render_stmts(stmts, 0).lines() {
            let _ = writeln!(xml, "          {}", xml_escape(line));
        }
    }
    xml.push_str("        </StructuredText>\n");
    xml.push_str("      </SW.Blocks.CompileUnit>\n    </ObjectList>\n");
    let _ = writeln!(xml, "  </{}>", element);
}
