//! Skeletal Allen-Bradley L5X emitter: the RSLogix5000Content document
//! shape with data types, program tags, ST routines, and task schedules.
//! Cosmetic attributes (editor layout, timestamps) are intentionally
//! absent.

use crate::st;
use crate::{unsupported, xml_escape, VendorDocument, VendorEmitter, VendorTarget};
use plx_compiler::CompileErrors;
use plx_core::pou::{Pou, PouKind};
use plx_core::project::{Project, TaskSchedule};
use plx_core::types::UserType;
use std::fmt::Write;

pub struct L5xEmitter;

impl VendorEmitter for L5xEmitter {
    fn target(&self) -> VendorTarget {
        VendorTarget::RockwellL5x
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
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            xml,
            "<RSLogix5000Content SchemaRevision=\"1.0\" TargetName=\"{}\" TargetType=\"Controller\">",
            xml_escape(&project.name)
        );
        let _ = writeln!(xml, "  <Controller Name=\"{}\">", xml_escape(&project.name));

        xml.push_str("    <DataTypes>\n");
        for ty in &project.data_types {
            emit_data_type(ty, &mut xml);
        }
        xml.push_str("    </DataTypes>\n");

        xml.push_str("    <Tags>\n");
        for block in &project.globals {
            for decl in &block.vars {
                let _ = writeln!(
                    xml,
                    "      <Tag Name=\"{}\" DataType=\"{}\" Constant=\"{}\"/>",
                    xml_escape(&decl.name),
                    xml_escape(&decl.ty.to_string()),
                    block.constant
                );
            }
        }
        xml.push_str("    </Tags>\n");

        xml.push_str("    <Programs>\n");
        for pou in &project.pous {
            emit_pou(pou, &mut xml);
        }
        xml.push_str("    </Programs>\n");

        xml.push_str("    <Tasks>\n");
        for task in &project.tasks {
            let (task_type, rate) = match &task.schedule {
                TaskSchedule::Periodic { period } => {
                    ("PERIODIC", format!(" Rate=\"{}\"", period.as_nanos() / 1_000_000))
                }
                TaskSchedule::Event { source } => {
                    ("EVENT", format!(" EventTag=\"{}\"", xml_escape(source)))
                }
                TaskSchedule::Continuous => ("CONTINUOUS", String::new()),
            };
            let priority = task
                .priority
                .map(|p| format!(" Priority=\"{}\"", p))
                .unwrap_or_default();
            let _ = writeln!(
                xml,
                "      <Task Name=\"{}\" Type=\"{}\"{}{}>",
                xml_escape(&task.name),
                task_type,
                rate,
                priority
            );
            xml.push_str("        <ScheduledPrograms>\n");
            for pou in &task.pous {
                let _ = writeln!(
                    xml,
                    "          <ScheduledProgram Name=\"{}\"/>",
                    xml_escape(pou)
                );
            }
            xml.push_str("        </ScheduledPrograms>\n");
            xml.push_str("      </Task>\n");
        }
        xml.push_str("    </Tasks>\n");

        xml.push_str("  </Controller>\n</RSLogix5000Content>\n");
        Ok(vec![VendorDocument {
            file_name: format!("{}.L5X", project.name),
            xml,
        }])
    }
}

fn emit_data_type(ty: &UserType, xml: &mut String) {
    match ty {
        UserType::Struct(s) => {
            let _ = writeln!(xml, "      <DataType Name=\"{}\" Class=\"User\">", xml_escape(&s.name));
            xml.push_str("        <Members>\n");
            for field in &s.fields {
                let _ = writeln!(
                    xml,
                    "          <Member Name=\"{}\" DataType=\"{}\"/>",
                    xml_escape(&field.name),
                    xml_escape(&field.ty.to_string())
                );
            }
            xml.push_str("        </Members>\n      </DataType>\n");
        }
        UserType::Enum(e) => {
            // L5X has no first-class enums; they travel as DINT aliases
            // with their variants as documented values.
            let _ = writeln!(
                xml,
                "      <DataType Name=\"{}\" Class=\"User\" Family=\"NoFamily\">",
                xml_escape(&e.name)
            );
            xml.push_str("        <Members>\n");
            let _ = writeln!(
                xml,
                "          <Member Name=\"Value\" DataType=\"DINT\" Description=\"{}\"/>",
                xml_escape(
                    &e.variants
                        .iter()
                        .map(|v| format!("{}={}", v.name, v.value))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            );
            xml.push_str("        </Members>\n      </DataType>\n");
        }
    }
}

fn emit_pou(pou: &Pou, xml: &mut String) {
    let class = match pou.kind {
        PouKind::Program => "Program",
        _ => "AddOnInstructionDefinition",
    };
    let _ = writeln!(
        xml,
        "      <{} Name=\"{}\">",
        class,
        xml_escape(&pou.name)
    );
    xml.push_str("        <Tags>\n");
    for (role, decl) in pou.vars() {
        let _ = writeln!(
            xml,
            "          <Tag Name=\"{}\" DataType=\"{}\" Usage=\"{}\"/>",
            xml_escape(&decl.name),
            xml_escape(&decl.ty.to_string()),
            role
        );
    }
    xml.push_str("        </Tags>\n");
    xml.push_str("        <Routines>\n");
    xml.push_str("          <Routine Name=\"Logic\" Type=\"ST\">\n");
    xml.push_str("            <STContent>\n");
    if let Some(stmts) = pou.statements() {
        for (i, line) in st::render_stmts(stmts, 0).lines().enumerate() {
            let _ = writeln!(
                xml,
                "              <Line Number=\"{}\">{}</Line>",
                i,
                xml_escape(line)
            );
        }
    }
    xml.push_str("            </STContent>\n");
    xml.push_str("          </Routine>\n");
    xml.push_str("        </Routines>\n");
    let _ = writeln!(xml, "      </{}>", class);
}
