//! Vendor emission tests: capability gating, preparation, and document
//! shape.

use plx_codegen::{emitter_for, prepare_for_target, VendorTarget};
use plx_compiler::{Ctx, PouBuilder, ProjectBuilder, VarSpec};
use plx_core::pou::Pou;
use plx_core::project::{Project, Task, TaskSchedule};
use plx_core::time::IecDuration;
use plx_core::types::{Type, TypeTable};

fn family_project() -> Project {
    let empty = Ctx::new(TypeTable::empty());
    let base = PouBuilder::function_block("Base")
        .var("go", VarSpec::input(Type::BOOL))
        .var("slow", VarSpec::output(Type::BOOL))
        .logic("self.slow = delayed(self.go, seconds=2)\n")
        .compile(&empty)
        .unwrap()
        .pou;

    let child = {
        let mut ctx = Ctx::new(TypeTable::empty());
        ctx.pous.insert("Base", &base);
        PouBuilder::function_block("Child")
            .parent("Base")
            .var("edge", VarSpec::output(Type::BOOL))
            .logic("super().logic()\nself.edge = rising(self.go)\n")
            .compile(&ctx)
            .unwrap()
            .pou
    };

    let main = PouBuilder::program("Main")
        .var("unit", VarSpec::fb("Child"))
        .var("run", VarSpec::input(Type::BOOL))
        .logic("self.unit(go=self.run)\n")
        .compile(&{
            let mut ctx = Ctx::new(TypeTable::empty());
            ctx.pous.insert("Base", &base);
            ctx.pous.insert("Child", &child);
            ctx
        })
        .unwrap()
        .pou;

    ProjectBuilder::new("cell")
        .pou(base)
        .pou(child)
        .pou(main)
        .task(Task {
            name: "main_task".to_string(),
            schedule: TaskSchedule::Periodic {
                period: IecDuration::from_millis(10),
            },
            priority: Some(2),
            pous: vec!["Main".to_string()],
        })
        .compile()
        .unwrap()
}

#[test]
fn l5x_requires_flattening_first() {
    let project = family_project();
    let emitter = emitter_for(VendorTarget::RockwellL5x);
    assert!(emitter.emit(&project).is_err());

    let prepared = prepare_for_target(&project, VendorTarget::RockwellL5x).unwrap();
    let documents = emitter.emit(&prepared).unwrap();
    assert_eq!(documents.len(), 1);
    assert!(documents[0].xml.contains("<RSLogix5000Content"));
    assert!(documents[0].xml.contains("Type=\"PERIODIC\" Rate=\"10\""));
    assert!(!documents[0].xml.contains("SUPER^"));
}

#[test]
fn twincat_keeps_extends() {
    let project = family_project();
    let prepared = prepare_for_target(&project, VendorTarget::BeckhoffTwinCat).unwrap();
    let emitter = emitter_for(VendorTarget::BeckhoffTwinCat);
    let documents = emitter.emit(&prepared).unwrap();
    assert_eq!(documents.len(), 3);

    let child = documents
        .iter()
        .find(|d| d.file_name == "Child.TcPOU")
        .unwrap();
    assert!(child.xml.contains("FUNCTION_BLOCK Child EXTENDS Base"));
    assert!(child.xml.contains("SUPER^();"));
}

#[test]
fn twincat_object_ids_are_stable() {
    let project = family_project();
    let emitter = emitter_for(VendorTarget::BeckhoffTwinCat);
    let first = emitter.emit(&project).unwrap();
    let second = emitter.emit(&project).unwrap();
    assert_eq!(first, second);
}

#[test]
fn simatic_emits_interface_sections() {
    let project = family_project();
    let prepared = prepare_for_target(&project, VendorTarget::SiemensSimaticMl).unwrap();
    let emitter = emitter_for(VendorTarget::SiemensSimaticMl);
    let documents = emitter.emit(&prepared).unwrap();
    let xml = &documents[0].xml;
    assert!(xml.contains("<Section Name=\"Input\">"));
    assert!(xml.contains("<Section Name=\"Static\">"));
    assert!(xml.contains("ProgrammingLanguage=\"SCL\""));
}

#[test]
fn flattened_bodies_render_parent_logic_inline() {
    let project = family_project();
    let prepared = prepare_for_target(&project, VendorTarget::RockwellL5x).unwrap();
    let child = prepared.pou("Child").unwrap();
    let rendered = plx_codegen::st::render_stmts(child.statements().unwrap(), 0);
    assert!(rendered.contains("__ton_0(IN := go, PT := T#2s);"));
    assert!(rendered.contains("edge := __rtrig_0.Q;"));
}
