//! Project assembly tests: cross-reference validation with best-effort
//! multi-error batches.

use plx_compiler::{Ctx, ErrorKind, PouBuilder, ProjectBuilder, VarSpec};
use plx_core::pou::VarDecl;
use plx_core::project::{GlobalBlock, Task, TaskSchedule};
use plx_core::time::IecDuration;
use plx_core::types::{
    StructField, StructType, Type, TypeTable, UserType,
};

fn main_program() -> plx_core::pou::Pou {
    PouBuilder::program("Main")
        .var("heartbeat", VarSpec::output(Type::BOOL))
        .logic("self.heartbeat = True\n")
        .compile(&Ctx::new(TypeTable::empty()))
        .unwrap()
        .pou
}

fn periodic(name: &str, pous: &[&str]) -> Task {
    Task {
        name: name.to_string(),
        schedule: TaskSchedule::Periodic {
            period: IecDuration::from_millis(10),
        },
        priority: None,
        pous: pous.iter().map(|p| p.to_string()).collect(),
    }
}

#[test]
fn valid_project_assembles() {
    let project = ProjectBuilder::new("cell")
        .pou(main_program())
        .task(periodic("main_task", &["Main"]))
        .compile()
        .unwrap();
    assert_eq!(project.pous.len(), 1);
}

#[test]
fn task_referencing_missing_pou_is_dangling() {
    let errors = ProjectBuilder::new("cell")
        .pou(main_program())
        .task(periodic("main_task", &["Ghost"]))
        .compile()
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::DanglingReference));
    assert!(errors.iter().any(|e| e.message.contains("Ghost")));
}

#[test]
fn duplicate_pou_names_rejected() {
    let errors = ProjectBuilder::new("cell")
        .pou(main_program())
        .pou(main_program())
        .compile()
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::DuplicateName));
}

#[test]
fn zero_period_is_invalid_schedule() {
    let errors = ProjectBuilder::new("cell")
        .pou(main_program())
        .task(Task {
            name: "main_task".to_string(),
            schedule: TaskSchedule::Periodic {
                period: IecDuration::ZERO,
            },
            priority: None,
            pous: vec!["Main".to_string()],
        })
        .compile()
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::InvalidSchedule));
}

#[test]
fn empty_event_source_is_invalid_schedule() {
    let errors = ProjectBuilder::new("cell")
        .pou(main_program())
        .task(Task {
            name: "evt".to_string(),
            schedule: TaskSchedule::Event {
                source: String::new(),
            },
            priority: None,
            pous: vec!["Main".to_string()],
        })
        .compile()
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::InvalidSchedule));
}

#[test]
fn struct_field_cycle_rejected() {
    let a = UserType::Struct(StructType {
        name: "A".to_string(),
        fields: vec![StructField {
            name: "b".to_string(),
            ty: Type::Struct("B".to_string()),
            default: None,
        }],
    });
    let b = UserType::Struct(StructType {
        name: "B".to_string(),
        fields: vec![StructField {
            name: "a".to_string(),
            ty: Type::Struct("A".to_string()),
            default: None,
        }],
    });
    let errors = ProjectBuilder::new("cell")
        .data_type(a)
        .data_type(b)
        .pou(main_program())
        .compile()
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::InheritanceCycle));
}

#[test]
fn pointer_indirection_breaks_struct_cycle() {
    let node = UserType::Struct(StructType {
        name: "Node".to_string(),
        fields: vec![StructField {
            name: "next".to_string(),
            ty: Type::Pointer(Box::new(Type::Struct("Node".to_string()))),
            default: None,
        }],
    });
    let project = ProjectBuilder::new("cell")
        .data_type(node)
        .pou(main_program())
        .compile();
    assert!(project.is_ok());
}

#[test]
fn global_with_missing_type_is_dangling() {
    let errors = ProjectBuilder::new("cell")
        .pou(main_program())
        .global(GlobalBlock {
            name: "G".to_string(),
            constant: false,
            vars: vec![VarDecl::new("recipe", Type::Struct("Recipe".to_string()))],
        })
        .compile()
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::DanglingReference));
}

#[test]
fn all_violations_reported_in_one_batch() {
    let errors = ProjectBuilder::new("cell")
        .pou(main_program())
        .pou(main_program())
        .task(periodic("t1", &["Ghost"]))
        .task(Task {
            name: "t1".to_string(),
            schedule: TaskSchedule::Periodic {
                period: IecDuration::ZERO,
            },
            priority: None,
            pous: vec![],
        })
        .compile()
        .unwrap_err();
    assert!(errors.len() >= 4);
    assert!(errors.has_kind(ErrorKind::DuplicateName));
    assert!(errors.has_kind(ErrorKind::DanglingReference));
    assert!(errors.has_kind(ErrorKind::InvalidSchedule));
}
