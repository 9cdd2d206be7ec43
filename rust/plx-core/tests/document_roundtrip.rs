//! Persisted-IR round-trip: serialize ∘ deserialize is the identity on
//! validated projects, and foreign versions are rejected.

use plx_core::document::{DocumentError, ProjectDocument, FORMAT_VERSION};
use plx_core::ir::{Expr, ExprKind, Stmt, StmtKind, VarPath};
use plx_core::pou::{BlockRole, Pou, PouBody, PouKind, VarBlock, VarDecl};
use plx_core::project::{Project, Task, TaskSchedule};
use plx_core::sfc::{Chart, Step, Transition};
use plx_core::span::Span;
use plx_core::time::IecDuration;
use plx_core::types::{Dimension, ElementaryType, EnumType, EnumVariant, Type, UserType};
use plx_core::value::Value;

fn sample_project() -> Project {
    let body = vec![
        Stmt::new(
            StmtKind::Assign {
                target: VarPath::var("running"),
                value: Expr::variable(VarPath::var("cmd"), Type::BOOL, Span::new(5, 8, 1, 6)),
            },
            Span::new(0, 8, 1, 1),
        ),
        Stmt::new(
            StmtKind::InvokeFb {
                instance: VarPath::var("t"),
                inputs: vec![(
                    "IN".to_string(),
                    Expr::literal(Value::Bool(true), Span::dummy()),
                )],
            },
            Span::dummy(),
        ),
    ];
    let motor = Pou {
        name: "Motor".to_string(),
        kind: PouKind::FunctionBlock,
        parent: None,
        blocks: vec![
            VarBlock {
                role: BlockRole::Input,
                vars: vec![VarDecl::new("cmd", Type::BOOL)],
            },
            VarBlock {
                role: BlockRole::Output,
                vars: vec![VarDecl::new("running", Type::BOOL)],
            },
            VarBlock {
                role: BlockRole::Local,
                vars: vec![
                    VarDecl::new("t", Type::Fb("TON".to_string())),
                    VarDecl {
                        name: "limits".to_string(),
                        ty: Type::array(Type::INT, vec![Dimension::new(0, 3).unwrap()]),
                        initial: Some(Value::Array(vec![
                            Value::Int(1),
                            Value::Int(2),
                            Value::Int(3),
                            Value::Int(4),
                        ])),
                        description: Some("per-stage limits".to_string()),
                    },
                ],
            },
        ],
        body: PouBody::Statements(body),
        methods: vec![],
        fingerprint: Some("sha256:0000".to_string()),
    };

    let batch = Pou {
        name: "Batch".to_string(),
        kind: PouKind::Program,
        parent: None,
        blocks: vec![VarBlock {
            role: BlockRole::Output,
            vars: vec![VarDecl::new("mixer", Type::BOOL)],
        }],
        body: PouBody::Chart(Chart {
            steps: vec![
                Step {
                    name: "idle".to_string(),
                    initial: true,
                    actions: vec![],
                },
                Step {
                    name: "mix".to_string(),
                    initial: false,
                    actions: vec![Stmt::new(
                        StmtKind::Assign {
                            target: VarPath::var("mixer"),
                            value: Expr::literal(Value::Bool(true), Span::dummy()),
                        },
                        Span::dummy(),
                    )],
                },
            ],
            transitions: vec![
                Transition {
                    source: "idle".to_string(),
                    target: "mix".to_string(),
                    condition: Expr::literal(Value::Bool(true), Span::dummy()),
                },
                Transition {
                    source: "mix".to_string(),
                    target: "idle".to_string(),
                    condition: Expr::literal(Value::Bool(false), Span::dummy()),
                },
            ],
        }),
        methods: vec![],
        fingerprint: None,
    };

    Project {
        name: "cell".to_string(),
        tasks: vec![Task {
            name: "main".to_string(),
            schedule: TaskSchedule::Periodic {
                period: IecDuration::from_millis(10),
            },
            priority: Some(3),
            pous: vec!["Batch".to_string()],
        }],
        pous: vec![motor, batch],
        data_types: vec![UserType::Enum(EnumType {
            name: "Mode".to_string(),
            variants: vec![
                EnumVariant {
                    name: "IDLE".to_string(),
                    value: 0,
                },
                EnumVariant {
                    name: "RUN".to_string(),
                    value: 1,
                },
            ],
        })],
        globals: vec![],
    }
}

#[test]
fn roundtrip_is_identity() {
    let document = ProjectDocument::new(sample_project());
    let json = document.to_json().unwrap();
    let back = ProjectDocument::from_json(&json).unwrap();
    assert_eq!(back, document);
}

#[test]
fn roundtrip_twice_is_stable() {
    let document = ProjectDocument::new(sample_project());
    let once = document.to_json().unwrap();
    let twice = ProjectDocument::from_json(&once)
        .unwrap()
        .to_json()
        .unwrap();
    assert_eq!(once, twice);
}

#[test]
fn foreign_version_rejected() {
    let document = ProjectDocument::new(sample_project());
    let json = document.to_json().unwrap();
    let bumped = json.replacen(
        &format!("\"format_version\": {}", FORMAT_VERSION),
        "\"format_version\": 99",
        1,
    );
    match ProjectDocument::from_json(&bumped) {
        Err(DocumentError::Version { found }) => assert_eq!(found, 99),
        other => panic!("expected version error, got {:?}", other),
    }
}

#[test]
fn duration_value_survives_with_sign() {
    let value = Value::Time(IecDuration::new(0, 0, 0, -90, 0, 0, 0).unwrap());
    let json = serde_json::to_string(&value).unwrap();
    let back: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(back, value);
}

#[test]
fn elementary_names_parse_back() {
    for (name, expected) in [
        ("BOOL", ElementaryType::Bool),
        ("DINT", ElementaryType::DInt),
        ("LREAL", ElementaryType::LReal),
        ("TOD", ElementaryType::TimeOfDay),
    ] {
        assert_eq!(name.parse::<ElementaryType>().unwrap(), expected);
        assert_eq!(expected.to_string(), name);
    }
}
