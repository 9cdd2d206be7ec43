//! Type rule tests: widening and narrowing, boolean contexts, case arm
//! checking, and the advisory analyses (exhaustiveness, output
//! assignment).

use plx_compiler::{Ctx, ErrorKind, PouBuilder, VarSpec};
use plx_core::types::{EnumType, EnumVariant, Type, TypeTable, UserType};
use plx_core::value::Value;

fn mode_enum() -> Vec<UserType> {
    vec![UserType::Enum(EnumType {
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
            EnumVariant {
                name: "FAULT".to_string(),
                value: 2,
            },
        ],
    })]
}

fn compile(builder: PouBuilder) -> Result<plx_compiler::CompiledPou, plx_compiler::CompileErrors> {
    builder.compile(&Ctx::new(TypeTable::empty()))
}

// ============================================================================
// ASSIGNMENT COMPATIBILITY
// ============================================================================

#[test]
fn integer_widening_accepted() {
    let compiled = compile(
        PouBuilder::function_block("Widen")
            .var("small", VarSpec::input(Type::INT))
            .var("big", VarSpec::output(Type::LINT))
            .logic("self.big = self.small\n"),
    );
    assert!(compiled.is_ok());
}

#[test]
fn float_to_int_without_conversion_rejected() {
    let errors = compile(
        PouBuilder::function_block("Narrow")
            .var("f", VarSpec::input(Type::REAL))
            .var("n", VarSpec::output(Type::DINT))
            .logic("self.n = self.f\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

#[test]
fn explicit_conversion_narrowing_accepted() {
    let compiled = compile(
        PouBuilder::function_block("Convert")
            .var("f", VarSpec::input(Type::REAL))
            .var("n", VarSpec::output(Type::DINT))
            .logic("self.n = dint(self.f)\n"),
    );
    assert!(compiled.is_ok());
}

#[test]
fn integer_literal_fits_narrow_target() {
    let compiled = compile(
        PouBuilder::function_block("Lit")
            .var("n", VarSpec::output(Type::INT))
            .logic("self.n = 1000\n"),
    );
    assert!(compiled.is_ok());

    let errors = compile(
        PouBuilder::function_block("Lit")
            .var("n", VarSpec::output(Type::INT))
            .logic("self.n = 70000\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

#[test]
fn constant_not_writable() {
    let errors = compile(
        PouBuilder::function_block("Fixed")
            .var("limit", VarSpec::constant(Type::DINT).init(Value::DInt(10)))
            .var("y", VarSpec::output(Type::DINT))
            .logic("self.limit = 5\nself.y = self.limit\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

#[test]
fn bad_initial_value_rejected() {
    let errors = compile(
        PouBuilder::function_block("Init")
            .var("n", VarSpec::stat(Type::INT).init(Value::DInt(1 << 20)))
            .var("y", VarSpec::output(Type::DINT))
            .logic("self.y = self.n\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

// ============================================================================
// BOOLEAN CONTEXTS
// ============================================================================

#[test]
fn integer_condition_rejected() {
    let errors = compile(
        PouBuilder::function_block("Cond")
            .var("n", VarSpec::input(Type::DINT))
            .var("y", VarSpec::output(Type::BOOL))
            .logic("if self.n:\n    self.y = True\nelse:\n    self.y = False\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

#[test]
fn integer_division_on_floats_rejected() {
    let errors = compile(
        PouBuilder::function_block("Div")
            .var("f", VarSpec::input(Type::LREAL))
            .var("y", VarSpec::output(Type::LREAL))
            .logic("self.y = self.f // 2.0\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

#[test]
fn and_on_integers_rejected() {
    let errors = compile(
        PouBuilder::function_block("Bad")
            .var("n", VarSpec::input(Type::DINT))
            .var("y", VarSpec::output(Type::BOOL))
            .logic("self.y = self.n and True\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

// ============================================================================
// CASE ARMS
// ============================================================================

#[test]
fn duplicate_case_labels_rejected() {
    let errors = compile(
        PouBuilder::function_block("Dup")
            .var("n", VarSpec::input(Type::DINT))
            .var("y", VarSpec::output(Type::DINT))
            .logic(concat!(
                "match self.n:\n",
                "    case 1:\n",
                "        self.y = 1\n",
                "    case 1 | 2:\n",
                "        self.y = 2\n",
            )),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::CaseOverlap));
}

#[test]
fn enum_selector_with_integer_label_rejected() {
    let types = mode_enum();
    let errors = PouBuilder::function_block("Sel")
        .var("mode", VarSpec::input(Type::Enum("Mode".to_string())))
        .var("y", VarSpec::output(Type::DINT))
        .logic(concat!(
            "match self.mode:\n",
            "    case 1:\n",
            "        self.y = 1\n",
        ))
        .compile(&Ctx::new(TypeTable::new(&types)))
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::TypeMismatch));
}

#[test]
fn exhaustive_enum_selector_accepted_without_warning() {
    let types = mode_enum();
    let compiled = PouBuilder::function_block("Sel")
        .var("mode", VarSpec::input(Type::Enum("Mode".to_string())))
        .var("y", VarSpec::output(Type::DINT))
        .logic(concat!(
            "match self.mode:\n",
            "    case Mode.IDLE:\n",
            "        self.y = 0\n",
            "    case Mode.RUN:\n",
            "        self.y = 1\n",
            "    case Mode.FAULT:\n",
            "        self.y = 2\n",
        ))
        .compile(&Ctx::new(TypeTable::new(&types)))
        .unwrap();
    assert!(compiled
        .warnings
        .iter()
        .all(|w| !w.message.contains("does not cover")));
}

#[test]
fn non_exhaustive_enum_selector_warns() {
    let types = mode_enum();
    let compiled = PouBuilder::function_block("Sel")
        .var("mode", VarSpec::input(Type::Enum("Mode".to_string())))
        .var("y", VarSpec::output(Type::DINT))
        .logic(concat!(
            "self.y = 0\n",
            "match self.mode:\n",
            "    case Mode.IDLE:\n",
            "        self.y = 0\n",
        ))
        .compile(&Ctx::new(TypeTable::new(&types)))
        .unwrap();
    assert!(compiled
        .warnings
        .iter()
        .any(|w| w.message.contains("does not cover")));
}

#[test]
fn unknown_variant_rejected() {
    let types = mode_enum();
    let errors = PouBuilder::function_block("Sel")
        .var("mode", VarSpec::input(Type::Enum("Mode".to_string())))
        .var("y", VarSpec::output(Type::DINT))
        .logic(concat!(
            "match self.mode:\n",
            "    case Mode.SLEEP:\n",
            "        self.y = 0\n",
        ))
        .compile(&Ctx::new(TypeTable::new(&types)))
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::NameUnresolved));
}

// ============================================================================
// ADVISORY ANALYSES
// ============================================================================

#[test]
fn output_unassigned_on_some_path_warns() {
    let compiled = compile(
        PouBuilder::function_block("Partial")
            .var("cmd", VarSpec::input(Type::BOOL))
            .var("y", VarSpec::output(Type::BOOL))
            .logic("if self.cmd:\n    self.y = True\n"),
    )
    .unwrap();
    assert!(compiled
        .warnings
        .iter()
        .any(|w| w.message.contains("'y'")));
}

#[test]
fn output_assigned_on_all_paths_is_clean() {
    let compiled = compile(
        PouBuilder::function_block("Total")
            .var("cmd", VarSpec::input(Type::BOOL))
            .var("y", VarSpec::output(Type::BOOL))
            .logic("if self.cmd:\n    self.y = True\nelse:\n    self.y = False\n"),
    )
    .unwrap();
    assert!(compiled.warnings.is_empty());
}

#[test]
fn duplicate_declaration_rejected() {
    let errors = compile(
        PouBuilder::function_block("Dup")
            .var("x", VarSpec::input(Type::BOOL))
            .var("x", VarSpec::output(Type::BOOL))
            .logic("self.x = True\n"),
    )
    .unwrap_err();
    assert!(errors.has_kind(ErrorKind::DuplicateName));
}
