//! Lowering tests: syntax mapping, sentinel expansion with stable
//! instance names, determinism, and rejection of constructs outside the
//! accepted subset.

use plx_compiler::{Ctx, ErrorKind, PouBuilder, VarSpec};
use plx_core::ir::{CaseLabel, ExprKind, PathSegment, StmtKind};
use plx_core::pou::{BlockRole, Pou};
use plx_core::types::{Type, TypeTable};

fn motor_builder() -> PouBuilder {
    PouBuilder::function_block("Motor")
        .var("cmd", VarSpec::input(Type::BOOL))
        .var("running", VarSpec::output(Type::BOOL))
        .logic("self.running = delayed(self.cmd, seconds=5)\n")
}

fn compile(builder: PouBuilder) -> Pou {
    let ctx = Ctx::new(TypeTable::empty());
    builder.compile(&ctx).expect("compile").pou
}

fn expect_error(builder: PouBuilder) -> plx_compiler::CompileErrors {
    let ctx = Ctx::new(TypeTable::empty());
    match builder.compile(&ctx) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(errors) => errors,
    }
}

// ============================================================================
// SENTINEL EXPANSION
// ============================================================================

#[test]
fn delayed_expands_to_ton_invocation() {
    let pou = compile(motor_builder());
    let stmts = pou.statements().unwrap();
    assert_eq!(stmts.len(), 2);

    let StmtKind::InvokeFb { instance, inputs } = &stmts[0].kind else {
        panic!("expected a TON invocation first");
    };
    assert_eq!(instance.root(), Some("__ton_0"));
    assert_eq!(inputs[0].0, "IN");
    assert_eq!(inputs[1].0, "PT");

    let StmtKind::Assign { target, value } = &stmts[1].kind else {
        panic!("expected the assignment second");
    };
    assert_eq!(target.root(), Some("running"));
    let ExprKind::Variable(path) = &value.kind else {
        panic!("expected a Q read");
    };
    assert_eq!(path.to_string(), "__ton_0.Q");
}

#[test]
fn synthesized_instance_lands_in_static_block() {
    let pou = compile(motor_builder());
    let block = pou.block(BlockRole::Local).expect("static block");
    assert_eq!(block.vars.len(), 1);
    assert_eq!(block.vars[0].name, "__ton_0");
    assert_eq!(block.vars[0].ty, Type::Fb("TON".to_string()));
}

#[test]
fn sentinel_names_count_per_kind_in_source_order() {
    let pou = compile(
        PouBuilder::function_block("Edges")
            .var("a", VarSpec::input(Type::BOOL))
            .var("b", VarSpec::input(Type::BOOL))
            .var("x", VarSpec::output(Type::BOOL))
            .var("y", VarSpec::output(Type::BOOL))
            .var("z", VarSpec::output(Type::BOOL))
            .logic(concat!(
                "self.x = delayed(self.a, seconds=1)\n",
                "self.y = rising(self.b)\n",
                "self.z = delayed(self.b, seconds=2)\n",
            )),
    );
    let names: Vec<&str> = pou
        .block(BlockRole::Local)
        .unwrap()
        .vars
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(names, vec!["__ton_0", "__rtrig_0", "__ton_1"]);
}

#[test]
fn relowering_is_deterministic() {
    let first = compile(motor_builder());
    let second = compile(motor_builder());
    assert_eq!(first, second);
    assert!(first.fingerprint.is_some());
    assert_eq!(first.fingerprint, second.fingerprint);
}

#[test]
fn sentinels_rejected_in_functions() {
    let errors = expect_error(
        PouBuilder::function("Bad", Type::BOOL)
            .var("x", VarSpec::input(Type::BOOL))
            .logic("return delayed(self.x, seconds=1)\n"),
    );
    assert!(errors.has_kind(ErrorKind::SyntaxUnsupported));
}

#[test]
fn timer_without_preset_rejected() {
    let errors = expect_error(
        PouBuilder::function_block("Bad")
            .var("x", VarSpec::input(Type::BOOL))
            .var("y", VarSpec::output(Type::BOOL))
            .logic("self.y = delayed(self.x)\n"),
    );
    assert!(errors.has_kind(ErrorKind::InvalidLiteral));
}

// ============================================================================
// SYNTAX MAPPING
// ============================================================================

#[test]
fn range_loop_gets_inclusive_bound() {
    let pou = compile(
        PouBuilder::function_block("Loop")
            .var("total", VarSpec::output(Type::DINT))
            .logic(concat!(
                "self.total = 0\n",
                "for i in range(0, 10):\n",
                "    self.total = self.total + i\n",
            )),
    );
    let stmts = pou.statements().unwrap();
    let StmtKind::For { var, to, .. } = &stmts[1].kind else {
        panic!("expected a for loop");
    };
    assert_eq!(var, "i");
    assert_eq!(to.const_int(), Some(9));
    // The induction variable is synthesized as a temp.
    assert!(pou
        .block(BlockRole::Temp)
        .is_some_and(|b| b.vars.iter().any(|d| d.name == "i")));
}

#[test]
fn match_lowers_to_case_with_default() {
    let pou = compile(
        PouBuilder::function_block("Sel")
            .var("n", VarSpec::input(Type::DINT))
            .var("y", VarSpec::output(Type::DINT))
            .logic(concat!(
                "match self.n:\n",
                "    case 1 | 2:\n",
                "        self.y = 10\n",
                "    case 3:\n",
                "        self.y = 30\n",
                "    case _:\n",
                "        self.y = 0\n",
            )),
    );
    let stmts = pou.statements().unwrap();
    let StmtKind::Case { arms, default, .. } = &stmts[0].kind else {
        panic!("expected a case statement");
    };
    assert_eq!(arms.len(), 2);
    assert_eq!(arms[0].labels, vec![CaseLabel::Int(1), CaseLabel::Int(2)]);
    assert!(default.is_some());
}

#[test]
fn boolean_operators_short_circuit_shape() {
    let pou = compile(
        PouBuilder::function_block("Logic")
            .var("a", VarSpec::input(Type::BOOL))
            .var("b", VarSpec::input(Type::BOOL))
            .var("c", VarSpec::input(Type::BOOL))
            .var("y", VarSpec::output(Type::BOOL))
            .logic("self.y = self.a and self.b or not self.c\n"),
    );
    let stmts = pou.statements().unwrap();
    let StmtKind::Assign { value, .. } = &stmts[0].kind else {
        panic!("expected assign");
    };
    let ExprKind::Binary { op, .. } = &value.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, plx_core::ir::BinaryOp::Or);
}

#[test]
fn subscript_chain_becomes_index_segment() {
    let pou = compile(
        PouBuilder::function_block("Arr")
            .var(
                "data",
                VarSpec::stat(Type::array(
                    Type::DINT,
                    vec![plx_core::types::Dimension::new(0, 4).unwrap()],
                )),
            )
            .var("y", VarSpec::output(Type::DINT))
            .logic("self.y = self.data[2]\n"),
    );
    let stmts = pou.statements().unwrap();
    let StmtKind::Assign { value, .. } = &stmts[0].kind else {
        panic!("expected assign");
    };
    let ExprKind::Variable(path) = &value.kind else {
        panic!("expected a path read");
    };
    assert!(matches!(path.segments[1], PathSegment::Index(_)));
}

#[test]
fn super_call_lowered_as_marker() {
    let ctx_base = Ctx::new(TypeTable::empty());
    let base = PouBuilder::function_block("Base")
        .var("go", VarSpec::input(Type::BOOL))
        .var("out_a", VarSpec::output(Type::BOOL))
        .logic("self.out_a = self.go\n")
        .compile(&ctx_base)
        .unwrap()
        .pou;

    let mut ctx = Ctx::new(TypeTable::empty());
    ctx.pous.insert("Base", &base);
    let child = PouBuilder::function_block("Child")
        .parent("Base")
        .var("out_b", VarSpec::output(Type::BOOL))
        .logic("super().logic()\nself.out_b = self.go\n")
        .compile(&ctx)
        .unwrap()
        .pou;
    let stmts = child.statements().unwrap();
    assert!(matches!(stmts[0].kind, StmtKind::SuperCall));
}

// ============================================================================
// REJECTIONS
// ============================================================================

#[test]
fn unknown_variable_is_name_unresolved() {
    let errors = expect_error(
        PouBuilder::function_block("Bad")
            .var("y", VarSpec::output(Type::BOOL))
            .logic("self.y = self.missing\n"),
    );
    assert!(errors.has_kind(ErrorKind::NameUnresolved));
}

#[test]
fn bare_name_assignment_rejected() {
    let errors = expect_error(
        PouBuilder::function_block("Bad")
            .var("y", VarSpec::output(Type::DINT))
            .logic("tmp = 1\n"),
    );
    assert!(errors.has_kind(ErrorKind::SyntaxUnsupported));
}

#[test]
fn chained_comparison_rejected() {
    let errors = expect_error(
        PouBuilder::function_block("Bad")
            .var("n", VarSpec::input(Type::DINT))
            .var("y", VarSpec::output(Type::BOOL))
            .logic("self.y = 1 < self.n < 5\n"),
    );
    assert!(errors.has_kind(ErrorKind::SyntaxUnsupported));
}

#[test]
fn non_range_iteration_rejected() {
    let errors = expect_error(
        PouBuilder::function_block("Bad")
            .var("y", VarSpec::output(Type::DINT))
            .logic("for x in self.y:\n    pass\n"),
    );
    assert!(errors.has_kind(ErrorKind::SyntaxUnsupported));
}

#[test]
fn super_without_parent_rejected() {
    let errors = expect_error(
        PouBuilder::function_block("Orphan")
            .var("y", VarSpec::output(Type::BOOL))
            .logic("super().logic()\nself.y = True\n"),
    );
    assert!(errors.has_kind(ErrorKind::NameUnresolved));
}

#[test]
fn return_outside_function_rejected() {
    let errors = expect_error(
        PouBuilder::function_block("Bad")
            .var("y", VarSpec::output(Type::BOOL))
            .logic("self.y = True\nreturn\n"),
    );
    assert!(errors.has_kind(ErrorKind::SyntaxUnsupported));
}

#[test]
fn missing_source_is_source_unavailable() {
    let errors = expect_error(
        PouBuilder::function_block("Empty").var("y", VarSpec::output(Type::BOOL)),
    );
    assert!(errors.has_kind(ErrorKind::SourceUnavailable));
}

#[test]
fn errors_are_collected_per_pou() {
    let errors = expect_error(
        PouBuilder::function_block("Bad")
            .var("y", VarSpec::output(Type::BOOL))
            .logic("self.y = self.a\nself.z = True\n"),
    );
    // Both unresolved names surface in one batch.
    assert!(errors.len() >= 2);
    assert!(errors.has_kind(ErrorKind::NameUnresolved));
}
