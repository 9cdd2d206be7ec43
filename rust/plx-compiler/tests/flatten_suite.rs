//! Inheritance flattening tests: body inlining at super().logic(),
//! declaration merge order, duplicate rejection, and cycle detection.

use plx_compiler::{flatten_pou, Ctx, ErrorKind, PouBuilder, VarSpec};
use plx_core::pou::{BlockRole, Pou, PouBody, PouKind};
use plx_core::types::{Type, TypeTable};
use std::collections::HashMap;

fn base_pou(ctx: &Ctx<'_>) -> Pou {
    PouBuilder::function_block("Base")
        .var("go", VarSpec::input(Type::BOOL))
        .var("out_a", VarSpec::output(Type::BOOL))
        .logic("self.out_a = self.go\n")
        .compile(ctx)
        .unwrap()
        .pou
}

#[test]
fn flattened_body_is_parent_then_child_additions() {
    let empty = Ctx::new(TypeTable::empty());
    let base = base_pou(&empty);

    let mut ctx = Ctx::new(TypeTable::empty());
    ctx.pous.insert("Base", &base);
    let child = PouBuilder::function_block("Child")
        .parent("Base")
        .var("out_b", VarSpec::output(Type::BOOL))
        .logic("super().logic()\nself.out_b = self.go\n")
        .compile(&ctx)
        .unwrap()
        .pou;

    let by_name: HashMap<&str, &Pou> = [("Base", &base), ("Child", &child)]
        .into_iter()
        .collect();
    let flat = flatten_pou(&child, &by_name).unwrap();

    assert!(flat.parent.is_none());
    let flat_stmts = flat.statements().unwrap();
    let base_stmts = base.statements().unwrap();
    let child_stmts = child.statements().unwrap();
    // Parent body replaces the super call in place; the child's own
    // addition follows unchanged.
    assert_eq!(flat_stmts.len(), base_stmts.len() + child_stmts.len() - 1);
    assert_eq!(&flat_stmts[..base_stmts.len()], base_stmts);
    assert_eq!(flat_stmts[base_stmts.len()..], child_stmts[1..]);

    // Parent declarations merge ahead of the child's within each role.
    let outputs = flat.block(BlockRole::Output).unwrap();
    let names: Vec<&str> = outputs.vars.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["out_a", "out_b"]);
    assert!(flat
        .block(BlockRole::Input)
        .is_some_and(|b| b.vars[0].name == "go"));
}

#[test]
fn grandparent_chain_flattens_root_first() {
    let empty = Ctx::new(TypeTable::empty());
    let base = base_pou(&empty);

    let mut ctx_mid = Ctx::new(TypeTable::empty());
    ctx_mid.pous.insert("Base", &base);
    let mid = PouBuilder::function_block("Mid")
        .parent("Base")
        .var("out_b", VarSpec::output(Type::BOOL))
        .logic("super().logic()\nself.out_b = self.out_a\n")
        .compile(&ctx_mid)
        .unwrap()
        .pou;

    let mut ctx_leaf = Ctx::new(TypeTable::empty());
    ctx_leaf.pous.insert("Base", &base);
    ctx_leaf.pous.insert("Mid", &mid);
    let leaf = PouBuilder::function_block("Leaf")
        .parent("Mid")
        .var("out_c", VarSpec::output(Type::BOOL))
        .logic("super().logic()\nself.out_c = self.out_b\n")
        .compile(&ctx_leaf)
        .unwrap()
        .pou;

    let by_name: HashMap<&str, &Pou> =
        [("Base", &base), ("Mid", &mid), ("Leaf", &leaf)]
            .into_iter()
            .collect();
    let flat = flatten_pou(&leaf, &by_name).unwrap();
    let outputs = flat.block(BlockRole::Output).unwrap();
    let names: Vec<&str> = outputs.vars.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["out_a", "out_b", "out_c"]);
    assert_eq!(flat.statements().unwrap().len(), 3);
}

#[test]
fn child_redeclaring_parent_variable_rejected_at_compile() {
    let empty = Ctx::new(TypeTable::empty());
    let base = base_pou(&empty);

    let mut ctx = Ctx::new(TypeTable::empty());
    ctx.pous.insert("Base", &base);
    let errors = PouBuilder::function_block("Child")
        .parent("Base")
        .var("go", VarSpec::input(Type::BOOL))
        .logic("super().logic()\n")
        .compile(&ctx)
        .unwrap_err();
    assert!(errors.has_kind(ErrorKind::DuplicateName));
}

#[test]
fn inheritance_cycle_rejected() {
    fn bare_fb(name: &str, parent: &str) -> Pou {
        Pou {
            name: name.to_string(),
            kind: PouKind::FunctionBlock,
            parent: Some(parent.to_string()),
            blocks: vec![],
            body: PouBody::empty(),
            methods: vec![],
            fingerprint: None,
        }
    }
    let a = bare_fb("A", "B");
    let b = bare_fb("B", "A");
    let by_name: HashMap<&str, &Pou> = [("A", &a), ("B", &b)].into_iter().collect();
    let errors = flatten_pou(&a, &by_name).unwrap_err();
    assert!(errors.has_kind(ErrorKind::InheritanceCycle));
}

#[test]
fn colliding_synthesized_instances_renamed() {
    let empty = Ctx::new(TypeTable::empty());
    let base = PouBuilder::function_block("Base")
        .var("go", VarSpec::input(Type::BOOL))
        .var("slow", VarSpec::output(Type::BOOL))
        .logic("self.slow = delayed(self.go, seconds=1)\n")
        .compile(&empty)
        .unwrap()
        .pou;

    let mut ctx = Ctx::new(TypeTable::empty());
    ctx.pous.insert("Base", &base);
    let child = PouBuilder::function_block("Child")
        .parent("Base")
        .var("slower", VarSpec::output(Type::BOOL))
        .logic("super().logic()\nself.slower = delayed(self.go, seconds=2)\n")
        .compile(&ctx)
        .unwrap()
        .pou;

    let by_name: HashMap<&str, &Pou> = [("Base", &base), ("Child", &child)]
        .into_iter()
        .collect();
    let flat = flatten_pou(&child, &by_name).unwrap();
    let locals: Vec<&str> = flat
        .block(BlockRole::Local)
        .unwrap()
        .vars
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert!(locals.contains(&"__base__ton_0"));
    assert!(locals.contains(&"__ton_0"));
}
