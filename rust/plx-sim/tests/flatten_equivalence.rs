//! Behavioral equivalence under inheritance flattening: a child with a
//! parent link and the flattened rendition produce the same observable
//! traces for the same input and tick schedule.

use plx_compiler::{flatten_pou, Ctx, PouBuilder, VarSpec};
use plx_core::pou::Pou;
use plx_core::time::IecDuration;
use plx_core::types::{Type, TypeTable};
use plx_core::value::Value;
use plx_sim::{simulate, Controller};
use plx_sim::state::SimCtx;
use std::collections::HashMap;

fn build_family() -> (Pou, Pou) {
    let empty = Ctx::new(TypeTable::empty());
    let base = PouBuilder::function_block("Base")
        .var("go", VarSpec::input(Type::BOOL))
        .var("slow", VarSpec::output(Type::BOOL))
        .logic("self.slow = delayed(self.go, seconds=2)\n")
        .compile(&empty)
        .unwrap()
        .pou;

    let mut ctx = Ctx::new(TypeTable::empty());
    ctx.pous.insert("Base", &base);
    let child = PouBuilder::function_block("Child")
        .parent("Base")
        .var("edge", VarSpec::output(Type::BOOL))
        .logic("super().logic()\nself.edge = rising(self.go)\n")
        .compile(&ctx)
        .unwrap()
        .pou;

    (base, child)
}

fn drive(controller: &mut Controller<'_>) -> Vec<Vec<(String, Value)>> {
    let mut trace = Vec::new();
    let schedule: [(bool, i64); 6] = [
        (true, 0),
        (true, 1),
        (true, 1),
        (false, 1),
        (true, 0),
        (true, 3),
    ];
    for (go, tick_seconds) in schedule {
        controller.set_input("go", Value::Bool(go)).unwrap();
        if tick_seconds > 0 {
            controller
                .tick(IecDuration::from_seconds(tick_seconds))
                .unwrap();
        }
        controller.scan().unwrap();
        let mut snapshot = controller.snapshot();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        trace.push(snapshot);
    }
    trace
}

#[test]
fn flattened_and_unflattened_traces_match() {
    let (base, child) = build_family();

    let by_name: HashMap<&str, &Pou> = [("Base", &base), ("Child", &child)]
        .into_iter()
        .collect();
    let flat = flatten_pou(&child, &by_name).unwrap();
    assert!(flat.parent.is_none());

    let unflattened_trace = {
        let ctx = SimCtx::new(TypeTable::empty(), [&base, &child]);
        let mut controller = Controller::new(&child, ctx).unwrap();
        drive(&mut controller)
    };
    let flattened_trace = {
        let mut controller = simulate(&flat).unwrap();
        drive(&mut controller)
    };
    assert_eq!(unflattened_trace, flattened_trace);
}

#[test]
fn flattened_outputs_match_at_every_step() {
    let (base, child) = build_family();
    let by_name: HashMap<&str, &Pou> = [("Base", &base), ("Child", &child)]
        .into_iter()
        .collect();
    let flat = flatten_pou(&child, &by_name).unwrap();

    let ctx = SimCtx::new(TypeTable::empty(), [&base, &child]);
    let mut original = Controller::new(&child, ctx).unwrap();
    let mut flattened = simulate(&flat).unwrap();

    for step in 0..8 {
        let go = step % 3 != 2;
        original.set_input("go", Value::Bool(go)).unwrap();
        flattened.set_input("go", Value::Bool(go)).unwrap();
        original.tick(IecDuration::from_millis(900)).unwrap();
        flattened.tick(IecDuration::from_millis(900)).unwrap();
        original.scan().unwrap();
        flattened.scan().unwrap();
        assert_eq!(original.get("slow"), flattened.get("slow"));
        assert_eq!(original.get("edge"), flattened.get("edge"));
    }
}
