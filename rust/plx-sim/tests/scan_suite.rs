//! Scan-cycle scenarios over lowered POUs: timers, edges, counters, SFC
//! stepping, determinism, and runtime faults.

use plx_compiler::{ChartBuilder, Ctx, PouBuilder, VarSpec};
use plx_core::pou::Pou;
use plx_core::time::IecDuration;
use plx_core::types::{Dimension, Type, TypeTable};
use plx_core::value::Value;
use plx_sim::{simulate, FaultKind};

fn compile(builder: PouBuilder) -> Pou {
    builder
        .compile(&Ctx::new(TypeTable::empty()))
        .expect("compile")
        .pou
}

fn seconds(s: i64) -> IecDuration {
    IecDuration::from_seconds(s)
}

// ============================================================================
// TIMERS
// ============================================================================

#[test]
fn motor_delay_scenario() {
    let pou = compile(
        PouBuilder::function_block("Motor")
            .var("cmd", VarSpec::input(Type::BOOL))
            .var("running", VarSpec::output(Type::BOOL))
            .logic("self.running = delayed(self.cmd, seconds=5)\n"),
    );
    let mut motor = simulate(&pou).unwrap();

    motor.set_input("cmd", Value::Bool(true)).unwrap();
    motor.scan().unwrap();
    assert_eq!(motor.get("running"), Some(Value::Bool(false)));

    motor.tick(seconds(5)).unwrap();
    motor.scan().unwrap();
    assert_eq!(motor.get("running"), Some(Value::Bool(true)));

    motor.set_input("cmd", Value::Bool(false)).unwrap();
    motor.scan().unwrap();
    assert_eq!(motor.get("running"), Some(Value::Bool(false)));
}

#[test]
fn zero_preset_fires_on_the_rising_scan() {
    let pou = compile(
        PouBuilder::function_block("Fast")
            .var("cmd", VarSpec::input(Type::BOOL))
            .var("q", VarSpec::output(Type::BOOL))
            .logic("self.q = delayed(self.cmd, seconds=0)\n"),
    );
    let mut fast = simulate(&pou).unwrap();
    fast.set_input("cmd", Value::Bool(true)).unwrap();
    fast.scan().unwrap();
    assert_eq!(fast.get("q"), Some(Value::Bool(true)));
}

#[test]
fn valve_fault_scenario() {
    let builder = || {
        compile(
            PouBuilder::function_block("Valve")
                .var("cmd_open", VarSpec::input(Type::BOOL))
                .var("feedback", VarSpec::input(Type::BOOL))
                .var("fault", VarSpec::output(Type::BOOL))
                .logic("self.fault = delayed(self.cmd_open and not self.feedback, seconds=3)\n"),
        )
    };

    // No feedback: fault after three seconds of ticks.
    let pou = builder();
    let mut valve = simulate(&pou).unwrap();
    valve.set_input("cmd_open", Value::Bool(true)).unwrap();
    valve.scan().unwrap();
    assert_eq!(valve.get("fault"), Some(Value::Bool(false)));
    valve.tick(seconds(3)).unwrap();
    valve.scan().unwrap();
    assert_eq!(valve.get("fault"), Some(Value::Bool(true)));

    // Feedback arrives within the window: fault stays false forever.
    let pou = builder();
    let mut valve = simulate(&pou).unwrap();
    valve.set_input("cmd_open", Value::Bool(true)).unwrap();
    valve.scan().unwrap();
    valve.tick(seconds(1)).unwrap();
    valve.set_input("feedback", Value::Bool(true)).unwrap();
    valve.scan().unwrap();
    for _ in 0..5 {
        valve.tick(seconds(10)).unwrap();
        valve.scan().unwrap();
        assert_eq!(valve.get("fault"), Some(Value::Bool(false)));
    }
}

#[test]
fn sustained_keeps_output_through_dropout() {
    let pou = compile(
        PouBuilder::function_block("Hold")
            .var("cmd", VarSpec::input(Type::BOOL))
            .var("q", VarSpec::output(Type::BOOL))
            .logic("self.q = sustained(self.cmd, seconds=2)\n"),
    );
    let mut hold = simulate(&pou).unwrap();
    hold.set_input("cmd", Value::Bool(true)).unwrap();
    hold.scan().unwrap();
    assert_eq!(hold.get("q"), Some(Value::Bool(true)));

    hold.set_input("cmd", Value::Bool(false)).unwrap();
    hold.scan().unwrap();
    assert_eq!(hold.get("q"), Some(Value::Bool(true)));

    hold.tick(seconds(2)).unwrap();
    hold.scan().unwrap();
    assert_eq!(hold.get("q"), Some(Value::Bool(false)));
}

// ============================================================================
// EDGES AND COUNTERS
// ============================================================================

#[test]
fn rising_edge_lasts_exactly_one_scan() {
    let pou = compile(
        PouBuilder::function_block("Edge")
            .var("x", VarSpec::input(Type::BOOL))
            .var("p", VarSpec::output(Type::BOOL))
            .logic("self.p = rising(self.x)\n"),
    );
    let mut edge = simulate(&pou).unwrap();

    edge.set_input("x", Value::Bool(false)).unwrap();
    edge.scan().unwrap();
    assert_eq!(edge.get("p"), Some(Value::Bool(false)));

    edge.set_input("x", Value::Bool(true)).unwrap();
    edge.scan().unwrap();
    assert_eq!(edge.get("p"), Some(Value::Bool(true)));

    edge.scan().unwrap();
    assert_eq!(edge.get("p"), Some(Value::Bool(false)));
}

#[test]
fn counter_counts_rising_edges_and_clamps() {
    let pou = compile(
        PouBuilder::function_block("Count")
            .var("clk", VarSpec::input(Type::BOOL))
            .var("rst", VarSpec::input(Type::BOOL))
            .var("done", VarSpec::output(Type::BOOL))
            .logic("self.done = count_up(self.clk, self.rst, 3)\n"),
    );
    let mut counter = simulate(&pou).unwrap();

    for pulse in 1i16..=5 {
        counter.set_input("clk", Value::Bool(true)).unwrap();
        counter.scan().unwrap();
        counter.set_input("clk", Value::Bool(false)).unwrap();
        counter.scan().unwrap();
        let cv = counter.get_path(&["__ctu_0", "CV"]).unwrap();
        assert_eq!(cv, Value::Int(pulse.min(3)));
    }
    assert_eq!(counter.get("done"), Some(Value::Bool(true)));

    counter.set_input("rst", Value::Bool(true)).unwrap();
    counter.scan().unwrap();
    assert_eq!(counter.get_path(&["__ctu_0", "CV"]), Some(Value::Int(0)));
    assert_eq!(counter.get("done"), Some(Value::Bool(false)));
}

// ============================================================================
// SFC
// ============================================================================

fn batch_pou() -> Pou {
    compile(
        PouBuilder::program("Batch")
            .var("cmd_start", VarSpec::input(Type::BOOL))
            .var("fill_done", VarSpec::input(Type::BOOL))
            .var("mixer", VarSpec::output(Type::BOOL))
            .var("mix_timer", VarSpec::fb("TON"))
            .chart(
                ChartBuilder::new()
                    .initial_step(
                        "idle",
                        concat!(
                            "self.mixer = False\n",
                            "self.mix_timer(IN=False, PT=duration(seconds=30))\n",
                        ),
                    )
                    .step("fill", "")
                    .step(
                        "mix",
                        concat!(
                            "self.mixer = True\n",
                            "self.mix_timer(IN=True, PT=duration(seconds=30))\n",
                        ),
                    )
                    .transition("idle", "fill", "self.cmd_start")
                    .transition("fill", "mix", "self.fill_done")
                    .transition("mix", "idle", "self.mix_timer.Q"),
            ),
    )
}

#[test]
fn batch_chart_scenario() {
    let pou = batch_pou();
    let mut batch = simulate(&pou).unwrap();

    batch.set_input("cmd_start", Value::Bool(true)).unwrap();
    batch.scan().unwrap();
    assert_eq!(batch.active_step(), Some("fill"));

    batch.set_input("fill_done", Value::Bool(true)).unwrap();
    batch.scan().unwrap();
    assert_eq!(batch.active_step(), Some("mix"));
    assert_eq!(batch.get("mixer"), Some(Value::Bool(true)));

    batch.tick(seconds(30)).unwrap();
    batch.set_input("cmd_start", Value::Bool(false)).unwrap();
    batch.scan().unwrap();
    assert_eq!(batch.active_step(), Some("idle"));
    assert_eq!(batch.get("mixer"), Some(Value::Bool(false)));
}

#[test]
fn transitions_resolve_in_declaration_order() {
    let pou = compile(
        PouBuilder::program("Race")
            .var("go", VarSpec::input(Type::BOOL))
            .var("winner", VarSpec::output(Type::DINT))
            .chart(
                ChartBuilder::new()
                    .initial_step("start", "self.winner = 0")
                    .step("a", "self.winner = 1")
                    .step("b", "self.winner = 2")
                    .transition("start", "a", "self.go")
                    .transition("start", "b", "self.go")
                    .transition("a", "start", "not self.go")
                    .transition("b", "start", "not self.go"),
            ),
    );
    let mut race = simulate(&pou).unwrap();
    race.set_input("go", Value::Bool(true)).unwrap();
    race.scan().unwrap();
    assert_eq!(race.active_step(), Some("a"));
    assert_eq!(race.get("winner"), Some(Value::DInt(1)));
}

// ============================================================================
// DETERMINISM
// ============================================================================

#[test]
fn identical_schedules_produce_identical_traces() {
    let run = || -> Vec<Vec<(String, Value)>> {
        let pou = batch_pou();
        let mut batch = simulate(&pou).unwrap();
        let mut trace = Vec::new();
        batch.set_input("cmd_start", Value::Bool(true)).unwrap();
        batch.scan().unwrap();
        trace.push(batch.snapshot());
        batch.set_input("fill_done", Value::Bool(true)).unwrap();
        batch.scan().unwrap();
        trace.push(batch.snapshot());
        for _ in 0..4 {
            batch.tick(IecDuration::from_millis(7_500)).unwrap();
            batch.scan().unwrap();
            trace.push(batch.snapshot());
        }
        trace
    };
    assert_eq!(run(), run());
}

// ============================================================================
// FAULTS AND STAGING
// ============================================================================

#[test]
fn division_by_zero_aborts_scan_and_keeps_outputs() {
    let pou = compile(
        PouBuilder::function_block("Div")
            .var("num", VarSpec::input(Type::DINT))
            .var("den", VarSpec::input(Type::DINT))
            .var("q", VarSpec::output(Type::DINT))
            .logic("self.q = self.num / self.den\n"),
    );
    let mut div = simulate(&pou).unwrap();
    div.set_input("num", Value::DInt(10)).unwrap();
    div.set_input("den", Value::DInt(2)).unwrap();
    div.scan().unwrap();
    assert_eq!(div.get("q"), Some(Value::DInt(5)));

    div.set_input("den", Value::DInt(0)).unwrap();
    let fault = div.scan().unwrap_err();
    assert_eq!(fault.kind, FaultKind::DivisionByZero);
    // The previous scan's output snapshot stays observable.
    assert_eq!(div.get("q"), Some(Value::DInt(5)));
}

#[test]
fn out_of_range_subscript_faults() {
    let pou = compile(
        PouBuilder::function_block("Arr")
            .var("i", VarSpec::input(Type::DINT))
            .var(
                "data",
                VarSpec::stat(Type::array(
                    Type::DINT,
                    vec![Dimension::new(0, 3).unwrap()],
                )),
            )
            .var("q", VarSpec::output(Type::DINT))
            .logic("self.q = self.data[self.i]\n"),
    );
    let mut arr = simulate(&pou).unwrap();
    arr.set_input("i", Value::DInt(2)).unwrap();
    arr.scan().unwrap();

    arr.set_input("i", Value::DInt(9)).unwrap();
    let fault = arr.scan().unwrap_err();
    assert_eq!(fault.kind, FaultKind::IndexOutOfRange);
}

#[test]
fn staging_is_type_checked() {
    let pou = compile(
        PouBuilder::function_block("Motor")
            .var("cmd", VarSpec::input(Type::BOOL))
            .var("running", VarSpec::output(Type::BOOL))
            .logic("self.running = self.cmd\n"),
    );
    let mut motor = simulate(&pou).unwrap();
    assert!(motor.set_input("cmd", Value::DInt(1)).is_err());
    assert!(motor.set_input("running", Value::Bool(true)).is_err());
    assert!(motor.set_input("cmd", Value::Bool(true)).is_ok());
}

#[test]
fn outputs_before_first_scan_show_initial_values() {
    let pou = compile(
        PouBuilder::function_block("Init")
            .var("q", VarSpec::output(Type::DINT).init(Value::DInt(7)))
            .logic("self.q = 1\n"),
    );
    let motor = simulate(&pou).unwrap();
    assert_eq!(motor.get("q"), Some(Value::DInt(7)));
}

#[test]
fn for_loop_accumulates() {
    let pou = compile(
        PouBuilder::function_block("Sum")
            .var("total", VarSpec::output(Type::DINT))
            .logic(concat!(
                "self.total = 0\n",
                "for i in range(1, 6):\n",
                "    self.total = self.total + i\n",
            )),
    );
    let mut sum = simulate(&pou).unwrap();
    sum.scan().unwrap();
    assert_eq!(sum.get("total"), Some(Value::DInt(15)));
}
