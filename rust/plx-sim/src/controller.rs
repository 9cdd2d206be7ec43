//! The controller: owns one top-level POU instance, stages inputs,
//! executes scans against the virtual clock, and publishes outputs
//! copy-in/copy-out.

use crate::clock::VirtualClock;
use crate::eval::{self, FaultKind, RuntimeFault};
use crate::fb::StdFbState;
use crate::state::{self, SimCtx, Slot, UserInstance};
use plx_core::ir::{BinaryOp, CaseLabel, Expr, ExprKind, PathSegment, Stmt, StmtKind, VarPath};
use plx_core::pou::{BlockRole, Pou, PouBody, PouKind};
use plx_core::project::Project;
use plx_core::sfc::Chart;
use plx_core::time::IecDuration;
use plx_core::types::Type;
use plx_core::value::Value;

pub use crate::state::SimError;

/// Construct a controller over a standalone POU with no project context.
/// POUs that instantiate user function blocks or inherit need
/// [`Controller::new`] with a populated [`SimCtx`].
pub fn simulate(pou: &Pou) -> Result<Controller<'_>, SimError> {
    Controller::new(pou, SimCtx::empty())
}

pub struct Controller<'a> {
    pou: &'a Pou,
    ctx: SimCtx<'a>,
    clock: VirtualClock,
    state: UserInstance,
    staged: Vec<(String, Value)>,
    published: Vec<(String, Value)>,
}

impl<'a> Controller<'a> {
    pub fn new(pou: &'a Pou, ctx: SimCtx<'a>) -> Result<Self, SimError> {
        let state = UserInstance::instantiate(pou, &ctx)?;
        let mut controller = Self {
            pou,
            ctx,
            clock: VirtualClock::new(),
            state,
            staged: Vec::new(),
            published: Vec::new(),
        };
        controller.publish_outputs();
        Ok(controller)
    }

    /// Construct over a named POU of a validated project.
    pub fn from_project(project: &'a Project, pou_name: &str) -> Result<Self, SimError> {
        let pou = project
            .pou(pou_name)
            .ok_or_else(|| SimError::UnknownPou(pou_name.to_string()))?;
        Self::new(pou, SimCtx::from_project(project))
    }

    /// Stage an input value; it becomes visible to the body at the next
    /// scan and stays staged until restaged.
    pub fn set_input(&mut self, name: &str, value: Value) -> Result<(), SimError> {
        let found = state::ancestry(self.pou, &self.ctx)
            .into_iter()
            .find_map(|p| p.find_var(name));
        let Some((role, decl)) = found else {
            return Err(SimError::UnknownVariable(name.to_string()));
        };
        if role != BlockRole::Input {
            return Err(SimError::NotAnInput(name.to_string()));
        }
        if !stageable(&decl.ty, &value) {
            return Err(SimError::Incompatible {
                value: value.to_string(),
                ty: decl.ty.to_string(),
            });
        }
        if let Some(slot) = self.staged.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.staged.push((name.to_string(), value));
        }
        Ok(())
    }

    /// Advance the virtual clock. Does not run a scan.
    pub fn tick(&mut self, duration: IecDuration) -> Result<(), SimError> {
        self.clock.tick(duration)?;
        Ok(())
    }

    /// Execute one scan: sample inputs, run the body against the clock
    /// sample taken now, then publish outputs. A fault aborts the scan and
    /// leaves the previous outputs observable.
    pub fn scan(&mut self) -> Result<(), RuntimeFault> {
        let now = self.clock.now_ns();

        for (name, value) in &self.staged {
            let Some(slot) = self.state.slot_mut(name) else {
                return Err(RuntimeFault::new(FaultKind::UnknownVariable).pushed(name.clone()));
            };
            state::store(slot, value.clone())
                .map_err(|kind| RuntimeFault::new(kind).pushed(name.clone()))?;
        }
        self.state
            .reset_temps(self.pou, &self.ctx)
            .map_err(|_| RuntimeFault::new(FaultKind::TypeConfusion))?;

        exec_body(&self.ctx, now, self.pou, &mut self.state)
            .map_err(|fault| fault.pushed(format!("scan of {}", self.pou.name)))?;

        self.publish_outputs();
        Ok(())
    }

    /// Read a variable. Outputs reflect the snapshot published at the end
    /// of the last completed scan.
    pub fn get(&self, name: &str) -> Option<Value> {
        if self.state.role(name) == Some(BlockRole::Output) {
            return self
                .published
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone());
        }
        self.state.slot(name).and_then(Slot::to_value)
    }

    /// Read through nested instances by field names, e.g.
    /// `get_path(&["valve_timer", "Q"])`.
    pub fn get_path(&self, path: &[&str]) -> Option<Value> {
        let (first, rest) = path.split_first()?;
        if rest.is_empty() {
            return self.get(first);
        }
        let mut slot = self.state.slot(first)?;
        for (i, name) in rest.iter().enumerate() {
            let name: &str = name;
            match slot {
                Slot::Struct(fields) => {
                    slot = fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)?;
                }
                Slot::Instance(inst) => {
                    slot = inst.slot(name)?;
                }
                Slot::Std(state) => {
                    return if i + 1 == rest.len() {
                        state.pin(name)
                    } else {
                        None
                    };
                }
                Slot::Value(_) | Slot::Array { .. } => return None,
            }
        }
        slot.to_value()
    }

    /// All plain variables in declaration order; outputs come from the
    /// published snapshot. The basis for determinism traces.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.state
            .vars
            .iter()
            .filter_map(|(name, role, slot)| {
                let value = if *role == BlockRole::Output {
                    self.published
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v.clone())
                } else {
                    slot.to_value()
                };
                value.map(|v| (name.clone(), v))
            })
            .collect()
    }

    pub fn now_ns(&self) -> i64 {
        self.clock.now_ns()
    }

    /// Name of the active SFC step, for chart-bodied POUs.
    pub fn active_step(&self) -> Option<&str> {
        self.state.active_step.as_deref()
    }

    fn publish_outputs(&mut self) {
        self.published = self
            .state
            .vars
            .iter()
            .filter(|(_, role, _)| *role == BlockRole::Output)
            .filter_map(|(name, _, slot)| slot.to_value().map(|v| (name.clone(), v)))
            .collect();
    }
}

fn stageable(ty: &Type, value: &Value) -> bool {
    if value.coerce_to(ty).is_some() {
        return true;
    }
    match (ty, value) {
        (Type::String { max_len }, Value::String(s)) => s.len() as u32 <= *max_len,
        (Type::WString { max_len }, Value::WString(s)) => s.chars().count() as u32 <= *max_len,
        (Type::Elementary(e), v) if e.is_float() => v.convert_to(*e).is_some(),
        _ => false,
    }
}

// ── Execution engine ──

enum Flow {
    Normal,
    Return(Option<Value>),
}

fn exec_body<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
) -> Result<(), RuntimeFault> {
    match &pou.body {
        PouBody::Statements(stmts) => {
            exec_stmts(ctx, now, pou, inst, stmts)?;
            Ok(())
        }
        PouBody::Chart(chart) => exec_chart(ctx, now, pou, inst, chart),
    }
}

/// One scan of a chart: run the active step's actions, then fire at most
/// one outgoing transition (declaration order) and run the target's
/// actions in the same scan.
fn exec_chart<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    chart: &Chart,
) -> Result<(), RuntimeFault> {
    let active = match inst.active_step.clone() {
        Some(name) => name,
        None => {
            let initial = chart
                .initial_step()
                .ok_or_else(|| RuntimeFault::new(FaultKind::UnsupportedConstruct))?;
            inst.active_step = Some(initial.name.clone());
            initial.name.clone()
        }
    };
    let step = chart
        .step(&active)
        .ok_or_else(|| RuntimeFault::new(FaultKind::UnknownVariable).pushed(active.clone()))?;
    exec_stmts(ctx, now, pou, inst, &step.actions)?;

    let transitions: Vec<(String, &Expr)> = chart
        .outgoing(&active)
        .map(|t| (t.target.clone(), &t.condition))
        .collect();
    for (target, condition) in transitions {
        let fired = eval_expr(ctx, now, pou, inst, condition)?
            .as_bool()
            .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
        if fired {
            let target_step = chart
                .step(&target)
                .ok_or_else(|| RuntimeFault::new(FaultKind::UnknownVariable).pushed(target.clone()))?;
            inst.active_step = Some(target.clone());
            exec_stmts(ctx, now, pou, inst, &target_step.actions)?;
            break;
        }
    }
    Ok(())
}

fn exec_stmts<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    stmts: &[Stmt],
) -> Result<Flow, RuntimeFault> {
    for stmt in stmts {
        match exec_stmt(ctx, now, pou, inst, stmt)? {
            Flow::Normal => {}
            flow @ Flow::Return(_) => return Ok(flow),
        }
    }
    Ok(Flow::Normal)
}

fn exec_stmt<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    stmt: &Stmt,
) -> Result<Flow, RuntimeFault> {
    match &stmt.kind {
        StmtKind::Assign { target, value } => {
            let value = eval_expr(ctx, now, pou, inst, value)?;
            write_path(ctx, now, pou, inst, target, value)?;
            Ok(Flow::Normal)
        }
        StmtKind::If {
            branches,
            else_body,
        } => {
            for branch in branches {
                let taken = eval_expr(ctx, now, pou, inst, &branch.condition)?
                    .as_bool()
                    .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
                if taken {
                    return exec_stmts(ctx, now, pou, inst, &branch.body);
                }
            }
            exec_stmts(ctx, now, pou, inst, else_body)
        }
        StmtKind::Case {
            selector,
            arms,
            default,
        } => {
            let selector = eval_expr(ctx, now, pou, inst, selector)?;
            let selector = selector
                .as_int()
                .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
            for arm in arms {
                for label in &arm.labels {
                    let label_value = match label {
                        CaseLabel::Int(v) => *v,
                        CaseLabel::EnumVariant { type_name, variant } => ctx
                            .types
                            .enumeration(type_name)
                            .and_then(|def| def.variant(variant))
                            .map(|v| v.value)
                            .ok_or_else(|| {
                                RuntimeFault::new(FaultKind::UnknownVariable)
                                    .pushed(format!("{}#{}", type_name, variant))
                            })?,
                    };
                    if label_value == selector {
                        return exec_stmts(ctx, now, pou, inst, &arm.body);
                    }
                }
            }
            match default {
                Some(body) => exec_stmts(ctx, now, pou, inst, body),
                None => Ok(Flow::Normal),
            }
        }
        StmtKind::While { condition, body } => {
            loop {
                let go = eval_expr(ctx, now, pou, inst, condition)?
                    .as_bool()
                    .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
                if !go {
                    break;
                }
                if let flow @ Flow::Return(_) = exec_stmts(ctx, now, pou, inst, body)? {
                    return Ok(flow);
                }
            }
            Ok(Flow::Normal)
        }
        StmtKind::RepeatUntil { body, condition } => {
            loop {
                if let flow @ Flow::Return(_) = exec_stmts(ctx, now, pou, inst, body)? {
                    return Ok(flow);
                }
                let done = eval_expr(ctx, now, pou, inst, condition)?
                    .as_bool()
                    .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
                if done {
                    break;
                }
            }
            Ok(Flow::Normal)
        }
        StmtKind::For {
            var,
            from,
            to,
            step,
            body,
        } => {
            let from = int_operand(ctx, now, pou, inst, from)?;
            let to = int_operand(ctx, now, pou, inst, to)?;
            let step = match step {
                Some(step) => int_operand(ctx, now, pou, inst, step)?,
                None => 1,
            };
            if step == 0 {
                return Err(RuntimeFault::new(FaultKind::InvalidStep).pushed(var.clone()));
            }
            let mut i = from;
            while (step > 0 && i <= to) || (step < 0 && i >= to) {
                let path = VarPath::var(var.clone());
                write_path(ctx, now, pou, inst, &path, Value::DInt(i as i32))?;
                if let flow @ Flow::Return(_) = exec_stmts(ctx, now, pou, inst, body)? {
                    return Ok(flow);
                }
                i += step;
            }
            Ok(Flow::Normal)
        }
        StmtKind::InvokeFb { instance, inputs } => {
            invoke_fb(ctx, now, pou, inst, instance, inputs)?;
            Ok(Flow::Normal)
        }
        StmtKind::SuperCall => {
            let parent_name = pou
                .parent
                .as_deref()
                .ok_or_else(|| RuntimeFault::new(FaultKind::UnknownPou))?;
            let parent = ctx
                .pou(parent_name)
                .ok_or_else(|| RuntimeFault::new(FaultKind::UnknownPou).pushed(parent_name))?;
            let stmts = parent
                .statements()
                .ok_or_else(|| RuntimeFault::new(FaultKind::UnsupportedConstruct))?;
            exec_stmts(ctx, now, parent, inst, stmts)
        }
        StmtKind::Return(value) => {
            let value = match value {
                Some(expr) => Some(eval_expr(ctx, now, pou, inst, expr)?),
                None => None,
            };
            Ok(Flow::Return(value))
        }
        StmtKind::Empty => Ok(Flow::Normal),
    }
}

fn int_operand<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    expr: &Expr,
) -> Result<i64, RuntimeFault> {
    eval_expr(ctx, now, pou, inst, expr)?
        .as_int()
        .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))
}

fn invoke_fb<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    instance: &VarPath,
    inputs: &[(String, Expr)],
) -> Result<(), RuntimeFault> {
    let mut values = Vec::with_capacity(inputs.len());
    for (name, expr) in inputs {
        values.push((name.clone(), eval_expr(ctx, now, pou, inst, expr)?));
    }

    // Write-backs for in-out pins of user FBs, applied after the call.
    let mut writebacks: Vec<(VarPath, String)> = Vec::new();

    {
        let slot = resolve_slot_mut(ctx, now, pou, inst, instance)?;
        match slot {
            Slot::Std(state) => invoke_std(state, &values, now)?,
            Slot::Instance(user) => {
                let user_pou = ctx.pou(&user.type_name).ok_or_else(|| {
                    RuntimeFault::new(FaultKind::UnknownPou).pushed(user.type_name.clone())
                })?;
                for (name, value) in &values {
                    let target = user.slot_mut(name).ok_or_else(|| {
                        RuntimeFault::new(FaultKind::UnknownVariable).pushed(name.clone())
                    })?;
                    state::store(target, value.clone())
                        .map_err(|kind| RuntimeFault::new(kind).pushed(name.clone()))?;
                }
                user.reset_temps(user_pou, ctx)
                    .map_err(|_| RuntimeFault::new(FaultKind::TypeConfusion))?;
                exec_body(ctx, now, user_pou, user)?;
                for (name, _) in &values {
                    if user.role(name) == Some(BlockRole::InOut) {
                        if let Some((_, expr)) = inputs.iter().find(|(n, _)| n == name) {
                            if let ExprKind::Variable(path) = &expr.kind {
                                writebacks.push((path.clone(), name.clone()));
                            }
                        }
                    }
                }
            }
            _ => {
                return Err(
                    RuntimeFault::new(FaultKind::TypeConfusion).pushed(instance.to_string())
                )
            }
        }
    }

    for (caller_path, pin) in writebacks {
        let value = {
            let slot = resolve_slot_mut(ctx, now, pou, inst, instance)?;
            let Slot::Instance(user) = slot else {
                return Err(RuntimeFault::new(FaultKind::TypeConfusion));
            };
            user.slot(&pin)
                .and_then(Slot::to_value)
                .ok_or_else(|| RuntimeFault::new(FaultKind::UnknownVariable).pushed(pin.clone()))?
        };
        write_path(ctx, now, pou, inst, &caller_path, value)?;
    }
    Ok(())
}

fn invoke_std(
    state: &mut StdFbState,
    values: &[(String, Value)],
    now: i64,
) -> Result<(), RuntimeFault> {
    let find_bool = |name: &str| -> Result<Option<bool>, RuntimeFault> {
        match values.iter().find(|(n, _)| n == name) {
            Some((_, v)) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion).pushed(name)),
            None => Ok(None),
        }
    };
    match state {
        StdFbState::Timer(timer) => {
            let input = find_bool("IN")?;
            let pt = match values.iter().find(|(n, _)| n == "PT") {
                Some((_, v)) => Some(
                    v.as_duration()
                        .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion).pushed("PT"))?,
                ),
                None => None,
            };
            timer.invoke(input, pt, now);
        }
        StdFbState::Trig(trig) => {
            trig.invoke(find_bool("CLK")?);
        }
        StdFbState::Counter(counter) => {
            let (clk_pin, gate_pin) = if counter.up { ("CU", "R") } else { ("CD", "LD") };
            let clk = find_bool(clk_pin)?;
            let gate = find_bool(gate_pin)?;
            let pv = match values.iter().find(|(n, _)| n == "PV") {
                Some((_, v)) => Some(
                    v.as_int()
                        .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion).pushed("PV"))?,
                ),
                None => None,
            };
            counter.invoke(clk, gate, pv);
        }
    }
    Ok(())
}

// ── Expressions ──

fn eval_expr<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    expr: &Expr,
) -> Result<Value, RuntimeFault> {
    match &expr.kind {
        ExprKind::Literal(value) => Ok(value.clone()),
        ExprKind::Variable(path) => read_path(ctx, now, pou, inst, path),
        ExprKind::EnumVariant { type_name, variant } => {
            let def = ctx.types.enumeration(type_name).ok_or_else(|| {
                RuntimeFault::new(FaultKind::UnknownVariable).pushed(type_name.clone())
            })?;
            let var = def.variant(variant).ok_or_else(|| {
                RuntimeFault::new(FaultKind::UnknownVariable)
                    .pushed(format!("{}#{}", type_name, variant))
            })?;
            Ok(Value::Enum {
                type_name: type_name.clone(),
                variant: variant.clone(),
                value: var.value,
            })
        }
        ExprKind::Unary { op, operand } => {
            let operand = eval_expr(ctx, now, pou, inst, operand)?;
            eval::unary_op(*op, &operand, expr.ty.as_ref()).map_err(RuntimeFault::new)
        }
        ExprKind::Binary { op, left, right } => {
            // Short-circuit the boolean connectives.
            if matches!(op, BinaryOp::And | BinaryOp::Or) {
                let l = eval_expr(ctx, now, pou, inst, left)?
                    .as_bool()
                    .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
                let short = match op {
                    BinaryOp::And => !l,
                    _ => l,
                };
                if short {
                    return Ok(Value::Bool(l));
                }
                let r = eval_expr(ctx, now, pou, inst, right)?
                    .as_bool()
                    .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
                return Ok(Value::Bool(r));
            }
            let l = eval_expr(ctx, now, pou, inst, left)?;
            let r = eval_expr(ctx, now, pou, inst, right)?;
            eval::binary_op(*op, &l, &r, expr.ty.as_ref()).map_err(RuntimeFault::new)
        }
        ExprKind::Select {
            condition,
            then_value,
            else_value,
        } => {
            let taken = eval_expr(ctx, now, pou, inst, condition)?
                .as_bool()
                .ok_or_else(|| RuntimeFault::new(FaultKind::TypeConfusion))?;
            if taken {
                eval_expr(ctx, now, pou, inst, then_value)
            } else {
                eval_expr(ctx, now, pou, inst, else_value)
            }
        }
        ExprKind::Call {
            function,
            args,
            named,
        } => {
            // POU methods take precedence over the standard library.
            if let Some((method_pou, method)) = find_method(ctx, pou, function) {
                if !args.is_empty() || !named.is_empty() {
                    // Methods are parameterless in this model; arguments
                    // would have been rejected by the compiler.
                    return Err(RuntimeFault::new(FaultKind::UnsupportedConstruct)
                        .pushed(function.clone()));
                }
                let stmts = method
                    .statements()
                    .ok_or_else(|| RuntimeFault::new(FaultKind::UnsupportedConstruct))?;
                let flow = exec_stmts(ctx, now, method_pou, inst, stmts)
                    .map_err(|fault| fault.pushed(format!("method {}", function)))?;
                let return_type = match &method.kind {
                    PouKind::Function { return_type } => return_type.clone(),
                    _ => return Err(RuntimeFault::new(FaultKind::UnsupportedConstruct)),
                };
                return match flow {
                    Flow::Return(Some(value)) => Ok(value),
                    _ => Value::default_for(&return_type, &ctx.types)
                        .map_err(|_| RuntimeFault::new(FaultKind::TypeConfusion)),
                };
            }

            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_expr(ctx, now, pou, inst, arg)?);
            }
            eval::call_std(function, &evaluated, expr.ty.as_ref())
                .map_err(|kind| RuntimeFault::new(kind).pushed(function.clone()))
        }
    }
}

/// Locate a method on the POU or its ancestors. Returns the POU whose
/// scope the method executes in (for nested super resolution).
fn find_method<'a>(ctx: &SimCtx<'a>, pou: &'a Pou, name: &str) -> Option<(&'a Pou, &'a Pou)> {
    let mut cursor = Some(pou);
    while let Some(current) = cursor {
        if let Some(method) = current.method(name) {
            return Some((current, method));
        }
        cursor = current.parent.as_deref().and_then(|p| ctx.pou(p));
    }
    None
}

// ── Paths ──

fn flat_index(
    dims: &[plx_core::types::Dimension],
    indexes: &[i64],
) -> Result<usize, FaultKind> {
    if dims.len() != indexes.len() {
        return Err(FaultKind::TypeConfusion);
    }
    let mut offset = 0usize;
    for (dim, &index) in dims.iter().zip(indexes) {
        if !dim.contains(index) {
            return Err(FaultKind::IndexOutOfRange);
        }
        offset = offset * dim.len() + (index - dim.lo) as usize;
    }
    Ok(offset)
}

/// Pre-evaluated subscripts for each segment of a path.
fn eval_indexes<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    path: &VarPath,
) -> Result<Vec<Option<Vec<i64>>>, RuntimeFault> {
    let mut out = Vec::with_capacity(path.segments.len());
    for segment in &path.segments {
        match segment {
            PathSegment::Index(exprs) => {
                let mut indexes = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    indexes.push(int_operand(ctx, now, pou, inst, expr)?);
                }
                out.push(Some(indexes));
            }
            _ => out.push(None),
        }
    }
    Ok(out)
}

fn read_path<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    path: &VarPath,
) -> Result<Value, RuntimeFault> {
    let indexes = eval_indexes(ctx, now, pou, inst, path)?;
    let fault = |kind: FaultKind| RuntimeFault::new(kind).pushed(path.to_string());

    let mut segments = path.segments.iter().zip(indexes);
    let Some((PathSegment::Field(root), _)) = segments.next() else {
        return Err(fault(FaultKind::UnknownVariable));
    };
    let mut slot = inst
        .slot(root)
        .ok_or_else(|| fault(FaultKind::UnknownVariable))?;
    for (segment, idx) in segments {
        match (segment, slot) {
            (PathSegment::Field(name), Slot::Struct(fields)) => {
                slot = fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, s)| s)
                    .ok_or_else(|| fault(FaultKind::UnknownVariable))?;
            }
            (PathSegment::Field(name), Slot::Instance(user)) => {
                slot = user
                    .slot(name)
                    .ok_or_else(|| fault(FaultKind::UnknownVariable))?;
            }
            (PathSegment::Field(name), Slot::Std(state)) => {
                // Pins are scalar; a pin read terminates the path.
                return state.pin(name).ok_or_else(|| fault(FaultKind::UnknownVariable));
            }
            (PathSegment::Index(_), Slot::Array { dims, elems }) => {
                let idx = idx.ok_or_else(|| fault(FaultKind::TypeConfusion))?;
                let offset = flat_index(dims, &idx).map_err(fault)?;
                slot = &elems[offset];
            }
            _ => return Err(fault(FaultKind::TypeConfusion)),
        }
    }
    slot.to_value().ok_or_else(|| fault(FaultKind::TypeConfusion))
}

fn resolve_slot_mut<'a, 's>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &'s mut UserInstance,
    path: &VarPath,
) -> Result<&'s mut Slot, RuntimeFault> {
    // Subscripts are evaluated before the mutable walk begins.
    let indexes = eval_indexes(ctx, now, pou, &mut *inst, path)?;
    let fault = |kind: FaultKind| RuntimeFault::new(kind).pushed(path.to_string());

    let mut segments = path.segments.iter().zip(indexes);
    let Some((PathSegment::Field(root), _)) = segments.next() else {
        return Err(fault(FaultKind::UnknownVariable));
    };
    let mut slot = inst
        .slot_mut(root)
        .ok_or_else(|| fault(FaultKind::UnknownVariable))?;
    for (segment, idx) in segments {
        match (segment, slot) {
            (PathSegment::Field(name), Slot::Struct(fields)) => {
                slot = fields
                    .iter_mut()
                    .find(|(n, _)| n == name)
                    .map(|(_, s)| s)
                    .ok_or_else(|| fault(FaultKind::UnknownVariable))?;
            }
            (PathSegment::Field(name), Slot::Instance(user)) => {
                slot = user
                    .slot_mut(name)
                    .ok_or_else(|| fault(FaultKind::UnknownVariable))?;
            }
            (PathSegment::Index(_), Slot::Array { dims, elems }) => {
                let idx = idx.ok_or_else(|| fault(FaultKind::TypeConfusion))?;
                let offset = flat_index(dims, &idx).map_err(fault)?;
                slot = &mut elems[offset];
            }
            _ => return Err(fault(FaultKind::TypeConfusion)),
        }
    }
    Ok(slot)
}

fn write_path<'a>(
    ctx: &SimCtx<'a>,
    now: i64,
    pou: &'a Pou,
    inst: &mut UserInstance,
    path: &VarPath,
    value: Value,
) -> Result<(), RuntimeFault> {
    let slot = resolve_slot_mut(ctx, now, pou, inst, path)?;
    state::store(slot, value).map_err(|kind| RuntimeFault::new(kind).pushed(path.to_string()))
}
