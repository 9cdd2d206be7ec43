//! Variable descriptors and the builders that materialize POUs, charts,
//! and projects. Descriptors are captured in declaration order, grouped
//! into blocks at compile time, and then discarded.

use crate::assemble;
use crate::diagnostics::{CompileError, CompileErrors, ErrorKind, Warning};
use crate::lower::{self, Ctx, Lowerer, Scope};
use plx_core::pou::{BlockRole, Pou, PouBody, PouKind, VarBlock, VarDecl};
use plx_core::project::{GlobalBlock, Project, Task};
use plx_core::sfc::{Chart, ChartError, Step, Transition};
use plx_core::types::{Type, UserType};
use plx_core::value::Value;

/// Declaration role of a variable descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Output,
    InOut,
    Static,
    Temp,
    Constant,
}

impl Role {
    fn block_role(self) -> BlockRole {
        match self {
            Role::Input => BlockRole::Input,
            Role::Output => BlockRole::Output,
            Role::InOut => BlockRole::InOut,
            Role::Static => BlockRole::Local,
            Role::Temp => BlockRole::Temp,
            Role::Constant => BlockRole::Constant,
        }
    }
}

/// A lightweight variable descriptor: role, type, optional initial value
/// and documentation.
#[derive(Debug, Clone)]
pub struct VarSpec {
    pub role: Role,
    pub ty: Type,
    pub initial: Option<Value>,
    pub description: Option<String>,
}

impl VarSpec {
    fn new(role: Role, ty: Type) -> Self {
        Self {
            role,
            ty,
            initial: None,
            description: None,
        }
    }

    pub fn input(ty: Type) -> Self {
        Self::new(Role::Input, ty)
    }

    pub fn output(ty: Type) -> Self {
        Self::new(Role::Output, ty)
    }

    pub fn in_out(ty: Type) -> Self {
        Self::new(Role::InOut, ty)
    }

    /// A static (VAR) variable, persistent across scans.
    pub fn stat(ty: Type) -> Self {
        Self::new(Role::Static, ty)
    }

    pub fn temp(ty: Type) -> Self {
        Self::new(Role::Temp, ty)
    }

    pub fn constant(ty: Type) -> Self {
        Self::new(Role::Constant, ty)
    }

    /// A static function-block instance, e.g. `VarSpec::fb("TON")`.
    pub fn fb(type_name: impl Into<String>) -> Self {
        Self::new(Role::Static, Type::Fb(type_name.into()))
    }

    pub fn init(mut self, value: Value) -> Self {
        self.initial = Some(value);
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

#[derive(Debug, Clone)]
struct MethodSpec {
    name: String,
    return_type: Type,
    logic: String,
}

/// Authors an SFC chart from step action and transition condition source
/// snippets.
#[derive(Debug, Clone, Default)]
pub struct ChartBuilder {
    steps: Vec<(String, bool, String)>,
    transitions: Vec<(String, String, String)>,
}

impl ChartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_step(mut self, name: impl Into<String>, actions: impl Into<String>) -> Self {
        self.steps.push((name.into(), true, actions.into()));
        self
    }

    pub fn step(mut self, name: impl Into<String>, actions: impl Into<String>) -> Self {
        self.steps.push((name.into(), false, actions.into()));
        self
    }

    pub fn transition(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        self.transitions
            .push((source.into(), target.into(), condition.into()));
        self
    }
}

/// A POU definition under construction. `compile` lowers the authored
/// logic and produces the immutable POU IR.
#[derive(Debug, Clone)]
pub struct PouBuilder {
    name: String,
    kind: PouKind,
    parent: Option<String>,
    vars: Vec<(String, VarSpec)>,
    logic: Option<String>,
    chart: Option<ChartBuilder>,
    methods: Vec<MethodSpec>,
}

#[derive(Debug)]
pub struct CompiledPou {
    pub pou: Pou,
    pub warnings: Vec<Warning>,
}

impl PouBuilder {
    fn new(name: impl Into<String>, kind: PouKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            vars: Vec::new(),
            logic: None,
            chart: None,
            methods: Vec::new(),
        }
    }

    pub fn function_block(name: impl Into<String>) -> Self {
        Self::new(name, PouKind::FunctionBlock)
    }

    pub fn program(name: impl Into<String>) -> Self {
        Self::new(name, PouKind::Program)
    }

    pub fn function(name: impl Into<String>, return_type: Type) -> Self {
        Self::new(name, PouKind::Function { return_type })
    }

    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parent = Some(name.into());
        self
    }

    pub fn var(mut self, name: impl Into<String>, spec: VarSpec) -> Self {
        self.vars.push((name.into(), spec));
        self
    }

    pub fn logic(mut self, source: impl Into<String>) -> Self {
        self.logic = Some(source.into());
        self
    }

    pub fn chart(mut self, chart: ChartBuilder) -> Self {
        self.chart = Some(chart);
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        return_type: Type,
        logic: impl Into<String>,
    ) -> Self {
        self.methods.push(MethodSpec {
            name: name.into(),
            return_type,
            logic: logic.into(),
        });
        self
    }

    /// Materialize the POU: group descriptors into blocks, lower the
    /// authored body, and append synthesized instances. Descriptor records
    /// do not survive this call.
    pub fn compile(self, ctx: &Ctx<'_>) -> Result<CompiledPou, CompileErrors> {
        let mut errors = CompileErrors::new();
        let mut warnings = Vec::new();

        // Declared names must be unique within the POU.
        for (i, (name, _)) in self.vars.iter().enumerate() {
            if self.vars[..i].iter().any(|(n, _)| n == name) {
                errors.push(CompileError::new(
                    ErrorKind::DuplicateName,
                    format!("variable '{}' declared twice in {}", name, self.name),
                ));
            }
        }

        // Initial values are compile-time constants assignable to the
        // declared type; array bounds and user type names are checked here
        // as well.
        for (name, spec) in &self.vars {
            assemble::check_type_shape(&spec.ty, &ctx.types, &mut errors, || {
                format!("{}.{}", self.name, name)
            });
            if let Some(initial) = &spec.initial {
                if initial.coerce_to(&spec.ty).is_none() {
                    errors.push(CompileError::new(
                        ErrorKind::TypeMismatch,
                        format!(
                            "initial value of '{}.{}' is not assignable to {}",
                            self.name, name, spec.ty
                        ),
                    ));
                }
            }
        }

        // Build the lowering scope: inherited declarations first.
        let mut scope = Scope::new(self.name.clone(), self.kind.clone(), self.parent.clone());
        if let Some(parent_name) = &self.parent {
            if matches!(self.kind, PouKind::FunctionBlock) {
                match collect_ancestor_vars(parent_name, ctx) {
                    Ok(inherited) => {
                        for (name, role, ty) in inherited {
                            if self.vars.iter().any(|(n, _)| *n == name) {
                                errors.push(CompileError::new(
                                    ErrorKind::DuplicateName,
                                    format!(
                                        "'{}' redeclares '{}' inherited from {}",
                                        self.name, name, parent_name
                                    ),
                                ));
                            }
                            scope.declare(name, role, ty);
                        }
                    }
                    Err(e) => errors.push(e),
                }
            } else {
                errors.push(CompileError::new(
                    ErrorKind::SyntaxUnsupported,
                    "only function blocks can inherit",
                ));
            }
        }
        for (name, spec) in &self.vars {
            scope.declare(name.clone(), spec.role.block_role(), spec.ty.clone());
        }
        for method in &self.methods {
            scope.declare_method(method.name.clone(), method.return_type.clone());
        }

        // Lower methods against the enclosing declarations.
        let mut methods = Vec::new();
        for spec in &self.methods {
            let mut method_scope = scope.clone();
            method_scope.kind = PouKind::Function {
                return_type: spec.return_type.clone(),
            };
            method_scope.pou_name = format!("{}.{}", self.name, spec.name);
            match lower::lower_logic(&spec.logic, &method_scope, ctx) {
                Ok(lowered) => {
                    warnings.extend(lowered.warnings);
                    methods.push(Pou {
                        name: spec.name.clone(),
                        kind: PouKind::Function {
                            return_type: spec.return_type.clone(),
                        },
                        parent: None,
                        blocks: Vec::new(),
                        body: PouBody::Statements(lowered.stmts),
                        methods: Vec::new(),
                        fingerprint: Some(lowered.fingerprint),
                    });
                }
                Err(e) => errors.extend(e),
            }
        }

        // Lower the main body.
        let mut synthesized_locals = Vec::new();
        let mut synthesized_temps = Vec::new();
        let mut fingerprint = None;
        let body = match (&self.logic, &self.chart) {
            (Some(source), None) => {
                match lower::lower_logic(source, &scope, ctx) {
                    Ok(lowered) => {
                        warnings.extend(lowered.warnings);
                        synthesized_locals = lowered.synthesized_locals;
                        synthesized_temps = lowered.synthesized_temps;
                        fingerprint = Some(lowered.fingerprint);
                        PouBody::Statements(lowered.stmts)
                    }
                    Err(e) => {
                        errors.extend(e);
                        PouBody::empty()
                    }
                }
            }
            (None, Some(chart)) => {
                let (chart, locals, temps, chart_warnings, chart_errors) =
                    lower_chart(chart, &scope, ctx);
                warnings.extend(chart_warnings);
                synthesized_locals = locals;
                synthesized_temps = temps;
                errors.extend(chart_errors);
                PouBody::Chart(chart)
            }
            (Some(_), Some(_)) => {
                errors.push(CompileError::new(
                    ErrorKind::SyntaxUnsupported,
                    format!("{} declares both logic and a chart", self.name),
                ));
                PouBody::empty()
            }
            (None, None) => {
                errors.push(CompileError::new(
                    ErrorKind::SourceUnavailable,
                    format!("no logic source available for {}", self.name),
                ));
                PouBody::empty()
            }
        };

        // Group descriptors into blocks, in canonical role order.
        let mut blocks = Vec::new();
        for role in [
            Role::Input,
            Role::Output,
            Role::InOut,
            Role::Static,
            Role::Temp,
            Role::Constant,
        ] {
            let mut decls: Vec<VarDecl> = self
                .vars
                .iter()
                .filter(|(_, spec)| spec.role == role)
                .map(|(name, spec)| VarDecl {
                    name: name.clone(),
                    ty: spec.ty.clone(),
                    initial: spec.initial.clone(),
                    description: spec.description.clone(),
                })
                .collect();
            if role == Role::Static {
                decls.extend(synthesized_locals.iter().cloned());
            }
            if role == Role::Temp {
                decls.extend(synthesized_temps.iter().cloned());
            }
            if !decls.is_empty() {
                blocks.push(VarBlock {
                    role: role.block_role(),
                    vars: decls,
                });
            }
        }

        let pou = Pou {
            name: self.name,
            kind: self.kind,
            parent: self.parent,
            blocks,
            body,
            methods,
            fingerprint,
        };
        errors.into_result(CompiledPou { pou, warnings })
    }
}

/// Declarations of the whole ancestor chain, root first. Cycles are
/// reported by the flattening pass and project assembly; here the walk
/// just stops.
fn collect_ancestor_vars(
    parent: &str,
    ctx: &Ctx<'_>,
) -> Result<Vec<(String, BlockRole, Type)>, CompileError> {
    let mut chain = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut cursor = Some(parent.to_string());
    while let Some(name) = cursor {
        if !seen.insert(name.clone()) {
            break;
        }
        let Some(pou) = ctx.pou(&name) else {
            return Err(CompileError::new(
                ErrorKind::NameUnresolved,
                format!("parent function block '{}' is not defined", name),
            ));
        };
        cursor = pou.parent.clone();
        chain.push(pou);
    }
    let mut vars = Vec::new();
    for pou in chain.iter().rev() {
        for (role, decl) in pou.vars() {
            vars.push((decl.name.clone(), role, decl.ty.clone()));
        }
    }
    Ok(vars)
}

type CharParts = (
    Chart,
    Vec<VarDecl>,
    Vec<VarDecl>,
    Vec<Warning>,
    CompileErrors,
);

fn lower_chart(builder: &ChartBuilder, scope: &Scope, ctx: &Ctx<'_>) -> CharParts {
    let mut lowerer = Lowerer::new(scope, ctx);
    let mut steps = Vec::new();
    for (name, initial, actions) in &builder.steps {
        let actions = if actions.trim().is_empty() {
            Vec::new()
        } else {
            lowerer.lower_source_body(actions)
        };
        steps.push(Step {
            name: name.clone(),
            initial: *initial,
            actions,
        });
    }
    let mut transitions = Vec::new();
    for (source, target, condition) in &builder.transitions {
        if let Some(condition) = lowerer.lower_condition_source(condition) {
            transitions.push(Transition {
                source: source.clone(),
                target: target.clone(),
                condition,
            });
        }
    }
    let chart = Chart { steps, transitions };

    let mut errors = CompileErrors::new();
    if let Err(chart_errors) = chart.validate() {
        for e in chart_errors {
            errors.push(chart_error(e));
        }
    }
    match lowerer.finish() {
        Ok((locals, temps, warnings)) => (chart, locals, temps, warnings, errors),
        Err(lower_errors) => {
            errors.extend(lower_errors);
            (chart, Vec::new(), Vec::new(), Vec::new(), errors)
        }
    }
}

fn chart_error(e: ChartError) -> CompileError {
    let kind = match &e {
        ChartError::DuplicateStep(_) => ErrorKind::DuplicateName,
        ChartError::UnknownStep(_) | ChartError::Disconnected(_) | ChartError::Unreachable(_) => {
            ErrorKind::DanglingReference
        }
        ChartError::NoInitialStep | ChartError::MultipleInitialSteps(_) | ChartError::Empty => {
            ErrorKind::SyntaxUnsupported
        }
    };
    CompileError::new(kind, e.to_string())
}

/// Composes POUs, data types, globals, and tasks into a validated project.
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            project: Project::new(name),
        }
    }

    pub fn data_type(mut self, ty: UserType) -> Self {
        self.project.data_types.push(ty);
        self
    }

    pub fn pou(mut self, pou: Pou) -> Self {
        self.project.pous.push(pou);
        self
    }

    pub fn global(mut self, block: GlobalBlock) -> Self {
        self.project.globals.push(block);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.project.tasks.push(task);
        self
    }

    /// Validate all cross-references and return the checked project, or
    /// every violation found.
    pub fn compile(self) -> Result<Project, CompileErrors> {
        assemble::assemble(self.project)
    }
}
