//! Project assembly: whole-project validation with best-effort
//! multi-error reporting. Nothing here short-circuits on the first
//! failure.

use crate::diagnostics::{CompileError, CompileErrors, ErrorKind};
use plx_core::ir::{Expr, ExprKind, Stmt, StmtKind};
use plx_core::pou::{Pou, PouKind};
use plx_core::project::{Project, TaskSchedule};
use plx_core::stdfb::StdFb;
use plx_core::types::{Type, TypeTable, UserType};
use plx_core::visit::{self, Visitor};
use std::collections::{HashMap, HashSet};

/// Validate every cross-reference invariant and return the checked
/// project, or the full batch of violations.
pub fn assemble(project: Project) -> Result<Project, CompileErrors> {
    let mut errors = CompileErrors::new();

    check_unique_names(&project, &mut errors);
    check_user_types(&project, &mut errors);
    check_struct_graph(&project, &mut errors);
    check_inheritance(&project, &mut errors);
    check_tasks(&project, &mut errors);
    check_declarations(&project, &mut errors);
    check_bodies(&project, &mut errors);

    errors.into_result(project)
}

fn check_unique_names(project: &Project, errors: &mut CompileErrors) {
    let namespaces: [(&str, Vec<&str>); 4] = [
        ("POU", project.pous.iter().map(|p| p.name.as_str()).collect()),
        ("task", project.tasks.iter().map(|t| t.name.as_str()).collect()),
        (
            "data type",
            project.data_types.iter().map(|t| t.name()).collect(),
        ),
        (
            "global block",
            project.globals.iter().map(|g| g.name.as_str()).collect(),
        ),
    ];
    for (what, names) in namespaces {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                errors.push(CompileError::new(
                    ErrorKind::DuplicateName,
                    format!("duplicate {} name '{}'", what, name),
                ));
            }
        }
    }
}

fn check_user_types(project: &Project, errors: &mut CompileErrors) {
    use plx_core::types::TypeError;
    let types = project.type_table();
    for ty in &project.data_types {
        if let UserType::Struct(s) = ty {
            for field in &s.fields {
                check_type_shape(&field.ty, &types, errors, || {
                    format!("{}.{}", s.name, field.name)
                });
            }
        }
        let result = match ty {
            UserType::Struct(s) => s.validate(),
            UserType::Enum(e) => e.validate(),
        };
        if let Err(e) = result {
            let kind = match &e {
                TypeError::DuplicateField { .. }
                | TypeError::DuplicateVariant { .. }
                | TypeError::DuplicateVariantValue { .. } => ErrorKind::DuplicateName,
                TypeError::EmptyDimension { .. } | TypeError::EmptyEnum { .. } => {
                    ErrorKind::InvalidLiteral
                }
            };
            errors.push(CompileError::new(kind, e.to_string()));
        }
    }
}

/// Struct names contained by value inside `ty` (pointers and references
/// break containment).
fn contained_structs<'a>(ty: &'a Type, out: &mut Vec<&'a str>) {
    match ty {
        Type::Struct(name) => out.push(name),
        Type::Array { element, .. } => contained_structs(element, out),
        _ => {}
    }
}

fn check_struct_graph(project: &Project, errors: &mut CompileErrors) {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for ty in &project.data_types {
        if let UserType::Struct(s) = ty {
            let mut contained = Vec::new();
            for field in &s.fields {
                contained_structs(&field.ty, &mut contained);
            }
            edges.insert(s.name.as_str(), contained);
        }
    }

    // Depth-first cycle search, reported once per offending struct.
    let mut state: HashMap<&str, u8> = HashMap::new();
    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        state: &mut HashMap<&'a str, u8>,
        trail: &mut Vec<&'a str>,
        errors: &mut CompileErrors,
    ) {
        match state.get(node) {
            Some(1) => {
                let start = trail.iter().position(|n| n == &node).unwrap_or(0);
                let cycle: Vec<&str> = trail[start..].to_vec();
                errors.push(CompileError::new(
                    ErrorKind::InheritanceCycle,
                    format!("struct field types form a cycle: {}", cycle.join(" -> ")),
                ));
                return;
            }
            Some(_) => return,
            None => {}
        }
        state.insert(node, 1);
        trail.push(node);
        if let Some(next) = edges.get(node) {
            for n in next {
                if edges.contains_key(n) {
                    visit(n, edges, state, trail, errors);
                }
            }
        }
        trail.pop();
        state.insert(node, 2);
    }
    let roots: Vec<&str> = edges.keys().copied().collect();
    for root in roots {
        let mut trail = Vec::new();
        visit(root, &edges, &mut state, &mut trail, errors);
    }
}

fn check_inheritance(project: &Project, errors: &mut CompileErrors) {
    let by_name: HashMap<&str, &Pou> =
        project.pous.iter().map(|p| (p.name.as_str(), p)).collect();
    for pou in &project.pous {
        let Some(parent) = &pou.parent else { continue };
        if !matches!(pou.kind, PouKind::FunctionBlock) {
            errors.push(CompileError::new(
                ErrorKind::SyntaxUnsupported,
                format!("'{}' has a parent but is not a function block", pou.name),
            ));
        }
        match by_name.get(parent.as_str()) {
            None => {
                errors.push(CompileError::new(
                    ErrorKind::NameUnresolved,
                    format!("'{}' extends undefined function block '{}'", pou.name, parent),
                ));
            }
            Some(parent_pou) if !matches!(parent_pou.kind, PouKind::FunctionBlock) => {
                errors.push(CompileError::new(
                    ErrorKind::SyntaxUnsupported,
                    format!("'{}' extends '{}', which is not a function block", pou.name, parent),
                ));
            }
            Some(_) => {}
        }

        // Walk the chain watching for a revisit of the starting POU.
        let mut seen = HashSet::new();
        seen.insert(pou.name.as_str());
        let mut cursor = Some(parent.as_str());
        while let Some(name) = cursor {
            if !seen.insert(name) {
                errors.push(CompileError::new(
                    ErrorKind::InheritanceCycle,
                    format!("inheritance cycle through '{}'", name),
                ));
                break;
            }
            cursor = by_name
                .get(name)
                .and_then(|p| p.parent.as_deref());
        }
    }
}

fn check_tasks(project: &Project, errors: &mut CompileErrors) {
    for task in &project.tasks {
        match &task.schedule {
            TaskSchedule::Periodic { period } => {
                if period.as_nanos() <= 0 {
                    errors.push(CompileError::new(
                        ErrorKind::InvalidSchedule,
                        format!("task '{}' has a non-positive period {}", task.name, period),
                    ));
                }
            }
            TaskSchedule::Event { source } => {
                if source.is_empty() {
                    errors.push(CompileError::new(
                        ErrorKind::InvalidSchedule,
                        format!("task '{}' has an empty event source", task.name),
                    ));
                }
            }
            TaskSchedule::Continuous => {}
        }
        for pou_ref in &task.pous {
            if project.pou(pou_ref).is_none() {
                errors.push(CompileError::new(
                    ErrorKind::DanglingReference,
                    format!("task '{}' references missing POU '{}'", task.name, pou_ref),
                ));
            }
        }
    }
}

/// Validate the shape of a declared type: array bounds, and resolution of
/// user type names. Used both at builder time and at assembly.
pub fn check_type_shape(
    ty: &Type,
    types: &TypeTable<'_>,
    errors: &mut CompileErrors,
    context: impl Fn() -> String + Copy,
) {
    match ty {
        Type::Array { element, dims } => {
            for dim in dims {
                if dim.lo > dim.hi {
                    errors.push(CompileError::new(
                        ErrorKind::InvalidLiteral,
                        format!(
                            "empty array dimension {}..{} in {}",
                            dim.lo,
                            dim.hi,
                            context()
                        ),
                    ));
                }
            }
            check_type_shape(element, types, errors, context);
        }
        Type::Pointer(inner) | Type::Reference(inner) => {
            check_type_shape(inner, types, errors, context);
        }
        Type::Struct(name) => {
            if types.structure(name).is_none() {
                errors.push(CompileError::new(
                    ErrorKind::NameUnresolved,
                    format!("unknown struct type '{}' in {}", name, context()),
                ));
            }
        }
        Type::Enum(name) => {
            if types.enumeration(name).is_none() {
                errors.push(CompileError::new(
                    ErrorKind::NameUnresolved,
                    format!("unknown enum type '{}' in {}", name, context()),
                ));
            }
        }
        _ => {}
    }
}

fn check_declarations(project: &Project, errors: &mut CompileErrors) {
    let types = project.type_table();
    let fb_names: HashSet<&str> = project
        .pous
        .iter()
        .filter(|p| matches!(p.kind, PouKind::FunctionBlock))
        .map(|p| p.name.as_str())
        .collect();

    for pou in &project.pous {
        for (_, decl) in pou.vars() {
            check_type_shape(&decl.ty, &types, errors, || {
                format!("{}.{}", pou.name, decl.name)
            });
            if let Type::Fb(fb) = &decl.ty {
                if StdFb::from_type_name(fb).is_none() && !fb_names.contains(fb.as_str()) {
                    errors.push(CompileError::new(
                        ErrorKind::NameUnresolved,
                        format!(
                            "'{}.{}' instantiates unknown function block '{}'",
                            pou.name, decl.name, fb
                        ),
                    ));
                }
            }
        }
    }

    // Function-block containment must be acyclic or instantiation would
    // never terminate.
    let mut containment: HashMap<&str, Vec<&str>> = HashMap::new();
    for pou in &project.pous {
        if !matches!(pou.kind, PouKind::FunctionBlock) {
            continue;
        }
        let contained: Vec<&str> = pou
            .vars()
            .filter_map(|(_, decl)| match &decl.ty {
                Type::Fb(fb) if fb_names.contains(fb.as_str()) => Some(fb.as_str()),
                _ => None,
            })
            .collect();
        containment.insert(pou.name.as_str(), contained);
    }
    for start in containment.keys().copied().collect::<Vec<_>>() {
        let mut stack = vec![start];
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(node) = stack.pop() {
            if let Some(next) = containment.get(node) {
                for &n in next {
                    if n == start {
                        errors.push(CompileError::new(
                            ErrorKind::InheritanceCycle,
                            format!("function block containment cycle through '{}'", start),
                        ));
                        stack.clear();
                        break;
                    }
                    if seen.insert(n) {
                        stack.push(n);
                    }
                }
            }
        }
    }

    // Globals referencing a missing type are dangling references.
    for block in &project.globals {
        for decl in &block.vars {
            let mut shape_errors = CompileErrors::new();
            check_type_shape(&decl.ty, &types, &mut shape_errors, || {
                format!("{}.{}", block.name, decl.name)
            });
            for e in shape_errors.0 {
                let kind = match e.kind {
                    ErrorKind::NameUnresolved => ErrorKind::DanglingReference,
                    other => other,
                };
                errors.push(CompileError::new(kind, e.message));
            }
        }
    }
}

/// Re-validate bodies structurally: variable roots resolve, and charts
/// hold their graph invariants. Builder-produced POUs already pass; this
/// catches hand-built or deserialized IR.
fn check_bodies(project: &Project, errors: &mut CompileErrors) {
    for pou in &project.pous {
        if let Some(chart) = pou.chart() {
            if let Err(chart_errors) = chart.validate() {
                for e in chart_errors {
                    errors.push(chart_error(&pou.name, e));
                }
            }
        }

        let mut declared: HashSet<String> = pou.vars().map(|(_, d)| d.name.clone()).collect();
        for method in &pou.methods {
            declared.insert(method.name.clone());
        }
        // Induction variables bind locally to their loops.
        let mut collector = ForVarCollector::default();
        visit::walk_pou(&mut collector, pou);
        declared.extend(collector.vars);

        let mut checker = RootChecker {
            declared: &declared,
            unresolved: Vec::new(),
        };
        visit::walk_pou(&mut checker, pou);
        for name in checker.unresolved {
            errors.push(CompileError::new(
                ErrorKind::NameUnresolved,
                format!("'{}' references undeclared variable '{}'", pou.name, name),
            ));
        }
    }
}

fn chart_error(pou: &str, e: plx_core::sfc::ChartError) -> CompileError {
    use plx_core::sfc::ChartError;
    let kind = match &e {
        ChartError::DuplicateStep(_) => ErrorKind::DuplicateName,
        ChartError::UnknownStep(_) | ChartError::Disconnected(_) | ChartError::Unreachable(_) => {
            ErrorKind::DanglingReference
        }
        ChartError::NoInitialStep | ChartError::MultipleInitialSteps(_) | ChartError::Empty => {
            ErrorKind::SyntaxUnsupported
        }
    };
    CompileError::new(kind, format!("chart of '{}': {}", pou, e))
}

#[derive(Default)]
struct ForVarCollector {
    vars: HashSet<String>,
}

impl Visitor for ForVarCollector {
    fn enter_stmt(&mut self, stmt: &Stmt) {
        if let StmtKind::For { var, .. } = &stmt.kind {
            self.vars.insert(var.clone());
        }
    }
}

struct RootChecker<'a> {
    declared: &'a HashSet<String>,
    unresolved: Vec<String>,
}

impl Visitor for RootChecker<'_> {
    fn enter_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Assign { target, .. } | StmtKind::InvokeFb { instance: target, .. } => {
                if let Some(root) = target.root() {
                    if !self.declared.contains(root) {
                        self.unresolved.push(root.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    fn enter_expr(&mut self, expr: &Expr) {
        if let ExprKind::Variable(path) = &expr.kind {
            if let Some(root) = path.root() {
                if !self.declared.contains(root) {
                    self.unresolved.push(root.to_string());
                }
            }
        }
    }
}
