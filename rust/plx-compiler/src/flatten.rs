//! Inheritance flattening: merge ancestor declarations into the child and
//! inline ancestor bodies at `super().logic()` call sites, for vendors
//! without native EXTENDS.

use crate::diagnostics::{CompileError, CompileErrors, ErrorKind};
use plx_core::ir::{CaseArm, Expr, ExprKind, IfBranch, PathSegment, Stmt, StmtKind, VarPath};
use plx_core::pou::{BlockRole, Pou, PouBody, VarBlock};
use plx_core::project::Project;
use std::collections::{HashMap, HashSet};

/// Flatten one POU against a lookup of its ancestors. POUs without a
/// parent are returned unchanged.
pub fn flatten_pou(pou: &Pou, pous: &HashMap<&str, &Pou>) -> Result<Pou, CompileErrors> {
    let Some(parent_name) = &pou.parent else {
        return Ok(pou.clone());
    };

    // Cycle detection over the ancestor chain.
    let mut seen = HashSet::new();
    seen.insert(pou.name.as_str());
    let mut cursor = Some(parent_name.as_str());
    while let Some(name) = cursor {
        if !seen.insert(name) {
            return Err(CompileError::new(
                ErrorKind::InheritanceCycle,
                format!("inheritance cycle through '{}'", name),
            )
            .into());
        }
        cursor = pous.get(name).and_then(|p| p.parent.as_deref());
    }

    let Some(parent) = pous.get(parent_name.as_str()) else {
        return Err(CompileError::new(
            ErrorKind::NameUnresolved,
            format!(
                "'{}' extends undefined function block '{}'",
                pou.name, parent_name
            ),
        )
        .into());
    };
    let parent = flatten_pou(parent, pous)?;

    let mut errors = CompileErrors::new();

    // Synthesized instances carry per-POU counters, so a parent's
    // `__ton_0` may collide with the child's. Inherited synthetic names
    // are renamed; colliding authored names are rejected.
    let child_names: HashSet<&str> = pou.vars().map(|(_, d)| d.name.as_str()).collect();
    let mut renames: HashMap<String, String> = HashMap::new();
    for (_, decl) in parent.vars() {
        if child_names.contains(decl.name.as_str()) {
            if decl.name.starts_with("__") {
                renames.insert(
                    decl.name.clone(),
                    format!("__{}{}", parent.name.to_lowercase(), decl.name),
                );
            } else {
                errors.push(CompileError::new(
                    ErrorKind::DuplicateName,
                    format!(
                        "'{}' redeclares '{}' inherited from {}",
                        pou.name, decl.name, parent.name
                    ),
                ));
            }
        }
    }

    // Merge declaration blocks, parent first within each role.
    let roles = [
        BlockRole::Input,
        BlockRole::Output,
        BlockRole::InOut,
        BlockRole::Local,
        BlockRole::Temp,
        BlockRole::Constant,
    ];
    let mut blocks = Vec::new();
    for role in roles {
        let mut vars = Vec::new();
        if let Some(block) = parent.block(role) {
            for decl in &block.vars {
                let mut decl = decl.clone();
                if let Some(renamed) = renames.get(&decl.name) {
                    decl.name = renamed.clone();
                }
                vars.push(decl);
            }
        }
        if let Some(block) = pou.block(role) {
            vars.extend(block.vars.iter().cloned());
        }
        if !vars.is_empty() {
            blocks.push(VarBlock { role, vars });
        }
    }

    // Inline the parent's body wherever the child calls super().logic().
    let parent_stmts: Vec<Stmt> = match &parent.body {
        PouBody::Statements(stmts) => rename_roots_stmts(stmts, &renames),
        PouBody::Chart(_) => {
            errors.push(CompileError::new(
                ErrorKind::SyntaxUnsupported,
                format!(
                    "cannot flatten '{}': parent '{}' is authored as a chart",
                    pou.name, parent.name
                ),
            ));
            Vec::new()
        }
    };
    let body = match &pou.body {
        PouBody::Statements(stmts) => PouBody::Statements(inline_super(stmts, &parent_stmts)),
        PouBody::Chart(chart) => PouBody::Chart(chart.clone()),
    };

    // Methods concatenate root-first; a child method overrides its parent's
    // namesake.
    let mut methods: Vec<Pou> = parent
        .methods
        .iter()
        .filter(|m| pou.methods.iter().all(|c| c.name != m.name))
        .cloned()
        .collect();
    methods.extend(pou.methods.iter().cloned());

    errors.into_result(Pou {
        name: pou.name.clone(),
        kind: pou.kind.clone(),
        parent: None,
        blocks,
        body,
        methods,
        fingerprint: pou.fingerprint.clone(),
    })
}

/// Flatten every POU of a project, preserving order.
pub fn flatten_project(project: &Project) -> Result<Project, CompileErrors> {
    let by_name: HashMap<&str, &Pou> =
        project.pous.iter().map(|p| (p.name.as_str(), p)).collect();
    let mut errors = CompileErrors::new();
    let mut pous = Vec::with_capacity(project.pous.len());
    for pou in &project.pous {
        match flatten_pou(pou, &by_name) {
            Ok(flat) => pous.push(flat),
            Err(e) => errors.extend(e),
        }
    }
    errors.into_result(Project {
        name: project.name.clone(),
        tasks: project.tasks.clone(),
        pous,
        data_types: project.data_types.clone(),
        globals: project.globals.clone(),
    })
}

fn inline_super(stmts: &[Stmt], parent: &[Stmt]) -> Vec<Stmt> {
    let mut out = Vec::new();
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::SuperCall => out.extend(parent.iter().cloned()),
            StmtKind::If {
                branches,
                else_body,
            } => out.push(Stmt::new(
                StmtKind::If {
                    branches: branches
                        .iter()
                        .map(|b| IfBranch {
                            condition: b.condition.clone(),
                            body: inline_super(&b.body, parent),
                        })
                        .collect(),
                    else_body: inline_super(else_body, parent),
                },
                stmt.span,
            )),
            StmtKind::Case {
                selector,
                arms,
                default,
            } => out.push(Stmt::new(
                StmtKind::Case {
                    selector: selector.clone(),
                    arms: arms
                        .iter()
                        .map(|arm| CaseArm {
                            labels: arm.labels.clone(),
                            body: inline_super(&arm.body, parent),
                            span: arm.span,
                        })
                        .collect(),
                    default: default.as_ref().map(|d| inline_super(d, parent)),
                },
                stmt.span,
            )),
            StmtKind::While { condition, body } => out.push(Stmt::new(
                StmtKind::While {
                    condition: condition.clone(),
                    body: inline_super(body, parent),
                },
                stmt.span,
            )),
            StmtKind::RepeatUntil { body, condition } => out.push(Stmt::new(
                StmtKind::RepeatUntil {
                    body: inline_super(body, parent),
                    condition: condition.clone(),
                },
                stmt.span,
            )),
            StmtKind::For {
                var,
                from,
                to,
                step,
                body,
            } => out.push(Stmt::new(
                StmtKind::For {
                    var: var.clone(),
                    from: from.clone(),
                    to: to.clone(),
                    step: step.clone(),
                    body: inline_super(body, parent),
                },
                stmt.span,
            )),
            _ => out.push(stmt.clone()),
        }
    }
    out
}

// ── Root renaming over inherited bodies ──

fn rename_root(path: &VarPath, renames: &HashMap<String, String>) -> VarPath {
    let mut segments = path.segments.clone();
    if let Some(PathSegment::Field(root)) = segments.first_mut() {
        if let Some(renamed) = renames.get(root) {
            *root = renamed.clone();
        }
    }
    for segment in segments.iter_mut() {
        if let PathSegment::Index(indexes) = segment {
            *indexes = indexes
                .iter()
                .map(|i| rename_roots_expr(i, renames))
                .collect();
        }
    }
    VarPath { segments }
}

fn rename_roots_expr(expr: &Expr, renames: &HashMap<String, String>) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Variable(path) => ExprKind::Variable(rename_root(path, renames)),
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: Box::new(rename_roots_expr(operand, renames)),
        },
        ExprKind::Binary { op, left, right } => ExprKind::Binary {
            op: *op,
            left: Box::new(rename_roots_expr(left, renames)),
            right: Box::new(rename_roots_expr(right, renames)),
        },
        ExprKind::Call {
            function,
            args,
            named,
        } => ExprKind::Call {
            function: function.clone(),
            args: args.iter().map(|a| rename_roots_expr(a, renames)).collect(),
            named: named
                .iter()
                .map(|(n, a)| (n.clone(), rename_roots_expr(a, renames)))
                .collect(),
        },
        ExprKind::Select {
            condition,
            then_value,
            else_value,
        } => ExprKind::Select {
            condition: Box::new(rename_roots_expr(condition, renames)),
            then_value: Box::new(rename_roots_expr(then_value, renames)),
            else_value: Box::new(rename_roots_expr(else_value, renames)),
        },
        literal => literal.clone(),
    };
    Expr {
        kind,
        ty: expr.ty.clone(),
        span: expr.span,
    }
}

fn rename_roots_stmts(stmts: &[Stmt], renames: &HashMap<String, String>) -> Vec<Stmt> {
    if renames.is_empty() {
        return stmts.to_vec();
    }
    stmts
        .iter()
        .map(|stmt| {
            let kind = match &stmt.kind {
                StmtKind::Assign { target, value } => StmtKind::Assign {
                    target: rename_root(target, renames),
                    value: rename_roots_expr(value, renames),
                },
                StmtKind::If {
                    branches,
                    else_body,
                } => StmtKind::If {
                    branches: branches
                        .iter()
                        .map(|b| IfBranch {
                            condition: rename_roots_expr(&b.condition, renames),
                            body: rename_roots_stmts(&b.body, renames),
                        })
                        .collect(),
                    else_body: rename_roots_stmts(else_body, renames),
                },
                StmtKind::Case {
                    selector,
                    arms,
                    default,
                } => StmtKind::Case {
                    selector: rename_roots_expr(selector, renames),
                    arms: arms
                        .iter()
                        .map(|arm| CaseArm {
                            labels: arm.labels.clone(),
                            body: rename_roots_stmts(&arm.body, renames),
                            span: arm.span,
                        })
                        .collect(),
                    default: default.as_ref().map(|d| rename_roots_stmts(d, renames)),
                },
                StmtKind::While { condition, body } => StmtKind::While {
                    condition: rename_roots_expr(condition, renames),
                    body: rename_roots_stmts(body, renames),
                },
                StmtKind::RepeatUntil { body, condition } => StmtKind::RepeatUntil {
                    body: rename_roots_stmts(body, renames),
                    condition: rename_roots_expr(condition, renames),
                },
                StmtKind::For {
                    var,
                    from,
                    to,
                    step,
                    body,
                } => StmtKind::For {
                    var: var.clone(),
                    from: rename_roots_expr(from, renames),
                    to: rename_roots_expr(to, renames),
                    step: step.as_ref().map(|s| rename_roots_expr(s, renames)),
                    body: rename_roots_stmts(body, renames),
                },
                StmtKind::InvokeFb { instance, inputs } => StmtKind::InvokeFb {
                    instance: rename_root(instance, renames),
                    inputs: inputs
                        .iter()
                        .map(|(n, e)| (n.clone(), rename_roots_expr(e, renames)))
                        .collect(),
                },
                other => other.clone(),
            };
            Stmt::new(kind, stmt.span)
        })
        .collect()
}
