//! Deterministic structured-text rendering of IR declarations and bodies,
//! shared by the vendor emitters.

use plx_core::ir::{BinaryOp, CaseLabel, Expr, ExprKind, PathSegment, Stmt, StmtKind, VarPath};
use plx_core::pou::{Pou, PouKind, VarBlock};
use plx_core::types::Type;
use std::fmt::Write;

/// Binding strength of a rendered operator (higher binds tighter).
fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or | BinaryOp::BitOr => 1,
        BinaryOp::Xor | BinaryOp::BitXor => 2,
        BinaryOp::And | BinaryOp::BitAnd => 3,
        BinaryOp::Eq | BinaryOp::NotEq => 4,
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 5,
        BinaryOp::Add | BinaryOp::Sub => 6,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 7,
        BinaryOp::Pow => 8,
    }
}

pub fn render_expr(expr: &Expr) -> String {
    render_expr_prec(expr, 0)
}

fn render_expr_prec(expr: &Expr, parent: u8) -> String {
    match &expr.kind {
        ExprKind::Literal(value) => value.to_string(),
        ExprKind::Variable(path) => render_path(path),
        ExprKind::EnumVariant { type_name, variant } => format!("{}#{}", type_name, variant),
        ExprKind::Unary { op, operand } => {
            let inner = render_expr_prec(operand, 9);
            match op {
                plx_core::ir::UnaryOp::Neg => format!("-{}", inner),
                _ => format!("NOT {}", inner),
            }
        }
        ExprKind::Binary { op, left, right } => {
            let prec = precedence(*op);
            let text = format!(
                "{} {} {}",
                render_expr_prec(left, prec),
                op,
                render_expr_prec(right, prec + 1),
            );
            if prec < parent {
                format!("({})", text)
            } else {
                text
            }
        }
        ExprKind::Call {
            function,
            args,
            named,
        } => {
            let mut parts: Vec<String> = args.iter().map(render_expr).collect();
            parts.extend(
                named
                    .iter()
                    .map(|(n, v)| format!("{} := {}", n, render_expr(v))),
            );
            let name = conversion_name(function, args);
            format!("{}({})", name, parts.join(", "))
        }
        // SEL(G, IN0, IN1) yields IN1 when G is TRUE.
        ExprKind::Select {
            condition,
            then_value,
            else_value,
        } => format!(
            "SEL({}, {}, {})",
            render_expr(condition),
            render_expr(else_value),
            render_expr(then_value),
        ),
    }
}

/// Conversion calls are stored under the bare target type name; render
/// them in the universal `TO_<type>` form.
fn conversion_name(function: &str, args: &[Expr]) -> String {
    let is_conversion = function
        .parse::<plx_core::types::ElementaryType>()
        .is_ok();
    if is_conversion && args.len() == 1 {
        format!("TO_{}", function)
    } else {
        function.to_string()
    }
}

pub fn render_path(path: &VarPath) -> String {
    let mut out = String::new();
    for (i, segment) in path.segments.iter().enumerate() {
        match segment {
            PathSegment::Field(name) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(name);
            }
            PathSegment::Index(indexes) => {
                let rendered: Vec<String> = indexes.iter().map(render_expr).collect();
                let _ = write!(out, "[{}]", rendered.join(", "));
            }
            PathSegment::Deref => out.push('^'),
        }
    }
    out
}

pub fn render_stmts(stmts: &[Stmt], indent: usize) -> String {
    let mut out = String::new();
    for stmt in stmts {
        render_stmt(stmt, indent, &mut out);
    }
    out
}

fn pad(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("    ");
    }
}

fn render_stmt(stmt: &Stmt, indent: usize, out: &mut String) {
    match &stmt.kind {
        StmtKind::Assign { target, value } => {
            pad(out, indent);
            let _ = writeln!(out, "{} := {};", render_path(target), render_expr(value));
        }
        StmtKind::If {
            branches,
            else_body,
        } => {
            for (i, branch) in branches.iter().enumerate() {
                pad(out, indent);
                let keyword = if i == 0 { "IF" } else { "ELSIF" };
                let _ = writeln!(out, "{} {} THEN", keyword, render_expr(&branch.condition));
                out.push_str(&render_stmts(&branch.body, indent + 1));
            }
            if !else_body.is_empty() {
                pad(out, indent);
                out.push_str("ELSE\n");
                out.push_str(&render_stmts(else_body, indent + 1));
            }
            pad(out, indent);
            out.push_str("END_IF;\n");
        }
        StmtKind::Case {
            selector,
            arms,
            default,
        } => {
            pad(out, indent);
            let _ = writeln!(out, "CASE {} OF", render_expr(selector));
            for arm in arms {
                let labels: Vec<String> = arm
                    .labels
                    .iter()
                    .map(|label| match label {
                        CaseLabel::Int(v) => v.to_string(),
                        CaseLabel::EnumVariant { type_name, variant } => {
                            format!("{}#{}", type_name, variant)
                        }
                    })
                    .collect();
                pad(out, indent + 1);
                let _ = writeln!(out, "{}:", labels.join(", "));
                out.push_str(&render_stmts(&arm.body, indent + 2));
            }
            if let Some(default) = default {
                pad(out, indent + 1);
                out.push_str("ELSE\n");
                out.push_str(&render_stmts(default, indent + 2));
            }
            pad(out, indent);
            out.push_str("END_CASE;\n");
        }
        StmtKind::While { condition, body } => {
            pad(out, indent);
            let _ = writeln!(out, "WHILE {} DO", render_expr(condition));
            out.push_str(&render_stmts(body, indent + 1));
            pad(out, indent);
            out.push_str("END_WHILE;\n");
        }
        StmtKind::RepeatUntil { body, condition } => {
            pad(out, indent);
            out.push_str("REPEAT\n");
            out.push_str(&render_stmts(body, indent + 1));
            pad(out, indent);
            let _ = writeln!(out, "UNTIL {}", render_expr(condition));
            pad(out, indent);
            out.push_str("END_REPEAT;\n");
        }
        StmtKind::For {
            var,
            from,
            to,
            step,
            body,
        } => {
            pad(out, indent);
            let by = match step {
                Some(step) => format!(" BY {}", render_expr(step)),
                None => String::new(),
            };
            let _ = writeln!(
                out,
                "FOR {} := {} TO {}{} DO",
                var,
                render_expr(from),
                render_expr(to),
                by
            );
            out.push_str(&render_stmts(body, indent + 1));
            pad(out, indent);
            out.push_str("END_FOR;\n");
        }
        StmtKind::InvokeFb { instance, inputs } => {
            pad(out, indent);
            let args: Vec<String> = inputs
                .iter()
                .map(|(n, v)| format!("{} := {}", n, render_expr(v)))
                .collect();
            let _ = writeln!(out, "{}({});", render_path(instance), args.join(", "));
        }
        StmtKind::SuperCall => {
            pad(out, indent);
            out.push_str("SUPER^();\n");
        }
        StmtKind::Return(_) => {
            pad(out, indent);
            out.push_str("RETURN;\n");
        }
        StmtKind::Empty => {
            pad(out, indent);
            out.push_str(";\n");
        }
    }
}

fn render_block(block: &VarBlock, out: &mut String) {
    let _ = writeln!(out, "{}", block.role.iec_keyword());
    for decl in &block.vars {
        let initial = match &decl.initial {
            Some(value) => format!(" := {}", value),
            None => String::new(),
        };
        let comment = match &decl.description {
            Some(text) => format!(" (* {} *)", text),
            None => String::new(),
        };
        let _ = writeln!(out, "    {} : {}{};{}", decl.name, decl.ty, initial, comment);
    }
    out.push_str("END_VAR\n");
}

/// The textual declaration part of a POU, as carried by TcPOU documents.
pub fn render_declaration(pou: &Pou) -> String {
    let mut out = String::new();
    let header = match &pou.kind {
        PouKind::Function { return_type } => {
            format!("FUNCTION {} : {}", pou.name, render_type(return_type))
        }
        PouKind::FunctionBlock => match &pou.parent {
            Some(parent) => format!("FUNCTION_BLOCK {} EXTENDS {}", pou.name, parent),
            None => format!("FUNCTION_BLOCK {}", pou.name),
        },
        PouKind::Program => format!("PROGRAM {}", pou.name),
    };
    out.push_str(&header);
    out.push('\n');
    for block in &pou.blocks {
        render_block(block, &mut out);
    }
    out
}

pub fn render_type(ty: &Type) -> String {
    ty.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use plx_core::ir::{BinaryOp, Expr, ExprKind, Stmt, StmtKind, VarPath};
    use plx_core::span::Span;
    use plx_core::types::Type;
    use plx_core::value::Value;

    fn var(name: &str) -> Expr {
        Expr::variable(VarPath::var(name), Type::BOOL, Span::dummy())
    }

    #[test]
    fn precedence_parenthesizes_or_under_and() {
        let or = Expr::typed(
            ExprKind::Binary {
                op: BinaryOp::Or,
                left: Box::new(var("a")),
                right: Box::new(var("b")),
            },
            Type::BOOL,
            Span::dummy(),
        );
        let and = Expr::typed(
            ExprKind::Binary {
                op: BinaryOp::And,
                left: Box::new(or),
                right: Box::new(var("c")),
            },
            Type::BOOL,
            Span::dummy(),
        );
        assert_eq!(render_expr(&and), "(a OR b) AND c");
    }

    #[test]
    fn assignment_renders_with_semicolon() {
        let stmt = Stmt::new(
            StmtKind::Assign {
                target: VarPath::field("motor", "run"),
                value: Expr::literal(Value::Bool(true), Span::dummy()),
            },
            Span::dummy(),
        );
        assert_eq!(render_stmts(&[stmt], 0), "motor.run := TRUE;\n");
    }
}
