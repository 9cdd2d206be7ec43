//! Structural visitor over IR bodies. Enter hooks fire before children,
//! leave hooks after; every child is walked exactly once.

use crate::ir::{CaseArm, Expr, ExprKind, IfBranch, PathSegment, Stmt, StmtKind, VarPath};
use crate::pou::{Pou, PouBody};
use crate::sfc::Chart;

pub trait Visitor {
    fn enter_stmt(&mut self, _stmt: &Stmt) {}
    fn leave_stmt(&mut self, _stmt: &Stmt) {}
    fn enter_expr(&mut self, _expr: &Expr) {}
    fn leave_expr(&mut self, _expr: &Expr) {}
}

pub fn walk_stmts<V: Visitor>(visitor: &mut V, stmts: &[Stmt]) {
    for stmt in stmts {
        walk_stmt(visitor, stmt);
    }
}

pub fn walk_stmt<V: Visitor>(visitor: &mut V, stmt: &Stmt) {
    visitor.enter_stmt(stmt);
    match &stmt.kind {
        StmtKind::Assign { target, value } => {
            walk_path(visitor, target);
            walk_expr(visitor, value);
        }
        StmtKind::If {
            branches,
            else_body,
        } => {
            for IfBranch { condition, body } in branches {
                walk_expr(visitor, condition);
                walk_stmts(visitor, body);
            }
            walk_stmts(visitor, else_body);
        }
        StmtKind::Case {
            selector,
            arms,
            default,
        } => {
            walk_expr(visitor, selector);
            for CaseArm { body, .. } in arms {
                walk_stmts(visitor, body);
            }
            if let Some(body) = default {
                walk_stmts(visitor, body);
            }
        }
        StmtKind::While { condition, body } => {
            walk_expr(visitor, condition);
            walk_stmts(visitor, body);
        }
        StmtKind::RepeatUntil { body, condition } => {
            walk_stmts(visitor, body);
            walk_expr(visitor, condition);
        }
        StmtKind::For {
            from,
            to,
            step,
            body,
            ..
        } => {
            walk_expr(visitor, from);
            walk_expr(visitor, to);
            if let Some(step) = step {
                walk_expr(visitor, step);
            }
            walk_stmts(visitor, body);
        }
        StmtKind::InvokeFb { instance, inputs } => {
            walk_path(visitor, instance);
            for (_, expr) in inputs {
                walk_expr(visitor, expr);
            }
        }
        StmtKind::Return(value) => {
            if let Some(expr) = value {
                walk_expr(visitor, expr);
            }
        }
        StmtKind::SuperCall | StmtKind::Empty => {}
    }
    visitor.leave_stmt(stmt);
}

pub fn walk_expr<V: Visitor>(visitor: &mut V, expr: &Expr) {
    visitor.enter_expr(expr);
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::EnumVariant { .. } => {}
        ExprKind::Variable(path) => walk_path(visitor, path),
        ExprKind::Unary { operand, .. } => walk_expr(visitor, operand),
        ExprKind::Binary { left, right, .. } => {
            walk_expr(visitor, left);
            walk_expr(visitor, right);
        }
        ExprKind::Call { args, named, .. } => {
            for arg in args {
                walk_expr(visitor, arg);
            }
            for (_, arg) in named {
                walk_expr(visitor, arg);
            }
        }
        ExprKind::Select {
            condition,
            then_value,
            else_value,
        } => {
            walk_expr(visitor, condition);
            walk_expr(visitor, then_value);
            walk_expr(visitor, else_value);
        }
    }
    visitor.leave_expr(expr);
}

fn walk_path<V: Visitor>(visitor: &mut V, path: &VarPath) {
    for segment in &path.segments {
        if let PathSegment::Index(indexes) = segment {
            for index in indexes {
                walk_expr(visitor, index);
            }
        }
    }
}

pub fn walk_chart<V: Visitor>(visitor: &mut V, chart: &Chart) {
    for step in &chart.steps {
        walk_stmts(visitor, &step.actions);
    }
    for transition in &chart.transitions {
        walk_expr(visitor, &transition.condition);
    }
}

/// Walks a POU's body, its chart (if any), and its methods.
pub fn walk_pou<V: Visitor>(visitor: &mut V, pou: &Pou) {
    match &pou.body {
        PouBody::Statements(stmts) => walk_stmts(visitor, stmts),
        PouBody::Chart(chart) => walk_chart(visitor, chart),
    }
    for method in &pou.methods {
        walk_pou(visitor, method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, ExprKind, Stmt, StmtKind, VarPath};
    use crate::span::Span;
    use crate::value::Value;

    #[derive(Default)]
    struct Counter {
        stmts: usize,
        exprs: usize,
        left: usize,
    }

    impl Visitor for Counter {
        fn enter_stmt(&mut self, _stmt: &Stmt) {
            self.stmts += 1;
        }
        fn enter_expr(&mut self, _expr: &Expr) {
            self.exprs += 1;
        }
        fn leave_expr(&mut self, _expr: &Expr) {
            self.left += 1;
        }
    }

    #[test]
    fn each_child_visited_once() {
        let span = Span::dummy();
        let cond = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Lt,
                left: Box::new(Expr::literal(Value::DInt(1), span)),
                right: Box::new(Expr::literal(Value::DInt(2), span)),
            },
            span,
        );
        let body = vec![Stmt::new(
            StmtKind::Assign {
                target: VarPath::var("x"),
                value: Expr::literal(Value::Bool(true), span),
            },
            span,
        )];
        let stmt = Stmt::new(
            StmtKind::While {
                condition: cond,
                body,
            },
            span,
        );

        let mut counter = Counter::default();
        walk_stmt(&mut counter, &stmt);
        // while + assign
        assert_eq!(counter.stmts, 2);
        // compare + 2 literals + assigned value
        assert_eq!(counter.exprs, 4);
        assert_eq!(counter.left, counter.exprs);
    }
}
