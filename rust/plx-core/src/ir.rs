//! The vendor-neutral IR: typed expressions and statements over POU
//! variables. Nodes are constructed once and never mutated; passes that
//! change a body produce new nodes.

use crate::span::Span;
use crate::types::Type;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("case label {label} appears in more than one arm")]
    CaseOverlap { label: String },
    #[error("case arm has no labels")]
    EmptyCaseArm,
    #[error("variable path is empty")]
    EmptyPath,
    #[error("variable path must start with a field segment")]
    BadPathRoot,
}

// ── Operators ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::BitNot => write!(f, "NOT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Short-circuit boolean AND.
    And,
    /// Short-circuit boolean OR.
    Or,
    Xor,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::Pow
        )
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }
}

impl fmt::Display for BinaryOp {
    /// Structured-text spelling.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "MOD",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And | BinaryOp::BitAnd => "AND",
            BinaryOp::Or | BinaryOp::BitOr => "OR",
            BinaryOp::Xor | BinaryOp::BitXor => "XOR",
        };
        write!(f, "{}", s)
    }
}

// ── Variable paths ──

/// One step of a variable path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathSegment {
    Field(String),
    /// One subscript per declared dimension.
    Index(Vec<Expr>),
    Deref,
}

/// A resolved l-value / variable reference: a root variable followed by
/// field accesses, subscripts, and dereferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarPath {
    pub segments: Vec<PathSegment>,
}

impl VarPath {
    pub fn new(segments: Vec<PathSegment>) -> Result<Self, IrError> {
        if segments.is_empty() {
            return Err(IrError::EmptyPath);
        }
        if !matches!(segments[0], PathSegment::Field(_)) {
            return Err(IrError::BadPathRoot);
        }
        Ok(Self { segments })
    }

    /// A single-variable path.
    pub fn var(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Field(name.into())],
        }
    }

    /// `instance.field` paths, as produced for FB output reads.
    pub fn field(root: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            segments: vec![
                PathSegment::Field(root.into()),
                PathSegment::Field(field.into()),
            ],
        }
    }

    pub fn root(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Field(name)) => Some(name),
            _ => None,
        }
    }

    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                PathSegment::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                PathSegment::Index(_) => write!(f, "[..]")?,
                PathSegment::Deref => write!(f, "^")?,
            }
        }
        Ok(())
    }
}

// ── Expressions ──

/// An expression with its result type. The type is `None` only while a
/// node is under construction; lowering annotates every expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Option<Type>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Value),
    Variable(VarPath),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Call of a callable by name: standard functions and explicit
    /// conversions (named by elementary type). FB invocations are
    /// statements, never expressions.
    Call {
        function: String,
        args: Vec<Expr>,
        named: Vec<(String, Expr)>,
    },
    /// Ternary selection.
    Select {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    EnumVariant {
        type_name: String,
        variant: String,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            ty: None,
            span,
        }
    }

    pub fn typed(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self {
            kind,
            ty: Some(ty),
            span,
        }
    }

    /// A literal, typed from its value where the value names its own type.
    pub fn literal(value: Value, span: Span) -> Self {
        let ty = value.ty();
        Self {
            kind: ExprKind::Literal(value),
            ty,
            span,
        }
    }

    pub fn variable(path: VarPath, ty: Type, span: Span) -> Self {
        Self::typed(ExprKind::Variable(path), ty, span)
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn is_boolean(&self) -> bool {
        self.ty.as_ref().is_some_and(|t| t.is_boolean())
    }

    /// Constant integer view, used for literal-fit checks and folding.
    pub fn const_int(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Literal(v) if v.is_integer() => v.as_int(),
            _ => None,
        }
    }
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBranch {
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseLabel {
    Int(i64),
    EnumVariant { type_name: String, variant: String },
}

impl fmt::Display for CaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseLabel::Int(v) => write!(f, "{}", v),
            CaseLabel::EnumVariant { type_name, variant } => {
                write!(f, "{}#{}", type_name, variant)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseArm {
    pub labels: Vec<CaseLabel>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Assign {
        target: VarPath,
        value: Expr,
    },
    If {
        branches: Vec<IfBranch>,
        else_body: Vec<Stmt>,
    },
    Case {
        selector: Expr,
        arms: Vec<CaseArm>,
        default: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    RepeatUntil {
        body: Vec<Stmt>,
        condition: Expr,
    },
    /// Counted loop with inclusive bounds.
    For {
        var: String,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// Invocation of a function-block instance with named inputs. Outputs
    /// are read afterwards through field access on the instance.
    InvokeFb {
        instance: VarPath,
        inputs: Vec<(String, Expr)>,
    },
    /// Placeholder for the parent POU's body; inlined by the flattening
    /// pass for vendors without EXTENDS.
    SuperCall,
    Return(Option<Expr>),
    Empty,
}

/// Checked constructor for case statements: arms must have labels, and
/// labels must be disjoint across arms.
pub fn case_stmt(
    selector: Expr,
    arms: Vec<CaseArm>,
    default: Option<Vec<Stmt>>,
    span: Span,
) -> Result<Stmt, IrError> {
    let mut seen: HashSet<&CaseLabel> = HashSet::new();
    for arm in &arms {
        if arm.labels.is_empty() {
            return Err(IrError::EmptyCaseArm);
        }
        for label in &arm.labels {
            if !seen.insert(label) {
                return Err(IrError::CaseOverlap {
                    label: label.to_string(),
                });
            }
        }
    }
    Ok(Stmt::new(
        StmtKind::Case {
            selector,
            arms,
            default,
        },
        span,
    ))
}
