//! Program Organization Units: functions, function blocks, and programs,
//! with their ordered declaration blocks.

use crate::ir::Stmt;
use crate::sfc::Chart;
use crate::types::Type;
use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PouKind {
    /// Stateless, returns a typed value.
    Function { return_type: Type },
    /// Stateful and instantiable; locals persist across scans.
    FunctionBlock,
    /// A function-block singleton bound into a task.
    Program,
}

impl PouKind {
    pub fn is_function(&self) -> bool {
        matches!(self, PouKind::Function { .. })
    }
}

/// Role of a declaration block. Direction and scope of a variable are
/// decided by the block that holds it, not by the variable itself.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum BlockRole {
    Input,
    Output,
    InOut,
    Local,
    Temp,
    Constant,
}

impl BlockRole {
    pub fn iec_keyword(&self) -> &'static str {
        match self {
            BlockRole::Input => "VAR_INPUT",
            BlockRole::Output => "VAR_OUTPUT",
            BlockRole::InOut => "VAR_IN_OUT",
            BlockRole::Local => "VAR",
            BlockRole::Temp => "VAR_TEMP",
            BlockRole::Constant => "VAR CONSTANT",
        }
    }

    /// Whether variables of this role persist across scans.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            BlockRole::Input | BlockRole::Output | BlockRole::InOut | BlockRole::Local
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub initial: Option<Value>,
    pub description: Option<String>,
}

impl VarDecl {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            initial: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarBlock {
    pub role: BlockRole,
    pub vars: Vec<VarDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PouBody {
    Statements(Vec<Stmt>),
    Chart(Chart),
}

impl PouBody {
    pub fn empty() -> Self {
        PouBody::Statements(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pou {
    pub name: String,
    pub kind: PouKind,
    /// Parent function block, for FB inheritance.
    pub parent: Option<String>,
    pub blocks: Vec<VarBlock>,
    pub body: PouBody,
    /// Inner function-kind POUs (function blocks only).
    pub methods: Vec<Pou>,
    /// `sha256:<hex>` of the authored logic source this POU was lowered
    /// from, when it was produced by the compiler.
    pub fingerprint: Option<String>,
}

impl Pou {
    pub fn find_var(&self, name: &str) -> Option<(BlockRole, &VarDecl)> {
        for block in &self.blocks {
            if let Some(decl) = block.vars.iter().find(|v| v.name == name) {
                return Some((block.role, decl));
            }
        }
        None
    }

    pub fn vars(&self) -> impl Iterator<Item = (BlockRole, &VarDecl)> {
        self.blocks
            .iter()
            .flat_map(|b| b.vars.iter().map(move |v| (b.role, v)))
    }

    pub fn block(&self, role: BlockRole) -> Option<&VarBlock> {
        self.blocks.iter().find(|b| b.role == role)
    }

    pub fn statements(&self) -> Option<&[Stmt]> {
        match &self.body {
            PouBody::Statements(stmts) => Some(stmts),
            PouBody::Chart(_) => None,
        }
    }

    pub fn chart(&self) -> Option<&Chart> {
        match &self.body {
            PouBody::Chart(chart) => Some(chart),
            PouBody::Statements(_) => None,
        }
    }

    pub fn method(&self, name: &str) -> Option<&Pou> {
        self.methods.iter().find(|m| m.name == name)
    }
}
