//! Tasks, global variable blocks, and the project container that owns all
//! POUs and user types.

use crate::pou::{Pou, VarDecl};
use crate::time::IecDuration;
use crate::types::{TypeTable, UserType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskSchedule {
    /// Cyclic execution with a strictly positive period.
    Periodic { period: IecDuration },
    /// Triggered by a named event source.
    Event { source: String },
    /// Free-running background execution.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub schedule: TaskSchedule,
    pub priority: Option<u8>,
    /// Programs bound to this task, in execution order.
    pub pous: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalBlock {
    pub name: String,
    pub constant: bool,
    pub vars: Vec<VarDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub tasks: Vec<Task>,
    pub pous: Vec<Pou>,
    pub data_types: Vec<UserType>,
    pub globals: Vec<GlobalBlock>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            pous: Vec::new(),
            data_types: Vec::new(),
            globals: Vec::new(),
        }
    }

    pub fn pou(&self, name: &str) -> Option<&Pou> {
        self.pous.iter().find(|p| p.name == name)
    }

    pub fn user_type(&self, name: &str) -> Option<&UserType> {
        self.data_types.iter().find(|t| t.name() == name)
    }

    pub fn type_table(&self) -> TypeTable<'_> {
        TypeTable::new(&self.data_types)
    }
}
