//! plx Compiler
//!
//! Lowers authored control logic into the vendor-neutral IEC 61131-3 IR:
//! the variable descriptor layer, the authored-source front-end, AST → IR
//! lowering with sentinel expansion, inheritance flattening, and project
//! assembly.

pub mod assemble;
pub mod descriptors;
pub mod diagnostics;
pub mod flatten;
pub mod frontend;
pub mod lower;
pub mod typerules;

pub use descriptors::{ChartBuilder, CompiledPou, PouBuilder, ProjectBuilder, Role, VarSpec};
pub use diagnostics::{CompileError, CompileErrors, ErrorKind, Severity, Warning};
pub use flatten::{flatten_pou, flatten_project};
pub use lower::{lower_logic, Ctx, LoweredBody, Scope};
