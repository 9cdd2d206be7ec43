//! Front-end for authored logic bodies: tokens, lexer, AST, and parser.
//!
//! The accepted grammar is exactly the compilable subset: assignment,
//! if/elif/else, match/case over integers and enum variants, while, for
//! over integer ranges, calls with positional and named arguments,
//! attribute and subscript access, boolean operators, comparisons, and
//! arithmetic. Anything else is reported as unsupported, never executed.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod tokens;
