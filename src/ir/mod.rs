//! Program model consumed by the analyses.
//!
//! - `program`: arena of variables, scopes, statements, loops and expressions
//! - `builder`: programmatic construction
//! - `print`: source-like rendering for diagnostics

pub mod program;
pub mod builder;
pub mod print;

pub use program::*;
pub use builder::{ProgramBuilder, LoopHandle};
pub use print::{expr_to_string, print_program, IrPrinter};
