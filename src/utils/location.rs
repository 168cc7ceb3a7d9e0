//! Source spans for diagnostics.
//!
//! Every node of the program model carries a span so that verdicts and
//! warnings can point back at the loop or access they are about. Hosts
//! that do not track positions leave spans at their default, which prints
//! as `<unknown>`.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A range of source text, 1-indexed. All zero for nodes without a
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Span of a synthesized node.
    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn is_dummy(&self) -> bool {
        self.start_line == 0 && self.end_line == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dummy() {
            write!(f, "<unknown>")
        } else if self.start_line == self.end_line {
            write!(f, "{}:{}-{}", self.start_line, self.start_column, self.end_column)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_column, self.end_line, self.end_column
            )
        }
    }
}
