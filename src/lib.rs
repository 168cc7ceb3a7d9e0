//! # autopar - Loop Parallelization Legality and Autoscoping
//!
//! Decides whether the iterations of a loop can run in parallel and how
//! every variable of the loop must be scoped for the parallel execution to
//! match the sequential one:
//! - Canonical counted-loop recognition
//! - Autoscoping (shared, private, firstprivate, lastprivate, reduction)
//! - Indirect array index normalization
//! - Dependence elimination over a raw dependence graph
//!
//! ## Architecture
//!
//! ```text
//! Program model + oracles → Autoscoping → Dependence elimination → Verdict
//! ```
//!
//! Liveness, reaching definitions and the raw dependence graph come from
//! the host compiler through the traits of [`analysis::oracle`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use autopar::prelude::*;
//!
//! let mut session = AnalysisSession::new();
//! session.initialize(Box::new(defs), Box::new(live_sets))?;
//! let parallelizer = LoopParallelizer::new(&session, &graphs, AnalysisConfig::default());
//! let report = parallelizer.analyze(&mut program, loop_id)?;
//! println!("{}", report);
//! ```

#![warn(clippy::all)]

pub mod ir;
pub mod analysis;
pub mod case;
pub mod utils;

use serde::{Serialize, Deserialize};

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::ir::*;
    pub use crate::analysis::{
        AnalysisSession, Classification, DependenceEdge, DependenceGraph, DependenceKind,
        LiveSetTable, LoopParallelizer, LoopReport, PrecomputedGraphs, ReachingDefTable,
        ScopeCategory, ShapeAnnotations, Verdict,
    };
    pub use crate::case::AnalysisCase;
    pub use crate::utils::errors::*;
    pub use crate::utils::location::Span;
    pub use crate::AnalysisConfig;
}

/// Configuration of the legality analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Trace autoscoping sets and every filtered edge at debug level
    pub enable_debug_trace: bool,
    /// Assume distinct arrays and pointers never alias
    pub assume_no_aliasing: bool,
    /// Treat accesses indexed through `index[i]` as distinct per iteration
    pub enable_indirect_index_uniqueness: bool,
}

impl AnalysisConfig {
    pub fn debug_trace(mut self, on: bool) -> Self {
        self.enable_debug_trace = on;
        self
    }

    pub fn assume_no_aliasing(mut self, on: bool) -> Self {
        self.assume_no_aliasing = on;
        self
    }

    pub fn indirect_index_uniqueness(mut self, on: bool) -> Self {
        self.enable_indirect_index_uniqueness = on;
        self
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
