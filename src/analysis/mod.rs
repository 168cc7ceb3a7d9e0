//! Parallelization legality analysis.
//!
//! The entry point is [`LoopParallelizer`]; the remaining modules are the
//! stages it runs and the interfaces it consumes.

pub mod access;
pub mod dependence;
pub mod oracle;
pub mod canonical;
pub mod reduction;
pub mod visible;
pub mod scoping;
pub mod indirect;
pub mod elimination;
pub mod session;
pub mod legality;

pub use dependence::{DependenceEdge, DependenceGraph, DependenceKind, NodeId};
pub use oracle::{
    CanonicalLoopOracle, DefSite, DefUseOracle, DependenceGraphBuilder, LiveSetTable, LivenessOracle,
    PrecomputedGraphs, ProgramPoint, ReachingDefTable, ReductionRecognizer, ShapeAnnotations,
};
pub use canonical::{find_unsupported_construct, StructuralLoopRecognizer};
pub use reduction::{AccumulationRecognizer, ReductionOp};
pub use visible::{collect_dependence_variables, collect_visible, VisibleVariables};
pub use scoping::{Autoscoper, Classification, ScopeCategory, ScopingFacts};
pub use indirect::{collect_verified_indirect, normalize_indirect_indexing, IndirectIndexTable};
pub use elimination::{DependenceEliminator, EliminatedEdge, EliminationOutcome, EliminationReason};
pub use session::AnalysisSession;
pub use legality::{EdgeReport, LoopParallelizer, LoopReport, NamedVar, ScopedVariable, ScopingContract, Verdict};
