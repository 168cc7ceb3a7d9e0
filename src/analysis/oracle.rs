//! Interfaces to the host compiler's analyses, and table-backed
//! implementations of them.
//!
//! The legality procedure never computes liveness, reaching definitions or
//! dependence graphs itself. It consumes them through the traits below. The
//! tables serve precomputed facts, as loaded from case files.

use super::dependence::DependenceGraph;
use super::reduction::ReductionOp;
use crate::ir::{ExprId, ExprKind, LoopId, Program, StmtId, VarId};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A point at which live sets are queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramPoint {
    /// Entry (live-in) or exit (live-out) of a loop
    Loop(LoopId),
    Stmt(StmtId),
}

/// A definition reaching a variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefSite {
    /// An assignment, compound assignment, or increment/decrement
    Expr(ExprId),
    /// A declaration with initializer
    Decl(StmtId),
}

/// Recognizes canonical counted loops.
pub trait CanonicalLoopOracle {
    /// The invariant of a canonical loop, or `None` when the loop is not
    /// canonical.
    fn canonical_invariant(&self, program: &Program, loop_id: LoopId) -> Option<VarId>;
}

/// Live-variable facts.
pub trait LivenessOracle {
    fn live_in(&self, point: ProgramPoint) -> BTreeSet<VarId>;
    fn live_out(&self, point: ProgramPoint) -> BTreeSet<VarId>;
}

/// Reaching-definition facts.
pub trait DefUseOracle {
    /// Definitions reaching the variable reference `var_ref`.
    fn reaching_definitions(&self, var_ref: ExprId) -> Vec<DefSite>;
}

/// Produces the raw dependence graph of a loop.
pub trait DependenceGraphBuilder {
    /// `None` when the builder does not support the loop.
    fn build(&self, program: &Program, loop_id: LoopId, annotations: &ShapeAnnotations) -> Option<DependenceGraph>;
}

/// Recognizes reduction variables of a loop.
pub trait ReductionRecognizer {
    /// Reductions among `candidates`, with their operator.
    fn recognize(
        &self,
        program: &Program,
        loop_id: LoopId,
        candidates: &BTreeSet<VarId>,
    ) -> BTreeMap<VarId, ReductionOp>;
}

/// Array-shape annotations: functions whose calls act as element accesses
/// of an array abstraction (`A.get(i)`, `elem(A, i)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeAnnotations {
    #[serde(default)]
    pub accessors: BTreeSet<String>,
}

/// Annotations naming no accessor.
pub static NO_ANNOTATIONS: ShapeAnnotations = ShapeAnnotations { accessors: BTreeSet::new() };

impl ShapeAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accessor(mut self, name: impl Into<String>) -> Self {
        self.accessors.insert(name.into());
        self
    }

    /// Index expressions, and calls to annotated accessors.
    pub fn is_array_access(&self, program: &Program, access: ExprId) -> bool {
        match &program.expr(access).kind {
            ExprKind::Index { .. } => true,
            ExprKind::Call { callee, .. } => self.accessors.contains(callee),
            _ => false,
        }
    }
}

/// Live sets per loop.
#[derive(Debug, Clone, Default)]
pub struct LiveSetTable {
    loops: HashMap<LoopId, (BTreeSet<VarId>, BTreeSet<VarId>)>,
}

impl LiveSetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record live-in and live-out of a loop.
    pub fn insert(
        &mut self,
        loop_id: LoopId,
        live_in: impl IntoIterator<Item = VarId>,
        live_out: impl IntoIterator<Item = VarId>,
    ) {
        self.loops.insert(
            loop_id,
            (live_in.into_iter().collect(), live_out.into_iter().collect()),
        );
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

impl LivenessOracle for LiveSetTable {
    fn live_in(&self, point: ProgramPoint) -> BTreeSet<VarId> {
        match point {
            ProgramPoint::Loop(id) => self.loops.get(&id).map(|(i, _)| i.clone()).unwrap_or_default(),
            ProgramPoint::Stmt(_) => BTreeSet::new(),
        }
    }

    fn live_out(&self, point: ProgramPoint) -> BTreeSet<VarId> {
        match point {
            ProgramPoint::Loop(id) => self.loops.get(&id).map(|(_, o)| o.clone()).unwrap_or_default(),
            ProgramPoint::Stmt(_) => BTreeSet::new(),
        }
    }
}

/// Reaching definitions per variable reference.
#[derive(Debug, Clone, Default)]
pub struct ReachingDefTable {
    defs: HashMap<ExprId, Vec<DefSite>>,
}

impl ReachingDefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var_ref: ExprId, definitions: Vec<DefSite>) {
        self.defs.insert(var_ref, definitions);
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl DefUseOracle for ReachingDefTable {
    fn reaching_definitions(&self, var_ref: ExprId) -> Vec<DefSite> {
        self.defs.get(&var_ref).cloned().unwrap_or_default()
    }
}

/// Dependence graphs computed ahead of time, one per loop.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedGraphs {
    graphs: HashMap<LoopId, DependenceGraph>,
}

impl PrecomputedGraphs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, loop_id: LoopId, graph: DependenceGraph) {
        self.graphs.insert(loop_id, graph);
    }

    pub fn get(&self, loop_id: LoopId) -> Option<&DependenceGraph> {
        self.graphs.get(&loop_id)
    }
}

impl DependenceGraphBuilder for PrecomputedGraphs {
    fn build(&self, _program: &Program, loop_id: LoopId, _annotations: &ShapeAnnotations) -> Option<DependenceGraph> {
        self.graphs.get(&loop_id).cloned()
    }
}
