//! Dependence elimination.
//!
//! The raw dependence graph of a loop is conservative: it contains every
//! pair of accesses that might touch the same memory. The eliminator drops
//! the edges that cannot prevent running the iterations of the analyzed
//! loop in parallel. Filters run in a fixed order and the first filter that
//! matches decides; whatever survives all of them blocks parallelization.

use super::access::{array_symbol, different_memory_location, is_static_array_ref, var_ref};
use super::dependence::{DependenceEdge, DependenceGraph};
use super::indirect::IndirectIndexTable;
use super::oracle::{ShapeAnnotations, NO_ANNOTATIONS};
use super::scoping::Classification;
use crate::ir::{ExprId, LoopId, Program, VarId};
use crate::utils::errors::AutoParResult;
use crate::AnalysisConfig;
use log::debug;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use std::fmt;

/// The filter that removed an edge, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EliminationReason {
    /// An endpoint is a variable declared inside the loop
    LocalDeclaration,
    /// An endpoint does not resolve to an access
    EmptyReference,
    /// Scalar dependence between a scalar and an array element
    ScalarVersusArray,
    /// Accesses to two different arrays
    DistinctArrays,
    /// An endpoint is privatized by autoscoping
    AutoscopedVariable,
    /// Both accesses go through a verified unique indirect index
    UniqueIndirectIndex,
    /// Members of two different objects
    DistinctMemoryLocation,
    /// No loop encloses both accesses
    NoCommonLoop,
    /// Carried by an inner loop, not this one
    NotCarriedHere,
}

impl EliminationReason {
    /// All filters, in the order they are applied.
    pub const ALL: [EliminationReason; 9] = [
        EliminationReason::LocalDeclaration,
        EliminationReason::EmptyReference,
        EliminationReason::ScalarVersusArray,
        EliminationReason::DistinctArrays,
        EliminationReason::AutoscopedVariable,
        EliminationReason::UniqueIndirectIndex,
        EliminationReason::DistinctMemoryLocation,
        EliminationReason::NoCommonLoop,
        EliminationReason::NotCarriedHere,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            EliminationReason::LocalDeclaration => "local declaration",
            EliminationReason::EmptyReference => "empty reference",
            EliminationReason::ScalarVersusArray => "scalar versus array",
            EliminationReason::DistinctArrays => "distinct arrays",
            EliminationReason::AutoscopedVariable => "autoscoped variable",
            EliminationReason::UniqueIndirectIndex => "unique indirect index",
            EliminationReason::DistinctMemoryLocation => "distinct memory location",
            EliminationReason::NoCommonLoop => "no common loop",
            EliminationReason::NotCarriedHere => "not carried by this loop",
        }
    }
}

impl fmt::Display for EliminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// An edge removed by a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EliminatedEdge {
    pub edge: DependenceEdge,
    pub reason: EliminationReason,
}

/// Result of [`DependenceEliminator::eliminate`].
#[derive(Debug, Clone, Default)]
pub struct EliminationOutcome {
    /// Edges that prevent parallelization
    pub remaining: Vec<DependenceEdge>,
    pub eliminated: Vec<EliminatedEdge>,
}

impl EliminationOutcome {
    pub fn is_parallelizable(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Number of eliminated edges per filter.
    pub fn counts(&self) -> BTreeMap<EliminationReason, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.eliminated {
            *counts.entry(e.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Endpoint accesses of an edge.
struct Endpoints {
    source: Option<ExprId>,
    sink: Option<ExprId>,
}

/// Runs the filter pipeline for one loop.
pub struct DependenceEliminator<'a> {
    program: &'a Program,
    loop_id: LoopId,
    invariant: VarId,
    config: &'a AnalysisConfig,
    classification: &'a Classification,
    indirect: &'a IndirectIndexTable,
    annotations: &'a ShapeAnnotations,
    disabled: Vec<EliminationReason>,
}

impl<'a> DependenceEliminator<'a> {
    pub fn new(
        program: &'a Program,
        loop_id: LoopId,
        invariant: VarId,
        config: &'a AnalysisConfig,
        classification: &'a Classification,
        indirect: &'a IndirectIndexTable,
    ) -> Self {
        Self {
            program,
            loop_id,
            invariant,
            config,
            classification,
            indirect,
            annotations: &NO_ANNOTATIONS,
            disabled: Vec::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: &'a ShapeAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    /// Disable one filter.
    pub fn without(mut self, reason: EliminationReason) -> Self {
        self.disabled.push(reason);
        self
    }

    fn enabled(&self, reason: EliminationReason) -> bool {
        !self.disabled.contains(&reason)
    }

    /// Filter every edge of the graph once.
    pub fn eliminate(&self, graph: &DependenceGraph) -> AutoParResult<EliminationOutcome> {
        let mut outcome = EliminationOutcome::default();
        for edge in graph.edges() {
            let ends = Endpoints {
                source: graph.access(edge.source)?,
                sink: graph.access(edge.sink)?,
            };
            match self.first_match(edge, &ends) {
                Some(reason) => {
                    if self.config.enable_debug_trace {
                        debug!("eliminated {} ({})", edge, reason);
                    }
                    outcome.eliminated.push(EliminatedEdge { edge: edge.clone(), reason });
                }
                None => {
                    if self.config.enable_debug_trace {
                        debug!("kept {}", edge);
                    }
                    outcome.remaining.push(edge.clone());
                }
            }
        }
        Ok(outcome)
    }

    fn first_match(&self, edge: &DependenceEdge, ends: &Endpoints) -> Option<EliminationReason> {
        EliminationReason::ALL
            .into_iter()
            .filter(|r| self.enabled(*r))
            .find(|r| self.applies(*r, edge, ends))
    }

    fn applies(&self, reason: EliminationReason, edge: &DependenceEdge, ends: &Endpoints) -> bool {
        match reason {
            EliminationReason::LocalDeclaration => self.local_declaration(ends),
            EliminationReason::EmptyReference => ends.source.is_none() || ends.sink.is_none(),
            EliminationReason::ScalarVersusArray => self.scalar_versus_array(edge, ends),
            EliminationReason::DistinctArrays => self.distinct_arrays(edge, ends),
            EliminationReason::AutoscopedVariable => self.autoscoped(ends),
            EliminationReason::UniqueIndirectIndex => self.unique_indirect(ends),
            EliminationReason::DistinctMemoryLocation => match (ends.source, ends.sink) {
                (Some(source), Some(sink)) => different_memory_location(self.program, source, sink),
                _ => false,
            },
            EliminationReason::NoCommonLoop => edge.common_level == 0,
            EliminationReason::NotCarriedHere => edge.carry_level != 0,
        }
    }

    fn endpoint_vars(&self, ends: &Endpoints) -> [Option<VarId>; 2] {
        [
            ends.source.and_then(|e| var_ref(self.program, e)),
            ends.sink.and_then(|e| var_ref(self.program, e)),
        ]
    }

    fn local_declaration(&self, ends: &Endpoints) -> bool {
        let loop_scope = self.program.loop_info(self.loop_id).scope;
        self.endpoint_vars(ends)
            .into_iter()
            .flatten()
            .any(|v| self.program.scope_within(self.program.variable(v).scope, loop_scope))
    }

    fn is_array_access(&self, access: Option<ExprId>) -> bool {
        access.is_some_and(|e| self.annotations.is_array_access(self.program, e))
    }

    fn scalar_versus_array(&self, edge: &DependenceEdge, ends: &Endpoints) -> bool {
        if !edge.kind.is_scalar_kind() {
            return false;
        }
        if !(self.is_array_access(ends.source) || self.is_array_access(ends.sink)) {
            return false;
        }
        let [source_var, sink_var] = self.endpoint_vars(ends);
        match source_var.or(sink_var) {
            // a pointer may alias the array
            Some(v) => !self.program.variable(v).ty.is_pointer() || self.config.assume_no_aliasing,
            None => {
                let both_static = match (ends.source, ends.sink) {
                    (Some(source), Some(sink)) => {
                        is_static_array_ref(self.program, source) && is_static_array_ref(self.program, sink)
                    }
                    _ => false,
                };
                self.config.assume_no_aliasing || both_static
            }
        }
    }

    fn distinct_arrays(&self, edge: &DependenceEdge, ends: &Endpoints) -> bool {
        if !self.config.assume_no_aliasing || !edge.kind.is_data_kind() {
            return false;
        }
        if !(self.is_array_access(ends.source) && self.is_array_access(ends.sink)) {
            return false;
        }
        match (ends.source, ends.sink) {
            (Some(source), Some(sink)) => {
                match (array_symbol(self.program, source), array_symbol(self.program, sink)) {
                    (Some(a), Some(b)) => a != b,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn autoscoped(&self, ends: &Endpoints) -> bool {
        self.endpoint_vars(ends)
            .into_iter()
            .flatten()
            .any(|v| v == self.invariant || self.classification.category(v).is_privatized())
    }

    fn unique_indirect(&self, ends: &Endpoints) -> bool {
        if !self.config.enable_indirect_index_uniqueness {
            return false;
        }
        match (ends.source, ends.sink) {
            (Some(source), Some(sink)) => self.indirect.contains(source) && self.indirect.contains(sink),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dependence::DependenceKind;
    use crate::analysis::scoping::ScopeCategory;
    use crate::ir::{LoopHandle, ProgramBuilder, VarType};

    struct Fixture {
        program: Program,
        lp: LoopHandle,
        i: VarId,
        t: VarId,
        x: VarId,
        a_i: ExprId,
        b_i: ExprId,
        p_i: ExprId,
        x_ref: ExprId,
        t_ref: ExprId,
        i_ref: ExprId,
        q_ref: ExprId,
    }

    /// Accesses `a[i]`, `b[i]`, `p[i]`, `x`, `q` and a loop local `t` in
    /// `for (i..)`.
    fn fixture() -> Fixture {
        let mut b = ProgramBuilder::new("filters");
        let root = b.root_scope();
        let a = b.param("a", VarType::array(VarType::Double, &[Some(64)]));
        let bb = b.param("b", VarType::array(VarType::Double, &[Some(64)]));
        let p = b.param("p", VarType::pointer(VarType::Double));
        let q = b.param("q", VarType::pointer(VarType::Double));
        let x = b.declare_var(root, "x", VarType::Double);
        let i = b.declare_var(root, "i", VarType::Int);
        let zero = b.int(0);
        let n = b.int(64);
        let lp = b.for_loop(root, i, zero, n);
        let t = b.declare_var(lp.body_scope, "t", VarType::Double);

        let elem = |b: &mut ProgramBuilder, arr: VarId| {
            let base = b.var(arr);
            let idx = b.var(i);
            b.index(base, idx)
        };
        let a_i = elem(&mut b, a);
        let b_i = elem(&mut b, bb);
        let p_i = elem(&mut b, p);
        let x_ref = b.var(x);
        let t_ref = b.var(t);
        let i_ref = b.var(i);
        let q_ref = b.var(q);
        for e in [a_i, b_i, p_i, x_ref, t_ref, i_ref, q_ref] {
            b.expr_stmt(lp.body_scope, e);
        }
        Fixture { program: b.finish(), lp, i, t, x, a_i, b_i, p_i, x_ref, t_ref, i_ref, q_ref }
    }

    fn reason_for(
        f: &Fixture,
        config: &AnalysisConfig,
        classification: &Classification,
        source: Option<ExprId>,
        sink: Option<ExprId>,
        edge: impl FnOnce(crate::analysis::dependence::NodeId, crate::analysis::dependence::NodeId) -> DependenceEdge,
    ) -> Option<EliminationReason> {
        let mut graph = DependenceGraph::new();
        let s = graph.add_node(source);
        let k = graph.add_node(sink);
        graph.add_edge(edge(s, k)).unwrap();
        let indirect = IndirectIndexTable::new();
        let outcome = DependenceEliminator::new(&f.program, f.lp.id, f.i, config, classification, &indirect)
            .eliminate(&graph)
            .unwrap();
        outcome.eliminated.first().map(|e| e.reason)
    }

    #[test]
    fn test_local_and_empty() {
        let f = fixture();
        let config = AnalysisConfig::default();
        let c = Classification::new();
        let local = reason_for(&f, &config, &c, Some(f.t_ref), Some(f.x_ref), |s, k| {
            DependenceEdge::new(s, k, DependenceKind::SCALAR)
        });
        assert_eq!(local, Some(EliminationReason::LocalDeclaration));
        assert!(f.program.variable(f.t).scope != f.program.variable(f.x).scope);

        let empty = reason_for(&f, &config, &c, None, Some(f.a_i), |s, k| {
            DependenceEdge::new(s, k, DependenceKind::TRUE)
        });
        assert_eq!(empty, Some(EliminationReason::EmptyReference));
    }

    #[test]
    fn test_header_declaration_is_local() {
        // for (int i = 0, h = 0; i < 64; i++) { h; h; }
        let mut b = ProgramBuilder::new("header");
        let root = b.root_scope();
        let lp = b.begin_for(root);
        let i = b.declare_var(lp.scope, "i", VarType::Int);
        let h = b.declare_var(lp.scope, "h", VarType::Int);
        let zero = b.int(0);
        let lhs = b.var(i);
        let n = b.int(64);
        let test = b.binary(crate::ir::BinaryOp::Lt, lhs, n);
        let r = b.var(i);
        let step = b.unary(crate::ir::UnaryOp::PostInc, r);
        b.set_loop_header(lp.id, Some(crate::ir::LoopInit::Decl { var: i, value: zero }), Some(test), Some(step));
        let first = b.var(h);
        let second = b.var(h);
        b.expr_stmt(lp.body_scope, first);
        b.expr_stmt(lp.body_scope, second);
        let program = b.finish();
        assert_ne!(program.variable(h).scope, lp.body_scope);

        let mut graph = DependenceGraph::new();
        let (s, k) = (graph.node_for(first), graph.node_for(second));
        graph.add_edge(DependenceEdge::new(s, k, DependenceKind::SCALAR)).unwrap();
        let config = AnalysisConfig::default();
        let classification = Classification::new();
        let indirect = IndirectIndexTable::new();
        let outcome = DependenceEliminator::new(&program, lp.id, i, &config, &classification, &indirect)
            .eliminate(&graph)
            .unwrap();
        assert!(outcome.remaining.is_empty());
        assert_eq!(outcome.eliminated[0].reason, EliminationReason::LocalDeclaration);
    }

    #[test]
    fn test_scalar_versus_array() {
        let f = fixture();
        let c = Classification::new();
        let scalar = |s, k| DependenceEdge::new(s, k, DependenceKind::SCALAR);

        let config = AnalysisConfig::default();
        assert_eq!(
            reason_for(&f, &config, &c, Some(f.x_ref), Some(f.a_i), scalar),
            Some(EliminationReason::ScalarVersusArray)
        );
        // the pointer q may alias p[i]
        assert_eq!(reason_for(&f, &config, &c, Some(f.q_ref), Some(f.p_i), scalar), None);
        // two static arrays
        assert_eq!(
            reason_for(&f, &config, &c, Some(f.a_i), Some(f.b_i), scalar),
            Some(EliminationReason::ScalarVersusArray)
        );
        assert_eq!(reason_for(&f, &config, &c, Some(f.a_i), Some(f.p_i), scalar), None);

        let no_alias = AnalysisConfig::default().assume_no_aliasing(true);
        assert_eq!(
            reason_for(&f, &no_alias, &c, Some(f.q_ref), Some(f.p_i), scalar),
            Some(EliminationReason::ScalarVersusArray)
        );
    }

    #[test]
    fn test_distinct_arrays_needs_no_aliasing() {
        let f = fixture();
        let c = Classification::new();
        let flow = |s, k| DependenceEdge::new(s, k, DependenceKind::TRUE);

        let config = AnalysisConfig::default();
        assert_eq!(reason_for(&f, &config, &c, Some(f.a_i), Some(f.p_i), flow), None);

        let no_alias = AnalysisConfig::default().assume_no_aliasing(true);
        assert_eq!(
            reason_for(&f, &no_alias, &c, Some(f.a_i), Some(f.p_i), flow),
            Some(EliminationReason::DistinctArrays)
        );
        assert_eq!(reason_for(&f, &no_alias, &c, Some(f.a_i), Some(f.a_i), flow), None);
    }

    #[test]
    fn test_autoscoped_and_invariant() {
        let f = fixture();
        let config = AnalysisConfig::default();
        let scalar = |s, k| DependenceEdge::new(s, k, DependenceKind::SCALAR);

        let mut c = Classification::new();
        assert_eq!(reason_for(&f, &config, &c, Some(f.x_ref), Some(f.x_ref), scalar), None);
        c.assign(f.x, ScopeCategory::FirstPrivate);
        assert_eq!(
            reason_for(&f, &config, &c, Some(f.x_ref), Some(f.x_ref), scalar),
            Some(EliminationReason::AutoscopedVariable)
        );

        let mut last = Classification::new();
        last.assign(f.x, ScopeCategory::LastPrivate);
        assert_eq!(reason_for(&f, &config, &last, Some(f.x_ref), Some(f.x_ref), scalar), None);

        assert_eq!(
            reason_for(&f, &config, &Classification::new(), Some(f.i_ref), Some(f.i_ref), scalar),
            Some(EliminationReason::AutoscopedVariable)
        );
    }

    #[test]
    fn test_levels() {
        let f = fixture();
        let config = AnalysisConfig::default();
        let c = Classification::new();

        let outside = reason_for(&f, &config, &c, Some(f.a_i), Some(f.a_i), |s, k| {
            DependenceEdge::new(s, k, DependenceKind::TRUE).levels(0, 0)
        });
        assert_eq!(outside, Some(EliminationReason::NoCommonLoop));

        let inner = reason_for(&f, &config, &c, Some(f.a_i), Some(f.a_i), |s, k| {
            DependenceEdge::new(s, k, DependenceKind::TRUE).levels(2, 1)
        });
        assert_eq!(inner, Some(EliminationReason::NotCarriedHere));

        let carried = reason_for(&f, &config, &c, Some(f.a_i), Some(f.a_i), |s, k| {
            DependenceEdge::new(s, k, DependenceKind::TRUE).levels(1, 0)
        });
        assert_eq!(carried, None);
    }

    #[test]
    fn test_disabled_filter_and_counts() {
        let f = fixture();
        let config = AnalysisConfig::default();
        let mut c = Classification::new();
        c.assign(f.x, ScopeCategory::Private);

        let mut graph = DependenceGraph::new();
        let n = graph.add_node(Some(f.x_ref));
        graph.add_edge(DependenceEdge::new(n, n, DependenceKind::SCALAR)).unwrap();
        let indirect = IndirectIndexTable::new();

        let full = DependenceEliminator::new(&f.program, f.lp.id, f.i, &config, &c, &indirect)
            .eliminate(&graph)
            .unwrap();
        assert!(full.is_parallelizable());
        assert_eq!(full.counts().get(&EliminationReason::AutoscopedVariable), Some(&1));

        let partial = DependenceEliminator::new(&f.program, f.lp.id, f.i, &config, &c, &indirect)
            .without(EliminationReason::AutoscopedVariable)
            .eliminate(&graph)
            .unwrap();
        assert_eq!(partial.remaining.len(), 1);
    }
}
