//! Autoscoping: classify the variables of a loop into sharing categories.
//!
//! Categories are derived from live-variable facts at the loop and from the
//! scalar dependences between plain variable references:
//!
//! | live-in | live-out | category     |
//! |---------|----------|--------------|
//! | yes     | yes      | shared       |
//! | no      | no       | private      |
//! | yes     | no       | firstprivate |
//! | no      | yes      | lastprivate  |
//!
//! with accumulations among the live-in variables recognized as reductions.
//! Shared is the default and is never recorded.

use super::dependence::DependenceGraph;
use super::oracle::{CanonicalLoopOracle, LivenessOracle, ProgramPoint, ReductionRecognizer};
use super::reduction::ReductionOp;
use super::visible::{collect_dependence_variables, collect_visible, VisibleVariables};
use crate::ir::{ExprKind, LoopId, Program, VarId};
use crate::utils::errors::DependenceError;
use log::debug;
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Sharing category of a variable in a parallel loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeCategory {
    Shared,
    Private,
    FirstPrivate,
    LastPrivate,
    Reduction(ReductionOp),
}

impl ScopeCategory {
    /// Restrictiveness, used when several rules classify one variable.
    fn rank(&self) -> u8 {
        match self {
            ScopeCategory::Shared => 0,
            ScopeCategory::Private => 1,
            ScopeCategory::FirstPrivate => 2,
            ScopeCategory::LastPrivate => 3,
            ScopeCategory::Reduction(_) => 4,
        }
    }

    /// Categories the legality decision accepts.
    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            ScopeCategory::Shared | ScopeCategory::Private | ScopeCategory::FirstPrivate
        )
    }

    /// Privatized: every thread works on its own copy.
    pub fn is_privatized(&self) -> bool {
        matches!(self, ScopeCategory::Private | ScopeCategory::FirstPrivate)
    }
}

impl fmt::Display for ScopeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeCategory::Shared => write!(f, "shared"),
            ScopeCategory::Private => write!(f, "private"),
            ScopeCategory::FirstPrivate => write!(f, "firstprivate"),
            ScopeCategory::LastPrivate => write!(f, "lastprivate"),
            ScopeCategory::Reduction(op) => write!(f, "reduction({})", op),
        }
    }
}

/// Category per variable for one analyzed loop. Variables without an entry
/// are shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    entries: BTreeMap<VarId, ScopeCategory>,
}

impl Classification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a category. An existing, more restrictive category is kept.
    /// Returns whether the entry changed.
    pub fn assign(&mut self, var: VarId, category: ScopeCategory) -> bool {
        match self.entries.get(&var) {
            Some(existing) if existing.rank() >= category.rank() => false,
            _ => {
                self.entries.insert(var, category);
                true
            }
        }
    }

    pub fn category(&self, var: VarId) -> ScopeCategory {
        self.entries.get(&var).copied().unwrap_or(ScopeCategory::Shared)
    }

    pub fn get(&self, var: VarId) -> Option<ScopeCategory> {
        self.entries.get(&var).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, ScopeCategory)> + '_ {
        self.entries.iter().map(|(v, c)| (*v, *c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Variables of one category.
    pub fn with_category(&self, wanted: ScopeCategory) -> Vec<VarId> {
        self.iter().filter(|(_, c)| *c == wanted).map(|(v, _)| v).collect()
    }

    /// Variables the legality decision rejects (lastprivate, reduction).
    pub fn disallowed(&self) -> Vec<(VarId, ScopeCategory)> {
        self.iter().filter(|(_, c)| !c.is_allowed()).collect()
    }

    /// Visible variables left at the shared default.
    pub fn shared(&self, visible: &VisibleVariables) -> BTreeSet<VarId> {
        visible
            .variables
            .iter()
            .filter(|v| !self.entries.contains_key(v))
            .copied()
            .collect()
    }
}

/// Facts the autoscoper classifies from.
#[derive(Debug, Clone, Default)]
pub struct ScopingFacts {
    /// Scalar variables live into the loop, invariant excluded
    pub live_in: BTreeSet<VarId>,
    /// Scalar variables live out of the loop, invariant excluded
    pub live_out: BTreeSet<VarId>,
    /// Variables on scalar dependences between plain references,
    /// invariant excluded
    pub dep_vars: BTreeSet<VarId>,
    pub visible: VisibleVariables,
    /// Variables introduced by normalizing loops of the nest, as referenced
    /// in the loop
    pub synthetic: BTreeSet<VarId>,
}

impl ScopingFacts {
    /// Gather the facts for a loop from the oracles and its dependence
    /// graph.
    pub fn collect(
        program: &Program,
        loop_id: LoopId,
        invariant: VarId,
        liveness: &dyn LivenessOracle,
        graph: &DependenceGraph,
        canonical: &dyn CanonicalLoopOracle,
    ) -> Result<Self, DependenceError> {
        let scalars = |set: BTreeSet<VarId>| -> BTreeSet<VarId> {
            set.into_iter()
                .filter(|v| *v != invariant && program.variable(*v).ty.is_scalar())
                .collect()
        };
        let point = ProgramPoint::Loop(loop_id);

        let synthetic = program
            .exprs_under(program.loop_info(loop_id).stmt)
            .into_iter()
            .filter_map(|e| match program.expr(e).kind {
                ExprKind::VarRef(v) if program.variable(v).synthetic => Some(v),
                _ => None,
            })
            .collect();

        Ok(Self {
            live_in: scalars(liveness.live_in(point)),
            live_out: scalars(liveness.live_out(point)),
            dep_vars: collect_dependence_variables(program, loop_id, graph, true)?
                .into_iter()
                .filter(|v| *v != invariant)
                .collect(),
            visible: collect_visible(program, loop_id, invariant, true, canonical),
            synthetic,
        })
    }
}

/// Applies the classification rules in order.
pub struct Autoscoper<'a> {
    reductions: &'a dyn ReductionRecognizer,
    trace: bool,
}

impl<'a> Autoscoper<'a> {
    pub fn new(reductions: &'a dyn ReductionRecognizer) -> Self {
        Self { reductions, trace: false }
    }

    /// Emit a debug trace of every rule.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    fn trace_set(&self, program: &Program, label: &str, vars: &BTreeSet<VarId>) {
        if self.trace {
            let names: Vec<&str> = vars.iter().map(|v| program.variable(*v).name.as_str()).collect();
            debug!("{}: {{{}}}", label, names.join(", "));
        }
    }

    pub fn classify(&self, program: &Program, loop_id: LoopId, facts: &ScopingFacts) -> Classification {
        let mut classification = Classification::new();

        // live sets restricted to dependence variables
        let live_in: BTreeSet<VarId> = facts.live_in.intersection(&facts.dep_vars).copied().collect();
        let live_out: BTreeSet<VarId> = facts.live_out.intersection(&facts.dep_vars).copied().collect();
        self.trace_set(program, "live-in", &facts.live_in);
        self.trace_set(program, "live-out", &facts.live_out);
        self.trace_set(program, "dependence variables", &facts.dep_vars);

        // neither live in nor live out, plus the invariants of nested loops
        let mut private: BTreeSet<VarId> = facts
            .dep_vars
            .iter()
            .filter(|v| !live_in.contains(v) && !live_out.contains(v))
            .copied()
            .collect();
        private.extend(facts.visible.nested_invariants.iter().copied());
        private.retain(|v| !facts.synthetic.contains(v));
        self.trace_set(program, "private", &private);
        for v in &private {
            classification.assign(*v, ScopeCategory::Private);
        }

        let lastprivate: BTreeSet<VarId> = live_out.difference(&facts.live_in).copied().collect();
        self.trace_set(program, "lastprivate", &lastprivate);
        for v in &lastprivate {
            classification.assign(*v, ScopeCategory::LastPrivate);
        }

        let reductions = self.reductions.recognize(program, loop_id, &facts.live_in);
        for (v, op) in &reductions {
            if self.trace {
                debug!("reduction({}): {}", op, program.variable(*v).name);
            }
            classification.assign(*v, ScopeCategory::Reduction(*op));
        }

        let firstprivate: BTreeSet<VarId> = facts
            .live_in
            .iter()
            .filter(|v| !facts.live_out.contains(v) && !facts.dep_vars.contains(v) && facts.visible.contains(**v))
            .copied()
            .collect();
        self.trace_set(program, "firstprivate", &firstprivate);
        for v in &firstprivate {
            classification.assign(*v, ScopeCategory::FirstPrivate);
        }

        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::reduction::AccumulationRecognizer;

    fn set(vars: &[u32]) -> BTreeSet<VarId> {
        vars.iter().map(|v| VarId(*v)).collect()
    }

    #[test]
    fn test_precedence() {
        let mut c = Classification::new();
        assert!(c.assign(VarId(1), ScopeCategory::Private));
        assert!(c.assign(VarId(1), ScopeCategory::LastPrivate));
        assert!(!c.assign(VarId(1), ScopeCategory::FirstPrivate));
        assert_eq!(c.category(VarId(1)), ScopeCategory::LastPrivate);
        assert_eq!(c.category(VarId(2)), ScopeCategory::Shared);
        assert_eq!(c.disallowed(), vec![(VarId(1), ScopeCategory::LastPrivate)]);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ScopeCategory::Reduction(ReductionOp::Mul).to_string(), "reduction(*)");
        assert_eq!(ScopeCategory::FirstPrivate.to_string(), "firstprivate");
        assert!(ScopeCategory::FirstPrivate.is_privatized());
        assert!(!ScopeCategory::LastPrivate.is_allowed());
    }

    #[test]
    fn test_rules_from_facts() {
        // v1: temp, v2: read-only, v3: result, v4: nested invariant,
        // v5: normalization temporary
        let mut b = crate::ir::ProgramBuilder::new("facts");
        let root = b.root_scope();
        for name in ["i", "t", "k", "r", "j", "n0"] {
            b.declare_var(root, name, crate::ir::VarType::Int);
        }
        let i = VarId(0);
        let zero = b.int(0);
        let n = b.int(10);
        let lp = b.for_loop(root, i, zero, n);
        let program = b.finish();

        let facts = ScopingFacts {
            live_in: set(&[2]),
            live_out: set(&[3]),
            dep_vars: set(&[1, 3, 5]),
            visible: VisibleVariables {
                variables: set(&[1, 2, 3, 4, 5]),
                nested_invariants: set(&[4]),
            },
            synthetic: set(&[5]),
        };
        let c = Autoscoper::new(&AccumulationRecognizer).classify(&program, lp.id, &facts);

        assert_eq!(c.category(VarId(1)), ScopeCategory::Private);
        assert_eq!(c.category(VarId(2)), ScopeCategory::FirstPrivate);
        assert_eq!(c.category(VarId(3)), ScopeCategory::LastPrivate);
        assert_eq!(c.category(VarId(4)), ScopeCategory::Private);
        assert_eq!(c.get(VarId(5)), None);
        assert_eq!(c.shared(&facts.visible), set(&[5]));
    }

    #[test]
    fn test_synthetic_variables_stay_shared() {
        // for (i..) { i0 = i0 + 1; t = t + 1; } with i0 from normalization
        use crate::analysis::canonical::StructuralLoopRecognizer;
        use crate::analysis::dependence::{DependenceEdge, DependenceKind};
        use crate::analysis::oracle::LiveSetTable;
        use crate::ir::{BinaryOp, ProgramBuilder, VarType};

        let mut b = ProgramBuilder::new("normalized");
        let root = b.root_scope();
        let i = b.declare_var(root, "i", VarType::Int);
        let i0 = b.synthetic_var(root, "i0", VarType::Int);
        let t = b.declare_var(root, "t", VarType::Int);
        let zero = b.int(0);
        let n = b.int(10);
        let lp = b.for_loop(root, i, zero, n);
        let mut graph = DependenceGraph::new();
        for v in [i0, t] {
            let target = b.var(v);
            let read = b.var(v);
            let one = b.int(1);
            let sum = b.binary(BinaryOp::Add, read, one);
            let store = b.assign(target, sum);
            b.expr_stmt(lp.body_scope, store);
            let (w, r) = (graph.node_for(target), graph.node_for(read));
            graph.add_edge(DependenceEdge::new(w, r, DependenceKind::SCALAR)).unwrap();
        }
        let program = b.finish();

        let live = LiveSetTable::new();
        let facts = ScopingFacts::collect(&program, lp.id, i, &live, &graph, &StructuralLoopRecognizer).unwrap();
        assert_eq!(facts.synthetic, [i0].into_iter().collect());
        assert_eq!(facts.dep_vars, [i0, t].into_iter().collect());

        let c = Autoscoper::new(&AccumulationRecognizer).classify(&program, lp.id, &facts);
        assert_eq!(c.get(i0), None);
        assert_eq!(c.category(t), ScopeCategory::Private);
    }
}
