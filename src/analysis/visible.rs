//! Variables visible to a loop, and variables involved in its scalar
//! dependences.

use super::access::var_ref;
use super::dependence::DependenceGraph;
use super::oracle::CanonicalLoopOracle;
use crate::ir::{ExprKind, LoopId, Program, VarId};
use crate::utils::errors::DependenceError;
use std::collections::BTreeSet;

/// Result of [`collect_visible`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleVariables {
    /// Variables referenced in the loop and declared at or outside the
    /// loop's enclosing scope
    pub variables: BTreeSet<VarId>,
    /// Invariants of canonical loops nested in the loop, visible at the
    /// enclosing scope
    pub nested_invariants: BTreeSet<VarId>,
}

impl VisibleVariables {
    pub fn contains(&self, var: VarId) -> bool {
        self.variables.contains(&var)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

fn is_visible(program: &Program, loop_id: LoopId, var: VarId) -> bool {
    let enclosing = program.loop_info(loop_id).enclosing;
    program.scope_within(enclosing, program.variable(var).scope)
}

/// Collect the variables referenced in the loop (header and body) whose
/// declaration is visible at the loop statement.
pub fn collect_visible(
    program: &Program,
    loop_id: LoopId,
    invariant: VarId,
    scalar_only: bool,
    oracle: &dyn CanonicalLoopOracle,
) -> VisibleVariables {
    let lp = program.loop_info(loop_id);

    let variables = program
        .exprs_under(lp.stmt)
        .into_iter()
        .filter_map(|e| match program.expr(e).kind {
            ExprKind::VarRef(v) => Some(v),
            _ => None,
        })
        .filter(|v| *v != invariant)
        .filter(|v| !scalar_only || program.variable(*v).ty.is_scalar())
        .filter(|v| is_visible(program, loop_id, *v))
        .collect();

    let nested_invariants = program
        .loop_nest(loop_id)
        .into_iter()
        .skip(1)
        .filter_map(|inner| oracle.canonical_invariant(program, inner))
        .filter(|v| *v != invariant && is_visible(program, loop_id, *v))
        .collect();

    VisibleVariables { variables, nested_invariants }
}

/// Variables on both ends of dependences between two plain references in
/// the loop, where neither variable is declared in the loop.
pub fn collect_dependence_variables(
    program: &Program,
    loop_id: LoopId,
    graph: &DependenceGraph,
    scalar_only: bool,
) -> Result<BTreeSet<VarId>, DependenceError> {
    let loop_scope = program.loop_info(loop_id).scope;
    let candidate = |access| -> Option<VarId> {
        let v = var_ref(program, access)?;
        if !program.expr_in_loop(access, loop_id) {
            return None;
        }
        if program.scope_within(program.variable(v).scope, loop_scope) {
            return None;
        }
        Some(v)
    };

    let mut vars = BTreeSet::new();
    for edge in graph.edges() {
        let (source, sink) = match (graph.access(edge.source)?, graph.access(edge.sink)?) {
            (Some(source), Some(sink)) => (source, sink),
            _ => continue,
        };
        if let (Some(v1), Some(v2)) = (candidate(source), candidate(sink)) {
            if scalar_only && !(program.variable(v1).ty.is_scalar() && program.variable(v2).ty.is_scalar()) {
                continue;
            }
            vars.insert(v1);
            vars.insert(v2);
        }
    }
    Ok(vars)
}
