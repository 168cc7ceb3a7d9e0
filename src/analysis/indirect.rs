//! Indirect array indices.
//!
//! A loop such as
//!
//! ```text
//! for (i = 0; i < n; i++) {
//!     t = index[i];
//!     x[t] = x[t] + 1;
//! }
//! ```
//!
//! only touches distinct elements of `x` when `index` holds distinct
//! values. Normalization rewrites `x[t]` into `x[index[i]]` so that the
//! indirection is visible in the access itself; classification then marks
//! the accesses whose innermost index is the loop invariant.

use super::oracle::{DefSite, DefUseOracle};
use crate::ir::{BinaryOp, ExprId, ExprKind, LoopId, Program, StmtId, StmtKind, VarId};
use log::{debug, warn};
use std::collections::BTreeSet;

/// Array accesses with a verified unique indirect index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndirectIndexTable {
    accesses: BTreeSet<ExprId>,
}

impl IndirectIndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, access: ExprId) -> bool {
        self.accesses.insert(access)
    }

    pub fn contains(&self, access: ExprId) -> bool {
        self.accesses.contains(&access)
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.accesses.iter().copied()
    }
}

/// Value assigned by a definition, or `None` when the definition does not
/// copy a value (with a warning for unknown shapes).
fn defined_value(program: &Program, def: DefSite) -> Option<ExprId> {
    match def {
        DefSite::Decl(stmt) => match &program.stmt(stmt).kind {
            StmtKind::Decl { init, .. } => *init,
            _ => {
                warn!("definition {} is not a declaration", stmt);
                None
            }
        },
        DefSite::Expr(expr) => match program.expr(expr).kind {
            ExprKind::Assign { op: None, value, .. } => Some(value),
            ExprKind::Unary { op, .. } if op.is_decrement() => None,
            ref other => {
                warn!(
                    "unhandled definition shape {} at {}",
                    other.variant_name(),
                    program.expr(expr).span
                );
                None
            }
        },
    }
}

fn def_stmt(program: &Program, def: DefSite) -> Option<StmtId> {
    match def {
        DefSite::Decl(stmt) => Some(stmt),
        DefSite::Expr(expr) => program.expr(expr).stmt,
    }
}

/// Follow single reaching definitions from `start`, a variable reference,
/// while they copy a value. Returns the last value reached.
fn chase(
    program: &Program,
    start: ExprId,
    invariant: VarId,
    body: StmtId,
    defuse: &dyn DefUseOracle,
) -> ExprId {
    let mut current = start;
    // a definition chain cannot be longer than the program
    for _ in 0..program.exprs.len() {
        let var = match program.expr(current).kind {
            ExprKind::VarRef(v) => v,
            _ => break,
        };
        if var == invariant {
            break;
        }
        let defs = defuse.reaching_definitions(current);
        let def = match defs.as_slice() {
            [] => {
                warn!(
                    "no reaching definition for {} at {}",
                    program.variable(var).name,
                    program.expr(current).span
                );
                break;
            }
            [def] => *def,
            _ => break,
        };
        match def_stmt(program, def) {
            Some(stmt) if program.stmt_within(stmt, body) => {}
            _ => break,
        }
        match defined_value(program, def) {
            Some(value) => current = value,
            None => break,
        }
    }
    current
}

/// Rewrite indices that are copies of array elements into the array
/// element itself. Returns the number of rewritten accesses.
///
/// Running it again on a normalized loop performs no rewrites.
pub fn normalize_indirect_indexing(
    program: &mut Program,
    loop_id: LoopId,
    invariant: VarId,
    defuse: &dyn DefUseOracle,
) -> usize {
    let body = match program.loop_info(loop_id).body {
        Some(body) => body,
        None => return 0,
    };

    let candidates: Vec<(ExprId, ExprId)> = program
        .exprs_under(body)
        .into_iter()
        .filter_map(|e| {
            let index = match program.expr(e).kind {
                ExprKind::Index { index, .. } => index,
                _ => return None,
            };
            match program.expr(index).kind {
                ExprKind::VarRef(_) => Some((e, index)),
                // already indirect
                ExprKind::Index { .. } => None,
                ref other if is_arithmetic_index(other) => None,
                ref other => {
                    warn!(
                        "unhandled index shape {} at {}",
                        other.variant_name(),
                        program.expr(index).span
                    );
                    None
                }
            }
        })
        .collect();

    let mut rewrites = 0;
    for (access, index) in candidates {
        let value = chase(program, index, invariant, body, defuse);
        if value == index || !matches!(program.expr(value).kind, ExprKind::Index { .. }) {
            continue;
        }
        let stmt = program.expr(access).stmt;
        let copy = program.deep_copy_expr(value, Some(access), stmt);
        if program.replace_index(access, copy) {
            debug!("rewrote index of access {} to the copy {} of {}", access, copy, value);
            rewrites += 1;
        }
    }
    rewrites
}

/// Index shapes that compute a position directly, without going through
/// another array.
fn is_arithmetic_index(kind: &ExprKind) -> bool {
    match kind {
        ExprKind::IntLit(_) => true,
        ExprKind::Binary { op, .. } => {
            matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Mod)
        }
        ExprKind::Unary { op, .. } => op.is_increment() || op.is_decrement(),
        _ => false,
    }
}

/// Innermost index of an index chain and its nesting depth:
/// `(i, 2)` for `x[y[i]]`.
fn innermost_index(program: &Program, access: ExprId) -> Option<(ExprId, usize)> {
    let mut index = match program.expr(access).kind {
        ExprKind::Index { index, .. } => index,
        _ => return None,
    };
    let mut depth = 1;
    while let ExprKind::Index { index: inner, .. } = program.expr(index).kind {
        index = inner;
        depth += 1;
    }
    Some((index, depth))
}

/// Array accesses of the loop body whose index is indexed, through one or
/// more arrays, by the loop invariant.
pub fn collect_verified_indirect(program: &Program, loop_id: LoopId, invariant: VarId) -> IndirectIndexTable {
    let mut table = IndirectIndexTable::new();
    let body = match program.loop_info(loop_id).body {
        Some(body) => body,
        None => return table,
    };

    for access in program.exprs_under(body) {
        let (index, depth) = match innermost_index(program, access) {
            Some(found) => found,
            None => continue,
        };
        match program.expr(index).kind {
            ExprKind::VarRef(v) if v == invariant => {
                if depth > 1 {
                    table.insert(access);
                }
            }
            ExprKind::VarRef(_) => {}
            ref other if is_arithmetic_index(other) => {}
            ref other => {
                warn!(
                    "unhandled index shape {} at {}",
                    other.variant_name(),
                    program.expr(index).span
                );
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::oracle::ReachingDefTable;
    use crate::ir::{LoopHandle, ProgramBuilder, VarType};

    struct Indirect {
        program: Program,
        lp: LoopHandle,
        i: VarId,
        x_access: ExprId,
        defs: ReachingDefTable,
    }

    /// `for (i..) { t = index[i]; x[t] = 0; }`
    fn indirect_loop() -> Indirect {
        let mut b = ProgramBuilder::new("scatter");
        let root = b.root_scope();
        let x = b.param("x", VarType::pointer(VarType::Double));
        let index = b.param("index", VarType::pointer(VarType::Int));
        let t = b.declare_var(root, "t", VarType::Int);
        let i = b.declare_var(root, "i", VarType::Int);
        let zero = b.int(0);
        let n = b.int(100);
        let lp = b.for_loop(root, i, zero, n);

        let t_def = b.var(t);
        let index_ref = b.var(index);
        let i_ref = b.var(i);
        let elem = b.index(index_ref, i_ref);
        let def = b.assign(t_def, elem);
        b.expr_stmt(lp.body_scope, def);

        let x_ref = b.var(x);
        let t_use = b.var(t);
        let x_access = b.index(x_ref, t_use);
        let zero = b.float(0.0);
        let store = b.assign(x_access, zero);
        b.expr_stmt(lp.body_scope, store);

        let mut defs = ReachingDefTable::new();
        defs.insert(t_use, vec![DefSite::Expr(def)]);
        Indirect { program: b.finish(), lp, i, x_access, defs }
    }

    #[test]
    fn test_normalize_rewrites_through_temporary() {
        let mut case = indirect_loop();
        let rewrites = normalize_indirect_indexing(&mut case.program, case.lp.id, case.i, &case.defs);
        assert_eq!(rewrites, 1);
        assert_eq!(
            crate::ir::expr_to_string(&case.program, case.x_access),
            "x[index[i]]"
        );

        // idempotent
        let again = normalize_indirect_indexing(&mut case.program, case.lp.id, case.i, &case.defs);
        assert_eq!(again, 0);

        let verified = collect_verified_indirect(&case.program, case.lp.id, case.i);
        assert!(verified.contains(case.x_access));
        assert_eq!(verified.len(), 1);
    }

    #[test]
    fn test_no_rewrite_with_multiple_definitions() {
        let mut case = indirect_loop();
        let t_use = match case.program.expr(case.x_access).kind {
            ExprKind::Index { index, .. } => index,
            _ => unreachable!(),
        };
        let def = case.defs.reaching_definitions(t_use)[0];
        case.defs.insert(t_use, vec![def, def]);

        let rewrites = normalize_indirect_indexing(&mut case.program, case.lp.id, case.i, &case.defs);
        assert_eq!(rewrites, 0);
        assert!(collect_verified_indirect(&case.program, case.lp.id, case.i).is_empty());
    }

    #[test]
    fn test_index_shapes() {
        // for (i..) { x[i + 1] = x[hash(i)]; }
        let mut b = ProgramBuilder::new("shapes");
        let root = b.root_scope();
        let x = b.param("x", VarType::pointer(VarType::Int));
        let i = b.declare_var(root, "i", VarType::Int);
        let zero = b.int(0);
        let n = b.int(100);
        let lp = b.for_loop(root, i, zero, n);
        let x_ref = b.var(x);
        let i_ref = b.var(i);
        let one = b.int(1);
        let next = b.binary(BinaryOp::Add, i_ref, one);
        let write = b.index(x_ref, next);
        let x_ref = b.var(x);
        let i_ref = b.var(i);
        let hashed = b.call("hash", vec![i_ref]);
        let read = b.index(x_ref, hashed);
        let store = b.assign(write, read);
        b.expr_stmt(lp.body_scope, store);
        let mut program = b.finish();

        assert!(is_arithmetic_index(&program.expr(next).kind));
        assert!(!is_arithmetic_index(&program.expr(hashed).kind));

        // neither index is a copy of an array element
        let rewrites = normalize_indirect_indexing(&mut program, lp.id, i, &ReachingDefTable::new());
        assert_eq!(rewrites, 0);
        assert_eq!(crate::ir::expr_to_string(&program, write), "x[i + 1]");
        assert!(collect_verified_indirect(&program, lp.id, i).is_empty());
    }
}
