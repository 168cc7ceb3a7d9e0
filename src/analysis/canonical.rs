//! Structural recognition of canonical counted loops.
//!
//! A canonical loop is a `for` loop
//!
//! ```text
//! for (i = lb; i <= ub; i++)     // or int i = lb, <, ++i, i += 1, i = i + 1, i = 1 + i
//! for (i = ub; i >= lb; i--)     // or >, --i, i -= 1, i = i - 1
//! ```
//!
//! with all three header parts present, a body, and a test whose direction
//! agrees with the step.

use super::oracle::CanonicalLoopOracle;
use crate::ir::{BinaryOp, ExprId, ExprKind, LoopForm, LoopId, LoopInit, Program, VarId};

/// Recognizer working on the program model alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralLoopRecognizer;

fn var_of(program: &Program, expr: ExprId) -> Option<VarId> {
    match program.expr(expr).kind {
        ExprKind::VarRef(v) => Some(v),
        _ => None,
    }
}

fn is_one(program: &Program, expr: ExprId) -> bool {
    program.expr(expr).kind == ExprKind::IntLit(1)
}

/// Variable assigned by the init part.
fn init_var(program: &Program, init: &LoopInit) -> Option<VarId> {
    match init {
        LoopInit::Decl { var, .. } => Some(*var),
        LoopInit::Assign(e) => match program.expr(*e).kind {
            ExprKind::Assign { op: None, target, .. } => var_of(program, target),
            _ => None,
        },
    }
}

/// Whether the test bounds `var` from above (`i < n`, `n > i`) or from
/// below. `None` when the test does not compare `var`.
fn test_direction(program: &Program, test: ExprId, var: VarId) -> Option<bool> {
    let (op, lhs, rhs) = match program.expr(test).kind {
        ExprKind::Binary { op, lhs, rhs } => (op, lhs, rhs),
        _ => return None,
    };
    let upper = match op {
        BinaryOp::Lt | BinaryOp::Le => true,
        BinaryOp::Gt | BinaryOp::Ge => false,
        _ => return None,
    };
    if var_of(program, lhs) == Some(var) {
        Some(upper)
    } else if var_of(program, rhs) == Some(var) {
        // n > i is i < n
        Some(!upper)
    } else {
        None
    }
}

/// Variable stepped by the step part and the step (+1 or -1).
fn step_var(program: &Program, step: ExprId) -> Option<(VarId, i64)> {
    match program.expr(step).kind {
        ExprKind::Unary { op, operand } => {
            let v = var_of(program, operand)?;
            if op.is_increment() {
                Some((v, 1))
            } else if op.is_decrement() {
                Some((v, -1))
            } else {
                None
            }
        }
        ExprKind::Assign { op: Some(op), target, value } if is_one(program, value) => {
            let v = var_of(program, target)?;
            match op {
                BinaryOp::Add => Some((v, 1)),
                BinaryOp::Sub => Some((v, -1)),
                _ => None,
            }
        }
        ExprKind::Assign { op: None, target, value } => {
            let v = var_of(program, target)?;
            let (op, lhs, rhs) = match program.expr(value).kind {
                ExprKind::Binary { op, lhs, rhs } => (op, lhs, rhs),
                _ => return None,
            };
            let var_lhs = var_of(program, lhs) == Some(v);
            let var_rhs = var_of(program, rhs) == Some(v);
            match op {
                BinaryOp::Add if var_lhs && is_one(program, rhs) => Some((v, 1)),
                BinaryOp::Add if var_rhs && is_one(program, lhs) => Some((v, 1)),
                BinaryOp::Sub if var_lhs && is_one(program, rhs) => Some((v, -1)),
                _ => None,
            }
        }
        _ => None,
    }
}

impl CanonicalLoopOracle for StructuralLoopRecognizer {
    fn canonical_invariant(&self, program: &Program, loop_id: LoopId) -> Option<VarId> {
        let lp = program.get_loop(loop_id)?;
        if lp.form != LoopForm::For || lp.body.is_none() {
            return None;
        }
        let invariant = init_var(program, lp.init.as_ref()?)?;
        let upper = test_direction(program, lp.test?, invariant)?;
        let (stepped, step) = step_var(program, lp.step?)?;

        if stepped != invariant {
            return None;
        }
        // increasing loops need an upper bound, decreasing a lower one
        if (step > 0) != upper {
            return None;
        }
        Some(invariant)
    }
}

/// First construct in the loop the analysis does not support: shift
/// operators.
pub fn find_unsupported_construct(program: &Program, loop_id: LoopId) -> Option<BinaryOp> {
    let stmt = program.get_loop(loop_id)?.stmt;
    program
        .exprs_under(stmt)
        .into_iter()
        .find_map(|e| match program.expr(e).kind {
            ExprKind::Binary { op, .. } | ExprKind::Assign { op: Some(op), .. }
                if matches!(op, BinaryOp::Shl | BinaryOp::Shr) =>
            {
                Some(op)
            }
            _ => None,
        })
}
