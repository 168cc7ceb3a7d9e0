//! Reduction recognition over accumulation statements.

use super::oracle::ReductionRecognizer;
use crate::ir::{BinaryOp, ExprId, ExprKind, LoopId, Program, StmtKind, VarId};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Operator of a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReductionOp {
    Add,
    Sub,
    Mul,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
}

impl ReductionOp {
    pub fn from_binary(op: BinaryOp) -> Option<Self> {
        match op {
            BinaryOp::Add => Some(ReductionOp::Add),
            BinaryOp::Sub => Some(ReductionOp::Sub),
            BinaryOp::Mul => Some(ReductionOp::Mul),
            BinaryOp::BitAnd => Some(ReductionOp::BitAnd),
            BinaryOp::BitOr => Some(ReductionOp::BitOr),
            BinaryOp::BitXor => Some(ReductionOp::BitXor),
            BinaryOp::LogicalAnd => Some(ReductionOp::LogicalAnd),
            BinaryOp::LogicalOr => Some(ReductionOp::LogicalOr),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ReductionOp::Add => "+",
            ReductionOp::Sub => "-",
            ReductionOp::Mul => "*",
            ReductionOp::BitAnd => "&",
            ReductionOp::BitOr => "|",
            ReductionOp::BitXor => "^",
            ReductionOp::LogicalAnd => "&&",
            ReductionOp::LogicalOr => "||",
        }
    }

    /// `x = e op x` is an accumulation only for commutative operators.
    pub fn is_commutative(&self) -> bool {
        !matches!(self, ReductionOp::Sub)
    }

    /// Combine the operators of two accumulations of the same variable.
    /// Additions and subtractions mix into an addition.
    fn merge(self, other: ReductionOp) -> Option<ReductionOp> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (ReductionOp::Add, ReductionOp::Sub) | (ReductionOp::Sub, ReductionOp::Add) => Some(ReductionOp::Add),
            _ => None,
        }
    }
}

impl fmt::Display for ReductionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Pattern-based recognizer.
///
/// A candidate is a reduction when every reference to it in the loop body is
/// part of an accumulation statement: `x = x op e`, `x = e op x`, `x op= e`,
/// `x++`, `++x`, `x--`, `--x`, where `e` does not reference `x` and all
/// statements agree on the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulationRecognizer;

impl AccumulationRecognizer {
    fn references(program: &Program, expr: ExprId, var: VarId) -> bool {
        program
            .subexprs(expr)
            .into_iter()
            .any(|e| program.expr(e).kind == ExprKind::VarRef(var))
    }

    fn is_ref_to(program: &Program, expr: ExprId, var: VarId) -> bool {
        program.expr(expr).kind == ExprKind::VarRef(var)
    }

    /// Operator of the accumulation statement rooted at `root`, if it is one
    /// for `var`.
    fn accumulation_op(program: &Program, root: ExprId, var: VarId) -> Option<ReductionOp> {
        match program.expr(root).kind {
            ExprKind::Unary { op, operand } if Self::is_ref_to(program, operand, var) => {
                if op.is_increment() {
                    Some(ReductionOp::Add)
                } else if op.is_decrement() {
                    Some(ReductionOp::Sub)
                } else {
                    None
                }
            }
            ExprKind::Assign { op: Some(op), target, value } => {
                if Self::is_ref_to(program, target, var) && !Self::references(program, value, var) {
                    ReductionOp::from_binary(op)
                } else {
                    None
                }
            }
            ExprKind::Assign { op: None, target, value } if Self::is_ref_to(program, target, var) => {
                let (op, lhs, rhs) = match program.expr(value).kind {
                    ExprKind::Binary { op, lhs, rhs } => (ReductionOp::from_binary(op)?, lhs, rhs),
                    _ => return None,
                };
                if Self::is_ref_to(program, lhs, var) && !Self::references(program, rhs, var) {
                    Some(op)
                } else if op.is_commutative()
                    && Self::is_ref_to(program, rhs, var)
                    && !Self::references(program, lhs, var)
                {
                    Some(op)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Reduction operator of `var` in the loop, if every reference to it is
    /// an accumulation.
    pub fn reduction_of(&self, program: &Program, loop_id: LoopId, var: VarId) -> Option<ReductionOp> {
        let body = program.loop_info(loop_id).body?;
        let roots: BTreeSet<ExprId> = program
            .exprs_under(body)
            .into_iter()
            .filter(|e| Self::is_ref_to(program, *e, var))
            .map(|e| program.root_expr(e))
            .collect();

        let mut result: Option<ReductionOp> = None;
        for root in roots {
            // accumulations are expression statements
            let stmt = program.expr(root).stmt?;
            if !matches!(program.stmt(stmt).kind, StmtKind::Expr(e) if e == root) {
                return None;
            }
            let op = Self::accumulation_op(program, root, var)?;
            result = match result {
                None => Some(op),
                Some(prev) => Some(prev.merge(op)?),
            };
        }
        result
    }
}

impl ReductionRecognizer for AccumulationRecognizer {
    fn recognize(
        &self,
        program: &Program,
        loop_id: LoopId,
        candidates: &BTreeSet<VarId>,
    ) -> BTreeMap<VarId, ReductionOp> {
        candidates
            .iter()
            .filter_map(|v| self.reduction_of(program, loop_id, *v).map(|op| (*v, op)))
            .collect()
    }
}
