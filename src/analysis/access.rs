//! Queries over memory-access expressions.
//!
//! Dependence endpoints are expressions of the program model. The
//! eliminator needs to know what kind of access an endpoint is, which
//! array or object it touches, and whether two member accesses provably go
//! through different objects.

use crate::ir::{ExprId, ExprKind, Program, VarId, BinaryOp};
use log::warn;

/// The storage an access expression is rooted at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Variable(VarId),
    /// The implicit object of a member function
    This,
    /// Result of a call
    Function(String),
}

/// The variable of a plain scalar reference.
pub fn var_ref(program: &Program, expr: ExprId) -> Option<VarId> {
    match program.expr(expr).kind {
        ExprKind::VarRef(v) => Some(v),
        _ => None,
    }
}

/// Base of a (possibly multi-dimensional) index chain: `a` for `a[i][j]`.
fn index_base(program: &Program, expr: ExprId) -> Option<ExprId> {
    let mut current = expr;
    let mut seen_index = false;
    while let ExprKind::Index { base, .. } = program.expr(current).kind {
        current = base;
        seen_index = true;
    }
    seen_index.then_some(current)
}

/// Array variable accessed by an index expression. For `obj.field[i]` this
/// is the member variable.
pub fn array_symbol(program: &Program, expr: ExprId) -> Option<VarId> {
    let base = index_base(program, expr)?;
    match program.expr(base).kind {
        ExprKind::VarRef(v) => Some(v),
        ExprKind::Member { field, .. } => var_ref(program, field),
        _ => None,
    }
}

/// The access indexes a statically shaped array (not a pointer).
pub fn is_static_array_ref(program: &Program, expr: ExprId) -> bool {
    let base = match index_base(program, expr) {
        Some(base) => base,
        None => return false,
    };
    match program.expr(base).kind {
        ExprKind::VarRef(v) => program.variable(v).ty.is_array(),
        _ => false,
    }
}

/// Owning object of a member access: `a` for `a.b.c`, for `a.b.c` itself
/// and for the field reference `c`. Any other expression is its own top.
pub fn top_variable_access(program: &Program, expr: ExprId) -> ExprId {
    let node = program.expr(expr);
    if let ExprKind::Member { base, .. } = node.kind {
        return top_variable_access(program, base);
    }
    if let Some(parent) = node.parent {
        if let ExprKind::Member { field, .. } = program.expr(parent).kind {
            if field == expr {
                return top_variable_access(program, parent);
            }
        }
    }
    expr
}

/// Symbol an access expression is rooted at.
///
/// Returns `None` (with a warning) for expression shapes that do not denote
/// storage.
pub fn symbol_of(program: &Program, expr: ExprId) -> Option<Symbol> {
    match &program.expr(expr).kind {
        ExprKind::VarRef(v) => Some(Symbol::Variable(*v)),
        ExprKind::This => Some(Symbol::This),
        ExprKind::Index { base, .. } => symbol_of(program, *base),
        ExprKind::Member { base, .. } => symbol_of(program, *base),
        ExprKind::Deref(operand) => symbol_of(program, *operand),
        ExprKind::Cast { operand, .. } => symbol_of(program, *operand),
        // *(p + offset)
        ExprKind::Binary { op: BinaryOp::Add, lhs, .. } => symbol_of(program, *lhs),
        ExprKind::Call { callee, .. } => Some(Symbol::Function(callee.clone())),
        other => {
            warn!(
                "cannot resolve the symbol of a {} at {}",
                other.variant_name(),
                program.expr(expr).span
            );
            None
        }
    }
}

/// Two accesses provably touch different memory: both are members of
/// aggregates and their owning objects are different symbols.
///
/// Accesses that are not members (the access is its own owning object) are
/// never reported as different, as pointers may alias.
pub fn different_memory_location(program: &Program, e1: ExprId, e2: ExprId) -> bool {
    if e1 == e2 {
        return false;
    }
    let top1 = top_variable_access(program, e1);
    let top2 = top_variable_access(program, e2);
    if e1 == top1 || e2 == top2 {
        return false;
    }
    match (symbol_of(program, top1), symbol_of(program, top2)) {
        (Some(s1), Some(s2)) => s1 != s2,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ProgramBuilder, VarType};

    #[test]
    fn test_array_symbol_and_static_shape() {
        let mut b = ProgramBuilder::new("arrays");
        let root = b.root_scope();
        let a = b.param("a", VarType::array(VarType::Double, &[Some(10), Some(10)]));
        let p = b.param("p", VarType::pointer(VarType::Double));
        let i = b.declare_var(root, "i", VarType::Int);

        let a_ref = b.var(a);
        let i1 = b.var(i);
        let row = b.index(a_ref, i1);
        let i2 = b.var(i);
        let elem = b.index(row, i2);

        let p_ref = b.var(p);
        let i3 = b.var(i);
        let p_elem = b.index(p_ref, i3);
        let program = b.finish();

        assert_eq!(array_symbol(&program, elem), Some(a));
        assert_eq!(array_symbol(&program, p_elem), Some(p));
        assert!(is_static_array_ref(&program, elem));
        assert!(!is_static_array_ref(&program, p_elem));
        assert!(!is_static_array_ref(&program, a_ref));
        assert_eq!(var_ref(&program, i1), Some(i));
    }

    #[test]
    fn test_top_variable_access() {
        // gun.mag.capacity
        let mut b = ProgramBuilder::new("members");
        let fields = b.aggregate_scope();
        let mag = b.member_var(fields, "mag", VarType::Aggregate("Magazine".into()));
        let capacity = b.member_var(fields, "capacity", VarType::Int);
        let gun = b.param("gun", VarType::Aggregate("Gun".into()));

        let gun_ref = b.var(gun);
        let inner = b.member(gun_ref, mag, false);
        let outer = b.member(inner, capacity, false);
        let program = b.finish();

        let capacity_ref = match program.expr(outer).kind {
            ExprKind::Member { field, .. } => field,
            _ => unreachable!(),
        };
        assert_eq!(top_variable_access(&program, outer), gun_ref);
        assert_eq!(top_variable_access(&program, capacity_ref), gun_ref);
        assert_eq!(top_variable_access(&program, gun_ref), gun_ref);
    }

    #[test]
    fn test_different_memory_location() {
        let mut b = ProgramBuilder::new("objects");
        let fields = b.aggregate_scope();
        let y = b.member_var(fields, "y", VarType::Int);
        let o1 = b.param("o1", VarType::Aggregate("VectorXY".into()));
        let o2 = b.param("o2", VarType::Aggregate("VectorXY".into()));

        let o1_ref = b.var(o1);
        let o1_y = b.member(o1_ref, y, false);
        let o2_ref = b.var(o2);
        let o2_y = b.member(o2_ref, y, false);
        let o1_again = b.var(o1);
        let o1_y_again = b.member(o1_again, y, false);
        let program = b.finish();

        assert!(different_memory_location(&program, o1_y, o2_y));
        assert!(!different_memory_location(&program, o1_y, o1_y_again));
        assert!(!different_memory_location(&program, o1_y, o1_y));
        // plain references may alias
        assert!(!different_memory_location(&program, o1_ref, o2_ref));
    }

    #[test]
    fn test_symbol_of_unresolvable() {
        let mut b = ProgramBuilder::new("literals");
        let lit = b.int(3);
        let this = b.this();
        let program = b.finish();

        assert_eq!(symbol_of(&program, lit), None);
        assert_eq!(symbol_of(&program, this), Some(Symbol::This));
    }
}
