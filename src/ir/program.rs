//! Arena-based program model.
//!
//! The host compiler owns the real AST; the analyses only need a narrow view
//! of it: declarations with their scopes, a statement tree, the loops in it,
//! and the expressions that make up memory accesses. Every node lives in an
//! arena inside [`Program`] and is referred to by a typed id, so dependence
//! graphs and oracle tables can point at nodes without borrowing.

use crate::utils::errors::{ModelError, ModelErrorKind};
use crate::utils::location::Span;
use serde::{Serialize, Deserialize};
use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(index: usize) -> Self {
                Self(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

arena_id!(
    /// Identity of a declaration site.
    VarId, "v"
);
arena_id!(
    /// Identity of a lexical scope.
    ScopeId, "s"
);
arena_id!(
    /// Identity of a statement.
    StmtId, "S"
);
arena_id!(
    /// Identity of a loop.
    LoopId, "L"
);
arena_id!(
    /// Identity of an expression node; memory accesses are expressions.
    ExprId, "e"
);

/// Declared type of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarType {
    Int,
    Float,
    Double,
    Bool,
    Char,
    /// Pointer to the given type (usable as an array)
    Pointer(Box<VarType>),
    /// Statically shaped array; `None` marks a symbolic extent
    Array {
        element: Box<VarType>,
        dimensions: Vec<Option<i64>>,
    },
    /// Struct or class object
    Aggregate(String),
}

impl VarType {
    /// Statically shaped array of the given element type.
    pub fn array(element: VarType, dimensions: &[Option<i64>]) -> Self {
        VarType::Array {
            element: Box::new(element),
            dimensions: dimensions.to_vec(),
        }
    }

    /// Pointer to the given type.
    pub fn pointer(pointee: VarType) -> Self {
        VarType::Pointer(Box::new(pointee))
    }

    /// Arithmetic, boolean and character types. Pointers are not scalars.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            VarType::Int | VarType::Float | VarType::Double | VarType::Bool | VarType::Char
        )
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, VarType::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, VarType::Array { .. })
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Int => write!(f, "int"),
            VarType::Float => write!(f, "float"),
            VarType::Double => write!(f, "double"),
            VarType::Bool => write!(f, "bool"),
            VarType::Char => write!(f, "char"),
            VarType::Pointer(inner) => write!(f, "{}*", inner),
            VarType::Array { element, dimensions } => {
                write!(f, "{}", element)?;
                for dim in dimensions {
                    match dim {
                        Some(n) => write!(f, "[{}]", n)?,
                        None => write!(f, "[]")?,
                    }
                }
                Ok(())
            }
            VarType::Aggregate(name) => write!(f, "{}", name),
        }
    }
}

/// A declared variable (or aggregate member).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub ty: VarType,
    /// Scope the declaration belongs to
    pub scope: ScopeId,
    /// Introduced by loop normalization rather than written by the user
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default)]
    pub span: Span,
}

/// Kind of a lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    /// The scope opened by a loop statement; header declarations live here
    Loop,
    /// Members of a struct or class
    Aggregate,
}

/// A nested lexical region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
}

/// A statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub id: StmtId,
    pub kind: StmtKind,
    /// Enclosing statement (`None` for the function body)
    pub parent: Option<StmtId>,
    #[serde(default)]
    pub span: Span,
}

/// Statement kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression statement
    Expr(ExprId),
    /// Variable declaration with optional initializer
    Decl { var: VarId, init: Option<ExprId> },
    /// Compound statement opening a scope
    Block { scope: ScopeId, stmts: Vec<StmtId> },
    /// Loop statement; details live in [`Loop`]
    Loop(LoopId),
    If {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
}

/// Syntactic form of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopForm {
    For,
    While,
}

/// Initialization part of a `for` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoopInit {
    /// `i = e`
    Assign(ExprId),
    /// `int i = e`; the variable belongs to the loop scope
    Decl { var: VarId, value: ExprId },
}

/// A loop statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub id: LoopId,
    pub form: LoopForm,
    /// The `StmtKind::Loop` statement
    pub stmt: StmtId,
    /// Scope opened by the loop statement itself
    pub scope: ScopeId,
    /// Scope the loop statement sits in
    pub enclosing: ScopeId,
    pub init: Option<LoopInit>,
    pub test: Option<ExprId>,
    pub step: Option<ExprId>,
    pub body: Option<StmtId>,
    #[serde(default)]
    pub span: Span,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PostInc,
    PreDec,
    PostDec,
}

impl UnaryOp {
    pub fn is_increment(&self) -> bool {
        matches!(self, UnaryOp::PreInc | UnaryOp::PostInc)
    }

    pub fn is_decrement(&self) -> bool {
        matches!(self, UnaryOp::PreDec | UnaryOp::PostDec)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Source spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
    /// Enclosing expression
    pub parent: Option<ExprId>,
    /// Statement owning the expression tree (`None` while detached)
    pub stmt: Option<StmtId>,
    #[serde(default)]
    pub span: Span,
}

/// Expression kinds.
///
/// Memory accesses are `VarRef`, `Index` and `Member`. Host constructs the
/// model has no variant for are carried as `Opaque` so that the analyses can
/// report them instead of silently misreading them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    VarRef(VarId),
    IntLit(i64),
    FloatLit(f64),
    /// The implicit object of a member function
    This,
    /// `base[index]`
    Index { base: ExprId, index: ExprId },
    /// `base.field` or `base->field`; `field` is a `VarRef` to the member
    Member { base: ExprId, field: ExprId, arrow: bool },
    /// `*operand`
    Deref(ExprId),
    /// `&operand`
    AddressOf(ExprId),
    Cast { ty: VarType, operand: ExprId },
    Unary { op: UnaryOp, operand: ExprId },
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    /// `target = value`, or `target op= value` when `op` is set
    Assign { op: Option<BinaryOp>, target: ExprId, value: ExprId },
    Call { callee: String, args: Vec<ExprId> },
    Opaque(String),
}

impl ExprKind {
    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::VarRef(_)
            | ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::This
            | ExprKind::Opaque(_) => Vec::new(),
            ExprKind::Index { base, index } => vec![*base, *index],
            ExprKind::Member { base, field, .. } => vec![*base, *field],
            ExprKind::Deref(operand)
            | ExprKind::AddressOf(operand)
            | ExprKind::Cast { operand, .. }
            | ExprKind::Unary { operand, .. } => vec![*operand],
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Assign { target, value, .. } => vec![*target, *value],
            ExprKind::Call { args, .. } => args.clone(),
        }
    }

    /// Rebuild this node with every child id passed through `f`.
    pub fn map_children(&self, mut f: impl FnMut(ExprId) -> ExprId) -> ExprKind {
        match self {
            ExprKind::VarRef(_)
            | ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::This
            | ExprKind::Opaque(_) => self.clone(),
            ExprKind::Index { base, index } => ExprKind::Index {
                base: f(*base),
                index: f(*index),
            },
            ExprKind::Member { base, field, arrow } => ExprKind::Member {
                base: f(*base),
                field: f(*field),
                arrow: *arrow,
            },
            ExprKind::Deref(operand) => ExprKind::Deref(f(*operand)),
            ExprKind::AddressOf(operand) => ExprKind::AddressOf(f(*operand)),
            ExprKind::Cast { ty, operand } => ExprKind::Cast {
                ty: ty.clone(),
                operand: f(*operand),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: f(*operand),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = f(*lhs);
                let rhs = f(*rhs);
                ExprKind::Binary { op: *op, lhs, rhs }
            }
            ExprKind::Assign { op, target, value } => {
                let target = f(*target);
                let value = f(*value);
                ExprKind::Assign { op: *op, target, value }
            }
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: callee.clone(),
                args: args.iter().map(|a| f(*a)).collect(),
            },
        }
    }

    /// Short name of the variant, used in warnings.
    pub fn variant_name(&self) -> &'static str {
        match self {
            ExprKind::VarRef(_) => "variable reference",
            ExprKind::IntLit(_) => "integer literal",
            ExprKind::FloatLit(_) => "float literal",
            ExprKind::This => "this",
            ExprKind::Index { .. } => "array index",
            ExprKind::Member { .. } => "member access",
            ExprKind::Deref(_) => "dereference",
            ExprKind::AddressOf(_) => "address-of",
            ExprKind::Cast { .. } => "cast",
            ExprKind::Unary { .. } => "unary operation",
            ExprKind::Binary { .. } => "binary operation",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::Call { .. } => "call",
            ExprKind::Opaque(_) => "opaque expression",
        }
    }
}

/// A function body under analysis together with all of its nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Function name
    pub name: String,
    /// Source file, for diagnostics
    #[serde(default)]
    pub file: String,
    pub variables: Vec<Variable>,
    pub scopes: Vec<Scope>,
    pub stmts: Vec<Stmt>,
    pub loops: Vec<Loop>,
    pub exprs: Vec<Expr>,
    /// The function body block
    pub root: StmtId,
}

impl Program {
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Look up a loop, or `None` if the id is out of range.
    pub fn get_loop(&self, id: LoopId) -> Option<&Loop> {
        self.loops.get(id.index())
    }

    pub fn loop_info(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    pub fn loop_ids(&self) -> impl Iterator<Item = LoopId> + '_ {
        self.loops.iter().map(|l| l.id)
    }

    /// First variable with the given name (names are not unique).
    pub fn find_variable(&self, name: &str) -> Option<VarId> {
        self.variables.iter().find(|v| v.name == name).map(|v| v.id)
    }

    /// Strict ancestor relation on scopes.
    pub fn is_ancestor_scope(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        let mut current = self.scope(scope).parent;
        while let Some(s) = current {
            if s == ancestor {
                return true;
            }
            current = self.scope(s).parent;
        }
        false
    }

    /// `scope` is `region` or nested inside it.
    pub fn scope_within(&self, scope: ScopeId, region: ScopeId) -> bool {
        scope == region || self.is_ancestor_scope(region, scope)
    }

    /// `stmt` is `root` or nested inside it.
    pub fn stmt_within(&self, stmt: StmtId, root: StmtId) -> bool {
        let mut current = Some(stmt);
        while let Some(s) = current {
            if s == root {
                return true;
            }
            current = self.stmt(s).parent;
        }
        false
    }

    /// The expression is part of the loop statement (header or body).
    pub fn expr_in_loop(&self, expr: ExprId, loop_id: LoopId) -> bool {
        match self.expr(expr).stmt {
            Some(stmt) => self.stmt_within(stmt, self.loop_info(loop_id).stmt),
            None => false,
        }
    }

    /// Topmost expression of the tree containing `expr`.
    pub fn root_expr(&self, expr: ExprId) -> ExprId {
        let mut current = expr;
        while let Some(parent) = self.expr(current).parent {
            current = parent;
        }
        current
    }

    /// Expression trees owned directly by a statement (not by nested ones).
    pub fn stmt_exprs(&self, stmt: StmtId) -> Vec<ExprId> {
        match &self.stmt(stmt).kind {
            StmtKind::Expr(e) => vec![*e],
            StmtKind::Decl { init, .. } => init.iter().copied().collect(),
            StmtKind::Block { .. } => Vec::new(),
            StmtKind::If { cond, .. } => vec![*cond],
            StmtKind::Loop(id) => {
                let lp = self.loop_info(*id);
                let mut exprs = Vec::new();
                match &lp.init {
                    Some(LoopInit::Assign(e)) => exprs.push(*e),
                    Some(LoopInit::Decl { value, .. }) => exprs.push(*value),
                    None => {}
                }
                exprs.extend(lp.test);
                exprs.extend(lp.step);
                exprs
            }
        }
    }

    /// Direct child statements.
    pub fn child_stmts(&self, stmt: StmtId) -> Vec<StmtId> {
        match &self.stmt(stmt).kind {
            StmtKind::Expr(_) | StmtKind::Decl { .. } => Vec::new(),
            StmtKind::Block { stmts, .. } => stmts.clone(),
            StmtKind::If { then_branch, else_branch, .. } => {
                let mut children = vec![*then_branch];
                children.extend(*else_branch);
                children
            }
            StmtKind::Loop(id) => self.loop_info(*id).body.into_iter().collect(),
        }
    }

    /// Statements of the subtree rooted at `root`, pre-order.
    pub fn stmts_under(&self, root: StmtId) -> Vec<StmtId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(s) = stack.pop() {
            out.push(s);
            let children = self.child_stmts(s);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Expression `root` and all its sub-expressions, pre-order.
    pub fn subexprs(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(e) = stack.pop() {
            out.push(e);
            let children = self.expr(e).kind.children();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Every expression reachable from the statement subtree, pre-order.
    pub fn exprs_under(&self, root: StmtId) -> Vec<ExprId> {
        self.stmts_under(root)
            .into_iter()
            .flat_map(|s| self.stmt_exprs(s))
            .flat_map(|e| self.subexprs(e))
            .collect()
    }

    /// Loops in the statement subtree, outer loops first.
    pub fn loops_under(&self, root: StmtId) -> Vec<LoopId> {
        self.stmts_under(root)
            .into_iter()
            .filter_map(|s| match self.stmt(s).kind {
                StmtKind::Loop(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// The loop and every loop nested in it, outer loops first.
    pub fn loop_nest(&self, loop_id: LoopId) -> Vec<LoopId> {
        self.loops_under(self.loop_info(loop_id).stmt)
    }

    /// All loops of the function, outer loops first.
    pub fn all_loops(&self) -> Vec<LoopId> {
        self.loops_under(self.root)
    }

    /// Copy the expression tree rooted at `expr`, attaching the copy to
    /// `parent` and `stmt`. Returns the id of the new root.
    pub fn deep_copy_expr(&mut self, expr: ExprId, parent: Option<ExprId>, stmt: Option<StmtId>) -> ExprId {
        let source = self.expr(expr).clone();
        let id = ExprId::new(self.exprs.len());
        self.exprs.push(Expr {
            id,
            kind: ExprKind::Opaque(String::new()),
            parent,
            stmt,
            span: source.span,
        });
        let kind = source.kind.map_children(|child| self.deep_copy_expr(child, Some(id), stmt));
        self.exprs[id.index()].kind = kind;
        id
    }

    /// Replace the index operand of an array access. The old index subtree
    /// is detached but stays in the arena.
    pub fn replace_index(&mut self, access: ExprId, new_index: ExprId) -> bool {
        let old = match self.exprs[access.index()].kind {
            ExprKind::Index { base, index } => {
                self.exprs[access.index()].kind = ExprKind::Index { base, index: new_index };
                index
            }
            _ => return false,
        };
        self.exprs[old.index()].parent = None;
        self.exprs[new_index.index()].parent = Some(access);
        true
    }

    /// Check that every id refers into its arena and sits at its own
    /// position.
    pub fn validate(&self) -> Result<(), ModelError> {
        let dangling = |what: &str, id: &dyn fmt::Display| {
            ModelError::new(
                ModelErrorKind::DanglingReference,
                format!("{} refers to missing node {}", what, id),
            )
        };
        let misplaced = |what: &str, pos: usize| {
            ModelError::new(
                ModelErrorKind::IdMismatch,
                format!("{} at position {} carries a different id", what, pos),
            )
        };
        let var_ok = |v: VarId| v.index() < self.variables.len();
        let scope_ok = |s: ScopeId| s.index() < self.scopes.len();
        let stmt_ok = |s: StmtId| s.index() < self.stmts.len();
        let expr_ok = |e: ExprId| e.index() < self.exprs.len();
        let loop_ok = |l: LoopId| l.index() < self.loops.len();

        if !stmt_ok(self.root) {
            return Err(dangling("program root", &self.root));
        }
        for (pos, var) in self.variables.iter().enumerate() {
            if var.id.index() != pos {
                return Err(misplaced("variable", pos));
            }
            if !scope_ok(var.scope) {
                return Err(dangling(&var.name, &var.scope));
            }
        }
        for (pos, scope) in self.scopes.iter().enumerate() {
            if scope.id.index() != pos {
                return Err(misplaced("scope", pos));
            }
            if let Some(parent) = scope.parent.filter(|p| !scope_ok(*p)) {
                return Err(dangling("scope parent", &parent));
            }
        }
        for (pos, expr) in self.exprs.iter().enumerate() {
            if expr.id.index() != pos {
                return Err(misplaced("expression", pos));
            }
            for child in expr.kind.children() {
                if !expr_ok(child) {
                    return Err(dangling("expression", &child));
                }
            }
            if let ExprKind::VarRef(v) = expr.kind {
                if !var_ok(v) {
                    return Err(dangling("variable reference", &v));
                }
            }
            if let Some(stmt) = expr.stmt.filter(|s| !stmt_ok(*s)) {
                return Err(dangling("expression owner", &stmt));
            }
            if let Some(parent) = expr.parent.filter(|p| !expr_ok(*p)) {
                return Err(dangling("expression parent", &parent));
            }
        }
        for (pos, stmt) in self.stmts.iter().enumerate() {
            if stmt.id.index() != pos {
                return Err(misplaced("statement", pos));
            }
            if let Some(parent) = stmt.parent.filter(|p| !stmt_ok(*p)) {
                return Err(dangling("statement parent", &parent));
            }
            let ok = match &stmt.kind {
                StmtKind::Expr(e) => expr_ok(*e),
                StmtKind::Decl { var, init } => var_ok(*var) && init.map_or(true, expr_ok),
                StmtKind::Block { scope, stmts } => scope_ok(*scope) && stmts.iter().all(|s| stmt_ok(*s)),
                StmtKind::Loop(l) => loop_ok(*l),
                StmtKind::If { cond, then_branch, else_branch } => {
                    expr_ok(*cond) && stmt_ok(*then_branch) && else_branch.map_or(true, stmt_ok)
                }
            };
            if !ok {
                return Err(dangling("statement", &stmt.id));
            }
        }
        for (pos, lp) in self.loops.iter().enumerate() {
            if lp.id.index() != pos {
                return Err(misplaced("loop", pos));
            }
            let header_ok = match &lp.init {
                Some(LoopInit::Assign(e)) => expr_ok(*e),
                Some(LoopInit::Decl { var, value }) => var_ok(*var) && expr_ok(*value),
                None => true,
            } && lp.test.map_or(true, expr_ok)
                && lp.step.map_or(true, expr_ok)
                && lp.body.map_or(true, stmt_ok);
            if !header_ok {
                return Err(dangling("loop header", &lp.id));
            }
            if !stmt_ok(lp.stmt) || !scope_ok(lp.scope) || !scope_ok(lp.enclosing) {
                return Err(ModelError::new(
                    ModelErrorKind::MalformedLoop,
                    format!("loop {} has no valid statement or scope", lp.id),
                ));
            }
            if !matches!(self.stmt(lp.stmt).kind, StmtKind::Loop(l) if l == lp.id) {
                return Err(ModelError::new(
                    ModelErrorKind::MalformedLoop,
                    format!("statement {} does not hold loop {}", lp.stmt, lp.id),
                ));
            }
        }

        // every id is in range from here on
        let cyclic = |what: &str, pos: usize| {
            ModelError::new(ModelErrorKind::Cycle, format!("{} {} is its own ancestor", what, pos))
        };
        let parents = |parent: Option<usize>| parent.into_iter().collect::<Vec<_>>();
        if let Some(pos) = find_cycle(self.scopes.len(), |s| parents(self.scopes[s].parent.map(|p| p.index()))) {
            return Err(cyclic("scope", pos));
        }
        if let Some(pos) = find_cycle(self.stmts.len(), |s| parents(self.stmts[s].parent.map(|p| p.index()))) {
            return Err(cyclic("statement", pos));
        }
        if let Some(pos) = find_cycle(self.exprs.len(), |e| parents(self.exprs[e].parent.map(|p| p.index()))) {
            return Err(cyclic("expression", pos));
        }
        if let Some(pos) = find_cycle(self.stmts.len(), |s| {
            self.child_stmts(StmtId::new(s)).into_iter().map(|c| c.index()).collect()
        }) {
            return Err(cyclic("statement", pos));
        }
        if let Some(pos) = find_cycle(self.exprs.len(), |e| {
            self.exprs[e].kind.children().into_iter().map(|c| c.index()).collect()
        }) {
            return Err(cyclic("expression", pos));
        }
        Ok(())
    }
}

/// A node lying on a cycle of the graph with successors `edges`, if any.
fn find_cycle(len: usize, edges: impl Fn(usize) -> Vec<usize>) -> Option<usize> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Open,
        Done,
    }
    let mut marks = vec![Mark::New; len];
    for start in 0..len {
        if marks[start] != Mark::New {
            continue;
        }
        marks[start] = Mark::Open;
        let mut stack = vec![(start, edges(start), 0usize)];
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let next = top.1.get(top.2).copied();
            top.2 += 1;
            match next {
                Some(child) => match marks[child] {
                    Mark::Open => return Some(child),
                    Mark::New => {
                        marks[child] = Mark::Open;
                        stack.push((child, edges(child), 0));
                    }
                    Mark::Done => {}
                },
                None => {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }
    None
}
