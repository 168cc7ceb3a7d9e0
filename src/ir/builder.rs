//! Programmatic construction of program models.
//!
//! Expressions are created detached and become owned by a statement when
//! they are used as the root of an expression statement, a declaration
//! initializer, or a loop header part.

use super::program::*;
use crate::utils::location::Span;
use std::collections::HashMap;

/// Ids of a loop created by [`ProgramBuilder::begin_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopHandle {
    /// The loop
    pub id: LoopId,
    /// Scope of the loop statement; header declarations go here
    pub scope: ScopeId,
    /// Scope of the body block
    pub body_scope: ScopeId,
}

/// Builder for [`Program`].
pub struct ProgramBuilder {
    program: Program,
    /// Block statement whose statement list receives new statements of a scope
    scope_owner: HashMap<ScopeId, StmtId>,
}

impl ProgramBuilder {
    /// Start a function with an empty body.
    pub fn new(name: impl Into<String>) -> Self {
        let mut program = Program {
            name: name.into(),
            file: String::new(),
            variables: Vec::new(),
            scopes: Vec::new(),
            stmts: Vec::new(),
            loops: Vec::new(),
            exprs: Vec::new(),
            root: StmtId(0),
        };
        program.scopes.push(Scope { id: ScopeId(0), parent: None, kind: ScopeKind::Global });
        program.scopes.push(Scope { id: ScopeId(1), parent: Some(ScopeId(0)), kind: ScopeKind::Function });
        program.stmts.push(Stmt {
            id: StmtId(0),
            kind: StmtKind::Block { scope: ScopeId(1), stmts: Vec::new() },
            parent: None,
            span: Span::dummy(),
        });

        let mut scope_owner = HashMap::new();
        scope_owner.insert(ScopeId(1), StmtId(0));
        Self { program, scope_owner }
    }

    /// Set the source file name used in diagnostics.
    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.program.file = file.into();
        self
    }

    /// Scope of global declarations.
    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Scope of the function body.
    pub fn root_scope(&self) -> ScopeId {
        ScopeId(1)
    }

    fn new_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId::new(self.program.scopes.len());
        self.program.scopes.push(Scope { id, parent: Some(parent), kind });
        id
    }

    fn new_stmt(&mut self, kind: StmtKind, parent: Option<StmtId>) -> StmtId {
        let id = StmtId::new(self.program.stmts.len());
        self.program.stmts.push(Stmt { id, kind, parent, span: Span::dummy() });
        id
    }

    /// Append a statement to the block owning `scope`.
    fn push_stmt(&mut self, scope: ScopeId, kind: StmtKind) -> StmtId {
        let owner = self.scope_owner.get(&scope).copied();
        let id = self.new_stmt(kind, owner);
        if let Some(owner) = owner {
            if let StmtKind::Block { stmts, .. } = &mut self.program.stmts[owner.index()].kind {
                stmts.push(id);
            }
        }
        id
    }

    fn new_expr(&mut self, kind: ExprKind) -> ExprId {
        let id = ExprId::new(self.program.exprs.len());
        for child in kind.children() {
            self.program.exprs[child.index()].parent = Some(id);
        }
        self.program.exprs.push(Expr { id, kind, parent: None, stmt: None, span: Span::dummy() });
        id
    }

    /// Mark every node of the tree rooted at `expr` as owned by `stmt`.
    fn attach(&mut self, expr: ExprId, stmt: StmtId) {
        for e in self.program.subexprs(expr) {
            self.program.exprs[e.index()].stmt = Some(stmt);
        }
    }

    // Declarations

    /// Declare a variable without a declaration statement (parameters,
    /// globals, loop header declarations).
    pub fn declare_var(&mut self, scope: ScopeId, name: impl Into<String>, ty: VarType) -> VarId {
        let id = VarId::new(self.program.variables.len());
        self.program.variables.push(Variable {
            id,
            name: name.into(),
            ty,
            scope,
            synthetic: false,
            span: Span::dummy(),
        });
        id
    }

    /// Declare a function parameter.
    pub fn param(&mut self, name: impl Into<String>, ty: VarType) -> VarId {
        let scope = self.root_scope();
        self.declare_var(scope, name, ty)
    }

    /// Declare a global variable.
    pub fn global(&mut self, name: impl Into<String>, ty: VarType) -> VarId {
        self.declare_var(ScopeId(0), name, ty)
    }

    /// Declare an aggregate member. Members live in their own scope so that
    /// they are never collected as visible variables of a loop.
    pub fn member_var(&mut self, aggregate: ScopeId, name: impl Into<String>, ty: VarType) -> VarId {
        self.declare_var(aggregate, name, ty)
    }

    /// Open a scope for the members of an aggregate type.
    pub fn aggregate_scope(&mut self) -> ScopeId {
        self.new_scope(ScopeId(0), ScopeKind::Aggregate)
    }

    // Expressions

    pub fn var(&mut self, var: VarId) -> ExprId {
        self.new_expr(ExprKind::VarRef(var))
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.new_expr(ExprKind::IntLit(value))
    }

    pub fn float(&mut self, value: f64) -> ExprId {
        self.new_expr(ExprKind::FloatLit(value))
    }

    pub fn this(&mut self) -> ExprId {
        self.new_expr(ExprKind::This)
    }

    pub fn index(&mut self, base: ExprId, index: ExprId) -> ExprId {
        self.new_expr(ExprKind::Index { base, index })
    }

    /// `base.field`, or `base->field` when `arrow` is set.
    pub fn member(&mut self, base: ExprId, field: VarId, arrow: bool) -> ExprId {
        let field = self.var(field);
        self.new_expr(ExprKind::Member { base, field, arrow })
    }

    pub fn deref(&mut self, operand: ExprId) -> ExprId {
        self.new_expr(ExprKind::Deref(operand))
    }

    pub fn address_of(&mut self, operand: ExprId) -> ExprId {
        self.new_expr(ExprKind::AddressOf(operand))
    }

    pub fn cast(&mut self, ty: VarType, operand: ExprId) -> ExprId {
        self.new_expr(ExprKind::Cast { ty, operand })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.new_expr(ExprKind::Unary { op, operand })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.new_expr(ExprKind::Binary { op, lhs, rhs })
    }

    /// `target = value`
    pub fn assign(&mut self, target: ExprId, value: ExprId) -> ExprId {
        self.new_expr(ExprKind::Assign { op: None, target, value })
    }

    /// `target op= value`
    pub fn compound(&mut self, op: BinaryOp, target: ExprId, value: ExprId) -> ExprId {
        self.new_expr(ExprKind::Assign { op: Some(op), target, value })
    }

    pub fn call(&mut self, callee: impl Into<String>, args: Vec<ExprId>) -> ExprId {
        self.new_expr(ExprKind::Call { callee: callee.into(), args })
    }

    pub fn opaque(&mut self, text: impl Into<String>) -> ExprId {
        self.new_expr(ExprKind::Opaque(text.into()))
    }

    // Statements

    /// Expression statement.
    pub fn expr_stmt(&mut self, scope: ScopeId, expr: ExprId) -> StmtId {
        let stmt = self.push_stmt(scope, StmtKind::Expr(expr));
        self.attach(expr, stmt);
        stmt
    }

    /// Declaration statement, returning the new variable and its statement.
    pub fn decl_stmt(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        ty: VarType,
        init: Option<ExprId>,
    ) -> (VarId, StmtId) {
        let var = self.declare_var(scope, name, ty);
        let stmt = self.push_stmt(scope, StmtKind::Decl { var, init });
        if let Some(init) = init {
            self.attach(init, stmt);
        }
        (var, stmt)
    }

    /// Nested compound statement; returns its scope.
    pub fn block(&mut self, scope: ScopeId) -> ScopeId {
        let inner = self.new_scope(scope, ScopeKind::Block);
        let stmt = self.push_stmt(scope, StmtKind::Block { scope: inner, stmts: Vec::new() });
        self.scope_owner.insert(inner, stmt);
        inner
    }

    /// `if (cond) { ... }`; returns the scope of the then-branch.
    pub fn if_then(&mut self, scope: ScopeId, cond: ExprId) -> ScopeId {
        let then_scope = self.new_scope(scope, ScopeKind::Block);
        let stmt = self.push_stmt(scope, StmtKind::If { cond, then_branch: StmtId(0), else_branch: None });
        self.attach(cond, stmt);
        let then_branch = self.new_stmt(StmtKind::Block { scope: then_scope, stmts: Vec::new() }, Some(stmt));
        if let StmtKind::If { then_branch: slot, .. } = &mut self.program.stmts[stmt.index()].kind {
            *slot = then_branch;
        }
        self.scope_owner.insert(then_scope, then_branch);
        then_scope
    }

    fn new_loop(&mut self, scope: ScopeId, form: LoopForm) -> LoopHandle {
        let id = LoopId::new(self.program.loops.len());
        let stmt = self.push_stmt(scope, StmtKind::Loop(id));
        let loop_scope = self.new_scope(scope, ScopeKind::Loop);
        let body_scope = self.new_scope(loop_scope, ScopeKind::Block);
        let body = self.new_stmt(StmtKind::Block { scope: body_scope, stmts: Vec::new() }, Some(stmt));
        self.scope_owner.insert(body_scope, body);

        self.program.loops.push(Loop {
            id,
            form,
            stmt,
            scope: loop_scope,
            enclosing: scope,
            init: None,
            test: None,
            step: None,
            body: Some(body),
            span: Span::dummy(),
        });
        LoopHandle { id, scope: loop_scope, body_scope }
    }

    /// Open a `for` loop with an empty header; fill it with
    /// [`set_loop_header`](Self::set_loop_header).
    pub fn begin_for(&mut self, scope: ScopeId) -> LoopHandle {
        self.new_loop(scope, LoopForm::For)
    }

    /// Set the header of a loop opened with [`begin_for`](Self::begin_for).
    pub fn set_loop_header(
        &mut self,
        id: LoopId,
        init: Option<LoopInit>,
        test: Option<ExprId>,
        step: Option<ExprId>,
    ) {
        let stmt = self.program.loops[id.index()].stmt;
        match &init {
            Some(LoopInit::Assign(e)) | Some(LoopInit::Decl { value: e, .. }) => self.attach(*e, stmt),
            None => {}
        }
        for part in test.iter().chain(step.iter()) {
            self.attach(*part, stmt);
        }
        let lp = &mut self.program.loops[id.index()];
        lp.init = init;
        lp.test = test;
        lp.step = step;
    }

    /// `for (var = start; var < bound; var++)`
    pub fn for_loop(&mut self, scope: ScopeId, var: VarId, start: ExprId, bound: ExprId) -> LoopHandle {
        let handle = self.begin_for(scope);
        let target = self.var(var);
        let init = self.assign(target, start);
        let lhs = self.var(var);
        let test = self.binary(BinaryOp::Lt, lhs, bound);
        let operand = self.var(var);
        let step = self.unary(UnaryOp::PostInc, operand);
        self.set_loop_header(handle.id, Some(LoopInit::Assign(init)), Some(test), Some(step));
        handle
    }

    /// `while (cond) { ... }`
    pub fn while_loop(&mut self, scope: ScopeId, cond: ExprId) -> LoopHandle {
        let handle = self.new_loop(scope, LoopForm::While);
        self.set_loop_header(handle.id, None, Some(cond), None);
        handle
    }

    /// Declare a variable the host introduced when normalizing a loop
    /// header.
    pub fn synthetic_var(&mut self, scope: ScopeId, name: impl Into<String>, ty: VarType) -> VarId {
        let var = self.declare_var(scope, name, ty);
        self.program.variables[var.index()].synthetic = true;
        var
    }

    pub fn set_loop_span(&mut self, id: LoopId, span: Span) {
        self.program.loops[id.index()].span = span;
        let stmt = self.program.loops[id.index()].stmt;
        self.program.stmts[stmt.index()].span = span;
    }

    pub fn set_expr_span(&mut self, id: ExprId, span: Span) {
        self.program.exprs[id.index()].span = span;
    }

    /// Read access to the program under construction.
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn finish(self) -> Program {
        self.program
    }
}
