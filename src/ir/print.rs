//! Source-like rendering of the program model.
//!
//! Used for diagnostics (`x[index[i]]` reads better than an expression id)
//! and for the `--dump` view of the command line tool.

use super::program::*;

/// Pretty printer for program models.
pub struct IrPrinter<'a> {
    program: &'a Program,
    /// Indentation level
    indent: usize,
    /// Output buffer
    buffer: String,
}

impl<'a> IrPrinter<'a> {
    /// Create a new printer.
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            indent: 0,
            buffer: String::new(),
        }
    }

    /// Get the output.
    pub fn output(&self) -> &str {
        &self.buffer
    }

    /// Take the output.
    pub fn take_output(self) -> String {
        self.buffer
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.buffer.push_str("  ");
        }
    }

    /// Print an expression tree.
    pub fn print_expr(&mut self, expr: ExprId) {
        let text = self.expr_text(expr);
        self.buffer.push_str(&text);
    }

    fn expr_text(&self, expr: ExprId) -> String {
        let program = self.program;
        match &program.expr(expr).kind {
            ExprKind::VarRef(v) => program.variable(*v).name.clone(),
            ExprKind::IntLit(n) => n.to_string(),
            ExprKind::FloatLit(x) => format!("{:?}", x),
            ExprKind::This => "this".to_string(),
            ExprKind::Index { base, index } => {
                format!("{}[{}]", self.expr_text(*base), self.expr_text(*index))
            }
            ExprKind::Member { base, field, arrow } => {
                let sep = if *arrow { "->" } else { "." };
                format!("{}{}{}", self.expr_text(*base), sep, self.expr_text(*field))
            }
            ExprKind::Deref(operand) => format!("*{}", self.operand_text(*operand)),
            ExprKind::AddressOf(operand) => format!("&{}", self.operand_text(*operand)),
            ExprKind::Cast { ty, operand } => format!("({}){}", ty, self.operand_text(*operand)),
            ExprKind::Unary { op, operand } => {
                let inner = self.operand_text(*operand);
                match op {
                    UnaryOp::Neg => format!("-{}", inner),
                    UnaryOp::Not => format!("!{}", inner),
                    UnaryOp::BitNot => format!("~{}", inner),
                    UnaryOp::PreInc => format!("++{}", inner),
                    UnaryOp::PreDec => format!("--{}", inner),
                    UnaryOp::PostInc => format!("{}++", inner),
                    UnaryOp::PostDec => format!("{}--", inner),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => format!(
                "{} {} {}",
                self.operand_text(*lhs),
                op.symbol(),
                self.operand_text(*rhs)
            ),
            ExprKind::Assign { op, target, value } => {
                let op = op.map(|o| o.symbol()).unwrap_or("");
                format!("{} {}= {}", self.expr_text(*target), op, self.expr_text(*value))
            }
            ExprKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| self.expr_text(*a)).collect();
                format!("{}({})", callee, args.join(", "))
            }
            ExprKind::Opaque(text) => text.clone(),
        }
    }

    /// Operands that are themselves operations get parentheses.
    fn operand_text(&self, expr: ExprId) -> String {
        let text = self.expr_text(expr);
        match self.program.expr(expr).kind {
            ExprKind::Binary { .. } | ExprKind::Assign { .. } | ExprKind::Cast { .. } => {
                format!("({})", text)
            }
            _ => text,
        }
    }

    /// Print a statement and everything nested in it.
    pub fn print_stmt(&mut self, stmt: StmtId) {
        let program = self.program;
        match &program.stmt(stmt).kind {
            StmtKind::Expr(e) => {
                self.write_indent();
                let text = self.expr_text(*e);
                self.buffer.push_str(&text);
                self.buffer.push_str(";\n");
            }
            StmtKind::Decl { var, init } => {
                self.write_indent();
                let v = program.variable(*var);
                self.buffer.push_str(&format!("{} {}", v.ty, v.name));
                if let Some(init) = init {
                    let text = self.expr_text(*init);
                    self.buffer.push_str(" = ");
                    self.buffer.push_str(&text);
                }
                self.buffer.push_str(";\n");
            }
            StmtKind::Block { stmts, .. } => {
                self.write_indent();
                self.buffer.push_str("{\n");
                self.indent += 1;
                for s in stmts {
                    self.print_stmt(*s);
                }
                self.indent -= 1;
                self.write_indent();
                self.buffer.push_str("}\n");
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                self.write_indent();
                let text = self.expr_text(*cond);
                self.buffer.push_str(&format!("if ({})\n", text));
                self.print_stmt(*then_branch);
                if let Some(else_branch) = else_branch {
                    self.write_indent();
                    self.buffer.push_str("else\n");
                    self.print_stmt(*else_branch);
                }
            }
            StmtKind::Loop(id) => {
                self.write_indent();
                let header = self.loop_header(*id);
                self.buffer.push_str(&header);
                self.buffer.push('\n');
                if let Some(body) = program.loop_info(*id).body {
                    self.print_stmt(body);
                }
            }
        }
    }

    /// `for (i = 0; i < n; i++)` or `while (cond)`.
    pub fn loop_header(&self, id: LoopId) -> String {
        let lp = self.program.loop_info(id);
        let part = |e: Option<ExprId>| e.map(|e| self.expr_text(e)).unwrap_or_default();
        match lp.form {
            LoopForm::While => format!("while ({})", part(lp.test)),
            LoopForm::For => {
                let init = match &lp.init {
                    Some(LoopInit::Assign(e)) => self.expr_text(*e),
                    Some(LoopInit::Decl { var, value }) => {
                        let v = self.program.variable(*var);
                        format!("{} {} = {}", v.ty, v.name, self.expr_text(*value))
                    }
                    None => String::new(),
                };
                format!("for ({}; {}; {})", init, part(lp.test), part(lp.step))
            }
        }
    }
}

/// Render an expression as source text.
pub fn expr_to_string(program: &Program, expr: ExprId) -> String {
    IrPrinter::new(program).expr_text(expr)
}

/// Render a whole function body.
pub fn print_program(program: &Program) -> String {
    let mut printer = IrPrinter::new(program);
    printer.buffer.push_str(&format!("void {}()\n", program.name));
    printer.print_stmt(program.root);
    printer.take_output()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::ProgramBuilder;

    #[test]
    fn test_print_indirect_access() {
        let mut b = ProgramBuilder::new("gather");
        let root = b.root_scope();
        let x = b.param("x", VarType::pointer(VarType::Double));
        let index = b.param("index", VarType::pointer(VarType::Int));
        let i = b.declare_var(root, "i", VarType::Int);

        let x_ref = b.var(x);
        let index_ref = b.var(index);
        let i_ref = b.var(i);
        let inner = b.index(index_ref, i_ref);
        let access = b.index(x_ref, inner);
        let program = b.finish();

        assert_eq!(expr_to_string(&program, access), "x[index[i]]");
    }

    #[test]
    fn test_print_loop() {
        let mut b = ProgramBuilder::new("scale");
        let root = b.root_scope();
        let a = b.param("a", VarType::array(VarType::Double, &[Some(100)]));
        let i = b.declare_var(root, "i", VarType::Int);
        let zero = b.int(0);
        let hundred = b.int(100);
        let lp = b.for_loop(root, i, zero, hundred);

        let a_ref = b.var(a);
        let i_ref = b.var(i);
        let elem = b.index(a_ref, i_ref);
        let two = b.int(2);
        let store = b.compound(BinaryOp::Mul, elem, two);
        b.expr_stmt(lp.body_scope, store);
        let program = b.finish();

        let text = print_program(&program);
        assert!(text.contains("for (i = 0; i < 100; i++)"));
        assert!(text.contains("a[i] *= 2;"));
    }
}
