use super::*;

/// One callback per node kind. Every default is a no-op, so an
/// implementation only handles the kinds it cares about and the rest are
/// skipped.
#[allow(unused_variables)]
pub trait Visitor {
    type Error;

    fn visit_block(&mut self, block: &Block) -> Result<(), Self::Error> {
        Ok(())
    }

    // ── Statements ─────────────────────────────────────────────────────

    fn visit_expr_stmt(&mut self, expr: &Expr) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_return(&mut self, value: Option<&Expr>, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_if(&mut self, node: &If, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_while(&mut self, node: &While, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_def(&mut self, node: &Function, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_type(&mut self, node: &TypeDecl, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_use(&mut self, path: &str, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn visit_int(&mut self, value: i64, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_float(&mut self, value: f64, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_string(&mut self, value: &str, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_bool(&mut self, value: bool, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_null(&mut self, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_id(&mut self, name: &str, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_array(&mut self, items: &[Expr], line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_hash(&mut self, pairs: &[HashPair], line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_unary(&mut self, node: &UnaryOp, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_binary(&mut self, node: &BinaryOp, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_let(&mut self, decls: &[Decl], line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_call(&mut self, node: &Call, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_slot(&mut self, node: &Slot, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_subscript(&mut self, node: &Subscript, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_function(&mut self, node: &Function, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    // ── Parts ──────────────────────────────────────────────────────────
    //
    // Not dispatched from `visit_stmt`/`visit_expr`; parents call these
    // for their parameters, fields, arguments and pairs.

    fn visit_decl(&mut self, decl: &Decl) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_args(&mut self, args: &Args, line: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn visit_hash_pair(&mut self, pair: &HashPair) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Dispatch a statement to its callback.
pub fn visit_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) -> Result<(), V::Error> {
    let line = stmt.line;
    match &stmt.kind {
        StmtKind::Expr(e) => v.visit_expr_stmt(e),
        StmtKind::Return(value) => v.visit_return(value.as_ref(), line),
        StmtKind::If(node) => v.visit_if(node, line),
        StmtKind::While(node) => v.visit_while(node, line),
        StmtKind::Def(node) => v.visit_def(node, line),
        StmtKind::Type(node) => v.visit_type(node, line),
        StmtKind::Use(path) => v.visit_use(path, line),
    }
}

/// Dispatch an expression to its callback.
pub fn visit_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) -> Result<(), V::Error> {
    let line = expr.line;
    match &expr.kind {
        ExprKind::Int(n) => v.visit_int(*n, line),
        ExprKind::Float(n) => v.visit_float(*n, line),
        ExprKind::Str(s) => v.visit_string(s, line),
        ExprKind::Bool(b) => v.visit_bool(*b, line),
        ExprKind::Null => v.visit_null(line),
        ExprKind::Id(name) => v.visit_id(name, line),
        ExprKind::Array(items) => v.visit_array(items, line),
        ExprKind::Hash(pairs) => v.visit_hash(pairs, line),
        ExprKind::Unary(node) => v.visit_unary(node, line),
        ExprKind::Binary(node) => v.visit_binary(node, line),
        ExprKind::Let(decls) => v.visit_let(decls, line),
        ExprKind::Call(node) => v.visit_call(node, line),
        ExprKind::Slot(node) => v.visit_slot(node, line),
        ExprKind::Subscript(node) => v.visit_subscript(node, line),
        ExprKind::Function(node) => v.visit_function(node, line),
    }
}

/// Visit every statement of `block` in order.
pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &Block) -> Result<(), V::Error> {
    for stmt in &block.stmts {
        visit_stmt(v, stmt)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts integer literals reachable through expression statements.
    #[derive(Default)]
    struct IntCounter {
        ints: usize,
        skipped: usize,
    }

    impl Visitor for IntCounter {
        type Error = ();

        fn visit_expr_stmt(&mut self, expr: &Expr) -> Result<(), ()> {
            visit_expr(self, expr)
        }

        fn visit_int(&mut self, _: i64, _: usize) -> Result<(), ()> {
            self.ints += 1;
            Ok(())
        }

        fn visit_binary(&mut self, node: &BinaryOp, _: usize) -> Result<(), ()> {
            visit_expr(self, &node.left)?;
            visit_expr(self, &node.right)
        }

        fn visit_return(&mut self, _: Option<&Expr>, _: usize) -> Result<(), ()> {
            self.skipped += 1;
            Ok(())
        }
    }

    fn int(n: i64) -> Box<Expr> {
        Expr::boxed(ExprKind::Int(n), 1)
    }

    /// Collects declared names and keyword-argument names.
    #[derive(Default)]
    struct Names(Vec<String>);

    impl Visitor for Names {
        type Error = ();

        fn visit_expr_stmt(&mut self, expr: &Expr) -> Result<(), ()> {
            visit_expr(self, expr)
        }

        fn visit_let(&mut self, decls: &[Decl], _: usize) -> Result<(), ()> {
            decls.iter().try_for_each(|d| self.visit_decl(d))
        }

        fn visit_decl(&mut self, decl: &Decl) -> Result<(), ()> {
            self.0.push(decl.name.clone());
            Ok(())
        }

        fn visit_call(&mut self, node: &Call, line: usize) -> Result<(), ()> {
            self.visit_args(&node.args, line)
        }

        fn visit_args(&mut self, args: &Args, _: usize) -> Result<(), ()> {
            self.0.extend(args.keyword.iter().map(|k| k.name.clone()));
            Ok(())
        }
    }

    #[test]
    fn part_callbacks_are_reached_through_parents() {
        let block = crate::parser::parse("let a = 1, b\nf(1, key: 2)\n{x: 1}", "test").unwrap();
        let mut v = Names::default();
        walk_block(&mut v, &block).unwrap();
        assert_eq!(v.0, vec!["a", "b", "key"]);
    }

    #[test]
    fn missing_callbacks_are_no_ops() {
        let sum = Expr::new(
            ExprKind::Binary(BinaryOp { op: BinOp::Add, left: int(1), right: int(2) }),
            1,
        );
        let block = Block {
            line: 1,
            stmts: vec![
                Stmt::new(StmtKind::Expr(sum), 1),
                Stmt::new(StmtKind::Use("io".into()), 2),
                Stmt::new(StmtKind::Return(None), 3),
                Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Str("s".into()), 4)), 4),
            ],
        };
        let mut v = IntCounter::default();
        walk_block(&mut v, &block).unwrap();
        assert_eq!(v.ints, 2);
        assert_eq!(v.skipped, 1);
    }
}
