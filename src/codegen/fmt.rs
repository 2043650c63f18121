use crate::ast::visit::{self, Visitor};
use crate::ast::*;
use crate::lexer::{tokenize, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmtMode {
    /// One line, statements separated by `; `.
    Dense,
    /// Multi-line, 2-space indentation, `end` on its own line.
    Expanded,
}

const INDENT: &str = "  ";

// Binding strength of non-binary expressions, on the scale of
// `BinOp::precedence`.
const LOOSE: u8 = 0;
const PREFIX: u8 = 12;
const POSTFIX: u8 = 13;
const POW: u8 = 14;
const ATOM: u8 = 15;

/// Minimum strength for list items followed by a `,`, so that `let` and pipe
/// functions, which would swallow it, get parenthesized.
const LIST_ITEM: u8 = 1;

fn item_prec(index: usize, len: usize) -> u8 {
    if index + 1 == len { LOOSE } else { LIST_ITEM }
}

pub fn format(block: &Block, mode: FmtMode) -> String {
    let mut p = Printer { out: String::new(), indent: 0, mode, pair_prec: LOOSE };
    p.stmts(&block.stmts);
    if mode == FmtMode::Expanded && !p.out.is_empty() {
        p.out.push('\n');
    }
    p.out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut p = Printer { out: String::new(), indent: 0, mode: FmtMode::Dense, pair_prec: LOOSE };
    p.expr(expr, LOOSE);
    p.out
}

fn precedence(e: &Expr) -> u8 {
    match &e.kind {
        // `a = let b = 1` is as open-ended as its right side
        ExprKind::Binary(b) if b.op.is_assignment() && precedence(&b.right) == LOOSE => LOOSE,
        ExprKind::Binary(b) => b.op.precedence(),
        ExprKind::Unary(u) if u.postfix => POSTFIX,
        ExprKind::Unary(_) => PREFIX,
        ExprKind::Let(_) => LOOSE,
        ExprKind::Function(f) if pipe_body(f).is_some() => LOOSE,
        _ => ATOM,
    }
}

/// The body expression when `f` can be written as `:|params| expr`.
fn pipe_body(f: &Function) -> Option<&Expr> {
    if f.name.is_some() || f.ret.is_some() || f.params.iter().any(|p| p.value.is_some()) {
        return None;
    }
    f.implicit_return()
}

fn is_identifier(s: &str) -> bool {
    matches!(tokenize(s, ""), Ok(tokens) if tokens.len() == 2 && tokens[0].kind == TokenKind::Id)
}

fn fmt_float(n: f64) -> String {
    let s = n.to_string();
    if s.contains('.') { s } else { format!("{s}.0") }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c == '\x7f' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A statement line beginning with one of these would be read as a
/// continuation of the previous expression.
fn continues_expression(text: &str) -> bool {
    text.starts_with(['(', '[', '-', '+'])
}

struct Printer {
    out: String,
    indent: usize,
    mode: FmtMode,
    /// Minimum precedence for the value of the hash pair being printed.
    pair_prec: u8,
}

impl Printer {
    fn capture(&mut self, f: impl FnOnce(&mut Self)) -> String {
        let saved = std::mem::take(&mut self.out);
        f(self);
        std::mem::replace(&mut self.out, saved)
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn expr(&mut self, e: &Expr, min_prec: u8) {
        let wrap = precedence(e) < min_prec;
        if wrap {
            self.out.push('(');
        }
        let Ok(()) = visit::visit_expr(self, e);
        if wrap {
            self.out.push(')');
        }
    }

    fn list(&mut self, items: &[Expr], trailing: bool) {
        let len = if trailing { items.len() + 1 } else { items.len() };
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(item, item_prec(i, len));
        }
    }

    fn decl(&mut self, d: &Decl) {
        let Ok(()) = self.visit_decl(d);
    }

    fn decls(&mut self, decls: &[Decl]) {
        for (i, d) in decls.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.decl(d);
        }
    }

    fn signature(&mut self, f: &Function) {
        self.out.push('(');
        self.decls(&f.params);
        self.out.push(')');
        if let Some(ret) = &f.ret {
            self.out.push_str(": ");
            self.out.push_str(ret);
        }
    }

    /// Statements at the current indent, without leading or trailing
    /// separators.
    fn stmts(&mut self, stmts: &[Stmt]) {
        for (i, stmt) in stmts.iter().enumerate() {
            let text = self.capture(|p| {
                let Ok(()) = visit::visit_stmt(p, stmt);
            });
            if i > 0 {
                match self.mode {
                    FmtMode::Expanded => {
                        self.newline();
                        if continues_expression(&text) {
                            self.out.push(';');
                        }
                    }
                    FmtMode::Dense => self.out.push_str("; "),
                }
            }
            self.out.push_str(&text);
            let bare_return = matches!(stmt.kind, StmtKind::Return(None));
            if self.mode == FmtMode::Expanded && bare_return && i + 1 < stmts.len() {
                self.out.push(';');
            }
        }
    }

    /// Body of a construct, written right after its header and leaving the
    /// cursor where the closing `else`/`end` goes. The header may end in an
    /// expression or `else`, so the first statement may need a separator too.
    fn body(&mut self, block: &Block) {
        match self.mode {
            FmtMode::Expanded => {
                self.indent += 1;
                if !block.is_empty() {
                    self.newline();
                    let text = self.capture(|p| p.stmts(&block.stmts));
                    // `else` followed by `if` would read as `else if`
                    if continues_expression(&text) || text.starts_with("if ") {
                        self.out.push(';');
                    }
                    self.out.push_str(&text);
                }
                self.indent -= 1;
                self.newline();
            }
            FmtMode::Dense => {
                if !block.is_empty() {
                    self.out.push_str("; ");
                    self.stmts(&block.stmts);
                }
                self.out.push(' ');
            }
        }
    }
}

impl Visitor for Printer {
    type Error = std::convert::Infallible;

    // ── Statements ─────────────────────────────────────────────────────

    fn visit_block(&mut self, block: &Block) -> Result<(), Self::Error> {
        self.stmts(&block.stmts);
        Ok(())
    }

    fn visit_expr_stmt(&mut self, expr: &Expr) -> Result<(), Self::Error> {
        self.expr(expr, LOOSE);
        Ok(())
    }

    fn visit_return(&mut self, value: Option<&Expr>, _: usize) -> Result<(), Self::Error> {
        self.out.push_str("return");
        if let Some(e) = value {
            self.out.push(' ');
            self.expr(e, LOOSE);
        }
        Ok(())
    }

    fn visit_if(&mut self, node: &If, _: usize) -> Result<(), Self::Error> {
        self.out.push_str(if node.negate { "unless " } else { "if " });
        self.expr(&node.cond, LOOSE);
        self.body(&node.block);
        for branch in &node.else_ifs {
            self.out.push_str("else if ");
            self.expr(&branch.cond, LOOSE);
            self.body(&branch.block);
        }
        if let Some(block) = &node.else_block {
            self.out.push_str("else");
            self.body(block);
        }
        self.out.push_str("end");
        Ok(())
    }

    fn visit_while(&mut self, node: &While, _: usize) -> Result<(), Self::Error> {
        self.out.push_str(if node.negate { "until " } else { "while " });
        self.expr(&node.cond, LOOSE);
        self.body(&node.block);
        self.out.push_str("end");
        Ok(())
    }

    fn visit_def(&mut self, node: &Function, _: usize) -> Result<(), Self::Error> {
        self.out.push_str("def ");
        self.out.push_str(node.name.as_deref().unwrap_or("_"));
        self.signature(node);
        self.body(&node.body);
        self.out.push_str("end");
        Ok(())
    }

    fn visit_type(&mut self, node: &TypeDecl, _: usize) -> Result<(), Self::Error> {
        self.out.push_str("type ");
        self.out.push_str(&node.name);
        match self.mode {
            FmtMode::Expanded => {
                self.indent += 1;
                for field in &node.fields {
                    self.newline();
                    self.decl(field);
                }
                self.indent -= 1;
                self.newline();
            }
            FmtMode::Dense => {
                for field in &node.fields {
                    self.out.push_str("; ");
                    self.decl(field);
                }
                self.out.push(' ');
            }
        }
        self.out.push_str("end");
        Ok(())
    }

    fn visit_use(&mut self, path: &str, _: usize) -> Result<(), Self::Error> {
        self.out.push_str("use ");
        if path.split('.').all(is_identifier) {
            self.out.push_str(path);
        } else {
            self.out.push_str(&escape(path));
        }
        Ok(())
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn visit_int(&mut self, value: i64, _: usize) -> Result<(), Self::Error> {
        self.out.push_str(&value.to_string());
        Ok(())
    }

    fn visit_float(&mut self, value: f64, _: usize) -> Result<(), Self::Error> {
        self.out.push_str(&fmt_float(value));
        Ok(())
    }

    fn visit_string(&mut self, value: &str, _: usize) -> Result<(), Self::Error> {
        self.out.push_str(&escape(value));
        Ok(())
    }

    fn visit_bool(&mut self, value: bool, _: usize) -> Result<(), Self::Error> {
        self.out.push_str(if value { "true" } else { "false" });
        Ok(())
    }

    fn visit_null(&mut self, _: usize) -> Result<(), Self::Error> {
        self.out.push_str("null");
        Ok(())
    }

    fn visit_id(&mut self, name: &str, _: usize) -> Result<(), Self::Error> {
        self.out.push_str(name);
        Ok(())
    }

    fn visit_array(&mut self, items: &[Expr], _: usize) -> Result<(), Self::Error> {
        self.out.push('[');
        self.list(items, false);
        self.out.push(']');
        Ok(())
    }

    fn visit_hash(&mut self, pairs: &[HashPair], _: usize) -> Result<(), Self::Error> {
        self.out.push('{');
        for (i, pair) in pairs.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.pair_prec = item_prec(i, pairs.len());
            self.visit_hash_pair(pair)?;
        }
        self.out.push('}');
        Ok(())
    }

    fn visit_unary(&mut self, node: &UnaryOp, _: usize) -> Result<(), Self::Error> {
        if node.postfix {
            self.expr(&node.operand, POSTFIX);
            self.out.push_str(&node.op.to_string());
            return Ok(());
        }
        let op = node.op.to_string();
        let operand = self.capture(|p| p.expr(&node.operand, PREFIX));
        self.out.push_str(&op);
        // `- -x` must not lex as `--x`
        if op.ends_with(['+', '-']) && operand.starts_with(['+', '-']) {
            self.out.push(' ');
        }
        self.out.push_str(&operand);
        Ok(())
    }

    fn visit_binary(&mut self, node: &BinaryOp, _: usize) -> Result<(), Self::Error> {
        let p = node.op.precedence();
        let (left, right) = match node.op {
            op if op.is_assignment() => (p + 1, LOOSE),
            BinOp::Pow => (POW, ATOM),
            _ => (p, p + 1),
        };
        self.expr(&node.left, left);
        self.out.push(' ');
        self.out.push_str(&node.op.to_string());
        self.out.push(' ');
        self.expr(&node.right, right);
        Ok(())
    }

    fn visit_let(&mut self, decls: &[Decl], _: usize) -> Result<(), Self::Error> {
        self.out.push_str("let ");
        self.decls(decls);
        Ok(())
    }

    fn visit_call(&mut self, node: &Call, line: usize) -> Result<(), Self::Error> {
        self.expr(&node.callee, ATOM);
        self.out.push('(');
        self.visit_args(&node.args, line)?;
        self.out.push(')');
        Ok(())
    }

    fn visit_slot(&mut self, node: &Slot, _: usize) -> Result<(), Self::Error> {
        self.expr(&node.object, ATOM);
        self.out.push('.');
        self.out.push_str(&node.name);
        Ok(())
    }

    fn visit_subscript(&mut self, node: &Subscript, _: usize) -> Result<(), Self::Error> {
        self.expr(&node.object, ATOM);
        self.out.push('[');
        self.expr(&node.index, LOOSE);
        self.out.push(']');
        Ok(())
    }

    fn visit_function(&mut self, node: &Function, _: usize) -> Result<(), Self::Error> {
        if let Some(body) = pipe_body(node) {
            self.out.push(':');
            if node.params.is_empty() {
                self.out.push_str("||");
            } else {
                self.out.push('|');
                self.decls(&node.params);
                self.out.push('|');
            }
            self.out.push(' ');
            self.expr(body, LOOSE);
            return Ok(());
        }
        self.out.push(':');
        self.signature(node);
        self.body(&node.body);
        self.out.push_str("end");
        Ok(())
    }

    // ── Parts ──────────────────────────────────────────────────────────

    fn visit_decl(&mut self, d: &Decl) -> Result<(), Self::Error> {
        self.out.push_str(&d.name);
        if let Some(ty) = &d.ty {
            self.out.push_str(": ");
            self.out.push_str(ty);
        }
        if let Some(value) = &d.value {
            self.out.push_str(" = ");
            self.expr(value, LIST_ITEM);
        }
        Ok(())
    }

    fn visit_args(&mut self, args: &Args, _: usize) -> Result<(), Self::Error> {
        let keyword = &args.keyword;
        self.list(&args.positional, !keyword.is_empty());
        for (i, kw) in keyword.iter().enumerate() {
            if i > 0 || !args.positional.is_empty() {
                self.out.push_str(", ");
            }
            self.out.push_str(&kw.name);
            self.out.push_str(": ");
            self.expr(&kw.value, item_prec(i, keyword.len()));
        }
        Ok(())
    }

    fn visit_hash_pair(&mut self, pair: &HashPair) -> Result<(), Self::Error> {
        if is_identifier(&pair.key) {
            self.out.push_str(&pair.key);
        } else {
            self.out.push_str(&escape(&pair.key));
        }
        self.out.push_str(": ");
        let prec = self.pair_prec;
        self.expr(&pair.value, prec);
        Ok(())
    }
}
