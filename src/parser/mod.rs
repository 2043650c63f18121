use crate::ast::*;
use crate::lexer::{LexError, Lexer, Token, TokenKind, TokenValue};

/// Grammar mismatch, tagged with the innermost production being parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub filename: String,
    pub message: String,
    pub context: &'static str,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// The lexer produced an illegal token.
    #[error("{error}")]
    Lex { error: LexError, context: &'static str },
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
}

impl ParseError {
    /// Name the source was registered under when it was lexed.
    pub fn filename(&self) -> &str {
        match self {
            ParseError::Lex { error, .. } => &error.filename,
            ParseError::Syntax(e) => &e.filename,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Lex { error, .. } => &error.message,
            ParseError::Syntax(e) => &e.message,
        }
    }

    pub fn context(&self) -> &'static str {
        match self {
            ParseError::Lex { context, .. } => context,
            ParseError::Syntax(e) => e.context,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            ParseError::Lex { error, .. } => error.line,
            ParseError::Syntax(e) => e.line,
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self, ParseError::Lex { .. })
    }

    /// `syntax` for lexical failures, `parse` for grammar mismatches.
    pub fn phase(&self) -> &'static str {
        if self.is_lexical() { "syntax" } else { "parse" }
    }
}

type Result<T> = std::result::Result<T, ParseError>;

/// Recursive-descent parser over a [`Lexer`] with one token of lookahead.
///
/// Parsing stops at the first failure. The error carries the context label
/// of the innermost production that was active, so `def` without a name
/// reports `function statement` rather than the enclosing `program`.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    la: Token,
    ctx: &'static str,
    depth: usize,
}

/// Deepest expression or statement nesting accepted before parsing fails.
pub const MAX_NESTING: usize = 64;

const BINARY_OR: &[(TokenKind, BinOp)] = &[(TokenKind::LogicalOr, BinOp::Or)];
const BINARY_AND: &[(TokenKind, BinOp)] =
    &[(TokenKind::LogicalAnd, BinOp::And), (TokenKind::And, BinOp::And)];
const BIT_OR: &[(TokenKind, BinOp)] = &[(TokenKind::BitOr, BinOp::BitOr)];
const BIT_XOR: &[(TokenKind, BinOp)] = &[(TokenKind::BitXor, BinOp::BitXor)];
const BIT_AND: &[(TokenKind, BinOp)] = &[(TokenKind::BitAnd, BinOp::BitAnd)];
const EQUALITY: &[(TokenKind, BinOp)] = &[(TokenKind::Eq, BinOp::Eq), (TokenKind::Neq, BinOp::Neq)];
const RELATIONAL: &[(TokenKind, BinOp)] = &[
    (TokenKind::Lt, BinOp::Lt),
    (TokenKind::Le, BinOp::Le),
    (TokenKind::Gt, BinOp::Gt),
    (TokenKind::Ge, BinOp::Ge),
];
const SHIFT: &[(TokenKind, BinOp)] = &[(TokenKind::Shl, BinOp::Shl), (TokenKind::Shr, BinOp::Shr)];
const ADDITIVE: &[(TokenKind, BinOp)] = &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)];
const MULTIPLICATIVE: &[(TokenKind, BinOp)] = &[
    (TokenKind::Star, BinOp::Mul),
    (TokenKind::Slash, BinOp::Div),
    (TokenKind::Percent, BinOp::Mod),
];

fn assign_op(kind: TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Assign => BinOp::Assign,
        TokenKind::PlusAssign => BinOp::AddAssign,
        TokenKind::MinusAssign => BinOp::SubAssign,
        TokenKind::MulAssign => BinOp::MulAssign,
        TokenKind::DivAssign => BinOp::DivAssign,
        TokenKind::AndAssign => BinOp::AndAssign,
        TokenKind::OrAssign => BinOp::OrAssign,
        _ => return None,
    })
}

fn into_text(token: Token) -> String {
    match token.value {
        TokenValue::Str(s) => s,
        _ => String::new(),
    }
}

impl<'src> Parser<'src> {
    pub fn new(mut lexer: Lexer<'src>) -> Self {
        let la = lexer.scan();
        Parser { lexer, la, ctx: "program", depth: 0 }
    }

    pub fn filename(&self) -> &str {
        self.lexer.filename()
    }

    // ---- Token plumbing ----

    fn peek(&self) -> Result<&Token> {
        if self.la.kind == TokenKind::Illegal {
            return Err(self.lex_error());
        }
        Ok(&self.la)
    }

    fn peek_kind(&self) -> Result<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Result<Token> {
        self.peek()?;
        let next = self.lexer.scan();
        Ok(std::mem::replace(&mut self.la, next))
    }

    fn accept(&mut self, kind: TokenKind) -> Result<bool> {
        if self.peek_kind()? == kind {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.peek_kind()? == kind {
            self.advance()
        } else {
            Err(self.error(format!("expected '{kind}' but found {}", self.found())))
        }
    }

    /// Consume an identifier, or fail with `missing <what>`.
    fn expect_id(&mut self, what: &str) -> Result<String> {
        if self.peek_kind()? == TokenKind::Id {
            Ok(into_text(self.advance()?))
        } else {
            Err(self.error(format!("missing {what}")))
        }
    }

    fn found(&self) -> String {
        let token = &self.la;
        match &token.value {
            TokenValue::Str(s) if token.kind == TokenKind::Id => format!("identifier '{s}'"),
            TokenValue::Str(s) => format!("string {s:?}"),
            TokenValue::Int(n) => format!("integer {n}"),
            TokenValue::Float(n) => format!("float {n}"),
            TokenValue::None if token.kind == TokenKind::Eos => "end of source".to_string(),
            TokenValue::None => format!("'{}'", token.kind),
        }
    }

    // ---- Errors and context ----

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax(SyntaxError {
            filename: self.filename().to_string(),
            message: message.into(),
            context: self.ctx,
            line: self.la.line,
        })
    }

    fn lex_error(&self) -> ParseError {
        let error = self.lexer.error().cloned().unwrap_or_else(|| LexError {
            filename: self.filename().to_string(),
            message: "illegal token".to_string(),
            line: self.la.line,
        });
        ParseError::Lex { error, context: self.ctx }
    }

    /// Run `f` with `label` as the active context, restoring the outer label
    /// on success.
    fn within<T>(&mut self, label: &'static str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outer = std::mem::replace(&mut self.ctx, label);
        let result = f(self)?;
        self.ctx = outer;
        Ok(result)
    }

    /// Run `f` one nesting level deeper, failing once [`MAX_NESTING`] is hit.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ---- Statements ----

    /// program: block EOS
    pub fn parse(&mut self) -> Result<Block> {
        let block = self.block()?;
        match self.peek_kind()? {
            TokenKind::Eos => Ok(block),
            _ => Err(self.error(format!("unexpected {}", self.found()))),
        }
    }

    /// block: (stmt | ';')* up to `end`, `else` or EOS
    fn block(&mut self) -> Result<Block> {
        let mut block = Block::new(self.la.line);
        loop {
            match self.peek_kind()? {
                TokenKind::Semicolon => {
                    self.advance()?;
                }
                TokenKind::End | TokenKind::Else | TokenKind::Eos => return Ok(block),
                _ => block.stmts.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> Result<Stmt> {
        let line = self.la.line;
        let kind = match self.peek_kind()? {
            TokenKind::If | TokenKind::Unless => self.if_stmt()?,
            TokenKind::While | TokenKind::Until => self.while_stmt()?,
            TokenKind::Return => self.return_stmt()?,
            TokenKind::Def => self.def_stmt()?,
            TokenKind::Type => self.type_stmt()?,
            TokenKind::Use => self.use_stmt()?,
            _ => StmtKind::Expr(self.expr()?),
        };
        Ok(Stmt::new(kind, line))
    }

    /// ('if' | 'unless') expr block ('else' 'if' expr block)* ('else' block)? 'end'
    fn if_stmt(&mut self) -> Result<StmtKind> {
        self.within("if statement", |p| {
            let negate = p.advance()?.kind == TokenKind::Unless;
            let cond = Box::new(p.expr()?);
            let block = p.block()?;
            let mut else_ifs = Vec::new();
            let mut else_block = None;
            while p.accept(TokenKind::Else)? {
                if p.peek_kind()? == TokenKind::If {
                    let line = p.advance()?.line;
                    let cond = Box::new(p.expr()?);
                    let block = p.block()?;
                    else_ifs.push(ElseIf { line, cond, block });
                } else {
                    else_block = Some(p.block()?);
                    break;
                }
            }
            p.expect(TokenKind::End)?;
            Ok(StmtKind::If(If { negate, cond, block, else_ifs, else_block }))
        })
    }

    /// ('while' | 'until') expr block 'end'
    fn while_stmt(&mut self) -> Result<StmtKind> {
        self.within("while statement", |p| {
            let negate = p.advance()?.kind == TokenKind::Until;
            let cond = Box::new(p.expr()?);
            let block = p.block()?;
            p.expect(TokenKind::End)?;
            Ok(StmtKind::While(While { negate, cond, block }))
        })
    }

    /// 'return' expr?
    fn return_stmt(&mut self) -> Result<StmtKind> {
        self.within("return statement", |p| {
            p.advance()?;
            let value = match p.peek_kind()? {
                TokenKind::End | TokenKind::Else | TokenKind::Eos | TokenKind::Semicolon => None,
                _ => Some(p.expr()?),
            };
            Ok(StmtKind::Return(value))
        })
    }

    /// 'def' id ('(' params ')')? (':' type)? block 'end'
    fn def_stmt(&mut self) -> Result<StmtKind> {
        self.within("function statement", |p| {
            p.advance()?;
            let name = p.expect_id("function name")?;
            let params = if p.peek_kind()? == TokenKind::LParen {
                p.params()?
            } else {
                Vec::new()
            };
            let ret = p.return_type()?;
            let body = p.block()?;
            p.expect(TokenKind::End)?;
            Ok(StmtKind::Def(Function { name: Some(name), params, ret, body }))
        })
    }

    /// 'type' id decl* 'end'
    fn type_stmt(&mut self) -> Result<StmtKind> {
        self.within("type statement", |p| {
            p.advance()?;
            let name = p.expect_id("type name")?;
            let mut fields = Vec::new();
            loop {
                match p.peek_kind()? {
                    TokenKind::Comma | TokenKind::Semicolon => {
                        p.advance()?;
                    }
                    TokenKind::Id => fields.push(p.decl("field name", true)?),
                    _ => break,
                }
            }
            p.expect(TokenKind::End)?;
            Ok(StmtKind::Type(TypeDecl { name, fields }))
        })
    }

    /// 'use' (string | id ('.' id)*)
    fn use_stmt(&mut self) -> Result<StmtKind> {
        self.within("use statement", |p| {
            p.advance()?;
            if p.peek_kind()? == TokenKind::Str {
                return Ok(StmtKind::Use(into_text(p.advance()?)));
            }
            let mut path = p.expect_id("module name")?;
            while p.accept(TokenKind::Dot)? {
                path.push('.');
                path.push_str(&p.expect_id("module name")?);
            }
            Ok(StmtKind::Use(path))
        })
    }

    // ---- Declarations ----

    /// '(' (decl (',' decl)*)? ')'
    fn params(&mut self) -> Result<Vec<Decl>> {
        self.within("function params", |p| {
            p.expect(TokenKind::LParen)?;
            let mut params = Vec::new();
            if p.accept(TokenKind::RParen)? {
                return Ok(params);
            }
            loop {
                params.push(p.decl("parameter name", true)?);
                if !p.accept(TokenKind::Comma)? {
                    break;
                }
            }
            p.expect(TokenKind::RParen)?;
            Ok(params)
        })
    }

    /// (':' id)?
    fn return_type(&mut self) -> Result<Option<String>> {
        if self.accept(TokenKind::Colon)? {
            Ok(Some(self.expect_id("type name")?))
        } else {
            Ok(None)
        }
    }

    /// id (':' type)? ('=' expr)?
    fn decl(&mut self, what: &str, with_default: bool) -> Result<Decl> {
        let line = self.la.line;
        let name = self.expect_id(what)?;
        let ty = self.return_type()?;
        let value = if with_default && self.accept(TokenKind::Assign)? {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Decl { line, name, ty, value })
    }

    // ---- Expressions ----

    pub fn expr(&mut self) -> Result<Expr> {
        self.nested(Self::assignment)
    }

    /// let_expr | logical_or (assign_op assignment)?
    fn assignment(&mut self) -> Result<Expr> {
        if self.peek_kind()? == TokenKind::Let {
            return self.let_expr();
        }
        let left = self.logical_or()?;
        let Some(op) = assign_op(self.peek_kind()?) else {
            return Ok(left);
        };
        if !matches!(left.kind, ExprKind::Id(_) | ExprKind::Slot(_) | ExprKind::Subscript(_)) {
            return Err(self.error(format!("cannot assign to {}", left.name())));
        }
        self.advance()?;
        let right = self.assignment()?;
        let line = left.line;
        Ok(Expr::new(
            ExprKind::Binary(BinaryOp { op, left: Box::new(left), right: Box::new(right) }),
            line,
        ))
    }

    /// 'let' decl (',' decl)*
    fn let_expr(&mut self) -> Result<Expr> {
        self.within("let expression", |p| {
            let line = p.advance()?.line;
            let mut decls = vec![p.decl("variable name", true)?];
            while p.accept(TokenKind::Comma)? {
                decls.push(p.decl("variable name", true)?);
            }
            Ok(Expr::new(ExprKind::Let(decls), line))
        })
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        loop {
            let kind = self.peek_kind()?;
            let Some(&(_, op)) = ops.iter().find(|(k, _)| *k == kind) else {
                return Ok(left);
            };
            self.advance()?;
            let right = next(self)?;
            let line = left.line;
            left = Expr::new(
                ExprKind::Binary(BinaryOp { op, left: Box::new(left), right: Box::new(right) }),
                line,
            );
        }
    }

    fn logical_or(&mut self) -> Result<Expr> {
        self.binary_level(BINARY_OR, Self::logical_and)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        self.binary_level(BINARY_AND, Self::bitwise_or)
    }

    fn bitwise_or(&mut self) -> Result<Expr> {
        self.binary_level(BIT_OR, Self::bitwise_xor)
    }

    fn bitwise_xor(&mut self) -> Result<Expr> {
        self.binary_level(BIT_XOR, Self::bitwise_and)
    }

    fn bitwise_and(&mut self) -> Result<Expr> {
        self.binary_level(BIT_AND, Self::equality)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(EQUALITY, Self::relational)
    }

    fn relational(&mut self) -> Result<Expr> {
        self.binary_level(RELATIONAL, Self::shift)
    }

    fn shift(&mut self) -> Result<Expr> {
        self.binary_level(SHIFT, Self::additive)
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(ADDITIVE, Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(MULTIPLICATIVE, Self::unary)
    }

    /// ('!' | 'not' | '-' | '+' | '~' | '++' | '--') unary | '&' unary | postfix
    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek_kind()? {
            TokenKind::Bang | TokenKind::Not => UnOp::Not,
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Plus => UnOp::Plus,
            TokenKind::BitNot => UnOp::BitNot,
            TokenKind::Incr => UnOp::Incr,
            TokenKind::Decr => UnOp::Decr,
            TokenKind::BitAnd => return self.fork(),
            _ => return self.postfix(),
        };
        let line = self.advance()?.line;
        let operand = Box::new(self.nested(Self::unary)?);
        Ok(Expr::new(ExprKind::Unary(UnaryOp { op, operand, postfix: false }), line))
    }

    /// `&expr` is sugar for `fork(expr)`.
    fn fork(&mut self) -> Result<Expr> {
        let line = self.advance()?.line;
        let operand = self.nested(Self::unary)?;
        let callee = Expr::boxed(ExprKind::Id("fork".to_string()), line);
        let args = Args { positional: vec![operand], keyword: Vec::new() };
        Ok(Expr::new(ExprKind::Call(Call { callee, args }), line))
    }

    /// pow ('++' | '--')*
    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.pow()?;
        loop {
            let op = match self.peek_kind()? {
                TokenKind::Incr => UnOp::Incr,
                TokenKind::Decr => UnOp::Decr,
                _ => return Ok(expr),
            };
            self.advance()?;
            let line = expr.line;
            expr = Expr::new(
                ExprKind::Unary(UnaryOp { op, operand: Box::new(expr), postfix: true }),
                line,
            );
        }
    }

    /// call ('**' call)*
    fn pow(&mut self) -> Result<Expr> {
        let mut left = self.call()?;
        while self.accept(TokenKind::Pow)? {
            let right = self.call()?;
            let line = left.line;
            left = Expr::new(
                ExprKind::Binary(BinaryOp { op: BinOp::Pow, left: Box::new(left), right: Box::new(right) }),
                line,
            );
        }
        Ok(left)
    }

    /// primary ('(' args ')' | '.' id | '[' expr ']')*
    fn call(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            let line = expr.line;
            let kind = match self.peek_kind()? {
                TokenKind::LParen => {
                    let args = self.args()?;
                    ExprKind::Call(Call { callee: Box::new(expr), args })
                }
                TokenKind::Dot => {
                    self.advance()?;
                    let name = self.within("slot access", |p| p.expect_id("slot name"))?;
                    ExprKind::Slot(Slot { object: Box::new(expr), name })
                }
                TokenKind::LBracket => {
                    let index = self.within("subscript", |p| {
                        p.advance()?;
                        let index = p.expr()?;
                        p.expect(TokenKind::RBracket)?;
                        Ok(index)
                    })?;
                    ExprKind::Subscript(Subscript { object: Box::new(expr), index: Box::new(index) })
                }
                _ => return Ok(expr),
            };
            expr = Expr::new(kind, line);
        }
    }

    /// '(' (arg (',' arg)*)? ')' where arg is `expr` or `id ':' expr`;
    /// keyword arguments come last.
    fn args(&mut self) -> Result<Args> {
        self.within("function arguments", |p| {
            p.expect(TokenKind::LParen)?;
            let mut args = Args::default();
            if p.accept(TokenKind::RParen)? {
                return Ok(args);
            }
            loop {
                let arg = p.expr()?;
                if p.peek_kind()? == TokenKind::Colon {
                    let ExprKind::Id(name) = arg.kind else {
                        return Err(p.error("keyword argument name must be an identifier"));
                    };
                    if args.get(&name).is_some() {
                        return Err(p.error(format!("duplicate keyword argument '{name}'")));
                    }
                    p.advance()?;
                    let value = p.expr()?;
                    args.keyword.push(KeywordArg { name, value });
                } else if !args.keyword.is_empty() {
                    return Err(p.error("positional argument follows keyword argument"));
                } else {
                    args.positional.push(arg);
                }
                if !p.accept(TokenKind::Comma)? {
                    break;
                }
            }
            p.expect(TokenKind::RParen)?;
            Ok(args)
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.la.line;
        let kind = match self.peek_kind()? {
            TokenKind::Id => match into_text(self.advance()?).as_str() {
                "true" => ExprKind::Bool(true),
                "false" => ExprKind::Bool(false),
                "null" => ExprKind::Null,
                name => ExprKind::Id(name.to_string()),
            },
            TokenKind::Int | TokenKind::Float | TokenKind::Str => match self.advance()?.value {
                TokenValue::Int(n) => ExprKind::Int(n),
                TokenValue::Float(n) => ExprKind::Float(n),
                TokenValue::Str(s) => ExprKind::Str(s),
                TokenValue::None => ExprKind::Null,
            },
            TokenKind::LBracket => self.array()?,
            TokenKind::LBrace => self.hash()?,
            TokenKind::Colon => self.function()?,
            TokenKind::LParen => {
                self.advance()?;
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.error(format!("unexpected {}", self.found()))),
        };
        Ok(Expr::new(kind, line))
    }

    /// '[' (expr (',' expr)* ','?)? ']'
    fn array(&mut self) -> Result<ExprKind> {
        self.within("array literal", |p| {
            p.advance()?;
            let mut items = Vec::new();
            while p.peek_kind()? != TokenKind::RBracket {
                items.push(p.expr()?);
                if !p.accept(TokenKind::Comma)? {
                    break;
                }
            }
            p.expect(TokenKind::RBracket)?;
            Ok(ExprKind::Array(items))
        })
    }

    /// '{' (key ':' expr (',' key ':' expr)* ','?)? '}'
    fn hash(&mut self) -> Result<ExprKind> {
        self.within("hash literal", |p| {
            p.advance()?;
            let mut pairs: Vec<HashPair> = Vec::new();
            while p.peek_kind()? != TokenKind::RBrace {
                let line = p.la.line;
                let key = match p.peek_kind()? {
                    TokenKind::Id | TokenKind::Str => into_text(p.advance()?),
                    _ => return Err(p.error(format!("expected hash key but found {}", p.found()))),
                };
                p.expect(TokenKind::Colon)?;
                let value = p.expr()?;
                pairs.push(HashPair { line, key, value });
                if !p.accept(TokenKind::Comma)? {
                    break;
                }
            }
            p.expect(TokenKind::RBrace)?;
            Ok(ExprKind::Hash(pairs))
        })
    }

    /// ':' ('(' params ')')? (':' type)? block 'end'
    /// | ':' '|' id (',' id)* '|' expr
    /// | ':' '||' expr
    fn function(&mut self) -> Result<ExprKind> {
        self.within("function literal", |p| {
            p.advance()?;
            let pipe_params = match p.peek_kind()? {
                TokenKind::LogicalOr => {
                    p.advance()?;
                    Some(Vec::new())
                }
                TokenKind::BitOr => {
                    p.advance()?;
                    let mut params = vec![p.decl("parameter name", false)?];
                    while p.accept(TokenKind::Comma)? {
                        params.push(p.decl("parameter name", false)?);
                    }
                    p.expect(TokenKind::BitOr)?;
                    Some(params)
                }
                _ => None,
            };

            if let Some(params) = pipe_params {
                let value = p.expr()?;
                let line = value.line;
                let body = Block { line, stmts: vec![Stmt::new(StmtKind::Return(Some(value)), line)] };
                return Ok(ExprKind::Function(Function { name: None, params, ret: None, body }));
            }

            let params = if p.peek_kind()? == TokenKind::LParen {
                p.params()?
            } else {
                Vec::new()
            };
            let ret = p.return_type()?;
            let body = p.block()?;
            p.expect(TokenKind::End)?;
            Ok(ExprKind::Function(Function { name: None, params, ret, body }))
        })
    }
}

/// Parse a whole source buffer.
pub fn parse(source: &str, filename: &str) -> Result<Block> {
    Parser::new(Lexer::new(source, filename)).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Block {
        match parse(source, "test") {
            Ok(block) => block,
            Err(e) => panic!("parse failed in {}: {} (line {})", e.context(), e.message(), e.line()),
        }
    }

    fn parse_err(source: &str) -> ParseError {
        parse(source, "test").expect_err("expected a parse error")
    }

    fn only_expr(source: &str) -> Expr {
        let mut block = parse_ok(source);
        assert_eq!(block.stmts.len(), 1, "expected one statement in {source:?}");
        match block.stmts.remove(0).kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn binary(e: &Expr) -> &BinaryOp {
        match &e.kind {
            ExprKind::Binary(b) => b,
            other => panic!("expected binary op, got {other:?}"),
        }
    }

    #[test]
    fn precedence_is_not_flattened() {
        let e = only_expr("1 + 2 * 3");
        let add = binary(&e);
        assert_eq!(add.op, BinOp::Add);
        assert!(matches!(add.left.kind, ExprKind::Int(1)));
        let mul = binary(&add.right);
        assert_eq!(mul.op, BinOp::Mul);
        assert!(matches!(mul.left.kind, ExprKind::Int(2)));
        assert!(matches!(mul.right.kind, ExprKind::Int(3)));
    }

    #[test]
    fn binary_levels_are_left_associative() {
        let e = only_expr("1 - 2 - 3");
        let outer = binary(&e);
        assert_eq!(outer.op, BinOp::Sub);
        assert!(matches!(outer.right.kind, ExprKind::Int(3)));
        assert_eq!(binary(&outer.left).op, BinOp::Sub);
    }

    #[test]
    fn operator_ladder() {
        let e = only_expr("a || b && c | d ^ e & f == g < h << i");
        let or = binary(&e);
        assert_eq!(or.op, BinOp::Or);
        let and = binary(&or.right);
        assert_eq!(and.op, BinOp::And);
        let bit_or = binary(&and.right);
        assert_eq!(bit_or.op, BinOp::BitOr);
        let xor = binary(&bit_or.right);
        assert_eq!(xor.op, BinOp::BitXor);
        let bit_and = binary(&xor.right);
        assert_eq!(bit_and.op, BinOp::BitAnd);
        let eq = binary(&bit_and.right);
        assert_eq!(eq.op, BinOp::Eq);
        let lt = binary(&eq.right);
        assert_eq!(lt.op, BinOp::Lt);
        assert_eq!(binary(&lt.right).op, BinOp::Shl);
    }

    #[test]
    fn and_keyword_and_not_keyword() {
        let e = only_expr("not a and b");
        let and = binary(&e);
        assert_eq!(and.op, BinOp::And);
        assert!(matches!(&and.left.kind, ExprKind::Unary(UnaryOp { op: UnOp::Not, .. })));
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = only_expr("a = b += 1");
        let outer = binary(&e);
        assert_eq!(outer.op, BinOp::Assign);
        assert!(matches!(&outer.left.kind, ExprKind::Id(n) if n == "a"));
        assert_eq!(binary(&outer.right).op, BinOp::AddAssign);
    }

    #[test]
    fn compound_assignment_keeps_single_target() {
        for (src, op) in [
            ("x -= 1", BinOp::SubAssign),
            ("x *= 1", BinOp::MulAssign),
            ("x /= 1", BinOp::DivAssign),
            ("x &&= y", BinOp::AndAssign),
            ("x ||= y", BinOp::OrAssign),
        ] {
            let e = only_expr(src);
            let b = binary(&e);
            assert_eq!(b.op, op);
            assert!(matches!(&b.left.kind, ExprKind::Id(n) if n == "x"));
        }
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse_err("1 = 2");
        assert_eq!(err.message(), "cannot assign to int");
    }

    #[test]
    fn let_declarations() {
        let e = only_expr("let a = 1, b: int = 2, c");
        let ExprKind::Let(decls) = &e.kind else { panic!("expected let") };
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[1].name, "b");
        assert_eq!(decls[1].ty.as_deref(), Some("int"));
        assert!(decls[2].value.is_none());
    }

    #[test]
    fn unary_and_postfix() {
        let e = only_expr("-x++");
        let ExprKind::Unary(neg) = &e.kind else { panic!("expected unary") };
        assert_eq!(neg.op, UnOp::Neg);
        let ExprKind::Unary(incr) = &neg.operand.kind else { panic!("expected postfix") };
        assert_eq!(incr.op, UnOp::Incr);
        assert!(incr.postfix);

        let e = only_expr("--x");
        assert!(matches!(&e.kind, ExprKind::Unary(UnaryOp { op: UnOp::Decr, postfix: false, .. })));
    }

    #[test]
    fn pow_binds_tighter_than_unary() {
        let e = only_expr("-2 ** 3");
        let ExprKind::Unary(neg) = &e.kind else { panic!("expected unary") };
        assert_eq!(binary(&neg.operand).op, BinOp::Pow);
    }

    #[test]
    fn call_slot_subscript_chain() {
        let e = only_expr("a.b[0](1, 2, key: 3).c");
        let ExprKind::Slot(outer) = &e.kind else { panic!("expected slot") };
        assert_eq!(outer.name, "c");
        let ExprKind::Call(call) = &outer.object.kind else { panic!("expected call") };
        assert_eq!(call.args.positional.len(), 2);
        assert!(matches!(call.args.get("key").map(|e| &e.kind), Some(ExprKind::Int(3))));
        let ExprKind::Subscript(sub) = &call.callee.kind else { panic!("expected subscript") };
        assert!(matches!(sub.index.kind, ExprKind::Int(0)));
        assert!(matches!(&sub.object.kind, ExprKind::Slot(s) if s.name == "b"));
    }

    #[test]
    fn keyword_args_must_trail() {
        let err = parse_err("f(a: 1, 2)");
        assert_eq!(err.message(), "positional argument follows keyword argument");
        assert_eq!(err.context(), "function arguments");
        let err = parse_err("f(a: 1, a: 2)");
        assert_eq!(err.message(), "duplicate keyword argument 'a'");
    }

    #[test]
    fn fork_rewrites_to_call() {
        let e = only_expr("&work(1)");
        let ExprKind::Call(call) = &e.kind else { panic!("expected call") };
        assert!(matches!(&call.callee.kind, ExprKind::Id(n) if n == "fork"));
        assert!(matches!(call.args.positional[0].kind, ExprKind::Call(_)));
    }

    #[test]
    fn literals() {
        assert!(matches!(only_expr("true").kind, ExprKind::Bool(true)));
        assert!(matches!(only_expr("false").kind, ExprKind::Bool(false)));
        assert!(matches!(only_expr("null").kind, ExprKind::Null));
        assert!(matches!(only_expr("1.5").kind, ExprKind::Float(_)));
        assert!(matches!(only_expr("'s'").kind, ExprKind::Str(_)));

        let ExprKind::Array(items) = only_expr("[1, 'two', [3],]").kind else { panic!("array") };
        assert_eq!(items.len(), 3);

        let ExprKind::Hash(pairs) = only_expr("{ a: 1, 'b c': 2 }").kind else { panic!("hash") };
        assert_eq!(pairs[0].key, "a");
        assert_eq!(pairs[1].key, "b c");
        assert!(matches!(only_expr("{}").kind, ExprKind::Hash(ref p) if p.is_empty()));
    }

    #[test]
    fn function_literals() {
        let ExprKind::Function(f) = only_expr(":(a, b = 2): int\n  a + b\nend").kind else {
            panic!("function")
        };
        assert_eq!(f.params.len(), 2);
        assert!(f.params[1].value.is_some());
        assert_eq!(f.ret.as_deref(), Some("int"));
        assert_eq!(f.body.stmts.len(), 1);

        let ExprKind::Function(f) = only_expr(":|a, b| a * b").kind else { panic!("pipe") };
        assert_eq!(f.params.len(), 2);
        assert!(matches!(f.implicit_return().map(|e| &e.kind), Some(ExprKind::Binary(_))));

        let ExprKind::Function(f) = only_expr(":|| 1").kind else { panic!("empty pipe") };
        assert!(f.params.is_empty());
    }

    #[test]
    fn if_else_chain() {
        let block = parse_ok("if x\n  1\nelse if y\n  2\nelse if z\n  3\nelse\n  4\nend");
        let StmtKind::If(node) = &block.stmts[0].kind else { panic!("if") };
        assert!(!node.negate);
        assert_eq!(node.else_ifs.len(), 2);
        assert_eq!(node.else_ifs[1].line, 5);
        assert!(node.else_block.is_some());

        let block = parse_ok("unless x y end");
        assert!(matches!(&block.stmts[0].kind, StmtKind::If(If { negate: true, .. })));
    }

    #[test]
    fn loops_and_returns() {
        let block = parse_ok("until done\n  step()\nend\nwhile true; end");
        assert!(matches!(&block.stmts[0].kind, StmtKind::While(While { negate: true, .. })));
        assert!(matches!(&block.stmts[1].kind, StmtKind::While(While { negate: false, .. })));

        let block = parse_ok("def f\n  return\nend");
        let StmtKind::Def(f) = &block.stmts[0].kind else { panic!("def") };
        assert!(matches!(f.body.stmts[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn def_with_params_and_return_type() {
        let block = parse_ok("def add(a: int, b: int = 1): int\n  return a + b\nend");
        let StmtKind::Def(f) = &block.stmts[0].kind else { panic!("def") };
        assert_eq!(f.name.as_deref(), Some("add"));
        assert_eq!(f.params[0].ty.as_deref(), Some("int"));
        assert_eq!(f.ret.as_deref(), Some("int"));
    }

    #[test]
    fn type_and_use_statements() {
        let block = parse_ok("type Point\n  x: int\n  y: int = 0\nend\nuse std.io\nuse 'lib.luna'");
        let StmtKind::Type(t) = &block.stmts[0].kind else { panic!("type") };
        assert_eq!(t.name, "Point");
        assert_eq!(t.fields.len(), 2);
        assert!(matches!(&block.stmts[1].kind, StmtKind::Use(p) if p == "std.io"));
        assert!(matches!(&block.stmts[2].kind, StmtKind::Use(p) if p == "lib.luna"));
    }

    #[test]
    fn def_without_name_reports_function_context() {
        let err = parse_err("def\n(");
        assert_eq!(err.context(), "function statement");
        assert_eq!(err.message(), "missing function name");
        assert_eq!(err.line(), 2);
        assert!(!err.is_lexical());
    }

    #[test]
    fn first_error_wins() {
        let err = parse_err("if x\n  def 1\nend");
        assert_eq!(err.phase(), "parse");
        assert_eq!(err.context(), "function statement");
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn context_restored_after_success() {
        let err = parse_err("def f end )");
        assert_eq!(err.context(), "program");
        assert_eq!(err.message(), "unexpected ')'");
    }

    #[test]
    fn missing_end() {
        let err = parse_err("while x\n  y\n");
        assert_eq!(err.context(), "while statement");
        assert_eq!(err.message(), "expected 'end' but found end of source");
    }

    #[test]
    fn lexer_errors_surface_with_line() {
        let err = parse_err("x = 1\ny = \"abc");
        assert!(err.is_lexical());
        assert_eq!(err.phase(), "syntax");
        assert_eq!(err.message(), "unterminated string literal");
        assert_eq!(err.line(), 2);

        let err = parse_err("f(\n'\\xG1')");
        assert!(err.is_lexical());
        assert_eq!(err.context(), "function arguments");
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn empty_program() {
        assert!(parse_ok("").is_empty());
        assert!(parse_ok("# just a comment\n;;").is_empty());
    }

    #[test]
    fn stray_else_is_an_error() {
        assert_eq!(parse_err("else").message(), "unexpected 'else'");
    }

    #[test]
    fn errors_carry_filename() {
        let err = parse("def\n(", "shapes.luna").unwrap_err();
        assert_eq!(err.filename(), "shapes.luna");

        let err = parse("x = $", "lex.luna").unwrap_err();
        assert!(err.is_lexical());
        assert_eq!(err.filename(), "lex.luna");
    }

    #[test]
    fn deep_parentheses_fail_cleanly() {
        let depth = 10_000;
        let source = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let err = parse_err(&source);
        assert_eq!(err.message(), "expression nested too deeply");
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn deep_unary_and_blocks_fail_cleanly() {
        assert_eq!(parse_err(&format!("{}1", "-".repeat(10_000))).message(), "expression nested too deeply");
        assert_eq!(parse_err(&format!("{}x", "!".repeat(10_000))).message(), "expression nested too deeply");

        let source = format!("{}1{}", "if x\n".repeat(5_000), "end\n".repeat(5_000));
        assert_eq!(parse_err(&source).message(), "expression nested too deeply");

        let source = format!("{}1{}", "[".repeat(5_000), "]".repeat(5_000));
        assert_eq!(parse_err(&source).message(), "expression nested too deeply");
    }

    #[test]
    fn moderate_nesting_parses() {
        let source = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(only_expr(&source).kind, ExprKind::Int(1)));

        let source = format!("{}x{}", "if x\n".repeat(10), "\nend".repeat(10));
        assert_eq!(parse_ok(&source).stmts.len(), 1);
    }
}
