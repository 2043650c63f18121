use std::fmt;

use serde::Serialize;

pub mod visit;

pub use visit::Visitor;

// ---- Node infrastructure ----

/// A node kind tagged with the source line it started on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node<T> {
    pub line: usize,
    pub kind: T,
}

impl<T> Node<T> {
    pub fn new(kind: T, line: usize) -> Self {
        Node { line, kind }
    }

    pub fn boxed(kind: T, line: usize) -> Box<Self> {
        Box::new(Node::new(kind, line))
    }
}

impl<T> std::ops::Deref for Node<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.kind
    }
}

pub type Expr = Node<ExprKind>;
pub type Stmt = Node<StmtKind>;

/// Ordered statement sequence. The program root is a block.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Block {
    pub line: usize,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(line: usize) -> Self {
        Block { line, stmts: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

// ---- Statements ----

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtKind {
    Expr(Expr),
    Return(Option<Expr>),
    If(If),
    While(While),
    /// `def name(params): type ... end`
    Def(Function),
    /// `type Name decls end`
    Type(TypeDecl),
    /// `use a.b` or `use "path"`; recognized, never resolved
    Use(String),
}

/// `if`/`unless` with its `else if` chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct If {
    /// `unless` tests the negated condition
    pub negate: bool,
    pub cond: Box<Expr>,
    pub block: Block,
    pub else_ifs: Vec<ElseIf>,
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElseIf {
    pub line: usize,
    pub cond: Box<Expr>,
    pub block: Block,
}

/// `while`/`until`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct While {
    pub negate: bool,
    pub cond: Box<Expr>,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<Decl>,
}

/// Named (`def`) or anonymous (`:`) function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Decl>,
    pub ret: Option<String>,
    pub body: Block,
}

impl Function {
    /// The expression of a body that is exactly `return expr`.
    pub fn implicit_return(&self) -> Option<&Expr> {
        match self.body.stmts.as_slice() {
            [Node { kind: StmtKind::Return(Some(e)), .. }] => Some(e),
            _ => None,
        }
    }
}

/// `name: type = value`, used for parameters, `let` and `type` fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decl {
    pub line: usize,
    pub name: String,
    pub ty: Option<String>,
    pub value: Option<Box<Expr>>,
}

// ---- Expressions ----

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Id(String),
    Array(Vec<Expr>),
    Hash(Vec<HashPair>),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Let(Vec<Decl>),
    Call(Call),
    /// `object.name`
    Slot(Slot),
    /// `object[index]`
    Subscript(Subscript),
    Function(Function),
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Int(_) => "int",
            ExprKind::Float(_) => "float",
            ExprKind::Str(_) => "string",
            ExprKind::Bool(_) => "boolean",
            ExprKind::Null => "null",
            ExprKind::Id(_) => "identifier",
            ExprKind::Array(_) => "array",
            ExprKind::Hash(_) => "hash",
            ExprKind::Unary(_) => "unary operation",
            ExprKind::Binary(_) => "binary operation",
            ExprKind::Let(_) => "let",
            ExprKind::Call(_) => "call",
            ExprKind::Slot(_) => "slot access",
            ExprKind::Subscript(_) => "subscript",
            ExprKind::Function(_) => "function",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HashPair {
    pub line: usize,
    pub key: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnaryOp {
    pub op: UnOp,
    pub operand: Box<Expr>,
    /// `x++` rather than `++x`
    pub postfix: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryOp {
    pub op: BinOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub callee: Box<Expr>,
    pub args: Args,
}

/// `f(a, b, key: c)`: positional arguments first, keyword arguments trailing.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Args {
    pub positional: Vec<Expr>,
    pub keyword: Vec<KeywordArg>,
}

impl Args {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.keyword.iter().find(|k| k.name == name).map(|k| &k.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordArg {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub object: Box<Expr>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscript {
    pub object: Box<Expr>,
    pub index: Box<Expr>,
}

// ---- Operators ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Incr,
    Decr,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnOp::Not => "!",
            UnOp::Neg => "-",
            UnOp::Plus => "+",
            UnOp::BitNot => "~",
            UnOp::Incr => "++",
            UnOp::Decr => "--",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    AndAssign,
    OrAssign,
}

impl BinOp {
    /// Binding strength, higher binds tighter. Mirrors the parser's levels.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Assign
            | BinOp::AddAssign
            | BinOp::SubAssign
            | BinOp::MulAssign
            | BinOp::DivAssign
            | BinOp::AndAssign
            | BinOp::OrAssign => 1,
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::BitOr => 4,
            BinOp::BitXor => 5,
            BinOp::BitAnd => 6,
            BinOp::Eq | BinOp::Neq => 7,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 8,
            BinOp::Shl | BinOp::Shr => 9,
            BinOp::Add | BinOp::Sub => 10,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 11,
            BinOp::Pow => 14,
        }
    }

    pub fn is_assignment(self) -> bool {
        self.precedence() == 1
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Assign => "=",
            BinOp::AddAssign => "+=",
            BinOp::SubAssign => "-=",
            BinOp::MulAssign => "*=",
            BinOp::DivAssign => "/=",
            BinOp::AndAssign => "&&=",
            BinOp::OrAssign => "||=",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_derefs_to_kind() {
        let e = Expr::new(ExprKind::Int(3), 7);
        assert_eq!(e.line, 7);
        assert!(matches!(*e, ExprKind::Int(3)));
        assert_eq!(e.name(), "int");
    }

    #[test]
    fn implicit_return_only_for_single_return() {
        let ret = Stmt::new(StmtKind::Return(Some(Expr::new(ExprKind::Int(1), 1))), 1);
        let mut f = Function { name: None, params: vec![], ret: None, body: Block::new(1) };
        assert!(f.implicit_return().is_none());
        f.body.stmts.push(ret.clone());
        assert!(matches!(f.implicit_return().map(|e| &e.kind), Some(ExprKind::Int(1))));
        f.body.stmts.push(ret);
        assert!(f.implicit_return().is_none());
    }

    #[test]
    fn keyword_args_lookup() {
        let args = Args {
            positional: vec![],
            keyword: vec![KeywordArg { name: "key".into(), value: Expr::new(ExprKind::Null, 1) }],
        };
        assert!(!args.is_empty());
        assert!(args.get("key").is_some());
        assert!(args.get("other").is_none());
    }

    #[test]
    fn assignment_ops_bind_loosest() {
        for op in [BinOp::Assign, BinOp::AddAssign, BinOp::OrAssign] {
            assert!(op.is_assignment());
            assert!(op.precedence() < BinOp::Or.precedence());
        }
        assert!(BinOp::Mul.precedence() > BinOp::Add.precedence());
        assert_eq!(BinOp::AndAssign.to_string(), "&&=");
    }

    #[test]
    fn ast_serializes_to_json() {
        let e = Expr::new(ExprKind::Str("hi".into()), 2);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["line"], 2);
        assert_eq!(v["kind"]["Str"], "hi");
    }
}
