use std::fmt;

use logos::Logos;

/// Token classification handed to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TokenKind {
    Illegal,
    Eos,

    // Literals
    Id,
    Int,
    Float,
    Str,

    // Keywords
    If,
    Else,
    Unless,
    While,
    Until,
    For,
    Def,
    End,
    Let,
    Return,
    Type,
    Not,
    And,
    Use,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Question,
    Dot,

    // Operators
    Plus,
    Incr,
    PlusAssign,
    Minus,
    Decr,
    MinusAssign,
    Star,
    Pow,
    MulAssign,
    Slash,
    DivAssign,
    Percent,
    Bang,
    Neq,
    Assign,
    Eq,
    BitAnd,
    LogicalAnd,
    AndAssign,
    BitOr,
    LogicalOr,
    OrAssign,
    BitXor,
    BitNot,
    Lt,
    Le,
    Shl,
    Gt,
    Ge,
    Shr,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Illegal => "illegal",
            TokenKind::Eos => "end of source",
            TokenKind::Id => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::Str => "string",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Unless => "unless",
            TokenKind::While => "while",
            TokenKind::Until => "until",
            TokenKind::For => "for",
            TokenKind::Def => "def",
            TokenKind::End => "end",
            TokenKind::Let => "let",
            TokenKind::Return => "return",
            TokenKind::Type => "type",
            TokenKind::Not => "not",
            TokenKind::And => "and",
            TokenKind::Use => "use",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Question => "?",
            TokenKind::Dot => ".",
            TokenKind::Plus => "+",
            TokenKind::Incr => "++",
            TokenKind::PlusAssign => "+=",
            TokenKind::Minus => "-",
            TokenKind::Decr => "--",
            TokenKind::MinusAssign => "-=",
            TokenKind::Star => "*",
            TokenKind::Pow => "**",
            TokenKind::MulAssign => "*=",
            TokenKind::Slash => "/",
            TokenKind::DivAssign => "/=",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Neq => "!=",
            TokenKind::Assign => "=",
            TokenKind::Eq => "==",
            TokenKind::BitAnd => "&",
            TokenKind::LogicalAnd => "&&",
            TokenKind::AndAssign => "&&=",
            TokenKind::BitOr => "|",
            TokenKind::LogicalOr => "||",
            TokenKind::OrAssign => "||=",
            TokenKind::BitXor => "^",
            TokenKind::BitNot => "~",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Shl => "<<",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Shr => ">>",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal payload carried by `Id`, `Int`, `Float` and `Str` tokens.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum TokenValue {
    None,
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub value: TokenValue,
}

impl Token {
    fn bare(kind: TokenKind, line: usize) -> Self {
        Token { kind, line, value: TokenValue::None }
    }

    /// Identifier or string text, if this token carries one.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            TokenValue::None => write!(f, "{}", self.kind),
            TokenValue::Int(n) => write!(f, "{} {n}", self.kind),
            TokenValue::Float(n) => write!(f, "{} {n}", self.kind),
            TokenValue::Str(s) => write!(f, "{} {s:?}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct LexError {
    pub filename: String,
    pub message: String,
    pub line: usize,
}

// ---- Raw scanner ----

#[derive(Debug, Clone, Default, PartialEq)]
enum ScanError {
    #[default]
    Unexpected,
    UnterminatedString,
    InvalidHexEscape,
    EmptyHexLiteral,
    IntegerOverflow,
    FloatOutOfRange,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = ScanError)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip(r"#[^\n]*", allow_greedy = true))]
enum Raw {
    #[token("\n")]
    Newline,

    #[token("if", |_| TokenKind::If)]
    #[token("else", |_| TokenKind::Else)]
    #[token("unless", |_| TokenKind::Unless)]
    #[token("while", |_| TokenKind::While)]
    #[token("until", |_| TokenKind::Until)]
    #[token("for", |_| TokenKind::For)]
    #[token("def", |_| TokenKind::Def)]
    #[token("end", |_| TokenKind::End)]
    #[token("let", |_| TokenKind::Let)]
    #[token("return", |_| TokenKind::Return)]
    #[token("type", |_| TokenKind::Type)]
    #[token("not", |_| TokenKind::Not)]
    #[token("and", |_| TokenKind::And)]
    #[token("use", |_| TokenKind::Use)]
    Keyword(TokenKind),

    #[token("(", |_| TokenKind::LParen)]
    #[token(")", |_| TokenKind::RParen)]
    #[token("{", |_| TokenKind::LBrace)]
    #[token("}", |_| TokenKind::RBrace)]
    #[token("[", |_| TokenKind::LBracket)]
    #[token("]", |_| TokenKind::RBracket)]
    #[token(",", |_| TokenKind::Comma)]
    #[token(";", |_| TokenKind::Semicolon)]
    #[token(":", |_| TokenKind::Colon)]
    #[token("?", |_| TokenKind::Question)]
    #[token(".", |_| TokenKind::Dot)]
    #[token("+", |_| TokenKind::Plus)]
    #[token("++", |_| TokenKind::Incr)]
    #[token("+=", |_| TokenKind::PlusAssign)]
    #[token("-", |_| TokenKind::Minus)]
    #[token("--", |_| TokenKind::Decr)]
    #[token("-=", |_| TokenKind::MinusAssign)]
    #[token("*", |_| TokenKind::Star)]
    #[token("**", |_| TokenKind::Pow)]
    #[token("*=", |_| TokenKind::MulAssign)]
    #[token("/", |_| TokenKind::Slash)]
    #[token("/=", |_| TokenKind::DivAssign)]
    #[token("%", |_| TokenKind::Percent)]
    #[token("!", |_| TokenKind::Bang)]
    #[token("!=", |_| TokenKind::Neq)]
    #[token("=", |_| TokenKind::Assign)]
    #[token("==", |_| TokenKind::Eq)]
    #[token("&", |_| TokenKind::BitAnd)]
    #[token("&&", |_| TokenKind::LogicalAnd)]
    #[token("&&=", |_| TokenKind::AndAssign)]
    #[token("|", |_| TokenKind::BitOr)]
    #[token("||", |_| TokenKind::LogicalOr)]
    #[token("||=", |_| TokenKind::OrAssign)]
    #[token("^", |_| TokenKind::BitXor)]
    #[token("~", |_| TokenKind::BitNot)]
    #[token("<", |_| TokenKind::Lt)]
    #[token("<=", |_| TokenKind::Le)]
    #[token("<<", |_| TokenKind::Shl)]
    #[token(">", |_| TokenKind::Gt)]
    #[token(">=", |_| TokenKind::Ge)]
    #[token(">>", |_| TokenKind::Shr)]
    Punct(TokenKind),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[regex(r"[0-9][0-9_]*([eE][+-]?[0-9]+)?", decimal)]
    #[regex(r"0[xX][0-9a-fA-F]*", hex)]
    Int(i64),

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", float)]
    Float(f64),

    #[token("\"", |lex| string(lex, '"'))]
    #[token("'", |lex| string(lex, '\''))]
    Str(String),
}

/// Split `1_000e3` into (`1000`, `3`); `_` separators are dropped.
fn digits_and_exponent(slice: &str) -> (String, Option<&str>) {
    match slice.find(['e', 'E']) {
        Some(at) => (slice[..at].replace('_', ""), Some(&slice[at + 1..])),
        None => (slice.replace('_', ""), None),
    }
}

fn decimal(lex: &mut logos::Lexer<'_, Raw>) -> Result<i64, ScanError> {
    let (digits, exponent) = digits_and_exponent(lex.slice());
    let n: i64 = digits.parse().map_err(|_| ScanError::IntegerOverflow)?;
    let Some(exponent) = exponent else {
        return Ok(n);
    };
    let exponent: i64 = exponent.parse().map_err(|_| ScanError::IntegerOverflow)?;
    if n == 0 {
        return Ok(0);
    }
    let scale = u32::try_from(exponent.unsigned_abs())
        .ok()
        .and_then(|e| 10i64.checked_pow(e));
    if exponent >= 0 {
        scale
            .and_then(|s| n.checked_mul(s))
            .ok_or(ScanError::IntegerOverflow)
    } else {
        // 10^-e truncates toward zero
        Ok(scale.map_or(0, |s| n / s))
    }
}

fn hex(lex: &mut logos::Lexer<'_, Raw>) -> Result<i64, ScanError> {
    let digits = &lex.slice()[2..];
    if digits.is_empty() {
        return Err(ScanError::EmptyHexLiteral);
    }
    i64::from_str_radix(digits, 16).map_err(|_| ScanError::IntegerOverflow)
}

fn float(lex: &mut logos::Lexer<'_, Raw>) -> Result<f64, ScanError> {
    let text = lex.slice().replace('_', "");
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ScanError::FloatOutOfRange),
    }
}

fn string(lex: &mut logos::Lexer<'_, Raw>, quote: char) -> Result<String, ScanError> {
    let rest = lex.remainder();
    let mut out = String::new();
    let mut chars = rest.char_indices();

    while let Some((at, c)) = chars.next() {
        if c == quote {
            lex.bump(at + c.len_utf8());
            return Ok(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some((_, escaped)) = chars.next() else {
            break;
        };
        match escaped {
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            'x' => {
                let hi = chars.next().and_then(|(_, c)| c.to_digit(16));
                let lo = chars.next().and_then(|(_, c)| c.to_digit(16));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(char::from((hi * 16 + lo) as u8)),
                    _ => {
                        let consumed = chars.offset();
                        lex.bump(consumed);
                        return Err(ScanError::InvalidHexEscape);
                    }
                }
            }
            other => out.push(other),
        }
    }

    lex.bump(rest.len());
    Err(ScanError::UnterminatedString)
}

// ---- Public lexer ----

/// Lazy token stream over a source buffer.
///
/// Errors are sticky: after the first illegal token every further call to
/// [`Lexer::scan`] returns `Illegal` again, and [`Lexer::error`] holds the
/// message and line of the first failure.
pub struct Lexer<'src> {
    raw: logos::Lexer<'src, Raw>,
    filename: String,
    line: usize,
    error: Option<LexError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, filename: impl Into<String>) -> Self {
        Lexer {
            raw: Raw::lexer(source),
            filename: filename.into(),
            line: 1,
            error: None,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn error(&self) -> Option<&LexError> {
        self.error.as_ref()
    }

    pub fn scan(&mut self) -> Token {
        if self.error.is_some() {
            return Token::bare(TokenKind::Illegal, self.line);
        }

        let token = loop {
            let Some(next) = self.raw.next() else {
                break Token::bare(TokenKind::Eos, self.line);
            };
            let line = self.line;
            match next {
                Ok(Raw::Newline) => {
                    self.line += 1;
                }
                Ok(raw) => {
                    self.line += self.raw.slice().matches('\n').count();
                    break lower(raw, line);
                }
                Err(e) => {
                    let message = self.describe(e);
                    log::trace!("{}:{line}: illegal token: {message}", self.filename);
                    self.error = Some(LexError {
                        filename: self.filename.clone(),
                        message,
                        line,
                    });
                    break Token::bare(TokenKind::Illegal, line);
                }
            }
        };

        log::trace!("{}:{}: {token}", self.filename, token.line);
        token
    }

    fn describe(&self, e: ScanError) -> String {
        match e {
            ScanError::Unexpected => match self.raw.slice().chars().next() {
                Some(c) => format!("unexpected character {c:?}"),
                None => "unexpected end of source".to_string(),
            },
            ScanError::UnterminatedString => "unterminated string literal".to_string(),
            ScanError::InvalidHexEscape => {
                "string hex literal \\x contains invalid digits".to_string()
            }
            ScanError::EmptyHexLiteral => "hex literal expects one or more digits".to_string(),
            ScanError::IntegerOverflow => {
                format!("integer literal {} is out of range", self.raw.slice())
            }
            ScanError::FloatOutOfRange => {
                format!("float literal {} is out of range", self.raw.slice())
            }
        }
    }
}

fn lower(raw: Raw, line: usize) -> Token {
    let (kind, value) = match raw {
        Raw::Keyword(kind) | Raw::Punct(kind) => (kind, TokenValue::None),
        Raw::Ident(s) => (TokenKind::Id, TokenValue::Str(s)),
        Raw::Int(n) => (TokenKind::Int, TokenValue::Int(n)),
        Raw::Float(n) => (TokenKind::Float, TokenValue::Float(n)),
        Raw::Str(s) => (TokenKind::Str, TokenValue::Str(s)),
        Raw::Newline => (TokenKind::Illegal, TokenValue::None),
    };
    Token { kind, line, value }
}

/// Scan the whole buffer. The last token is always `Eos`.
pub fn tokenize(source: &str, filename: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source, filename);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.scan();
        match token.kind {
            TokenKind::Illegal => {
                return Err(lexer.error.take().unwrap_or(LexError {
                    filename: filename.to_string(),
                    message: "illegal token".to_string(),
                    line: token.line,
                }));
            }
            TokenKind::Eos => {
                tokens.push(token);
                return Ok(tokens);
            }
            _ => tokens.push(token),
        }
    }
}
