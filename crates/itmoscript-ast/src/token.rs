//! Lexical tokens (spec §3 "Token", §4.1 "Lexer").

use itmoscript_span::Span;
use std::fmt;

/// The kind of a lexical token. Keywords are their own variants (rather than
/// `Ident` carrying a keyword flag) so the parser can match on them directly.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Literals and identifiers.
    Ident(String),
    Int(i64),
    Float(f64),
    /// The raw string body between quotes, escapes not yet interpreted
    /// (escape processing happens in the parser per spec §4.2).
    StringLit(String),

    // Keywords.
    Function,
    End,
    Return,
    Or,
    And,
    Not,
    If,
    Else,
    Elseif,
    For,
    While,
    Then,
    Break,
    Continue,
    In,
    True,
    False,
    Nil,

    // Single-character operators and punctuation.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Assign,
    Lt,
    Gt,
    Bang,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,

    // Compound operators.
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    CaretEq,

    /// A statement separator, emitted for every physical newline
    /// (spec §4.1: "Newlines are emitted as a distinct NEWLINE token").
    Newline,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let s = match self {
            Ident(name) => return write!(f, "identifier `{name}`"),
            Int(v) => return write!(f, "integer `{v}`"),
            Float(v) => return write!(f, "float `{v}`"),
            StringLit(s) => return write!(f, "string {s:?}"),
            Function => "`function`",
            End => "`end`",
            Return => "`return`",
            Or => "`or`",
            And => "`and`",
            Not => "`not`",
            If => "`if`",
            Else => "`else`",
            Elseif => "`elseif`",
            For => "`for`",
            While => "`while`",
            Then => "`then`",
            Break => "`break`",
            Continue => "`continue`",
            In => "`in`",
            True => "`true`",
            False => "`false`",
            Nil => "`nil`",
            Plus => "`+`",
            Minus => "`-`",
            Star => "`*`",
            Slash => "`/`",
            Percent => "`%`",
            Caret => "`^`",
            Assign => "`=`",
            Lt => "`<`",
            Gt => "`>`",
            Bang => "`!`",
            Dot => "`.`",
            Comma => "`,`",
            LParen => "`(`",
            RParen => "`)`",
            LBracket => "`[`",
            RBracket => "`]`",
            Colon => "`:`",
            EqEq => "`==`",
            NotEq => "`!=`",
            LtEq => "`<=`",
            GtEq => "`>=`",
            PlusEq => "`+=`",
            MinusEq => "`-=`",
            StarEq => "`*=`",
            SlashEq => "`/=`",
            PercentEq => "`%=`",
            CaretEq => "`^=`",
            Newline => "newline",
            Eof => "end of input",
        };
        f.write_str(s)
    }
}

impl TokenKind {
    /// Resolve a scanned identifier to a keyword token, or plain `Ident`.
    pub fn keyword_or_ident(ident: String) -> Self {
        match ident.as_str() {
            "function" => TokenKind::Function,
            "end" => TokenKind::End,
            "return" => TokenKind::Return,
            "or" => TokenKind::Or,
            "and" => TokenKind::And,
            "not" => TokenKind::Not,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "elseif" => TokenKind::Elseif,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "then" => TokenKind::Then,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "in" => TokenKind::In,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            _ => TokenKind::Ident(ident),
        }
    }
}

/// A lexical token: kind, literal source text, and position (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self { kind, text: text.into(), span }
    }

    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}) at {}", self.kind, self.text, self.span)
    }
}
