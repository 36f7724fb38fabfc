//! Abstract syntax tree node types (spec §3 "AST nodes").
//!
//! Every node carries the token that originated it, for diagnostics. A
//! tagged-variant enum with an exhaustive match is used throughout the
//! evaluator rather than a visitor (spec §9 design note).

use crate::token::Token;
use itmoscript_span::Span;

/// A bare name together with the span it was written at.
#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
        };
        f.write_str(s)
    }
}

/// One arm of an `if`/`elseif`/`else` chain. At most one branch in an `If`
/// expression has `condition: None` (the trailing `else`).
#[derive(Clone, Debug, PartialEq)]
pub struct IfBranch {
    pub condition: Option<Expr>,
    pub consequence: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Identifier { name: String, token: Token },
    IntLiteral { value: i64, token: Token },
    FloatLiteral { value: f64, token: Token },
    StringLiteral { value: String, token: Token },
    BoolLiteral { value: bool, token: Token },
    NilLiteral { token: Token },
    ListLiteral { elements: Vec<Expr>, token: Token },
    FunctionLiteral { params: Vec<Identifier>, body: Vec<Stmt>, token: Token },
    Prefix { op: UnaryOp, right: Box<Expr>, token: Token },
    Infix { op: BinaryOp, left: Box<Expr>, right: Box<Expr>, token: Token },
    Index {
        operand: Box<Expr>,
        index: Option<Box<Expr>>,
        second_index: Option<Box<Expr>>,
        is_slice: bool,
        token: Token,
    },
    Call { callee: Box<Expr>, args: Vec<Expr>, token: Token },
    If { branches: Vec<IfBranch>, token: Token },
}

impl Expr {
    pub fn token(&self) -> &Token {
        match self {
            Expr::Identifier { token, .. }
            | Expr::IntLiteral { token, .. }
            | Expr::FloatLiteral { token, .. }
            | Expr::StringLiteral { token, .. }
            | Expr::BoolLiteral { token, .. }
            | Expr::NilLiteral { token }
            | Expr::ListLiteral { token, .. }
            | Expr::FunctionLiteral { token, .. }
            | Expr::Prefix { token, .. }
            | Expr::Infix { token, .. }
            | Expr::Index { token, .. }
            | Expr::Call { token, .. }
            | Expr::If { token, .. } => token,
        }
    }

    pub fn span(&self) -> Span {
        self.token().span
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign { name: String, expr: Expr, token: Token },
    OperatorAssign { name: String, op: BinaryOp, expr: Expr, token: Token },
    Return { expr: Option<Expr>, token: Token },
    Break { token: Token },
    Continue { token: Token },
    While { condition: Expr, body: Vec<Stmt>, token: Token },
    For { iter_name: String, iterable: Expr, body: Vec<Stmt>, token: Token },
    ExpressionStatement { expr: Expr, token: Token },
    Block(Vec<Stmt>),
}

impl Stmt {
    pub fn token(&self) -> Option<&Token> {
        match self {
            Stmt::Assign { token, .. }
            | Stmt::OperatorAssign { token, .. }
            | Stmt::Return { token, .. }
            | Stmt::Break { token }
            | Stmt::Continue { token }
            | Stmt::While { token, .. }
            | Stmt::For { token, .. }
            | Stmt::ExpressionStatement { token, .. } => Some(token),
            Stmt::Block(_) => None,
        }
    }
}

/// The root AST node: an ordered sequence of statements.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
