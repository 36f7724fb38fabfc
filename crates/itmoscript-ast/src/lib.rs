pub mod ast;
pub mod token;
pub mod value;

pub use ast::{BinaryOp, Expr, Identifier, IfBranch, Program, Stmt, UnaryOp};
pub use token::{Token, TokenKind};
pub use value::{assign_or_define, lookup, EnvHandle, Frame, FunctionData, FunctionHandle, ListHandle, StringHandle, Value};
