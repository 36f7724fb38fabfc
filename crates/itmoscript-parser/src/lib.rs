pub mod lexer;
pub mod parser;

pub use lexer::Lexer;
pub use parser::{parse_tokens, Parser};

use itmoscript_ast::Program;
use itmoscript_errors::Diagnostic;

/// Lex and parse `source` in one step, for callers that don't need the
/// intermediate token stream.
pub fn parse_source(source: &str) -> Result<Program, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Ok(parse_tokens(tokens)?)
}
