pub mod builtins;
pub mod evaluator;
pub mod ops;

pub use builtins::{BuiltinKind, BuiltinRegistry};
pub use evaluator::{Evaluator, Flow, Outcome};

use itmoscript_ast::Program;
use itmoscript_errors::Diagnostic;
use std::io::{BufRead, Write};

/// Run a complete program against fresh I/O streams and a fresh evaluator,
/// the embedding entry point for one-shot script execution (spec §6.1).
pub fn run_program(program: &Program, output: Box<dyn Write>, input: Box<dyn BufRead>, seed: Option<u64>) -> Result<itmoscript_ast::Value, Diagnostic> {
    let mut evaluator = Evaluator::new(output, input, seed);
    evaluator.run(program).map_err(|error| Diagnostic::Runtime { error, call_stack: evaluator.call_stack().to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use itmoscript_parser::parse_source;

    #[test]
    fn runtime_errors_carry_call_stack_into_diagnostic() {
        let program = parse_source("f = function()\n  return 1 / 0\nend function\nf()\n").unwrap();
        let err = run_program(&program, Box::new(std::io::sink()), Box::new(std::io::empty()), Some(1)).unwrap_err();
        match err {
            Diagnostic::Runtime { call_stack, .. } => assert_eq!(call_stack.len(), 1),
            other => panic!("expected a runtime diagnostic, got {other:?}"),
        }
    }
}

