//! Embedding API (spec.md §6.1): lex, parse, and evaluate a complete source
//! string in one call, or drive a line-oriented REPL, against caller-
//! supplied I/O streams.

pub use itmoscript_ast::Value;
pub use itmoscript_errors::Diagnostic;
pub use itmoscript_interpreter::{BuiltinKind, Evaluator};

use itmoscript_parser::{parse_source, Lexer};
use std::cell::RefCell;
use std::io::{self, BufRead, Read, Write};
use std::rc::Rc;

/// Lex, parse, and evaluate `source` against a fresh evaluator. `print`/
/// `println` write to `output`; `read` reads from `input`.
pub fn interpret(source: &str, input: impl BufRead + 'static, output: impl Write + 'static, seed: Option<u64>) -> Result<Value, Diagnostic> {
    let program = parse_source(source)?;
    itmoscript_interpreter::run_program(&program, Box::new(output), Box::new(input), seed)
}

/// What each line of REPL input is treated as (spec.md §6.2: the CLI's
/// `--lexer`/`--parser` flags carry over into interactive mode).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplMode {
    /// Evaluate the line against a persistent environment, echoing the
    /// resulting value — the one-slot "last evaluated value" of spec §4.5.
    Eval,
    /// Print the line's token stream and stop there.
    Lexer,
    /// Print the line's parsed AST and stop there.
    Parser,
}

/// Drive a line-oriented REPL until `input` hits EOF. `output` carries both
/// the evaluator's `print`/`println` output and the REPL's own echoed
/// results, so the two interleave the way a real terminal session would;
/// `input` is likewise shared with the evaluator's `read` builtin, so a
/// script statement that calls `read()` consumes the REPL's next input line.
pub fn start_repl(mode: ReplMode, input: impl BufRead + 'static, output: impl Write + 'static, seed: Option<u64>) -> io::Result<()> {
    let input = Rc::new(RefCell::new(Box::new(input) as Box<dyn BufRead>));
    let output = Rc::new(RefCell::new(Box::new(output) as Box<dyn Write>));
    let mut evaluator = Evaluator::new(Box::new(SharedWriter(Rc::clone(&output))), Box::new(SharedReader::new(Rc::clone(&input))), seed);

    let mut line = String::new();
    loop {
        line.clear();
        let read = input.borrow_mut().read_line(&mut line)?;
        if read == 0 {
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        let mut out = output.borrow_mut();
        match mode {
            ReplMode::Lexer => match Lexer::new(trimmed).tokenize() {
                Ok(tokens) => {
                    for token in &tokens {
                        writeln!(out, "{} {:?} {}", token.kind, token.text, token.span)?;
                    }
                }
                Err(e) => writeln!(out, "{}", Diagnostic::from(e))?,
            },
            ReplMode::Parser => match parse_source(trimmed) {
                Ok(program) => writeln!(out, "{program:#?}")?,
                Err(e) => writeln!(out, "{e}")?,
            },
            ReplMode::Eval => {
                drop(out);
                match parse_source(trimmed) {
                    Ok(program) => match evaluator.run(&program) {
                        Ok(value) => writeln!(output.borrow_mut(), "{value}")?,
                        Err(error) => writeln!(output.borrow_mut(), "{}", Diagnostic::Runtime { error, call_stack: evaluator.call_stack().to_vec() })?,
                    },
                    Err(e) => writeln!(output.borrow_mut(), "{e}")?,
                }
            }
        }
    }
}

struct SharedWriter(Rc<RefCell<Box<dyn Write>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

/// A `BufRead` over a shared, reference-counted underlying reader. Keeps its
/// own small line buffer (filled a read-call at a time from the shared
/// reader) rather than implementing `fill_buf` by borrowing through the
/// `RefCell` directly, which can't produce a reference with the right
/// lifetime.
struct SharedReader {
    inner: Rc<RefCell<Box<dyn BufRead>>>,
    buf: Vec<u8>,
    pos: usize,
}

impl SharedReader {
    fn new(inner: Rc<RefCell<Box<dyn BufRead>>>) -> Self {
        Self { inner, buf: Vec::new(), pos: 0 }
    }
}

impl Read for SharedReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.buf.len() {
            let available = &self.buf[self.pos..];
            let n = available.len().min(out.len());
            out[..n].copy_from_slice(&available[..n]);
            self.pos += n;
            return Ok(n);
        }
        self.inner.borrow_mut().read(out)
    }
}

impl BufRead for SharedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.buf.len() {
            self.buf.clear();
            self.pos = 0;
            let mut chunk = [0u8; 4096];
            let n = self.inner.borrow_mut().read(&mut chunk)?;
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(&self.buf[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buf.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct CapturedOutput(Rc<RefCell<Vec<u8>>>);

    impl Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn interpret_runs_a_complete_program() {
        let out = CapturedOutput::default();
        let value = interpret("println(1 + 2)\n", io::empty(), out.clone(), Some(1)).unwrap();
        assert!(matches!(value, Value::Nil));
        assert_eq!(String::from_utf8(out.0.borrow().clone()).unwrap(), "3\n");
    }

    #[test]
    fn interpret_surfaces_parse_errors_as_diagnostics() {
        let err = interpret("1 +\n", io::empty(), io::sink(), None).unwrap_err();
        assert!(matches!(err, Diagnostic::Parse(_)));
    }
}
