//! The three error families ItmoScript can fail with: lexical, parse, and
//! runtime. Every variant carries the [`Span`] of the offending token, and
//! runtime errors are additionally paired with a call-stack snapshot by
//! [`Diagnostic`] for the traceback rendering described in spec §6.4.

use colored::Colorize;
use itmoscript_span::{Position, Span};
use std::fmt;

pub type LexResult<T> = std::result::Result<T, LexicalError>;
pub type ParseResult<T> = std::result::Result<T, ParseError>;
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Errors raised while turning source text into tokens (spec §4.1, §7).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LexicalError {
    #[error("illegal character {character:?}")]
    IllegalCharacter { character: char, span: Span },

    #[error("unterminated string literal")]
    UnterminatedString { span: Span },

    #[error("malformed number literal: identifier character follows digits without a break")]
    MalformedNumber { span: Span },
}

impl LexicalError {
    pub fn span(&self) -> Span {
        match self {
            Self::IllegalCharacter { span, .. }
            | Self::UnterminatedString { span }
            | Self::MalformedNumber { span } => *span,
        }
    }
}

/// Errors raised while building the AST from a token stream (spec §4.2, §7).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String, span: Span },

    #[error("unterminated block: missing `end {keyword}`")]
    UnterminatedBlock { keyword: String, span: Span },

    #[error("duplicate parameter name `{name}`")]
    DuplicateParameter { name: String, span: Span },

    #[error("malformed escape sequence `\\{escape}`")]
    MalformedEscape { escape: String, span: Span },

    #[error("malformed index or slice expression")]
    MalformedIndex { span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. }
            | Self::UnterminatedBlock { span, .. }
            | Self::DuplicateParameter { span, .. }
            | Self::MalformedEscape { span, .. }
            | Self::MalformedIndex { span } => *span,
        }
    }
}

/// Errors raised while evaluating a parsed program (spec §4.3–§4.6, §7).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RuntimeError {
    #[error("division by zero")]
    ZeroDivision { span: Span },

    #[error("no operator `{op}` registered for operand types {left} and {right}")]
    OperatorType { op: String, left: String, right: String, span: Span },

    #[error("index must be an integer, found {found}")]
    IndexType { found: String, span: Span },

    #[error("cannot index a value of type {found}")]
    IndexOperandType { found: String, span: Span },

    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize, span: Span },

    #[error("negative index {index} resolves out of range for length {length}")]
    NegativeIndex { index: i64, length: usize, span: Span },

    #[error("undefined name `{name}`")]
    UndefinedName { name: String, span: Span },

    #[error("value of type {found} is not callable")]
    UncallableObject { found: String, span: Span },

    #[error("expected {expected} argument(s), found {found}")]
    ParametersCount { expected: usize, found: usize, span: Span },

    #[error("argument {position} to `{function}` must be {expected}, found {found}")]
    ArgumentType { function: String, position: usize, expected: String, found: String, span: Span },

    #[error("invalid argument to `{function}`: {reason}")]
    InvalidArgument { function: String, reason: String, span: Span },

    #[error("cannot repeat a sequence a negative number of times")]
    SequenceMultiplication { span: Span },

    #[error("cannot take the square root of a negative number")]
    SqrtFromNegative { span: Span },

    #[error("pop from an empty list")]
    EmptyListPop { span: Span },

    #[error("file access error: {reason}")]
    FileAccess { reason: String, span: Span },

    #[error("`{name}` is a standard library name and cannot be overridden")]
    StandardOverride { name: String, span: Span },

    #[error("`{name}` is a standard library function and must be called")]
    StandardFunctionNoCall { name: String, span: Span },

    #[error("`break`/`continue` used outside of a loop")]
    ControlFlow { span: Span },

    #[error("`return` used outside of a function")]
    UnexpectedReturn { span: Span },

    #[error("duplicate parameter name `{name}`")]
    DuplicateParameter { name: String, span: Span },

    #[error("cannot assign to `{name}`")]
    ImmutableAssignment { name: String, span: Span },

    #[error("unsupported type {found} for this operation")]
    UnsupportedType { found: String, span: Span },
}

impl RuntimeError {
    pub fn span(&self) -> Span {
        match self {
            Self::ZeroDivision { span }
            | Self::OperatorType { span, .. }
            | Self::IndexType { span, .. }
            | Self::IndexOperandType { span, .. }
            | Self::IndexOutOfRange { span, .. }
            | Self::NegativeIndex { span, .. }
            | Self::UndefinedName { span, .. }
            | Self::UncallableObject { span, .. }
            | Self::ParametersCount { span, .. }
            | Self::ArgumentType { span, .. }
            | Self::InvalidArgument { span, .. }
            | Self::SequenceMultiplication { span }
            | Self::SqrtFromNegative { span }
            | Self::EmptyListPop { span }
            | Self::FileAccess { span, .. }
            | Self::StandardOverride { span, .. }
            | Self::StandardFunctionNoCall { span, .. }
            | Self::ControlFlow { span }
            | Self::UnexpectedReturn { span }
            | Self::DuplicateParameter { span, .. }
            | Self::ImmutableAssignment { span, .. }
            | Self::UnsupportedType { span, .. } => *span,
        }
    }
}

/// One frame of the runtime call stack, carried alongside a [`RuntimeError`]
/// for the traceback rendering in spec §6.4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStackFrame {
    pub function_name: String,
    pub call_site: Position,
}

/// The top-level error an embedder sees from `interpret()`: any of the three
/// error families, with a call-stack snapshot attached for runtime errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Diagnostic {
    Lexical(LexicalError),
    Parse(ParseError),
    Runtime { error: RuntimeError, call_stack: Vec<CallStackFrame> },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(f, self, false)
    }
}

impl Diagnostic {
    /// Render the §6.4 diagnostic format, coloring the header and the
    /// `Traceback` line when `color` is true. Color is cosmetic: the text
    /// content is identical either way.
    pub fn render(&self, color: bool) -> String {
        struct Colored<'a>(&'a Diagnostic, bool);
        impl fmt::Display for Colored<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                render(f, self.0, self.1)
            }
        }
        Colored(self, color).to_string()
    }
}

fn render(f: &mut fmt::Formatter<'_>, diag: &Diagnostic, color: bool) -> fmt::Result {
    let (kind, span, message) = match diag {
        Diagnostic::Lexical(e) => ("LexicalError", e.span(), e.to_string()),
        Diagnostic::Parse(e) => ("ParseError", e.span(), e.to_string()),
        Diagnostic::Runtime { error, .. } => (runtime_kind(error), error.span(), error.to_string()),
    };

    let header = format!("{} at {}:", kind, span);
    if color {
        writeln!(f, "{}", header.red().bold())?;
    } else {
        writeln!(f, "{}", header)?;
    }
    writeln!(f, "    {}", message)?;

    if let Diagnostic::Runtime { call_stack, .. } = diag {
        if !call_stack.is_empty() {
            let label = "Traceback (most recent call last):";
            if color {
                writeln!(f, "{}", label.yellow())?;
            } else {
                writeln!(f, "{}", label)?;
            }
            for frame in call_stack {
                writeln!(f, "    {}, on line {}", frame.function_name, frame.call_site.line)?;
            }
        }
    }
    Ok(())
}

fn runtime_kind(error: &RuntimeError) -> &'static str {
    match error {
        RuntimeError::ZeroDivision { .. } => "ZeroDivisionError",
        RuntimeError::OperatorType { .. } => "OperatorTypeError",
        RuntimeError::IndexType { .. } => "IndexTypeError",
        RuntimeError::IndexOperandType { .. } => "IndexOperandTypeError",
        RuntimeError::IndexOutOfRange { .. } => "IndexOutOfRangeError",
        RuntimeError::NegativeIndex { .. } => "NegativeIndexError",
        RuntimeError::UndefinedName { .. } => "UndefinedNameError",
        RuntimeError::UncallableObject { .. } => "UncallableObjectCallError",
        RuntimeError::ParametersCount { .. } => "ParametersCountError",
        RuntimeError::ArgumentType { .. } => "ArgumentTypeError",
        RuntimeError::InvalidArgument { .. } => "InvalidArgumentError",
        RuntimeError::SequenceMultiplication { .. } => "SequenceMultiplicationError",
        RuntimeError::SqrtFromNegative { .. } => "SqrtFromNegativeError",
        RuntimeError::EmptyListPop { .. } => "EmptyListPopError",
        RuntimeError::FileAccess { .. } => "FileAccessError",
        RuntimeError::StandardOverride { .. } => "StandardOverrideError",
        RuntimeError::StandardFunctionNoCall { .. } => "StandardFunctionNoCallError",
        RuntimeError::ControlFlow { .. } => "ControlFlowError",
        RuntimeError::UnexpectedReturn { .. } => "UnexpectedReturnError",
        RuntimeError::DuplicateParameter { .. } => "DuplicateParameterError",
        RuntimeError::ImmutableAssignment { .. } => "ImmutableAssignmentError",
        RuntimeError::UnsupportedType { .. } => "UnsupportedTypeError",
    }
}

impl From<LexicalError> for Diagnostic {
    fn from(e: LexicalError) -> Self {
        Diagnostic::Lexical(e)
    }
}

impl From<ParseError> for Diagnostic {
    fn from(e: ParseError) -> Self {
        Diagnostic::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lexical_error_without_traceback() {
        let diag = Diagnostic::Lexical(LexicalError::IllegalCharacter {
            character: '$',
            span: Span::at(2, 5),
        });
        let rendered = diag.render(false);
        assert!(rendered.starts_with("LexicalError at line 2, column 5:\n"));
        assert!(rendered.contains("illegal character"));
        assert!(!rendered.contains("Traceback"));
    }

    #[test]
    fn renders_runtime_error_with_traceback() {
        let diag = Diagnostic::Runtime {
            error: RuntimeError::ZeroDivision { span: Span::at(4, 1) },
            call_stack: vec![CallStackFrame { function_name: "divide".into(), call_site: Position::new(4, 1) }],
        };
        let rendered = diag.render(false);
        assert!(rendered.contains("ZeroDivisionError at line 4, column 1:"));
        assert!(rendered.contains("Traceback (most recent call last):"));
        assert!(rendered.contains("divide, on line 4"));
    }
}
