//! Source position tracking for tokens, AST nodes, and diagnostics.

use std::fmt;

/// A single point in source text. `line` and `column` are both 1-based;
/// they mark the first character of whatever they're attached to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// The position of the first character of the first line.
    pub const fn start() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A span is just the position of the first character; ItmoScript's
/// diagnostics only ever report a single point (spec.md §4.1: "every token
/// records the line and column of its first character"), so unlike a
/// begin/end range this is a thin wrapper kept distinct from `Position` so
/// call sites read as "the span of this token" rather than "a point in
/// space", and so a future end-position could be added without disturbing
/// call sites.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Position,
}

impl Span {
    pub const fn new(start: Position) -> Self {
        Self { start }
    }

    pub const fn at(line: usize, column: usize) -> Self {
        Self::new(Position::new(line, column))
    }

    pub const fn line(&self) -> usize {
        self.start.line
    }

    pub const fn column(&self) -> usize {
        self.start.column
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.start, f)
    }
}

/// Tracks the current line/column as a cursor advances byte-by-byte through
/// source text, the way the lexer's position bookkeeping works in spec.md
/// §4.1: "on newline, line increments and column resets to 1".
#[derive(Clone, Copy, Debug)]
pub struct Cursor {
    line: usize,
    column: usize,
}

impl Cursor {
    pub const fn new() -> Self {
        Self { line: 1, column: 1 }
    }

    pub const fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Advance past a single character, updating line/column.
    pub fn advance(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_tracks_newlines() {
        let mut cursor = Cursor::new();
        assert_eq!(cursor.position(), Position::new(1, 1));
        for c in "ab\ncd".chars() {
            cursor.advance(c);
        }
        assert_eq!(cursor.position(), Position::new(2, 3));
    }

    #[test]
    fn display_matches_error_format() {
        let span = Span::at(3, 7);
        assert_eq!(span.to_string(), "line 3, column 7");
    }
}
