//! Character stream → token stream (spec.md §4.1).
//!
//! A single-pass scanner, one token at a time, in the style of a
//! `Token::eat`-per-call lexer: each call to [`Lexer::next_token`] consumes
//! exactly the characters belonging to the next token and returns it.

use itmoscript_ast::{Token, TokenKind};
use itmoscript_errors::{LexResult, LexicalError};
use itmoscript_span::{Cursor, Span};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    cursor: Cursor,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, cursor: Cursor::new() }
    }

    /// Scan the whole source into a token vector, ending with one `Eof`.
    pub fn tokenize(mut self) -> LexResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.cursor.advance(c);
        Some(c)
    }

    fn next_token(&mut self) -> LexResult<Token> {
        loop {
            while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
                self.bump();
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('/') {
                while self.peek().is_some() && self.peek() != Some('\n') {
                    self.bump();
                }
                continue;
            }
            break;
        }

        let start = self.cursor.position();
        let span = Span::new(start);

        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, "", span));
        };

        if c == '\n' {
            self.bump();
            return Ok(Token::new(TokenKind::Newline, "\n", span));
        }
        if c.is_ascii_digit() {
            return self.scan_number(span);
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(self.scan_identifier(span));
        }
        if c == '"' {
            return self.scan_string(span);
        }
        self.scan_operator(span)
    }

    fn scan_number(&mut self, span: Span) -> LexResult<Token> {
        let mut text = String::new();
        let mut is_float = false;

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }

        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            text.push(self.bump().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign_offset = if matches!(self.peek_at(1), Some('+') | Some('-')) { 2 } else { 1 };
            if matches!(self.peek_at(sign_offset), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                text.push(self.bump().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.bump().unwrap());
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.bump().unwrap());
                }
            }
        }

        if matches!(self.peek(), Some(c) if c.is_alphabetic() || c == '_') {
            return Err(LexicalError::MalformedNumber { span });
        }

        if is_float {
            let value: f64 = text.parse().expect("scanned float text is always valid");
            Ok(Token::new(TokenKind::Float(value), text, span))
        } else {
            let value: i64 = text.parse().expect("scanned int text is always valid");
            Ok(Token::new(TokenKind::Int(value), text, span))
        }
    }

    fn scan_identifier(&mut self, span: Span) -> Token {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            text.push(self.bump().unwrap());
        }
        let kind = TokenKind::keyword_or_ident(text.clone());
        Token::new(kind, text, span)
    }

    fn scan_string(&mut self, span: Span) -> LexResult<Token> {
        self.bump(); // opening quote
        let mut raw = String::new();
        loop {
            match self.peek() {
                None => return Err(LexicalError::UnterminatedString { span }),
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    raw.push(self.bump().unwrap());
                    match self.bump() {
                        Some(escaped) => raw.push(escaped),
                        None => return Err(LexicalError::UnterminatedString { span }),
                    }
                }
                Some(c) => {
                    raw.push(c);
                    self.bump();
                }
            }
        }
        Ok(Token::new(TokenKind::StringLit(raw.clone()), raw, span))
    }

    fn scan_operator(&mut self, span: Span) -> LexResult<Token> {
        let c = self.bump().unwrap();
        let second = self.peek();

        macro_rules! compound {
            ($second_char:literal, $kind:expr) => {
                if second == Some($second_char) {
                    self.bump();
                    let text: String = [c, $second_char].iter().collect();
                    return Ok(Token::new($kind, text, span));
                }
            };
        }

        match c {
            '=' => {
                compound!('=', TokenKind::EqEq);
                Ok(Token::new(TokenKind::Assign, "=", span))
            }
            '!' => {
                compound!('=', TokenKind::NotEq);
                Ok(Token::new(TokenKind::Bang, "!", span))
            }
            '<' => {
                compound!('=', TokenKind::LtEq);
                Ok(Token::new(TokenKind::Lt, "<", span))
            }
            '>' => {
                compound!('=', TokenKind::GtEq);
                Ok(Token::new(TokenKind::Gt, ">", span))
            }
            '+' => {
                compound!('=', TokenKind::PlusEq);
                Ok(Token::new(TokenKind::Plus, "+", span))
            }
            '-' => {
                compound!('=', TokenKind::MinusEq);
                Ok(Token::new(TokenKind::Minus, "-", span))
            }
            '*' => {
                compound!('=', TokenKind::StarEq);
                Ok(Token::new(TokenKind::Star, "*", span))
            }
            '/' => {
                compound!('=', TokenKind::SlashEq);
                Ok(Token::new(TokenKind::Slash, "/", span))
            }
            '%' => {
                compound!('=', TokenKind::PercentEq);
                Ok(Token::new(TokenKind::Percent, "%", span))
            }
            '^' => {
                compound!('=', TokenKind::CaretEq);
                Ok(Token::new(TokenKind::Caret, "^", span))
            }
            '.' => Ok(Token::new(TokenKind::Dot, ".", span)),
            ',' => Ok(Token::new(TokenKind::Comma, ",", span)),
            '(' => Ok(Token::new(TokenKind::LParen, "(", span)),
            ')' => Ok(Token::new(TokenKind::RParen, ")", span)),
            '[' => Ok(Token::new(TokenKind::LBracket, "[", span)),
            ']' => Ok(Token::new(TokenKind::RBracket, "]", span)),
            ':' => Ok(Token::new(TokenKind::Colon, ":", span)),
            other => Err(LexicalError::IllegalCharacter { character: other, span }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn skips_whitespace_and_comments() {
        let k = kinds("  1 + 2 // trailing comment\n");
        assert_eq!(k, vec![TokenKind::Int(1), TokenKind::Plus, TokenKind::Int(2), TokenKind::Newline, TokenKind::Eof]);
    }

    #[test]
    fn distinguishes_int_and_float() {
        let k = kinds("42 3.14 1e3 1.5E-2");
        assert_eq!(
            k,
            vec![
                TokenKind::Int(42),
                TokenKind::Float(3.14),
                TokenKind::Float(1e3),
                TokenKind::Float(1.5e-2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = Lexer::new("1abc").tokenize().unwrap_err();
        assert!(matches!(err, LexicalError::MalformedNumber { .. }));
    }

    #[test]
    fn keywords_are_recognized() {
        let k = kinds("function end if elseif else while for true false nil foo");
        assert_eq!(
            k,
            vec![
                TokenKind::Function,
                TokenKind::End,
                TokenKind::If,
                TokenKind::Elseif,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::For,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Nil,
                TokenKind::Ident("foo".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn compound_operators_win_over_prefixes() {
        let k = kinds("== != <= >= += -= *= /= %= ^=");
        assert_eq!(
            k,
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
                TokenKind::PercentEq,
                TokenKind::CaretEq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literal_keeps_escapes_raw() {
        let k = kinds(r#""hi\n\"there\"""#);
        assert_eq!(k, vec![TokenKind::StringLit(r#"hi\n\"there\""#.to_string()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("\"oops").tokenize().unwrap_err();
        assert!(matches!(err, LexicalError::UnterminatedString { .. }));
    }

    #[test]
    fn illegal_character_is_an_error() {
        let err = Lexer::new("$").tokenize().unwrap_err();
        assert!(matches!(err, LexicalError::IllegalCharacter { character: '$', .. }));
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = Lexer::new("x\ny").tokenize().unwrap();
        assert_eq!(tokens[0].span.start.line, 1);
        assert_eq!(tokens[2].span.start.line, 2);
        assert_eq!(tokens[2].span.start.column, 1);
    }
}
