//! Token stream → AST (spec.md §4.2): a precedence-climbing expression
//! parser plus a small statement-level dispatcher.

use itmoscript_ast::{BinaryOp, Expr, Identifier, IfBranch, Program, Stmt, Token, TokenKind, UnaryOp};
use itmoscript_errors::{ParseError, ParseResult};
use itmoscript_span::Span;

const LOWEST: u8 = 0;
const EQUALITY: u8 = 1;
const COMPARISON: u8 = 2;
const ADDITIVE: u8 = 3;
const MULTIPLICATIVE: u8 = 4;
const POWER_PREFIX: u8 = 5;
const CALL: u8 = 6;

fn infix_precedence(kind: &TokenKind) -> u8 {
    match kind {
        TokenKind::EqEq | TokenKind::NotEq => EQUALITY,
        TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq | TokenKind::And | TokenKind::Or => COMPARISON,
        TokenKind::Plus | TokenKind::Minus | TokenKind::Percent => ADDITIVE,
        TokenKind::Star | TokenKind::Slash => MULTIPLICATIVE,
        TokenKind::Caret | TokenKind::LBracket => POWER_PREFIX,
        TokenKind::LParen => CALL,
        _ => LOWEST,
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::GtEq => BinaryOp::GtEq,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Caret => BinaryOp::Pow,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        _ => return None,
    })
}

/// Compound-assignment operator token → the binary op it desugars through
/// (`x += e` is `x = x + e`, spec §4.5).
fn compound_assign_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::PlusEq => BinaryOp::Add,
        TokenKind::MinusEq => BinaryOp::Sub,
        TokenKind::StarEq => BinaryOp::Mul,
        TokenKind::SlashEq => BinaryOp::Div,
        TokenKind::PercentEq => BinaryOp::Mod,
        TokenKind::CaretEq => BinaryOp::Pow,
        _ => return None,
    })
}

/// A cursor over a token stream: current token, previous token, and the
/// remaining tokens held in reverse so the next one pops cheaply off the end.
pub struct Parser {
    token: Token,
    prev_token: Token,
    tokens: Vec<Token>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        tokens.reverse();
        let first = tokens.pop().unwrap_or_else(|| Token::new(TokenKind::Eof, "", Span::default()));
        Self { prev_token: first.clone(), token: first, tokens }
    }

    fn bump(&mut self) {
        self.prev_token = std::mem::replace(
            &mut self.token,
            self.tokens.pop().unwrap_or_else(|| Token::new(TokenKind::Eof, "", self.prev_token.span)),
        );
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.token.kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(&kind) {
            let token = self.token.clone();
            self.bump();
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: self.token.kind.to_string(),
                span: self.token.span,
            })
        }
    }

    fn look_ahead(&self, n: usize) -> TokenKind {
        if n == 0 {
            return self.token.kind.clone();
        }
        self.tokens
            .len()
            .checked_sub(n)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.bump();
        }
    }

    /// Consume `end <keyword>`, reporting an `UnterminatedBlock` naming
    /// `label` if `end` (or the keyword after it) isn't there.
    fn expect_end(&mut self, keyword: TokenKind, label: &str) -> ParseResult<()> {
        if !self.eat(&TokenKind::End) {
            return Err(ParseError::UnterminatedBlock { keyword: label.to_string(), span: self.token.span });
        }
        self.expect(keyword)?;
        Ok(())
    }

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.token.is_eof() {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_block_until(&mut self, terminators: &[TokenKind]) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.token.is_eof() {
                let label = terminators.first().map(|t| t.to_string()).unwrap_or_default();
                return Err(ParseError::UnterminatedBlock { keyword: label, span: self.token.span });
            }
            if terminators.iter().any(|t| self.check(t)) {
                return Ok(statements);
            }
            statements.push(self.parse_statement()?);
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        if let TokenKind::Ident(name) = self.token.kind.clone() {
            let ahead = self.look_ahead(1);
            if ahead == TokenKind::Assign {
                return self.parse_assign(name);
            }
            if let Some(op) = compound_assign_op(&ahead) {
                return self.parse_operator_assign(name, op);
            }
        }

        match self.token.kind {
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let token = self.token.clone();
                self.bump();
                Ok(Stmt::Break { token })
            }
            TokenKind::Continue => {
                let token = self.token.clone();
                self.bump();
                Ok(Stmt::Continue { token })
            }
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_assign(&mut self, name: String) -> ParseResult<Stmt> {
        let token = self.token.clone();
        self.bump(); // identifier
        self.bump(); // `=`
        let expr = self.parse_expression(LOWEST)?;
        Ok(Stmt::Assign { name, expr, token })
    }

    fn parse_operator_assign(&mut self, name: String, op: BinaryOp) -> ParseResult<Stmt> {
        let token = self.token.clone();
        self.bump(); // identifier
        self.bump(); // compound operator
        let expr = self.parse_expression(LOWEST)?;
        Ok(Stmt::OperatorAssign { name, op, expr, token })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let token = self.token.clone();
        self.bump();
        let expr = if matches!(self.token.kind, TokenKind::Newline | TokenKind::End | TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expression(LOWEST)?)
        };
        Ok(Stmt::Return { expr, token })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let token = self.token.clone();
        self.bump();
        let condition = self.parse_expression(LOWEST)?;
        self.eat(&TokenKind::Then);
        self.skip_newlines();
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect_end(TokenKind::While, "while")?;
        Ok(Stmt::While { condition, body, token })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let token = self.token.clone();
        self.bump();
        let iter_name = match self.token.kind.clone() {
            TokenKind::Ident(name) => {
                self.bump();
                name
            }
            _ => {
                return Err(ParseError::UnexpectedToken {
                    expected: "identifier".to_string(),
                    found: self.token.kind.to_string(),
                    span: self.token.span,
                })
            }
        };
        self.expect(TokenKind::In)?;
        let iterable = self.parse_expression(LOWEST)?;
        self.skip_newlines();
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect_end(TokenKind::For, "for")?;
        Ok(Stmt::For { iter_name, iterable, body, token })
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let token = self.token.clone();
        let expr = self.parse_expression(LOWEST)?;
        Ok(Stmt::ExpressionStatement { expr, token })
    }

    fn parse_expression(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;
        while min_prec < infix_precedence(&self.token.kind) {
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let token = self.token.clone();
        match token.kind.clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expr::Identifier { name, token })
            }
            TokenKind::Int(value) => {
                self.bump();
                Ok(Expr::IntLiteral { value, token })
            }
            TokenKind::Float(value) => {
                self.bump();
                Ok(Expr::FloatLiteral { value, token })
            }
            TokenKind::StringLit(raw) => {
                self.bump();
                let value = process_escapes(&raw, token.span)?;
                Ok(Expr::StringLiteral { value, token })
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::BoolLiteral { value: true, token })
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::BoolLiteral { value: false, token })
            }
            TokenKind::Nil => {
                self.bump();
                Ok(Expr::NilLiteral { token })
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expression(LOWEST)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_list_literal(token),
            TokenKind::Function => self.parse_function_literal(token),
            TokenKind::If => self.parse_if_expression(token),
            TokenKind::Minus => self.parse_unary(token, UnaryOp::Neg),
            TokenKind::Plus => self.parse_unary(token, UnaryOp::Plus),
            TokenKind::Bang | TokenKind::Not => self.parse_unary(token, UnaryOp::Not),
            _ => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: token.kind.to_string(),
                span: token.span,
            }),
        }
    }

    fn parse_unary(&mut self, token: Token, op: UnaryOp) -> ParseResult<Expr> {
        self.bump();
        // One tier below POWER_PREFIX so `-a^b` parses as `-(a^b)`, the usual
        // math convention, rather than `(-a)^b`.
        let right = self.parse_expression(MULTIPLICATIVE)?;
        Ok(Expr::Prefix { op, right: Box::new(right), token })
    }

    fn parse_list_literal(&mut self, token: Token) -> ParseResult<Expr> {
        self.bump();
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expression(LOWEST)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::ListLiteral { elements, token })
    }

    fn parse_function_literal(&mut self, token: Token) -> ParseResult<Expr> {
        self.bump();
        self.expect(TokenKind::LParen)?;
        let mut params: Vec<Identifier> = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param_token = self.token.clone();
                let name = match param_token.kind.clone() {
                    TokenKind::Ident(name) => name,
                    _ => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "parameter name".to_string(),
                            found: param_token.kind.to_string(),
                            span: param_token.span,
                        })
                    }
                };
                if params.iter().any(|p| p.name == name) {
                    return Err(ParseError::DuplicateParameter { name, span: param_token.span });
                }
                self.bump();
                params.push(Identifier { name, span: param_token.span });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.skip_newlines();
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect_end(TokenKind::Function, "function")?;
        Ok(Expr::FunctionLiteral { params, body, token })
    }

    fn parse_if_expression(&mut self, token: Token) -> ParseResult<Expr> {
        self.bump();
        let mut branches = Vec::new();
        branches.push(self.parse_if_branch()?);

        loop {
            if self.check(&TokenKind::Elseif) {
                self.bump();
                branches.push(self.parse_if_branch()?);
            } else if self.check(&TokenKind::Else) && self.look_ahead(1) == TokenKind::If {
                self.bump(); // else
                self.bump(); // if
                branches.push(self.parse_if_branch()?);
            } else if self.check(&TokenKind::Else) {
                self.bump();
                self.skip_newlines();
                let consequence = self.parse_block_until(&[TokenKind::End])?;
                branches.push(IfBranch { condition: None, consequence });
                break;
            } else {
                break;
            }
        }

        self.expect_end(TokenKind::If, "if")?;
        Ok(Expr::If { branches, token })
    }

    /// One `if`/`elseif` condition + body, assuming the leading keyword has
    /// already been consumed.
    fn parse_if_branch(&mut self) -> ParseResult<IfBranch> {
        let condition = self.parse_expression(LOWEST)?;
        self.eat(&TokenKind::Then);
        self.skip_newlines();
        let consequence = self.parse_block_until(&[TokenKind::End, TokenKind::Else, TokenKind::Elseif])?;
        Ok(IfBranch { condition: Some(condition), consequence })
    }

    fn parse_infix(&mut self, left: Expr) -> ParseResult<Expr> {
        match self.token.kind {
            TokenKind::LBracket => self.parse_index(left),
            TokenKind::LParen => self.parse_call(left),
            _ => self.parse_binary(left),
        }
    }

    fn parse_binary(&mut self, left: Expr) -> ParseResult<Expr> {
        let token = self.token.clone();
        let op = binary_op(&token.kind).expect("parse_infix only dispatches here for binary operator tokens");
        let prec = infix_precedence(&token.kind);
        self.bump();
        // `^` is right-associative; binding the right operand at one tier
        // below its own lets a further `^` on the right recurse back in.
        let right_prec = if op == BinaryOp::Pow { prec - 1 } else { prec };
        let right = self.parse_expression(right_prec)?;
        Ok(Expr::Infix { op, left: Box::new(left), right: Box::new(right), token })
    }

    fn parse_index(&mut self, operand: Expr) -> ParseResult<Expr> {
        let token = self.token.clone();
        self.bump();

        if self.eat(&TokenKind::Colon) {
            let second = if self.check(&TokenKind::RBracket) { None } else { Some(Box::new(self.parse_expression(LOWEST)?)) };
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr::Index { operand: Box::new(operand), index: None, second_index: second, is_slice: true, token });
        }

        let first = self.parse_expression(LOWEST)?;

        if self.eat(&TokenKind::Colon) {
            let second = if self.check(&TokenKind::RBracket) { None } else { Some(Box::new(self.parse_expression(LOWEST)?)) };
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr::Index {
                operand: Box::new(operand),
                index: Some(Box::new(first)),
                second_index: second,
                is_slice: true,
                token,
            });
        }

        self.expect(TokenKind::RBracket)?;
        Ok(Expr::Index { operand: Box::new(operand), index: Some(Box::new(first)), second_index: None, is_slice: false, token })
    }

    fn parse_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let token = self.token.clone();
        self.bump();
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression(LOWEST)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RParen) {
                    return Err(ParseError::UnexpectedToken {
                        expected: "expression".to_string(),
                        found: self.token.kind.to_string(),
                        span: self.token.span,
                    });
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Call { callee: Box::new(callee), args, token })
    }
}

/// Interpret the raw (unescaped) body of a string literal (spec §4.2:
/// `\n \t \r \' \" \\ \a \b \f \v \?`).
fn process_escapes(raw: &str, span: Span) -> ParseResult<String> {
    let mut result = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\'') => result.push('\''),
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some('a') => result.push('\u{07}'),
            Some('b') => result.push('\u{08}'),
            Some('f') => result.push('\u{0C}'),
            Some('v') => result.push('\u{0B}'),
            Some('?') => result.push('?'),
            Some(other) => return Err(ParseError::MalformedEscape { escape: other.to_string(), span }),
            None => return Err(ParseError::MalformedEscape { escape: String::new(), span }),
        }
    }
    Ok(result)
}

pub fn parse_tokens(tokens: Vec<Token>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().expect("lex ok");
        parse_tokens(tokens).expect("parse ok")
    }

    #[test]
    fn parses_assignment_and_arithmetic() {
        let program = parse("x = 1 + 2 * 3\n");
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Stmt::Assign { name, expr, .. } => {
                assert_eq!(name, "x");
                match expr {
                    Expr::Infix { op: BinaryOp::Add, right, .. } => {
                        assert!(matches!(**right, Expr::Infix { op: BinaryOp::Mul, .. }));
                    }
                    other => panic!("expected addition, got {other:?}"),
                }
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let program = parse("x = 2^3^2\n");
        let Stmt::Assign { expr: Expr::Infix { op: BinaryOp::Pow, left, right, .. }, .. } = &program.statements[0] else {
            panic!("expected power expression");
        };
        assert!(matches!(**left, Expr::IntLiteral { value: 2, .. }));
        assert!(matches!(**right, Expr::Infix { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn parses_while_loop() {
        let program = parse("while x < 10\n  x = x + 1\nend while\n");
        assert!(matches!(program.statements[0], Stmt::While { .. }));
    }

    #[test]
    fn parses_for_loop() {
        let program = parse("for i in range(0, 5, 1)\n  print(i)\nend for\n");
        let Stmt::For { iter_name, body, .. } = &program.statements[0] else { panic!("expected for loop") };
        assert_eq!(iter_name, "i");
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn parses_if_elseif_else_chain() {
        let program = parse("if a\n  1\nelseif b\n  2\nelse\n  3\nend if\n");
        let Stmt::ExpressionStatement { expr: Expr::If { branches, .. }, .. } = &program.statements[0] else {
            panic!("expected if expression");
        };
        assert_eq!(branches.len(), 3);
        assert!(branches[2].condition.is_none());
    }

    #[test]
    fn else_if_is_equivalent_to_elseif() {
        let program = parse("if a\n  1\nelse if b\n  2\nend if\n");
        let Stmt::ExpressionStatement { expr: Expr::If { branches, .. }, .. } = &program.statements[0] else {
            panic!("expected if expression");
        };
        assert_eq!(branches.len(), 2);
        assert!(branches[1].condition.is_some());
    }

    #[test]
    fn rejects_duplicate_parameters() {
        let tokens = Lexer::new("function(a, a) return a end function\n").tokenize().unwrap();
        let err = parse_tokens(tokens).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateParameter { .. }));
    }

    #[test]
    fn parses_slice_variants() {
        let program = parse("x = a[1:3]\ny = a[:3]\nz = a[1:]\nw = a[:]\n");
        for stmt in &program.statements {
            let Stmt::Assign { expr: Expr::Index { is_slice, .. }, .. } = stmt else { panic!("expected index") };
            assert!(is_slice);
        }
    }

    #[test]
    fn rejects_trailing_comma_in_call() {
        let tokens = Lexer::new("f(1, 2,)\n").tokenize().unwrap();
        assert!(parse_tokens(tokens).is_err());
    }

    #[test]
    fn string_escapes_are_interpreted() {
        let program = parse(r#"x = "a\nb""#);
        let Stmt::Assign { expr: Expr::StringLiteral { value, .. }, .. } = &program.statements[0] else {
            panic!("expected string literal")
        };
        assert_eq!(value, "a\nb");
    }
}
