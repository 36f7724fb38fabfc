//! The tree walker (spec.md §4.5): owns the environment chain, the call
//! stack, and the built-in registry, and drives statement/expression
//! evaluation with `{value, flow}` signalling for `return`/`break`/`continue`.

use crate::builtins::{BuiltinKind, BuiltinRegistry};
use crate::ops;
use itmoscript_ast::{assign_or_define, lookup, BinaryOp, Expr, Frame};
use itmoscript_ast::{EnvHandle, FunctionData, FunctionHandle, Program, Stmt, Token, Value};
use itmoscript_errors::{CallStackFrame, RuntimeError, RuntimeResult};
use itmoscript_span::Span;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

/// How a statement or branch exited: naturally, or via `return`/`break`/
/// `continue` bubbling toward whatever construct consumes it (spec §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Normal,
    Return,
    Break,
    Continue,
}

#[derive(Clone, Debug)]
pub struct Outcome {
    pub value: Value,
    pub flow: Flow,
}

impl Outcome {
    pub fn normal(value: Value) -> Self {
        Self { value, flow: Flow::Normal }
    }
}

pub struct Evaluator {
    registry: BuiltinRegistry,
    env: EnvHandle,
    call_stack: Vec<CallStackFrame>,
    loop_depth: usize,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
    last_value: Value,
    /// Set when an `if` expression's chosen branch exits non-`Normal`, so
    /// the statement that evaluated it (the realistic case: an `if` used
    /// directly as a statement, or as the right-hand side of an
    /// assignment/return) can pick the flow back up. An `if` buried inside
    /// arithmetic that triggers `return` is not threaded past its immediate
    /// statement context; see DESIGN.md.
    pending_flow: Option<Outcome>,
}

impl Evaluator {
    pub fn new(output: Box<dyn Write>, input: Box<dyn BufRead>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            registry: BuiltinRegistry::with_stdlib(Rc::new(RefCell::new(rng))),
            env: Frame::new_global(),
            call_stack: Vec::new(),
            loop_depth: 0,
            output,
            input,
            last_value: Value::Nil,
            pending_flow: None,
        }
    }

    pub fn register_builtin(&mut self, name: impl Into<String>, kind: BuiltinKind) {
        self.registry.register(name, kind);
    }

    pub fn last_value(&self) -> &Value {
        &self.last_value
    }

    pub fn call_stack(&self) -> &[CallStackFrame] {
        &self.call_stack
    }

    /// Run a complete program, or (called repeatedly against the same
    /// evaluator) one REPL line's worth of statements against the
    /// evaluator's persistent global environment. Clears any call-stack
    /// frames a prior erroring run left behind.
    pub fn run(&mut self, program: &Program) -> RuntimeResult<Value> {
        self.call_stack.clear();
        let outcome = self.eval_block(&program.statements)?;
        self.last_value = outcome.value.clone();
        Ok(outcome.value)
    }

    /// Run a single statement against the evaluator's persistent global
    /// environment (the REPL's `eval` mode re-enters here per input line).
    pub fn run_statement(&mut self, stmt: &Stmt) -> RuntimeResult<Value> {
        self.call_stack.clear();
        let outcome = self.eval_stmt(stmt)?;
        self.last_value = outcome.value.clone();
        Ok(outcome.value)
    }

    fn eval_block(&mut self, statements: &[Stmt]) -> RuntimeResult<Outcome> {
        let mut last = Value::Nil;
        for stmt in statements {
            let outcome = self.eval_stmt(stmt)?;
            last = outcome.value.clone();
            if outcome.flow != Flow::Normal {
                return Ok(outcome);
            }
        }
        Ok(Outcome::normal(last))
    }

    fn eval_scoped_block(&mut self, statements: &[Stmt]) -> RuntimeResult<Outcome> {
        let child = Frame::child_of(&self.env);
        let previous = std::mem::replace(&mut self.env, child);
        let outcome = self.eval_block(statements);
        self.env = previous;
        outcome
    }

    fn take_pending(&mut self, value: Value) -> Outcome {
        self.pending_flow.take().unwrap_or_else(|| Outcome::normal(value))
    }

    fn eval_stmt(&mut self, stmt: &Stmt) -> RuntimeResult<Outcome> {
        match stmt {
            Stmt::Assign { name, expr, token } => {
                let value = self.eval_expr(expr)?;
                let outcome = self.take_pending(value);
                if outcome.flow != Flow::Normal {
                    return Ok(outcome);
                }
                if self.registry.contains(name) {
                    return Err(RuntimeError::StandardOverride { name: name.clone(), span: token.span });
                }
                assign_or_define(&self.env, name, outcome.value.clone());
                Ok(outcome)
            }
            Stmt::OperatorAssign { name, op, expr, token } => {
                let current = lookup(&self.env, name).ok_or_else(|| RuntimeError::UndefinedName { name: name.clone(), span: token.span })?;
                let rhs = self.eval_expr(expr)?;
                let outcome = self.take_pending(rhs);
                if outcome.flow != Flow::Normal {
                    return Ok(outcome);
                }
                if self.registry.contains(name) {
                    return Err(RuntimeError::StandardOverride { name: name.clone(), span: token.span });
                }
                let new_value = ops::apply_binary(*op, current, outcome.value, token.span)?;
                assign_or_define(&self.env, name, new_value.clone());
                Ok(Outcome::normal(new_value))
            }
            Stmt::Return { expr, token } => {
                if self.call_stack.is_empty() {
                    return Err(RuntimeError::UnexpectedReturn { span: token.span });
                }
                let value = match expr {
                    Some(e) => {
                        let value = self.eval_expr(e)?;
                        let outcome = self.take_pending(value);
                        if outcome.flow != Flow::Normal {
                            return Ok(outcome);
                        }
                        outcome.value
                    }
                    None => Value::Nil,
                };
                Ok(Outcome { value, flow: Flow::Return })
            }
            Stmt::Break { token } => {
                if self.loop_depth == 0 {
                    return Err(RuntimeError::ControlFlow { span: token.span });
                }
                Ok(Outcome { value: Value::Nil, flow: Flow::Break })
            }
            Stmt::Continue { token } => {
                if self.loop_depth == 0 {
                    return Err(RuntimeError::ControlFlow { span: token.span });
                }
                Ok(Outcome { value: Value::Nil, flow: Flow::Continue })
            }
            Stmt::While { condition, body, .. } => self.eval_while(condition, body),
            Stmt::For { iter_name, iterable, body, token } => self.eval_for(iter_name, iterable, body, token),
            Stmt::ExpressionStatement { expr, .. } => {
                let value = self.eval_expr(expr)?;
                Ok(self.take_pending(value))
            }
            Stmt::Block(statements) => self.eval_scoped_block(statements),
        }
    }

    fn eval_while(&mut self, condition: &Expr, body: &[Stmt]) -> RuntimeResult<Outcome> {
        self.loop_depth += 1;
        let result = self.eval_while_inner(condition, body);
        self.loop_depth -= 1;
        result
    }

    fn eval_while_inner(&mut self, condition: &Expr, body: &[Stmt]) -> RuntimeResult<Outcome> {
        loop {
            let cond_value = self.eval_expr(condition)?;
            let cond_outcome = self.take_pending(cond_value);
            if cond_outcome.flow != Flow::Normal {
                return Ok(cond_outcome);
            }
            if !cond_outcome.value.is_truthy() {
                return Ok(Outcome::normal(Value::Nil));
            }
            let outcome = self.eval_scoped_block(body)?;
            match outcome.flow {
                Flow::Break => return Ok(Outcome::normal(Value::Nil)),
                Flow::Return => return Ok(outcome),
                Flow::Continue | Flow::Normal => continue,
            }
        }
    }

    fn eval_for(&mut self, iter_name: &str, iterable: &Expr, body: &[Stmt], token: &Token) -> RuntimeResult<Outcome> {
        let iterable_value = self.eval_expr(iterable)?;
        let outcome = self.take_pending(iterable_value);
        if outcome.flow != Flow::Normal {
            return Ok(outcome);
        }
        let items: Vec<Value> = match &outcome.value {
            Value::List(list) => list.borrow().clone(),
            Value::String(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
            other => return Err(RuntimeError::IndexOperandType { found: other.type_name().to_string(), span: token.span }),
        };
        self.loop_depth += 1;
        let result = self.eval_for_inner(iter_name, &items, body);
        self.loop_depth -= 1;
        result
    }

    fn eval_for_inner(&mut self, iter_name: &str, items: &[Value], body: &[Stmt]) -> RuntimeResult<Outcome> {
        for item in items {
            let child = Frame::child_of(&self.env);
            child.borrow_mut().define(iter_name, item.clone());
            let previous = std::mem::replace(&mut self.env, child);
            let outcome = self.eval_block(body);
            self.env = previous;
            let outcome = outcome?;
            match outcome.flow {
                Flow::Break => return Ok(Outcome::normal(Value::Nil)),
                Flow::Return => return Ok(outcome),
                Flow::Continue | Flow::Normal => continue,
            }
        }
        Ok(Outcome::normal(Value::Nil))
    }

    fn eval_expr(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Identifier { name, token } => {
                if let Some(value) = lookup(&self.env, name) {
                    return Ok(value);
                }
                if self.registry.contains(name) {
                    return Err(RuntimeError::StandardFunctionNoCall { name: name.clone(), span: token.span });
                }
                Err(RuntimeError::UndefinedName { name: name.clone(), span: token.span })
            }
            Expr::IntLiteral { value, .. } => Ok(Value::Int(*value)),
            Expr::FloatLiteral { value, .. } => Ok(Value::Float(*value)),
            Expr::StringLiteral { value, .. } => Ok(Value::string(value.clone())),
            Expr::BoolLiteral { value, .. } => Ok(Value::Bool(*value)),
            Expr::NilLiteral { .. } => Ok(Value::Nil),
            Expr::ListLiteral { elements, .. } => {
                let items = elements.iter().map(|e| self.eval_expr(e)).collect::<RuntimeResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::FunctionLiteral { params, body, .. } => self.eval_function_literal(params, body),
            Expr::Prefix { op, right, token } => {
                let value = self.eval_expr(right)?;
                ops::apply_unary(*op, value, token.span)
            }
            Expr::Infix { op, left, right, token } => self.eval_infix(*op, left, right, token.span),
            Expr::Index { operand, index, second_index, is_slice, token } => {
                self.eval_index(operand, index.as_deref(), second_index.as_deref(), *is_slice, token)
            }
            Expr::Call { callee, args, token } => self.eval_call(callee, args, token),
            Expr::If { branches, .. } => self.eval_if(branches),
        }
    }

    fn eval_function_literal(&mut self, params: &[itmoscript_ast::Identifier], body: &[Stmt]) -> RuntimeResult<Value> {
        let mut seen = std::collections::HashSet::new();
        for p in params {
            if !seen.insert(p.name.as_str()) {
                return Err(RuntimeError::DuplicateParameter { name: p.name.clone(), span: p.span });
            }
        }
        let names = params.iter().map(|p| p.name.clone()).collect();
        Ok(Value::Function(Rc::new(FunctionData { params: names, body: body.to_vec(), captured_env: Rc::clone(&self.env) })))
    }

    fn eval_infix(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> RuntimeResult<Value> {
        match op {
            BinaryOp::And => {
                let left_value = self.eval_expr(left)?;
                if !left_value.is_truthy() {
                    return Ok(left_value);
                }
                self.eval_expr(right)
            }
            BinaryOp::Or => {
                let left_value = self.eval_expr(left)?;
                if left_value.is_truthy() {
                    return Ok(left_value);
                }
                self.eval_expr(right)
            }
            _ => {
                let left_value = self.eval_expr(left)?;
                let right_value = self.eval_expr(right)?;
                ops::apply_binary(op, left_value, right_value, span)
            }
        }
    }

    fn eval_if(&mut self, branches: &[itmoscript_ast::IfBranch]) -> RuntimeResult<Value> {
        for branch in branches {
            let take = match &branch.condition {
                Some(cond) => self.eval_expr(cond)?.is_truthy(),
                None => true,
            };
            if take {
                let outcome = self.eval_scoped_block(&branch.consequence)?;
                if outcome.flow != Flow::Normal {
                    self.pending_flow = Some(outcome);
                    return Ok(Value::Nil);
                }
                return Ok(outcome.value);
            }
        }
        Ok(Value::Nil)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], token: &Token) -> RuntimeResult<Value> {
        if let Expr::Identifier { name, .. } = callee {
            if lookup(&self.env, name).is_none() {
                if let Some(kind) = self.registry.get(name).cloned() {
                    let arg_values = self.eval_args(args)?;
                    return self.invoke_builtin(&kind, arg_values, token);
                }
            }
        }
        let callee_value = self.eval_expr(callee)?;
        let arg_values = self.eval_args(args)?;
        match callee_value {
            Value::Function(f) => {
                let name_hint = if let Expr::Identifier { name, .. } = callee { Some(name.clone()) } else { None };
                self.invoke_function(&f, arg_values, token, name_hint)
            }
            other => Err(RuntimeError::UncallableObject { found: other.type_name().to_string(), span: token.span }),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> RuntimeResult<Vec<Value>> {
        args.iter().map(|a| self.eval_expr(a)).collect()
    }

    fn invoke_builtin(&mut self, kind: &BuiltinKind, args: Vec<Value>, token: &Token) -> RuntimeResult<Value> {
        match kind {
            BuiltinKind::Value(f) => f(&args, token.span, &self.call_stack),
            BuiltinKind::OutStream(f) => f(&args, token.span, &self.call_stack, &mut *self.output),
            BuiltinKind::InStream(f) => f(&args, token.span, &self.call_stack, &mut *self.input),
        }
    }

    fn invoke_function(&mut self, f: &FunctionHandle, args: Vec<Value>, token: &Token, name_hint: Option<String>) -> RuntimeResult<Value> {
        if args.len() != f.params.len() {
            return Err(RuntimeError::ParametersCount { expected: f.params.len(), found: args.len(), span: token.span });
        }
        let frame = Frame::child_of(&f.captured_env);
        for (param, arg) in f.params.iter().zip(args) {
            frame.borrow_mut().define(param.clone(), arg);
        }
        let function_name = name_hint.unwrap_or_else(|| "anonymous".to_string());
        self.call_stack.push(CallStackFrame { function_name, call_site: token.span.start });
        let previous_env = std::mem::replace(&mut self.env, frame);
        let result = self.eval_block(&f.body);
        self.env = previous_env;
        // Only pop on success: an error leaves every active frame on the
        // stack so it's still there for the traceback once the error
        // reaches run()/run_program(). run_statement() clears stale frames
        // before the next REPL input.
        match result {
            Ok(outcome) => {
                self.call_stack.pop();
                Ok(outcome.value)
            }
            Err(e) => Err(e),
        }
    }

    fn eval_index(&mut self, operand: &Expr, index: Option<&Expr>, second_index: Option<&Expr>, is_slice: bool, token: &Token) -> RuntimeResult<Value> {
        let operand_value = self.eval_expr(operand)?;
        if is_slice {
            return self.eval_slice(operand_value, index, second_index, token);
        }
        let index_expr = index.expect("non-slice Index nodes always carry an index expression");
        let index_value = self.eval_expr(index_expr)?;
        let i = match index_value {
            Value::Int(i) => i,
            other => return Err(RuntimeError::IndexType { found: other.type_name().to_string(), span: token.span }),
        };
        match &operand_value {
            Value::List(list) => {
                let items = list.borrow();
                let resolved = resolve_index(i, items.len(), token.span)?;
                Ok(items[resolved].clone())
            }
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let resolved = resolve_index(i, chars.len(), token.span)?;
                Ok(Value::string(chars[resolved].to_string()))
            }
            other => Err(RuntimeError::IndexOperandType { found: other.type_name().to_string(), span: token.span }),
        }
    }

    fn eval_slice(&mut self, operand: Value, start_expr: Option<&Expr>, end_expr: Option<&Expr>, token: &Token) -> RuntimeResult<Value> {
        let len = match &operand {
            Value::List(list) => list.borrow().len(),
            Value::String(s) => s.chars().count(),
            other => return Err(RuntimeError::IndexOperandType { found: other.type_name().to_string(), span: token.span }),
        };
        let start = self.eval_slice_bound(start_expr, 0, len, token)?;
        let end = self.eval_slice_bound(end_expr, len, len, token)?;
        let (start, end) = if start >= end { (0, 0) } else { (start, end) };
        match operand {
            Value::List(list) => Ok(Value::list(list.borrow()[start..end].to_vec())),
            Value::String(s) => Ok(Value::string(s.chars().collect::<Vec<_>>()[start..end].iter().collect::<String>())),
            _ => unreachable!("operand type already validated above"),
        }
    }

    fn eval_slice_bound(&mut self, expr: Option<&Expr>, default: usize, len: usize, token: &Token) -> RuntimeResult<usize> {
        let Some(expr) = expr else { return Ok(default) };
        let value = self.eval_expr(expr)?;
        let i = match value {
            Value::Int(i) => i,
            other => return Err(RuntimeError::IndexType { found: other.type_name().to_string(), span: token.span }),
        };
        let len_i = len as i64;
        let resolved = if i < 0 { len_i + i } else { i };
        Ok(resolved.clamp(0, len_i) as usize)
    }
}

/// Resolve a possibly-negative index against `len`, distinguishing "still
/// negative after resolution" from "positive but past the end" (spec §7:
/// `NegativeIndex` vs `IndexOutOfRange`).
fn resolve_index(i: i64, len: usize, span: Span) -> RuntimeResult<usize> {
    let len_i = len as i64;
    if i >= 0 {
        if i >= len_i {
            return Err(RuntimeError::IndexOutOfRange { index: i, length: len, span });
        }
        Ok(i as usize)
    } else {
        let resolved = len_i + i;
        if resolved < 0 {
            return Err(RuntimeError::NegativeIndex { index: i, length: len, span });
        }
        Ok(resolved as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itmoscript_parser::parse_source;

    fn run(src: &str) -> Value {
        let program = parse_source(src).expect("parse ok");
        let mut evaluator = Evaluator::new(Box::new(std::io::sink()), Box::new(std::io::empty()), Some(1));
        evaluator.run(&program).expect("eval ok")
    }

    #[test]
    fn while_loop_counts_to_ten() {
        let value = run("x = 0\nwhile x < 10\n  x = x + 1\nend while\nx\n");
        assert!(matches!(value, Value::Int(10)));
    }

    #[test]
    fn string_repetition() {
        let value = run("\"ITMO\" * 2\n");
        assert!(matches!(value, Value::String(ref s) if s.as_ref() == "ITMOITMO"));
    }

    #[test]
    fn negative_index_and_slice() {
        let value = run("[1,2,3][-1]\n");
        assert!(matches!(value, Value::Int(3)));
        let value = run("[1,2,3,4][1:3]\n");
        match value {
            Value::List(l) => {
                let items = l.borrow();
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], Value::Int(2)));
                assert!(matches!(items[1], Value::Int(3)));
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn closures_capture_distinct_loop_bindings() {
        let value = run(
            "make = function()\n  counters = []\n  for i in range(3)\n    push(counters, function() return i end function)\n  end for\n  return counters\nend function\nfs = make()\nfs[0]() + fs[1]() + fs[2]()\n",
        );
        assert!(matches!(value, Value::Int(3)));
    }

    #[test]
    fn short_circuit_and_or() {
        let value = run("false and undefined_name\n");
        assert!(matches!(value, Value::Bool(false)));
        let value = run("5 or undefined_name\n");
        assert!(matches!(value, Value::Int(5)));
    }

    #[test]
    fn if_return_propagates_out_of_function() {
        let value = run("f = function(x)\n  if x > 0\n    return 1\n  else\n    return -1\n  end if\nend function\nf(5)\n");
        assert!(matches!(value, Value::Int(1)));
    }

    #[test]
    fn for_over_string_yields_one_char_values() {
        let value = run("out = \"\"\nfor c in \"ab\"\n  out = out + c\nend for\nout\n");
        assert!(matches!(value, Value::String(ref s) if s.as_ref() == "ab"));
    }

    #[test]
    fn undefined_name_errors() {
        let program = parse_source("missing\n").unwrap();
        let mut evaluator = Evaluator::new(Box::new(std::io::sink()), Box::new(std::io::empty()), Some(1));
        let err = evaluator.run(&program).unwrap_err();
        assert!(matches!(err, RuntimeError::UndefinedName { .. }));
    }

    #[test]
    fn break_outside_loop_errors() {
        let program = parse_source("break\n").unwrap();
        let mut evaluator = Evaluator::new(Box::new(std::io::sink()), Box::new(std::io::empty()), Some(1));
        let err = evaluator.run(&program).unwrap_err();
        assert!(matches!(err, RuntimeError::ControlFlow { .. }));
    }
}
