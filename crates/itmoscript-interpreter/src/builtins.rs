//! The standard library (spec §4.6): a name→callable registry the evaluator
//! consults before treating an identifier as undefined. Three callable
//! shapes exist — pure value builtins, and two that need one of the
//! evaluator's I/O streams — so an embedder's [`register_builtin`] call can
//! plug in any of the three without the evaluator knowing the difference.

use itmoscript_ast::{ListHandle, Value};
use itmoscript_errors::{CallStackFrame, RuntimeError, RuntimeResult};
use itmoscript_span::Span;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fs;
use std::io::{BufRead, Write};
use std::rc::Rc;

pub type ValueBuiltin = Rc<dyn Fn(&[Value], Span, &[CallStackFrame]) -> RuntimeResult<Value>>;
pub type OutStreamBuiltin = Rc<dyn Fn(&[Value], Span, &[CallStackFrame], &mut dyn Write) -> RuntimeResult<Value>>;
pub type InStreamBuiltin = Rc<dyn Fn(&[Value], Span, &[CallStackFrame], &mut dyn BufRead) -> RuntimeResult<Value>>;

#[derive(Clone)]
pub enum BuiltinKind {
    Value(ValueBuiltin),
    OutStream(OutStreamBuiltin),
    InStream(InStreamBuiltin),
}

/// Name → callable. Three parallel shapes rather than one trait object so
/// `print`/`read` can reach the evaluator's output/input streams without
/// every other builtin paying for a capability it doesn't use.
pub struct BuiltinRegistry {
    entries: indexmap::IndexMap<String, BuiltinKind>,
}

impl BuiltinRegistry {
    pub fn with_stdlib(rng: Rc<RefCell<ChaCha8Rng>>) -> Self {
        let mut registry = Self { entries: indexmap::IndexMap::new() };
        register_stdlib(&mut registry, rng);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, kind: BuiltinKind) {
        self.entries.insert(name.into(), kind);
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinKind> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

fn arity_at_least(args: &[Value], min: usize, span: Span) -> RuntimeResult<()> {
    if args.len() < min {
        return Err(RuntimeError::ParametersCount { expected: min, found: args.len(), span });
    }
    Ok(())
}

fn arg_int(args: &[Value], idx: usize, function: &str, span: Span) -> RuntimeResult<i64> {
    match args.get(idx) {
        Some(Value::Int(i)) => Ok(*i),
        Some(other) => Err(RuntimeError::ArgumentType { function: function.into(), position: idx + 1, expected: "Int".into(), found: other.type_name().into(), span }),
        None => Err(RuntimeError::ParametersCount { expected: idx + 1, found: args.len(), span }),
    }
}

fn arg_number(args: &[Value], idx: usize, function: &str, span: Span) -> RuntimeResult<f64> {
    match args.get(idx) {
        Some(Value::Int(i)) => Ok(*i as f64),
        Some(Value::Float(f)) => Ok(*f),
        Some(other) => Err(RuntimeError::ArgumentType { function: function.into(), position: idx + 1, expected: "Int or Float".into(), found: other.type_name().into(), span }),
        None => Err(RuntimeError::ParametersCount { expected: idx + 1, found: args.len(), span }),
    }
}

fn arg_string(args: &[Value], idx: usize, function: &str, span: Span) -> RuntimeResult<Rc<str>> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(Rc::clone(s)),
        Some(other) => Err(RuntimeError::ArgumentType { function: function.into(), position: idx + 1, expected: "String".into(), found: other.type_name().into(), span }),
        None => Err(RuntimeError::ParametersCount { expected: idx + 1, found: args.len(), span }),
    }
}

fn arg_list(args: &[Value], idx: usize, function: &str, span: Span) -> RuntimeResult<ListHandle> {
    match args.get(idx) {
        Some(Value::List(l)) => Ok(Rc::clone(l)),
        Some(other) => Err(RuntimeError::ArgumentType { function: function.into(), position: idx + 1, expected: "List".into(), found: other.type_name().into(), span }),
        None => Err(RuntimeError::ParametersCount { expected: idx + 1, found: args.len(), span }),
    }
}

fn arg_value<'a>(args: &'a [Value], idx: usize, span: Span) -> RuntimeResult<&'a Value> {
    args.get(idx).ok_or(RuntimeError::ParametersCount { expected: idx + 1, found: args.len(), span })
}

/// Resolve a user-supplied index against `len`, the same negative-index rule
/// `a[i]` uses (spec §4.5).
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

/// `insert` additionally allows `index == len` (insert at the end).
fn resolve_insert_index(i: i64, len: usize, span: Span) -> RuntimeResult<usize> {
    if i == len as i64 {
        return Ok(len);
    }
    resolve_index(i, len, span)
}

/// `remove`/`set` reject negative indices outright rather than resolving
/// them relative to `len`, matching the original's `IndexOutOfRangeError`
/// for any `index < 0`.
fn resolve_nonneg_index(i: i64, len: usize, span: Span) -> RuntimeResult<usize> {
    if i < 0 || i >= len as i64 {
        return Err(RuntimeError::IndexOutOfRange { index: i, length: len, span });
    }
    Ok(i as usize)
}

/// Cross-type total order used by `sort` (spec §4.6): `Bool < Int < Float <
/// String < Function < List < Nil`. Functions have no intrinsic order, so
/// ties among them fall back to pointer identity — deterministic within a
/// run, arbitrary across runs.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Int(_) => 1,
        Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Function(_) => 4,
        Value::List(_) => 5,
        Value::Nil => 6,
    }
}

fn total_order(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.as_ref().cmp(y.as_ref()),
        (Value::Function(x), Value::Function(y)) => Rc::as_ptr(x).cast::<()>().cmp(&Rc::as_ptr(y).cast::<()>()),
        (Value::List(x), Value::List(y)) => {
            let (xb, yb) = (x.borrow(), y.borrow());
            xb.iter().zip(yb.iter()).map(|(p, q)| total_order(p, q)).find(|o| *o != Ordering::Equal).unwrap_or_else(|| xb.len().cmp(&yb.len()))
        }
        (Value::Nil, Value::Nil) => Ordering::Equal,
        _ => unreachable!("same rank implies same tag"),
    }
}

fn file_error(function: &str, err: std::io::Error, span: Span) -> RuntimeError {
    RuntimeError::FileAccess { reason: format!("{function}: {err}"), span }
}

fn register_stdlib(registry: &mut BuiltinRegistry, rng: Rc<RefCell<ChaCha8Rng>>) {
    registry.register("abs", BuiltinKind::Value(Rc::new(|args, span, _| {
        arity_at_least(args, 1, span)?;
        match arg_value(args, 0, span)? {
            Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(RuntimeError::ArgumentType { function: "abs".into(), position: 1, expected: "Int or Float".into(), found: other.type_name().into(), span }),
        }
    })));

    registry.register("ceil", BuiltinKind::Value(Rc::new(|args, span, _| Ok(Value::Int(arg_number(args, 0, "ceil", span)?.ceil() as i64)))));
    registry.register("floor", BuiltinKind::Value(Rc::new(|args, span, _| Ok(Value::Int(arg_number(args, 0, "floor", span)?.floor() as i64)))));
    registry.register("round", BuiltinKind::Value(Rc::new(|args, span, _| Ok(Value::Int(arg_number(args, 0, "round", span)?.round() as i64)))));

    registry.register("sqrt", BuiltinKind::Value(Rc::new(|args, span, _| {
        let n = arg_number(args, 0, "sqrt", span)?;
        if n < 0.0 {
            return Err(RuntimeError::SqrtFromNegative { span });
        }
        Ok(Value::Float(n.sqrt()))
    })));

    {
        let rng = Rc::clone(&rng);
        registry.register("rnd", BuiltinKind::Value(Rc::new(move |args, span, _| {
            let mut rng = rng.borrow_mut();
            match args.len() {
                0 => Ok(Value::Float(rng.gen_range(0.0..1.0))),
                2 => {
                    let lo = arg_int(args, 0, "rnd", span)?;
                    let hi = arg_int(args, 1, "rnd", span)?;
                    if lo > hi {
                        return Err(RuntimeError::InvalidArgument { function: "rnd".into(), reason: "lower bound must not exceed upper bound".into(), span });
                    }
                    Ok(Value::Int(rng.gen_range(lo..=hi)))
                }
                found => Err(RuntimeError::ParametersCount { expected: 2, found, span }),
            }
        })));
    }

    registry.register("parse_num", BuiltinKind::Value(Rc::new(|args, span, _| {
        let s = arg_string(args, 0, "parse_num", span)?;
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        s.parse::<f64>().map(Value::Float).map_err(|_| RuntimeError::InvalidArgument { function: "parse_num".into(), reason: format!("{s:?} is not a number"), span })
    })));

    registry.register("to_string", BuiltinKind::Value(Rc::new(|args, span, _| Ok(Value::string(arg_value(args, 0, span)?.display_string())))));

    registry.register("len", BuiltinKind::Value(Rc::new(|args, span, _| match arg_value(args, 0, span)? {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::List(l) => Ok(Value::Int(l.borrow().len() as i64)),
        other => Err(RuntimeError::ArgumentType { function: "len".into(), position: 1, expected: "String or List".into(), found: other.type_name().into(), span }),
    })));

    registry.register("push", BuiltinKind::Value(Rc::new(|args, span, _| {
        let list = arg_list(args, 0, "push", span)?;
        let value = arg_value(args, 1, span)?.clone();
        list.borrow_mut().push(value);
        Ok(Value::List(list))
    })));

    registry.register("pop", BuiltinKind::Value(Rc::new(|args, span, _| {
        let list = arg_list(args, 0, "pop", span)?;
        if list.borrow_mut().pop().is_none() {
            return Err(RuntimeError::EmptyListPop { span });
        }
        Ok(Value::List(list))
    })));

    registry.register("insert", BuiltinKind::Value(Rc::new(|args, span, _| {
        let list = arg_list(args, 0, "insert", span)?;
        let index = arg_int(args, 1, "insert", span)?;
        let value = arg_value(args, 2, span)?.clone();
        let len = list.borrow().len();
        let at = resolve_insert_index(index, len, span)?;
        list.borrow_mut().insert(at, value);
        Ok(Value::List(list))
    })));

    registry.register("remove", BuiltinKind::Value(Rc::new(|args, span, _| {
        let list = arg_list(args, 0, "remove", span)?;
        let index = arg_int(args, 1, "remove", span)?;
        let len = list.borrow().len();
        let at = resolve_nonneg_index(index, len, span)?;
        list.borrow_mut().remove(at);
        Ok(Value::List(list))
    })));

    registry.register("set", BuiltinKind::Value(Rc::new(|args, span, _| {
        let list = arg_list(args, 0, "set", span)?;
        let index = arg_int(args, 1, "set", span)?;
        let value = arg_value(args, 2, span)?.clone();
        let len = list.borrow().len();
        let at = resolve_nonneg_index(index, len, span)?;
        list.borrow_mut()[at] = value;
        Ok(Value::List(list))
    })));

    registry.register("sort", BuiltinKind::Value(Rc::new(|args, span, _| {
        let list = arg_list(args, 0, "sort", span)?;
        list.borrow_mut().sort_by(total_order);
        Ok(Value::List(list))
    })));

    registry.register("range", BuiltinKind::Value(Rc::new(|args, span, _| {
        let (start, end, step) = match args.len() {
            1 => (0, arg_int(args, 0, "range", span)?, 1),
            2 => (arg_int(args, 0, "range", span)?, arg_int(args, 1, "range", span)?, 1),
            3 => (arg_int(args, 0, "range", span)?, arg_int(args, 1, "range", span)?, arg_int(args, 2, "range", span)?),
            found => return Err(RuntimeError::ParametersCount { expected: 1, found, span }),
        };
        if step == 0 {
            return Err(RuntimeError::InvalidArgument { function: "range".into(), reason: "step must not be zero".into(), span });
        }
        let mut items = Vec::new();
        let mut i = start;
        if step > 0 {
            while i < end {
                items.push(Value::Int(i));
                i += step;
            }
        } else {
            while i > end {
                items.push(Value::Int(i));
                i += step;
            }
        }
        Ok(Value::list(items))
    })));

    registry.register("lower", BuiltinKind::Value(Rc::new(|args, span, _| Ok(Value::string(arg_string(args, 0, "lower", span)?.to_lowercase())))));
    registry.register("upper", BuiltinKind::Value(Rc::new(|args, span, _| Ok(Value::string(arg_string(args, 0, "upper", span)?.to_uppercase())))));

    registry.register("split", BuiltinKind::Value(Rc::new(|args, span, _| {
        let s = arg_string(args, 0, "split", span)?;
        let sep = arg_string(args, 1, "split", span)?;
        let parts = if sep.is_empty() { s.chars().map(|c| Value::string(c.to_string())).collect() } else { s.split(sep.as_ref()).map(Value::string).collect() };
        Ok(Value::list(parts))
    })));

    registry.register("join", BuiltinKind::Value(Rc::new(|args, span, _| {
        let list = arg_list(args, 0, "join", span)?;
        let sep = arg_string(args, 1, "join", span)?;
        let joined = list.borrow().iter().map(|v| v.display_string()).collect::<Vec<_>>().join(&sep);
        Ok(Value::string(joined))
    })));

    registry.register("replace", BuiltinKind::Value(Rc::new(|args, span, _| {
        let s = arg_string(args, 0, "replace", span)?;
        let from = arg_string(args, 1, "replace", span)?;
        let to = arg_string(args, 2, "replace", span)?;
        Ok(Value::string(s.replace(from.as_ref(), &to)))
    })));

    registry.register("stacktrace", BuiltinKind::Value(Rc::new(|_args, _span, call_stack: &[CallStackFrame]| {
        let frames = call_stack.iter().map(|f| Value::list(vec![Value::string(f.function_name.clone()), Value::Int(f.call_site.line as i64)])).collect();
        Ok(Value::list(frames))
    })));

    registry.register("file_read", BuiltinKind::Value(Rc::new(|args, span, _| {
        let path = arg_string(args, 0, "file_read", span)?;
        fs::read_to_string(path.as_ref()).map(Value::string).map_err(|e| file_error("file_read", e, span))
    })));

    registry.register("file_read_lines", BuiltinKind::Value(Rc::new(|args, span, _| {
        let path = arg_string(args, 0, "file_read_lines", span)?;
        let content = fs::read_to_string(path.as_ref()).map_err(|e| file_error("file_read_lines", e, span))?;
        Ok(Value::list(content.lines().map(Value::string).collect()))
    })));

    registry.register("file_write", BuiltinKind::Value(Rc::new(|args, span, _| {
        let path = arg_string(args, 0, "file_write", span)?;
        let content = arg_string(args, 1, "file_write", span)?;
        fs::write(path.as_ref(), content.as_bytes()).map_err(|e| file_error("file_write", e, span))?;
        Ok(Value::Nil)
    })));

    registry.register("file_append", BuiltinKind::Value(Rc::new(|args, span, _| {
        use std::io::Write as _;
        let path = arg_string(args, 0, "file_append", span)?;
        let content = arg_string(args, 1, "file_append", span)?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path.as_ref()).map_err(|e| file_error("file_append", e, span))?;
        file.write_all(content.as_bytes()).map_err(|e| file_error("file_append", e, span))?;
        Ok(Value::Nil)
    })));

    registry.register("print", BuiltinKind::OutStream(Rc::new(|args, _span, _call_stack, out| {
        let rendered = args.iter().map(|v| v.display_string()).collect::<Vec<_>>().join(" ");
        write!(out, "{rendered}").ok();
        Ok(Value::Nil)
    })));

    registry.register("println", BuiltinKind::OutStream(Rc::new(|args, _span, _call_stack, out| {
        let rendered = args.iter().map(|v| v.display_string()).collect::<Vec<_>>().join(" ");
        writeln!(out, "{rendered}").ok();
        Ok(Value::Nil)
    })));

    registry.register("read", BuiltinKind::InStream(Rc::new(|_args, _span, _call_stack, input| {
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => Ok(Value::Nil),
            Ok(_) => Ok(Value::string(line.trim_end_matches(['\n', '\r']).to_string())),
            Err(_) => Ok(Value::Nil),
        }
    })));
}

#[cfg(test)]
mod tests {
    use super::*;
    use itmoscript_span::Position;

    fn span() -> Span {
        Span::new(Position::new(1, 1))
    }

    fn registry() -> BuiltinRegistry {
        use rand::SeedableRng;
        BuiltinRegistry::with_stdlib(Rc::new(RefCell::new(ChaCha8Rng::seed_from_u64(7))))
    }

    fn call(registry: &BuiltinRegistry, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        match registry.get(name).unwrap() {
            BuiltinKind::Value(f) => f(args, span(), &[]),
            _ => panic!("{name} is not a Value builtin"),
        }
    }

    #[test]
    fn sort_orders_by_type_then_value() {
        let registry = registry();
        let list = Value::list(vec![Value::Int(3), Value::Bool(true), Value::Int(1), Value::string("a")]);
        let sorted = call(&registry, "sort", std::slice::from_ref(&list)).unwrap();
        let Value::List(l) = sorted else { panic!() };
        let items = l.borrow();
        assert!(matches!(items[0], Value::Bool(true)));
        assert!(matches!(items[1], Value::Int(1)));
        assert!(matches!(items[2], Value::Int(3)));
        assert!(matches!(items[3], Value::String(ref s) if s.as_ref() == "a"));
    }

    #[test]
    fn range_three_arg_with_negative_step() {
        let registry = registry();
        let result = call(&registry, "range", &[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap();
        let Value::List(l) = result else { panic!() };
        let items: Vec<i64> = l.borrow().iter().map(|v| if let Value::Int(i) = v { *i } else { panic!() }).collect();
        assert_eq!(items, vec![5, 3, 1]);
    }

    #[test]
    fn pop_from_empty_list_errors() {
        let registry = registry();
        let err = call(&registry, "pop", &[Value::list(vec![])]).unwrap_err();
        assert!(matches!(err, RuntimeError::EmptyListPop { .. }));
    }

    #[test]
    fn negative_insert_index_resolves_relative_to_len() {
        let registry = registry();
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        call(&registry, "insert", &[list.clone(), Value::Int(-1), Value::Int(9)]).unwrap();
        let Value::List(l) = list else { panic!() };
        let items = l.borrow();
        assert!(matches!(items[1], Value::Int(9)));
    }

    #[test]
    fn parse_num_prefers_int() {
        let registry = registry();
        assert!(matches!(call(&registry, "parse_num", &[Value::string("42")]).unwrap(), Value::Int(42)));
        assert!(matches!(call(&registry, "parse_num", &[Value::string("4.5")]).unwrap(), Value::Float(f) if f == 4.5));
    }

    #[test]
    fn sqrt_of_negative_errors() {
        let registry = registry();
        let err = call(&registry, "sqrt", &[Value::Int(-4)]).unwrap_err();
        assert!(matches!(err, RuntimeError::SqrtFromNegative { .. }));
    }

    #[test]
    fn split_and_join_roundtrip() {
        let registry = registry();
        let parts = call(&registry, "split", &[Value::string("a,b,c"), Value::string(",")]).unwrap();
        let joined = call(&registry, "join", &[parts, Value::string("-")]).unwrap();
        assert!(matches!(joined, Value::String(ref s) if s.as_ref() == "a-b-c"));
    }
}
