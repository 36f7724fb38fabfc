//! The runtime value model (spec §3 "Value", §4.3 "Value model") and the
//! lexically-scoped environment frames closures capture (spec §3
//! "Environment"). The two live in the same module because `Value::Function`
//! holds a captured `EnvHandle` and `Frame` holds `Value`s — they're mutually
//! recursive, so they can't be split across crates the way the component
//! table in spec §2 otherwise suggests (see DESIGN.md).

use crate::ast::Stmt;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type ListHandle = Rc<RefCell<Vec<Value>>>;
pub type StringHandle = Rc<str>;
pub type FunctionHandle = Rc<FunctionData>;
pub type EnvHandle = Rc<RefCell<Frame>>;

/// The captured state of a function literal (spec §3 "Function literal":
/// `{parameters, body, captured_environment}`).
#[derive(Debug)]
pub struct FunctionData {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub captured_env: EnvHandle,
}

/// A tagged union over the seven value kinds ItmoScript programs manipulate
/// (spec §3 "Value"). `String` and `List` are shared-ownership handles;
/// `Function` is identity-compared.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(StringHandle),
    List(ListHandle),
    Function(FunctionHandle),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// The tag name used in diagnostics (e.g. `OperatorTypeError`'s operand
    /// type names).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Bool(_) => "Bool",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Function(_) => "Function",
        }
    }

    /// Truthiness (spec §4.3): nil is false, bool is itself, numbers are
    /// nonzero, strings/lists are non-empty, functions are always true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Function(_) => true,
        }
    }

    /// Structural equality for same-tagged operands, identity equality for
    /// functions, nil-equals-only-nil otherwise. Cross-tag pairs (other than
    /// through the numeric promotion the operator dispatcher performs) are
    /// `false`, never an error (spec §4.3, and the pinned ambiguity in §9:
    /// `5 == true` is `false`, not an error).
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The string shown by `print`/`to_string`/the REPL: strings render
    /// unquoted at top level, but quoted when nested inside a list (spec
    /// §4.3 "Stringification").
    pub fn display_string(&self) -> String {
        self.stringify(true)
    }

    fn stringify(&self, top_level: bool) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => {
                if top_level {
                    s.to_string()
                } else {
                    format!("\"{s}\"")
                }
            }
            Value::List(items) => {
                let rendered: Vec<String> = items.borrow().iter().map(|v| v.stringify(false)).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Function(f) => format!("<Function object>({})", f.params.join(", ")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

/// Format a float with the shortest round-trippable decimal representation,
/// always keeping a visible fractional marker so `2.0` never prints
/// identically to the integer `2` (spec §9 "Float formatting").
fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let rendered = format!("{value}");
    if rendered.contains('.') || rendered.contains('e') || rendered.contains('E') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

/// A lexically scoped frame: a name→value map plus an optional parent
/// (spec §3 "Environment"). The global frame has `parent: None`.
#[derive(Debug)]
pub struct Frame {
    bindings: IndexMap<String, Value>,
    parent: Option<EnvHandle>,
}

impl Frame {
    pub fn new_global() -> EnvHandle {
        Rc::new(RefCell::new(Frame { bindings: IndexMap::new(), parent: None }))
    }

    pub fn child_of(parent: &EnvHandle) -> EnvHandle {
        Rc::new(RefCell::new(Frame { bindings: IndexMap::new(), parent: Some(Rc::clone(parent)) }))
    }

    /// Bind `name` in *this* frame, shadowing any enclosing binding.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Resolve `name` by walking the frame's parent chain (spec §3
/// "Environment": "Lookup walks the parent chain").
pub fn lookup(env: &EnvHandle, name: &str) -> Option<Value> {
    let frame = env.borrow();
    if let Some(value) = frame.bindings.get(name) {
        return Some(value.clone());
    }
    match &frame.parent {
        Some(parent) => {
            let parent = Rc::clone(parent);
            drop(frame);
            lookup(&parent, name)
        }
        None => None,
    }
}

/// Assignment rule (spec §4.5): update the nearest enclosing frame that
/// already binds `name`, or bind in `env` itself if none does. Returns
/// whether an existing binding was found and updated, purely so callers that
/// care (none currently do) can distinguish the two cases.
pub fn assign_or_define(env: &EnvHandle, name: &str, value: Value) -> bool {
    if assign_existing(env, name, value.clone()) {
        return true;
    }
    env.borrow_mut().define(name, value);
    false
}

fn assign_existing(env: &EnvHandle, name: &str, value: Value) -> bool {
    let mut frame = env.borrow_mut();
    if frame.has_local(name) {
        frame.define(name, value);
        return true;
    }
    let parent = frame.parent.clone();
    drop(frame);
    match parent {
        Some(parent) => assign_existing(&parent, name, value),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec_table() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::list(vec![Value::Nil]).is_truthy());
    }

    #[test]
    fn nil_equals_only_nil() {
        assert!(Value::Nil.structural_eq(&Value::Nil));
        assert!(!Value::Nil.structural_eq(&Value::Int(0)));
        assert!(!Value::Bool(false).structural_eq(&Value::Nil));
    }

    #[test]
    fn closures_are_never_structurally_equal() {
        let env = Frame::new_global();
        let a = Value::Function(Rc::new(FunctionData { params: vec![], body: vec![], captured_env: Rc::clone(&env) }));
        let b = Value::Function(Rc::new(FunctionData { params: vec![], body: vec![], captured_env: env }));
        assert!(!a.structural_eq(&b));
    }

    #[test]
    fn string_quoting_depends_on_nesting() {
        let s = Value::string("hi");
        assert_eq!(s.display_string(), "hi");
        let list = Value::list(vec![s]);
        assert_eq!(list.display_string(), "[\"hi\"]");
    }

    #[test]
    fn float_formatting_keeps_decimal_marker() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(2.5), "2.5");
    }

    #[test]
    fn environment_assign_updates_enclosing_frame() {
        let global = Frame::new_global();
        global.borrow_mut().define("x", Value::Int(1));
        let inner = Frame::child_of(&global);
        assign_or_define(&inner, "x", Value::Int(2));
        assert!(!inner.borrow().has_local("x"));
        assert!(matches!(lookup(&global, "x"), Some(Value::Int(2))));
    }
}
