//! Runtime values.
//!
//! Lists and dicts have value semantics: assignment copies, and the only way
//! to change a container held in a variable is an index assignment on that
//! variable. Dict keys are always strings so every container value maps onto
//! JSON without loss.

use super::error::{ScriptError, ScriptResult};
use super::modules::ModuleHandle;
use super::namespace::Namespace;
use super::native::BuiltinFunction;
use crate::ast::FunctionDef;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

pub type Dict = IndexMap<String, Value>;

/// Upper bound on the length of any list or string built by an operator or
/// builtin.
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(Dict),
    Function(Arc<Closure>),
    Builtin(Arc<BuiltinFunction>),
    Module(Arc<ModuleHandle>),
}

/// A user-defined function together with the scope it was defined in.
pub struct Closure {
    pub def: Arc<FunctionDef>,
    /// Evaluated default for each parameter, `None` when the parameter is required.
    pub defaults: Vec<Option<Value>>,
    /// Held weakly: the namespace owns the closure through its bindings.
    pub globals: Weak<Namespace>,
    /// Locals of the enclosing function at definition time.
    pub captured: HashMap<String, Value>,
    pub nested: bool,
}

impl Closure {
    /// A module-level function bound to `globals`.
    pub fn new(def: Arc<FunctionDef>, defaults: Vec<Option<Value>>, globals: &Arc<Namespace>) -> Self {
        Closure {
            def,
            defaults,
            globals: Arc::downgrade(globals),
            captured: HashMap::new(),
            nested: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// A copy that reaches itself through its own frame, so it stays
    /// callable by name without being bound in its namespace.
    pub fn self_bound(&self) -> Closure {
        Closure {
            def: self.def.clone(),
            defaults: self.defaults.clone(),
            globals: self.globals.clone(),
            captured: self.captured.clone(),
            nested: true,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::Module(_) => "module",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Module(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, with booleans counting as 0 and 1.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric view of ints, floats and booleans.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    /// The `repr()` form: strings quoted, containers recursive.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            other => other.to_string(),
        }
    }

    /// Element-wise iteration for `for`, `list()` and friends.
    pub fn iterate(&self) -> ScriptResult<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Dict(map) => Ok(map.keys().map(|k| Value::Str(k.clone())).collect()),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Ordering for `<`, `sorted()`, `min()` and `max()`.
    pub fn compare(&self, other: &Value) -> ScriptResult<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => Ok(x.cmp(&y)),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                    _ => Err(ScriptError::type_error(format!(
                        "'<' not supported between instances of '{}' and '{}'",
                        a.type_name(),
                        b.type_name()
                    ))),
                },
            },
        }
    }

    /// Membership test behind `in` and `not in`.
    pub fn contains(&self, item: &Value) -> ScriptResult<bool> {
        match self {
            Value::List(items) => Ok(items.iter().any(|v| v == item)),
            Value::Dict(map) => Ok(item.as_str().map(|k| map.contains_key(k)).unwrap_or(false)),
            Value::Str(s) => match item {
                Value::Str(needle) => Ok(s.contains(needle.as_str())),
                other => Err(ScriptError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            other => Err(ScriptError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    pub fn to_json(&self) -> ScriptResult<serde_json::Value> {
        match self {
            Value::None => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(i) => Ok(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    ScriptError::value_error(format!("float {} is not JSON compliant", f))
                }),
            Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
            Value::List(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<ScriptResult<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Dict(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
            other => Err(ScriptError::type_error(format!(
                "object of type {} is not JSON serializable",
                other.type_name()
            ))),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                },
            },
        }
    }
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// `str()` form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", quote(k), v.repr())?;
                }
                write!(f, "}}")
            }
            Value::Function(closure) => write!(f, "<function {}>", closure.name()),
            Value::Builtin(builtin) => write!(f, "<built-in function {}>", builtin.name),
            Value::Module(module) => write!(f, "<module '{}'>", module.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_display_matches_script_conventions() {
        let value = Value::from_json(&json!({"a": [1, 2.0, "x"], "b": null, "c": true}));
        assert_eq!(value.to_string(), "{'a': [1, 2.0, 'x'], 'b': None, 'c': True}");
    }

    #[test]
    fn test_numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Str("2".into()));
    }

    #[test]
    fn test_json_roundtrip_preserves_key_order() {
        let original = json!({"z": 1, "a": {"y": [true, null]}});
        let value = Value::from_json(&original);
        assert_eq!(value.to_json().unwrap(), original);
        let keys: Vec<String> = match &value {
            Value::Dict(map) => map.keys().cloned().collect(),
            _ => unreachable!(),
        };
        assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_non_finite_float_is_not_json() {
        assert!(Value::Float(f64::INFINITY).to_json().is_err());
    }

    #[test]
    fn test_compare_rejects_mixed_types() {
        assert!(Value::Int(1).compare(&Value::Str("a".into())).is_err());
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)])
                .compare(&Value::List(vec![Value::Int(1)]))
                .unwrap(),
            Ordering::Greater
        );
    }
}
