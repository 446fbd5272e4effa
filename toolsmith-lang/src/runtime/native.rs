//! Calling convention for functions implemented in Rust.

use super::error::{ScriptError, ScriptResult};
use super::values::Value;
use std::fmt;

/// What a native function may ask of the interpreter that called it.
pub trait CallContext {
    /// Call a script or native function with positional arguments.
    fn call(&mut self, callee: &Value, args: Vec<Value>) -> ScriptResult<Value>;

    /// Emit one line of `print()` output.
    fn print(&mut self, line: String);
}

pub type NativeFn = fn(&mut dyn CallContext, Args) -> ScriptResult<Value>;

pub struct BuiltinFunction {
    pub name: String,
    pub func: NativeFn,
}

impl BuiltinFunction {
    pub fn new(name: impl Into<String>, func: NativeFn) -> Self {
        BuiltinFunction {
            name: name.into(),
            func,
        }
    }
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// Arguments of a native call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Args {
            positional,
            keyword: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Enforce the positional arity and the set of accepted keyword names.
    pub fn check(&self, func: &str, min: usize, max: usize, keywords: &[&str]) -> ScriptResult<()> {
        self.check_arity(func, min, max)?;
        if let Some((name, _)) = self
            .keyword
            .iter()
            .find(|(name, _)| !keywords.contains(&name.as_str()))
        {
            return Err(ScriptError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, name
            )));
        }
        Ok(())
    }

    /// Enforce the positional arity only; any keyword is accepted.
    pub fn check_arity(&self, func: &str, min: usize, max: usize) -> ScriptResult<()> {
        let given = self.positional.len();
        if given < min || given > max {
            let expected = if min == max {
                format!("{}", min)
            } else if max == usize::MAX {
                format!("at least {}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(ScriptError::type_error(format!(
                "{}() takes {} positional argument(s) but {} were given",
                func, expected, given
            )));
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.keyword
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Positional argument `index`, falling back to keyword `name`.
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.get(index).or_else(|| self.kwarg(name))
    }

    pub fn value(&self, func: &str, index: usize) -> ScriptResult<&Value> {
        self.get(index).ok_or_else(|| {
            ScriptError::type_error(format!("{}() missing argument {}", func, index + 1))
        })
    }

    pub fn str(&self, func: &str, index: usize) -> ScriptResult<&str> {
        match self.value(func, index)? {
            Value::Str(s) => Ok(s),
            other => Err(ScriptError::type_error(format!(
                "{}() argument {} must be str, not {}",
                func,
                index + 1,
                other.type_name()
            ))),
        }
    }

    pub fn int(&self, func: &str, index: usize) -> ScriptResult<i64> {
        let value = self.value(func, index)?;
        value.as_int().ok_or_else(|| {
            ScriptError::type_error(format!(
                "{}() argument {} must be int, not {}",
                func,
                index + 1,
                value.type_name()
            ))
        })
    }

    pub fn number(&self, func: &str, index: usize) -> ScriptResult<f64> {
        let value = self.value(func, index)?;
        value.as_f64().ok_or_else(|| {
            ScriptError::type_error(format!(
                "{}() argument {} must be a number, not {}",
                func,
                index + 1,
                value.type_name()
            ))
        })
    }
}
