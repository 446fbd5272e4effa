//! The builtin surface every program sees.
//!
//! Deliberately small: conversions, collection helpers and `print`. There is
//! no `open`, `eval`, `exec`, `getattr` or anything else that reaches outside
//! the interpreter; those names simply do not resolve.

use super::error::{ScriptError, ScriptResult};
use super::native::{Args, BuiltinFunction, CallContext, NativeFn};
use super::values::{Dict, Value, MAX_SEQUENCE_LEN};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

const BUILTINS: &[(&str, NativeFn)] = &[
    ("len", len),
    ("str", str_),
    ("int", int),
    ("float", float),
    ("bool", bool_),
    ("list", list),
    ("dict", dict),
    ("range", range),
    ("min", min),
    ("max", max),
    ("sum", sum),
    ("abs", abs),
    ("round", round),
    ("sorted", sorted),
    ("reversed", reversed),
    ("enumerate", enumerate),
    ("zip", zip),
    ("any", any),
    ("all", all),
    ("isinstance", isinstance),
    ("type", type_),
    ("print", print),
];

fn table() -> &'static HashMap<&'static str, Value> {
    static TABLE: OnceLock<HashMap<&'static str, Value>> = OnceLock::new();
    TABLE.get_or_init(|| {
        BUILTINS
            .iter()
            .map(|(name, func)| {
                (
                    *name,
                    Value::Builtin(Arc::new(BuiltinFunction::new(*name, *func))),
                )
            })
            .collect()
    })
}

pub fn lookup(name: &str) -> Option<Value> {
    table().get(name).cloned()
}

pub fn is_builtin(name: &str) -> bool {
    table().contains_key(name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

fn len(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("len", 1, 1, &[])?;
    let n = match args.value("len", 0)? {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Dict(map) => map.len(),
        other => {
            return Err(ScriptError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

fn str_(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("str", 0, 1, &[])?;
    Ok(Value::Str(
        args.get(0).map(|v| v.to_string()).unwrap_or_default(),
    ))
}

fn int(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("int", 0, 1, &[])?;
    match args.get(0) {
        None => Ok(Value::Int(0)),
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        Some(Value::Float(f)) => {
            if !f.is_finite() || *f >= i64::MAX as f64 || *f < i64::MIN as f64 {
                Err(ScriptError::Overflow)
            } else {
                Ok(Value::Int(f.trunc() as i64))
            }
        }
        Some(Value::Str(s)) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
            ScriptError::value_error(format!("invalid literal for int() with base 10: '{}'", s))
        }),
        Some(other) => Err(ScriptError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("float", 0, 1, &[])?;
    match args.get(0) {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => s
            .trim()
            .to_ascii_lowercase()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ScriptError::value_error(format!("could not convert string to float: '{}'", s))),
        Some(other) => other.as_f64().map(Value::Float).ok_or_else(|| {
            ScriptError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn bool_(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("bool", 0, 1, &[])?;
    Ok(Value::Bool(
        args.get(0).map(Value::is_truthy).unwrap_or(false),
    ))
}

fn list(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("list", 0, 1, &[])?;
    match args.get(0) {
        None => Ok(Value::List(Vec::new())),
        Some(value) => value.iterate().map(Value::List),
    }
}

/// `dict()`, `dict(mapping)`, `dict(pairs)` and `dict(key=value, ...)`.
fn dict(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check_arity("dict", 0, 1)?;
    let mut out = Dict::new();
    match args.get(0) {
        None => {}
        Some(Value::Dict(map)) => out = map.clone(),
        Some(other) => {
            for pair in other.iterate()? {
                match pair {
                    Value::List(kv) if kv.len() == 2 => match &kv[0] {
                        Value::Str(k) => {
                            out.insert(k.clone(), kv[1].clone());
                        }
                        key => {
                            return Err(ScriptError::type_error(format!(
                                "dict keys must be str, not {}",
                                key.type_name()
                            )))
                        }
                    },
                    _ => {
                        return Err(ScriptError::value_error(
                            "dict() sequence elements must be [key, value] pairs",
                        ))
                    }
                }
            }
        }
    }
    for (k, v) in args.keyword {
        out.insert(k, v);
    }
    Ok(Value::Dict(out))
}

fn range(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("range", 1, 3, &[])?;
    let (start, stop, step) = match args.len() {
        1 => (0, args.int("range", 0)?, 1),
        2 => (args.int("range", 0)?, args.int("range", 1)?, 1),
        _ => (
            args.int("range", 0)?,
            args.int("range", 1)?,
            args.int("range", 2)?,
        ),
    };
    if step == 0 {
        return Err(ScriptError::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        (stop as i128 - start as i128 + step as i128 - 1) / step as i128
    } else {
        (start as i128 - stop as i128 - step as i128 - 1) / (-(step as i128))
    };
    let count = span.max(0);
    if count > MAX_SEQUENCE_LEN as i128 {
        return Err(ScriptError::value_error("range() result is too large"));
    }
    Ok(Value::List(
        (0..count as i64)
            .map(|i| Value::Int(start + i * step))
            .collect(),
    ))
}

/// Shared body of `min` and `max`: one iterable or several arguments, with an
/// optional `key` function.
fn extreme(ctx: &mut dyn CallContext, args: Args, name: &str, want: Ordering) -> ScriptResult<Value> {
    args.check(name, 1, usize::MAX, &["key", "default"])?;
    let candidates = if args.len() == 1 {
        args.positional[0].iterate()?
    } else {
        args.positional.clone()
    };
    let key = args.kwarg("key").filter(|k| !matches!(k, Value::None)).cloned();
    let mut best: Option<(Value, Value)> = None;
    for candidate in candidates {
        let rank = match &key {
            Some(func) => ctx.call(func, vec![candidate.clone()])?,
            None => candidate.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => rank.compare(best_rank)? == want,
        };
        if replace {
            best = Some((rank, candidate));
        }
    }
    match best {
        Some((_, value)) => Ok(value),
        None => args.kwarg("default").cloned().ok_or_else(|| {
            ScriptError::value_error(format!("{}() arg is an empty sequence", name))
        }),
    }
}

fn min(ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    extreme(ctx, args, "min", Ordering::Less)
}

fn max(ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    extreme(ctx, args, "max", Ordering::Greater)
}

fn sum(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("sum", 1, 2, &["start"])?;
    let mut total = args.arg(1, "start").cloned().unwrap_or(Value::Int(0));
    for item in args.positional[0].iterate()? {
        total = match (&total, &item) {
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                match (total.as_f64(), item.as_f64()) {
                    (Some(a), Some(b)) => Value::Float(a + b),
                    _ => return Err(unsupported_sum(&total, &item)),
                }
            }
            _ => match (total.as_int(), item.as_int()) {
                (Some(a), Some(b)) => Value::Int(a.checked_add(b).ok_or(ScriptError::Overflow)?),
                _ => return Err(unsupported_sum(&total, &item)),
            },
        };
    }
    Ok(total)
}

fn unsupported_sum(a: &Value, b: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for +: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

fn abs(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("abs", 1, 1, &[])?;
    match args.value("abs", 0)? {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => match other.as_int() {
            Some(i) => i.checked_abs().map(Value::Int).ok_or(ScriptError::Overflow),
            None => Err(ScriptError::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
        },
    }
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

/// Banker's rounding. Without `ndigits` the result is an int.
fn round(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("round", 1, 2, &["ndigits"])?;
    let value = args.value("round", 0)?;
    let ndigits = match args.arg(1, "ndigits") {
        None | Some(Value::None) => None,
        Some(v) => Some(
            v.as_int()
                .ok_or_else(|| ScriptError::type_error("round() ndigits must be an int"))?,
        ),
    };
    if let (Some(i), None) = (value.as_int(), ndigits) {
        return Ok(Value::Int(i));
    }
    let x = args.number("round", 0)?;
    match ndigits {
        None => {
            let r = round_half_even(x);
            if !r.is_finite() || r >= i64::MAX as f64 || r < i64::MIN as f64 {
                return Err(ScriptError::Overflow);
            }
            Ok(Value::Int(r as i64))
        }
        Some(n) => {
            let factor = 10f64.powi(n.clamp(-300, 300) as i32);
            Ok(Value::Float(round_half_even(x * factor) / factor))
        }
    }
}

fn sorted(ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("sorted", 1, 1, &["key", "reverse"])?;
    let items = args.positional[0].iterate()?;
    let key = args.kwarg("key").filter(|k| !matches!(k, Value::None)).cloned();
    let mut ranked = Vec::with_capacity(items.len());
    for item in items {
        let rank = match &key {
            Some(func) => ctx.call(func, vec![item.clone()])?,
            None => item.clone(),
        };
        ranked.push((rank, item));
    }

    let mut failure: Option<ScriptError> = None;
    ranked.sort_by(|(a, _), (b, _)| match a.compare(b) {
        Ok(ordering) => ordering,
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }

    let mut out: Vec<Value> = ranked.into_iter().map(|(_, item)| item).collect();
    if args.kwarg("reverse").map(Value::is_truthy).unwrap_or(false) {
        out.reverse();
    }
    Ok(Value::List(out))
}

fn reversed(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("reversed", 1, 1, &[])?;
    let mut items = args.positional[0].iterate()?;
    items.reverse();
    Ok(Value::List(items))
}

/// Pairs are two-element lists.
fn enumerate(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("enumerate", 1, 2, &["start"])?;
    let start = match args.arg(1, "start") {
        Some(v) => v
            .as_int()
            .ok_or_else(|| ScriptError::type_error("enumerate() start must be an int"))?,
        None => 0,
    };
    let items = args.positional[0].iterate()?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let index = start.checked_add(i as i64).ok_or(ScriptError::Overflow)?;
        out.push(Value::List(vec![Value::Int(index), item]));
    }
    Ok(Value::List(out))
}

fn zip(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("zip", 0, usize::MAX, &[])?;
    let columns = args
        .positional
        .iter()
        .map(Value::iterate)
        .collect::<ScriptResult<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::List(
        (0..rows)
            .map(|row| Value::List(columns.iter().map(|col| col[row].clone()).collect()))
            .collect(),
    ))
}

fn any(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("any", 1, 1, &[])?;
    Ok(Value::Bool(
        args.positional[0].iterate()?.iter().any(Value::is_truthy),
    ))
}

fn all(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("all", 1, 1, &[])?;
    Ok(Value::Bool(
        args.positional[0].iterate()?.iter().all(Value::is_truthy),
    ))
}

fn matches_type(value: &Value, ty: &Value) -> ScriptResult<bool> {
    match ty {
        Value::Builtin(builtin) => Ok(match builtin.name.as_str() {
            "str" => matches!(value, Value::Str(_)),
            "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
            "float" => matches!(value, Value::Float(_)),
            "bool" => matches!(value, Value::Bool(_)),
            "list" => matches!(value, Value::List(_)),
            "dict" => matches!(value, Value::Dict(_)),
            other => {
                return Err(ScriptError::type_error(format!(
                    "isinstance() arg 2 must be a type, not {}",
                    other
                )))
            }
        }),
        Value::List(options) => {
            for option in options {
                if matches_type(value, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(ScriptError::type_error(format!(
            "isinstance() arg 2 must be a type or list of types, not {}",
            other.type_name()
        ))),
    }
}

fn isinstance(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("isinstance", 2, 2, &[])?;
    Ok(Value::Bool(matches_type(&args.positional[0], &args.positional[1])?))
}

/// The type's name as a string.
fn type_(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("type", 1, 1, &[])?;
    Ok(Value::Str(args.positional[0].type_name().to_string()))
}

fn print(ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("print", 0, usize::MAX, &["sep"])?;
    let sep = match args.kwarg("sep") {
        Some(Value::Str(s)) => s.clone(),
        Some(Value::None) | None => " ".to_string(),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "sep must be None or a string, not {}",
                other.type_name()
            )))
        }
    };
    let line = args
        .positional
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&sep);
    ctx.print(line);
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(3.5), 4.0);
        assert_eq!(round_half_even(-2.5), -2.0);
        assert_eq!(round_half_even(2.4), 2.0);
    }

    #[test]
    fn test_no_escape_hatches_are_builtins() {
        for name in ["eval", "exec", "open", "__import__", "getattr", "globals", "compile"] {
            assert!(!is_builtin(name), "{} must not be a builtin", name);
        }
    }
}
