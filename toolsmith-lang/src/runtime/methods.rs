//! Methods callable on strings, lists and dicts (`"a,b".split(",")`).
//!
//! None of them mutate their receiver.

use super::error::{ScriptError, ScriptResult};
use super::native::Args;
use super::values::{format_float, Value, MAX_SEQUENCE_LEN};

pub fn call_method(receiver: &Value, method: &str, args: Args) -> ScriptResult<Value> {
    match receiver {
        Value::Str(s) => str_method(s, method, args),
        Value::List(items) => list_method(items, method, args),
        Value::Dict(map) => dict_method(map, method, args),
        other => Err(no_attribute(other, method)),
    }
}

fn no_attribute(receiver: &Value, method: &str) -> ScriptError {
    ScriptError::AttributeError(format!(
        "'{}' object has no attribute '{}'",
        receiver.type_name(),
        method
    ))
}

fn optional_chars<'a>(args: &'a Args, func: &str) -> ScriptResult<Option<&'a str>> {
    match args.get(0) {
        None | Some(Value::None) => Ok(None),
        Some(_) => args.str(func, 0).map(Some),
    }
}

fn str_method(s: &str, method: &str, args: Args) -> ScriptResult<Value> {
    let qualified = format!("str.{}", method);
    let func = qualified.as_str();
    match method {
        "upper" => {
            args.check(func, 0, 0, &[])?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "lower" => {
            args.check(func, 0, 0, &[])?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            args.check(func, 0, 1, &[])?;
            let chars = optional_chars(&args, func)?;
            let matcher = |c: char| match chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            let out = match method {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(Value::Str(out.to_string()))
        }
        "split" => {
            args.check(func, 0, 2, &["sep", "maxsplit"])?;
            let sep = match args.arg(0, "sep") {
                None | Some(Value::None) => None,
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(ScriptError::value_error("empty separator"))
                }
                Some(Value::Str(sep)) => Some(sep.as_str()),
                Some(other) => {
                    return Err(ScriptError::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )))
                }
            };
            let maxsplit = match args.arg(1, "maxsplit") {
                Some(v) => v
                    .as_int()
                    .ok_or_else(|| ScriptError::type_error("maxsplit must be an int"))?,
                None => -1,
            };
            let parts: Vec<Value> = match (sep, maxsplit) {
                (Some(sep), n) if n >= 0 => s.splitn(n as usize + 1, sep).map(Value::from).collect(),
                (Some(sep), _) => s.split(sep).map(Value::from).collect(),
                (None, n) if n >= 0 => {
                    let mut parts = Vec::new();
                    let mut rest = s.trim_start();
                    while !rest.is_empty() {
                        if parts.len() as i64 == n {
                            parts.push(Value::from(rest.trim_end()));
                            break;
                        }
                        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                        parts.push(Value::from(&rest[..end]));
                        rest = rest[end..].trim_start();
                    }
                    parts
                }
                (None, _) => s.split_whitespace().map(Value::from).collect(),
            };
            Ok(Value::List(parts))
        }
        "join" => {
            args.check(func, 1, 1, &[])?;
            let mut pieces = Vec::new();
            for item in args.value(func, 0)?.iterate()? {
                match item {
                    Value::Str(piece) => pieces.push(piece),
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            pieces.len(),
                            other.type_name()
                        )))
                    }
                }
            }
            Ok(Value::Str(pieces.join(s)))
        }
        "replace" => {
            args.check(func, 2, 3, &[])?;
            let old = args.str(func, 0)?;
            let new = args.str(func, 1)?;
            let out = match args.get(2) {
                Some(_) => {
                    let count = args.int(func, 2)?;
                    if count < 0 {
                        s.replace(old, new)
                    } else {
                        s.replacen(old, new, count as usize)
                    }
                }
                None => s.replace(old, new),
            };
            if out.len() > MAX_SEQUENCE_LEN {
                return Err(ScriptError::value_error("resulting string is too large"));
            }
            Ok(Value::Str(out))
        }
        "startswith" | "endswith" => {
            args.check(func, 1, 1, &[])?;
            let candidates = match args.value(func, 0)? {
                Value::Str(prefix) => vec![prefix.clone()],
                Value::List(options) => options
                    .iter()
                    .map(|o| {
                        o.as_str().map(str::to_string).ok_or_else(|| {
                            ScriptError::type_error(format!("{} expects str or list of str", func))
                        })
                    })
                    .collect::<ScriptResult<Vec<_>>>()?,
                other => {
                    return Err(ScriptError::type_error(format!(
                        "{} arg must be str or list of str, not {}",
                        func,
                        other.type_name()
                    )))
                }
            };
            let hit = candidates.iter().any(|c| {
                if method == "startswith" {
                    s.starts_with(c.as_str())
                } else {
                    s.ends_with(c.as_str())
                }
            });
            Ok(Value::Bool(hit))
        }
        "find" => {
            args.check(func, 1, 1, &[])?;
            let needle = args.str(func, 0)?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte_idx) => s[..byte_idx].chars().count() as i64,
                None => -1,
            }))
        }
        "format" => format_string(s, &args).map(Value::Str),
        _ => Err(no_attribute(&Value::Str(String::new()), method)),
    }
}

fn list_method(items: &[Value], method: &str, args: Args) -> ScriptResult<Value> {
    match method {
        "index" => {
            args.check("list.index", 1, 1, &[])?;
            let needle = &args.positional[0];
            items
                .iter()
                .position(|v| v == needle)
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| ScriptError::value_error(format!("{} is not in list", needle.repr())))
        }
        "count" => {
            args.check("list.count", 1, 1, &[])?;
            let needle = &args.positional[0];
            Ok(Value::Int(items.iter().filter(|v| *v == needle).count() as i64))
        }
        _ => Err(no_attribute(&Value::List(Vec::new()), method)),
    }
}

fn dict_method(
    map: &indexmap::IndexMap<String, Value>,
    method: &str,
    args: Args,
) -> ScriptResult<Value> {
    match method {
        "get" => {
            args.check("dict.get", 1, 2, &[])?;
            let found = args
                .positional[0]
                .as_str()
                .and_then(|key| map.get(key))
                .cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.check("dict.keys", 0, 0, &[])?;
            Ok(Value::List(map.keys().map(|k| Value::Str(k.clone())).collect()))
        }
        "values" => {
            args.check("dict.values", 0, 0, &[])?;
            Ok(Value::List(map.values().cloned().collect()))
        }
        "items" => {
            args.check("dict.items", 0, 0, &[])?;
            Ok(Value::List(
                map.iter()
                    .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            ))
        }
        _ => Err(no_attribute(&Value::Dict(Default::default()), method)),
    }
}

/// `"{} has {count:>4} items ({:.1f}%)".format(...)`
///
/// Supports automatic and explicit positional fields, keyword fields, `{{`
/// and `}}` escapes, and a format spec of `[[fill]align][width][.precision][type]`
/// with types `s`, `d` and `f`.
pub fn format_string(template: &str, args: &Args) -> ScriptResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(ScriptError::value_error(
                                "single '{' encountered in format string",
                            ))
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, spec),
                    None => (field.as_str(), ""),
                };
                let value = if name.is_empty() {
                    let value = args.get(auto_index).ok_or_else(|| {
                        ScriptError::IndexError(format!(
                            "replacement index {} out of range",
                            auto_index
                        ))
                    })?;
                    auto_index += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).ok_or_else(|| {
                        ScriptError::IndexError(format!("replacement index {} out of range", index))
                    })?
                } else {
                    args.kwarg(name)
                        .ok_or_else(|| ScriptError::KeyError(format!("'{}'", name)))?
                };
                out.push_str(&apply_spec(value, spec)?);
            }
            '}' => {
                return Err(ScriptError::value_error(
                    "single '}' encountered in format string",
                ))
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn apply_spec(value: &Value, spec: &str) -> ScriptResult<String> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let chars: Vec<char> = spec.chars().collect();
    let mut pos = 0;
    let mut fill = ' ';
    let mut align = None;
    let is_align = |c: char| matches!(c, '<' | '>' | '^');
    if chars.len() >= 2 && is_align(chars[1]) {
        fill = chars[0];
        align = Some(chars[1]);
        pos = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        align = Some(chars[0]);
        pos = 1;
    }
    let mut width = String::new();
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        width.push(chars[pos]);
        pos += 1;
    }
    let mut precision = None;
    if pos < chars.len() && chars[pos] == '.' {
        pos += 1;
        let mut digits = String::new();
        while pos < chars.len() && chars[pos].is_ascii_digit() {
            digits.push(chars[pos]);
            pos += 1;
        }
        precision = digits.parse::<usize>().ok();
    }
    let kind = chars.get(pos).copied();
    if pos + 1 < chars.len() {
        return Err(ScriptError::value_error(format!("invalid format spec '{}'", spec)));
    }

    let body = match kind {
        Some('f') => {
            let x = value.as_f64().ok_or_else(|| {
                ScriptError::value_error(format!(
                    "unknown format code 'f' for object of type '{}'",
                    value.type_name()
                ))
            })?;
            format!("{:.*}", precision.unwrap_or(6), x)
        }
        Some('d') => match value {
            Value::Int(i) => i.to_string(),
            other => {
                return Err(ScriptError::value_error(format!(
                    "unknown format code 'd' for object of type '{}'",
                    other.type_name()
                )))
            }
        },
        Some('s') | None => match (value, precision) {
            (Value::Float(x), Some(p)) => format!("{:.*}", p, x),
            (Value::Float(x), None) => format_float(*x),
            (other, Some(p)) if matches!(other, Value::Str(_)) => other.to_string().chars().take(p).collect(),
            (other, _) => other.to_string(),
        },
        Some(other) => {
            return Err(ScriptError::value_error(format!(
                "unknown format code '{}'",
                other
            )))
        }
    };

    let width = width.parse::<usize>().unwrap_or(0).min(10_000);
    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    let numeric = matches!(value, Value::Int(_) | Value::Float(_));
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    let fill_n = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    Ok(match align {
        '>' => format!("{}{}", fill_n(pad), body),
        '^' => format!("{}{}{}", fill_n(pad / 2), body, fill_n(pad - pad / 2)),
        _ => format!("{}{}", body, fill_n(pad)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fmt(template: &str, positional: Vec<Value>, keyword: Vec<(&str, Value)>) -> String {
        let args = Args {
            positional,
            keyword: keyword
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        format_string(template, &args).unwrap()
    }

    #[test]
    fn test_format_fields_and_specs() {
        assert_eq!(
            fmt(
                "{} has {n:>3} items ({:.1f}%) {{ok}}",
                vec![Value::from("cart"), Value::Float(12.345)],
                vec![("n", Value::Int(7))]
            ),
            "cart has   7 items (12.3%) {ok}"
        );
        assert_eq!(fmt("{0}-{0}", vec![Value::from("x")], vec![]), "x-x");
        assert_eq!(fmt("[{:*^7}]", vec![Value::from("mid")], vec![]), "[**mid**]");
    }

    #[test]
    fn test_split_without_separator_collapses_whitespace() {
        let result = call_method(&Value::from("  a  b c "), "split", Args::default()).unwrap();
        assert_eq!(result, Value::List(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn test_unknown_method_is_attribute_error() {
        let err = call_method(&Value::Int(1), "upper", Args::default()).unwrap_err();
        assert!(matches!(err, ScriptError::AttributeError(_)));
    }
}
