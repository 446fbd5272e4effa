//! Regular expressions. Matches are returned as plain dicts with `match`,
//! `groups`, `start` and `end` keys.

use super::ModuleHandle;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::{Dict, Value};
use regex::{Captures, Regex, RegexBuilder};

const PATTERN_SIZE_LIMIT: usize = 1 << 20;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("re")
        .function("match", match_start)
        .function("search", search)
        .function("findall", findall)
        .function("sub", sub)
        .function("split", split)
}

fn compile(pattern: &str) -> ScriptResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|e| ScriptError::value_error(format!("invalid pattern: {}", e)))
}

fn char_offset(text: &str, byte_offset: usize) -> i64 {
    text[..byte_offset].chars().count() as i64
}

fn match_value(text: &str, caps: &Captures<'_>) -> Value {
    let Some(whole) = caps.get(0) else {
        return Value::None;
    };
    let groups = caps
        .iter()
        .skip(1)
        .map(|g| g.map(|m| Value::Str(m.as_str().to_string())).unwrap_or(Value::None))
        .collect();
    let mut dict = Dict::new();
    dict.insert("match".to_string(), Value::Str(whole.as_str().to_string()));
    dict.insert("groups".to_string(), Value::List(groups));
    dict.insert("start".to_string(), Value::Int(char_offset(text, whole.start())));
    dict.insert("end".to_string(), Value::Int(char_offset(text, whole.end())));
    Value::Dict(dict)
}

fn match_start(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("re.match", 2, 2, &[])?;
    let regex = compile(args.str("re.match", 0)?)?;
    let text = args.str("re.match", 1)?;
    Ok(match regex.captures(text) {
        Some(caps) if caps.get(0).map(|m| m.start()) == Some(0) => match_value(text, &caps),
        _ => Value::None,
    })
}

fn search(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("re.search", 2, 2, &[])?;
    let regex = compile(args.str("re.search", 0)?)?;
    let text = args.str("re.search", 1)?;
    Ok(regex
        .captures(text)
        .map(|caps| match_value(text, &caps))
        .unwrap_or(Value::None))
}

fn findall(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("re.findall", 2, 2, &[])?;
    let regex = compile(args.str("re.findall", 0)?)?;
    let text = args.str("re.findall", 1)?;
    let group_count = regex.captures_len() - 1;
    let found = regex
        .captures_iter(text)
        .map(|caps| {
            let group = |i: usize| {
                caps.get(i)
                    .map(|m| Value::Str(m.as_str().to_string()))
                    .unwrap_or_else(|| Value::Str(String::new()))
            };
            match group_count {
                0 => group(0),
                1 => group(1),
                n => Value::List((1..=n).map(group).collect()),
            }
        })
        .collect();
    Ok(Value::List(found))
}

/// Convert `\1`-style group references to the `${1}` form the regex crate
/// expands, escaping literal `$`.
fn translate_replacement(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' if chars.peek().map(|n| n.is_ascii_digit()).unwrap_or(false) => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                out.push_str(&format!("${{{}}}", digits));
            }
            other => out.push(other),
        }
    }
    out
}

fn sub(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("re.sub", 3, 4, &["count"])?;
    let regex = compile(args.str("re.sub", 0)?)?;
    let replacement = translate_replacement(args.str("re.sub", 1)?);
    let text = args.str("re.sub", 2)?;
    let count = match args.arg(3, "count") {
        Some(value) => value
            .as_int()
            .ok_or_else(|| ScriptError::type_error("re.sub() count must be an int"))?,
        None => 0,
    };
    let limit = usize::try_from(count.max(0)).unwrap_or(0);
    Ok(Value::Str(
        regex.replacen(text, limit, replacement.as_str()).into_owned(),
    ))
}

fn split(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("re.split", 2, 2, &[])?;
    let regex = compile(args.str("re.split", 0)?)?;
    let text = args.str("re.split", 1)?;
    Ok(Value::List(
        regex
            .split(text)
            .map(|part| Value::Str(part.to_string()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::translate_replacement;

    #[test]
    fn test_translate_replacement() {
        assert_eq!(translate_replacement(r"\2-\1 $5"), "${2}-${1} $$5");
    }
}
