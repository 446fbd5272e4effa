//! Lexical path helpers. None of these look at a filesystem.

use super::ModuleHandle;
use crate::runtime::error::ScriptResult;
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("path")
        .function("join", join)
        .function("basename", basename)
        .function("dirname", dirname)
        .function("extension", extension)
        .function("normalize", normalize)
}

fn join(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("path.join", 1, usize::MAX, &[])?;
    let mut joined = String::new();
    for index in 0..args.len() {
        let part = args.str("path.join", index)?;
        if part.starts_with('/') {
            joined = part.to_string();
        } else if joined.is_empty() || joined.ends_with('/') {
            joined.push_str(part);
        } else {
            joined.push('/');
            joined.push_str(part);
        }
    }
    Ok(Value::Str(joined))
}

fn split_last(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx + 1], &path[idx + 1..]),
        None => ("", path),
    }
}

fn basename(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("path.basename", 1, 1, &[])?;
    let (_, name) = split_last(args.str("path.basename", 0)?);
    Ok(Value::Str(name.to_string()))
}

fn dirname(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("path.dirname", 1, 1, &[])?;
    let (dir, _) = split_last(args.str("path.dirname", 0)?);
    let trimmed = dir.trim_end_matches('/');
    let dir = if trimmed.is_empty() && dir.starts_with('/') {
        "/"
    } else {
        trimmed
    };
    Ok(Value::Str(dir.to_string()))
}

/// Extension including the leading dot, or an empty string.
fn extension(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("path.extension", 1, 1, &[])?;
    let (_, name) = split_last(args.str("path.extension", 0)?);
    let ext = match name.rfind('.') {
        Some(idx) if idx > 0 && !name[..idx].chars().all(|c| c == '.') => &name[idx..],
        _ => "",
    };
    Ok(Value::Str(ext.to_string()))
}

pub(crate) fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().map(|p| *p != "..").unwrap_or(false) {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let body = parts.join("/");
    match (absolute, body.is_empty()) {
        (true, _) => format!("/{}", body),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

fn normalize(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("path.normalize", 1, 1, &[])?;
    Ok(Value::Str(normalize_path(args.str("path.normalize", 0)?)))
}

#[cfg(test)]
mod tests {
    use super::normalize_path;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/./b/../c"), "a/c");
        assert_eq!(normalize_path("/../etc//x"), "/etc/x");
        assert_eq!(normalize_path("../a/.."), "..");
        assert_eq!(normalize_path(""), ".");
    }
}
