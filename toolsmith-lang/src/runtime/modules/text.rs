use super::ModuleHandle;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("text")
        .function("slugify", slugify)
        .function("truncate", truncate)
        .function("wrap", wrap)
}

pub(crate) fn slugify_str(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn slugify(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("text.slugify", 1, 1, &[])?;
    Ok(Value::Str(slugify_str(args.str("text.slugify", 0)?)))
}

/// `truncate(s, length, suffix="...")`: the result, suffix included, is at
/// most `length` characters.
fn truncate(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("text.truncate", 2, 3, &["suffix"])?;
    let text = args.str("text.truncate", 0)?;
    let length = usize::try_from(args.int("text.truncate", 1)?)
        .map_err(|_| ScriptError::value_error("text.truncate() length must be non-negative"))?;
    let suffix = match args.arg(2, "suffix") {
        Some(Value::Str(s)) => s.as_str(),
        Some(other) => {
            return Err(ScriptError::type_error(format!(
                "text.truncate() suffix must be str, not {}",
                other.type_name()
            )))
        }
        None => "...",
    };
    if text.chars().count() <= length {
        return Ok(Value::Str(text.to_string()));
    }
    let keep = length.saturating_sub(suffix.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(suffix);
    Ok(Value::Str(out.chars().take(length).collect()))
}

/// Greedy word wrap into a list of lines.
fn wrap(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("text.wrap", 1, 2, &["width"])?;
    let text = args.str("text.wrap", 0)?;
    let width = match args.arg(1, "width") {
        Some(value) => value
            .as_int()
            .filter(|w| *w > 0)
            .ok_or_else(|| ScriptError::value_error("text.wrap() width must be a positive int"))?
            as usize,
        None => 70,
    };
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(Value::Str(std::mem::take(&mut current)));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(Value::Str(current));
    }
    Ok(Value::List(lines))
}

#[cfg(test)]
mod tests {
    use super::slugify_str;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify_str("  Hello, World! 2024 "), "hello-world-2024");
        assert_eq!(slugify_str("---"), "");
    }
}
