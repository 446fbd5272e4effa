use super::ModuleHandle;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use std::io;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("json")
        .function("dumps", dumps)
        .function("loads", loads)
}

/// Compact output with a space after `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn sort_keys(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> =
                std::mem::take(map).into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, mut inner) in entries {
                sort_keys(&mut inner);
                map.insert(key, inner);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(sort_keys),
        _ => {}
    }
}

fn serialize_with<F: Formatter>(value: &serde_json::Value, formatter: F) -> ScriptResult<String> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| ScriptError::value_error(format!("json.dumps failed: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| ScriptError::value_error(e.to_string()))
}

fn dumps(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("json.dumps", 1, 1, &["indent", "sort_keys"])?;
    let mut json = args.value("json.dumps", 0)?.to_json()?;
    if args.kwarg("sort_keys").map(Value::is_truthy).unwrap_or(false) {
        sort_keys(&mut json);
    }
    let text = match args.kwarg("indent") {
        None | Some(Value::None) => serialize_with(&json, SpacedFormatter)?,
        Some(indent) => {
            let width = indent
                .as_int()
                .ok_or_else(|| ScriptError::type_error("json.dumps() indent must be an int"))?;
            let pad = " ".repeat(width.clamp(0, 16) as usize);
            serialize_with(&json, PrettyFormatter::with_indent(pad.as_bytes()))?
        }
    };
    Ok(Value::Str(text))
}

fn loads(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("json.loads", 1, 1, &[])?;
    let text = args.str("json.loads", 0)?;
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ScriptError::value_error(format!("invalid JSON: {}", e)))?;
    Ok(Value::from_json(&parsed))
}
