use super::ModuleHandle;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;
use ::base64::engine::general_purpose::STANDARD;
use ::base64::Engine as _;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("base64")
        .function("b64encode", b64encode)
        .function("b64decode", b64decode)
}

fn b64encode(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("base64.b64encode", 1, 1, &[])?;
    Ok(Value::Str(
        STANDARD.encode(args.str("base64.b64encode", 0)?.as_bytes()),
    ))
}

/// Decodes to text; payloads that are not UTF-8 are rejected.
fn b64decode(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("base64.b64decode", 1, 1, &[])?;
    let bytes = STANDARD
        .decode(args.str("base64.b64decode", 0)?.trim())
        .map_err(|e| ScriptError::value_error(format!("invalid base64: {}", e)))?;
    String::from_utf8(bytes)
        .map(Value::Str)
        .map_err(|_| ScriptError::value_error("decoded payload is not valid UTF-8"))
}
