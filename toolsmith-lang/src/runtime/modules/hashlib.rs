use super::ModuleHandle;
use crate::runtime::error::ScriptResult;
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;
use sha2::{Digest, Sha256, Sha512};

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("hashlib")
        .function("sha256", sha256)
        .function("sha512", sha512)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hex digest of the UTF-8 encoding of the argument.
fn sha256(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("hashlib.sha256", 1, 1, &[])?;
    let digest = Sha256::digest(args.str("hashlib.sha256", 0)?.as_bytes());
    Ok(Value::Str(hex(&digest)))
}

fn sha512(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("hashlib.sha512", 1, 1, &[])?;
    let digest = Sha512::digest(args.str("hashlib.sha512", 0)?.as_bytes());
    Ok(Value::Str(hex(&digest)))
}
