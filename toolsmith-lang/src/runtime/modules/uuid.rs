use super::ModuleHandle;
use crate::runtime::error::ScriptResult;
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("uuid").function("uuid4", uuid4)
}

fn uuid4(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("uuid.uuid4", 0, 0, &[])?;
    Ok(Value::Str(::uuid::Uuid::new_v4().to_string()))
}
