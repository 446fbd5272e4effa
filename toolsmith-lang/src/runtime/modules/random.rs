use super::ModuleHandle;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;
use rand::seq::SliceRandom;
use rand::Rng;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("random")
        .function("random", random)
        .function("randint", randint)
        .function("choice", choice)
        .function("shuffle", shuffle)
}

fn random(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("random.random", 0, 0, &[])?;
    Ok(Value::Float(rand::thread_rng().gen::<f64>()))
}

/// Inclusive on both ends.
fn randint(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("random.randint", 2, 2, &[])?;
    let low = args.int("random.randint", 0)?;
    let high = args.int("random.randint", 1)?;
    if low > high {
        return Err(ScriptError::value_error(format!(
            "empty range for randint({}, {})",
            low, high
        )));
    }
    Ok(Value::Int(rand::thread_rng().gen_range(low..=high)))
}

fn choice(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("random.choice", 1, 1, &[])?;
    let items = args.value("random.choice", 0)?.iterate()?;
    items
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| ScriptError::IndexError("cannot choose from an empty sequence".into()))
}

/// Returns a shuffled copy; lists are values, so the argument is untouched.
fn shuffle(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("random.shuffle", 1, 1, &[])?;
    let mut items = args.value("random.shuffle", 0)?.iterate()?;
    items.shuffle(&mut rand::thread_rng());
    Ok(Value::List(items))
}
