use super::ModuleHandle;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("math")
        .function("sqrt", sqrt)
        .function("floor", floor)
        .function("ceil", ceil)
        .function("pow", pow)
        .function("log", log)
        .constant("pi", Value::Float(std::f64::consts::PI))
        .constant("e", Value::Float(std::f64::consts::E))
}

fn domain_error() -> ScriptError {
    ScriptError::value_error("math domain error")
}

fn to_int(x: f64) -> ScriptResult<Value> {
    if !x.is_finite() || x < i64::MIN as f64 || x > i64::MAX as f64 {
        return Err(ScriptError::Overflow);
    }
    Ok(Value::Int(x as i64))
}

fn sqrt(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("math.sqrt", 1, 1, &[])?;
    let x = args.number("math.sqrt", 0)?;
    if x < 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.sqrt()))
}

fn floor(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("math.floor", 1, 1, &[])?;
    to_int(args.number("math.floor", 0)?.floor())
}

fn ceil(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("math.ceil", 1, 1, &[])?;
    to_int(args.number("math.ceil", 0)?.ceil())
}

fn pow(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("math.pow", 2, 2, &[])?;
    let result = args
        .number("math.pow", 0)?
        .powf(args.number("math.pow", 1)?);
    if result.is_nan() {
        return Err(domain_error());
    }
    Ok(Value::Float(result))
}

fn log(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("math.log", 1, 2, &[])?;
    let x = args.number("math.log", 0)?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        None => Ok(Value::Float(x.ln())),
        Some(_) => {
            let base = args.number("math.log", 1)?;
            if base <= 0.0 || base == 1.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
    }
}
