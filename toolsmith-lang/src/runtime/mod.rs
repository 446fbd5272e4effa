//! Execution of toolscript programs.

pub mod builtins;
pub mod error;
pub mod interpreter;
pub mod methods;
pub mod modules;
pub mod namespace;
pub mod native;
pub mod values;

pub use error::{ScriptError, ScriptResult};
pub use interpreter::{ExecutionLimits, Interpreter, DEFAULT_MAX_CALL_DEPTH};
pub use modules::{ModuleHandle, ModuleRegistry};
pub use namespace::{ImportResolver, Namespace};
pub use native::{Args, BuiltinFunction, CallContext, NativeFn};
pub use values::{Closure, Dict, Value};
