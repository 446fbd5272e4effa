//! Tool records, compilation and the compiled-tool cache.

pub mod cache;
pub mod callable;
pub mod compiler;
pub mod types;

pub use cache::{CompileOutcome, CompiledToolCache};
pub use callable::{CallableUnit, Invocation, InvocationError, InvocationLimits};
pub use compiler::{CompilationError, CompilerSettings, ToolCompiler};
pub use types::{ParamType, ToolParameter, ToolSpec};
