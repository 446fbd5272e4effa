//! Toolscript: the small, sandboxed language tenant tools are written in.
//!
//! The crate is split the same way the host consumes it:
//! - [`parser`] turns source text into the [`ast`]
//! - [`walk`] and [`scope_check`] inspect a parsed program without running it
//! - [`runtime`] executes programs inside a per-tenant [`runtime::Namespace`]
//!
//! Nothing in here knows about tenants or tiers. Which host modules a program
//! may import is decided by the [`runtime::ImportResolver`] the namespace is
//! built with.

pub mod ast;
pub mod parser;
pub mod runtime;
pub mod scope_check;
pub mod walk;

pub use ast::{Expr, Program, Stmt, StmtKind};
pub use parser::{parse, ParseError};
pub use runtime::{
    ExecutionLimits, ImportResolver, Interpreter, ModuleHandle, ModuleRegistry, Namespace,
    ScriptError, Value,
};
