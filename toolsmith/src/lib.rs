//! Toolsmith
//!
//! Multi-tenant tool host. Tenants author tools as small scripts; the host
//! validates them against a per-tier capability policy, compiles them into a
//! per-tenant namespace and serves them over MCP from one process.

pub mod auth;
pub mod config;
pub mod host;
#[cfg(feature = "server")]
pub mod http;
pub mod mcp;
pub mod repository;
pub mod security;
pub mod tools;

pub use config::{ConfigError, HostConfig};
pub use host::{
    HostError, HostSettings, MountPhase, MountResult, ReconciliationReport, RuntimeHost,
};
pub use repository::{ActiveDeployment, InMemoryRepository, RepositoryError, ToolRepository};
pub use security::{CapabilityPolicy, CodeValidator, Tier};
pub use tools::{CallableUnit, CompilationError, CompiledToolCache, ToolCompiler, ToolSpec};
