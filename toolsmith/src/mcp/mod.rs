//! Tenant-scoped MCP sub-servers.

pub mod server;
pub mod session;

pub use server::{Exchange, MCPError, MCPRequest, MCPResponse, TenantServer, ToolDefinition};
pub use session::SessionStore;
