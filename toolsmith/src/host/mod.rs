//! Tenant mount lifecycle, routing and scoped resources.

pub mod resources;
pub mod routing;
pub mod runtime_host;

pub use resources::{InvocationGate, ResourceLedger, ResourceStack, ScopedResource};
pub use routing::{endpoint_for, RouteTable};
pub use runtime_host::{
    HostError, HostSettings, MountPhase, MountResult, ReconciliationReport, RuntimeHost,
    TenantFailure, ToolFailure,
};
