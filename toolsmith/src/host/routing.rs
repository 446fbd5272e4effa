//! The parent process's live routing surface: endpoint path to tenant server.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::mcp::TenantServer;

/// Endpoint path a tenant's server is registered under.
pub fn endpoint_for(tenant_id: &str) -> String {
    format!("/{}", tenant_id)
}

#[derive(Debug, Default)]
pub struct RouteTable {
    routes: DashMap<String, Arc<TenantServer>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// False when the endpoint is already taken.
    pub fn register(&self, endpoint: &str, server: Arc<TenantServer>) -> bool {
        match self.routes.entry(endpoint.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(server);
                true
            }
        }
    }

    pub fn deregister(&self, endpoint: &str) -> Option<Arc<TenantServer>> {
        self.routes.remove(endpoint).map(|(_, server)| server)
    }

    pub fn resolve(&self, tenant_id: &str) -> Option<Arc<TenantServer>> {
        self.routes
            .get(&endpoint_for(tenant_id))
            .map(|entry| entry.value().clone())
    }

    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.routes.iter().map(|e| e.key().clone()).collect();
        endpoints.sort();
        endpoints
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::InvocationLimits;
    use std::time::Duration;

    fn empty_server(tenant: &str) -> Arc<TenantServer> {
        Arc::new(TenantServer::new(
            tenant,
            &endpoint_for(tenant),
            Vec::new(),
            InvocationLimits {
                max_call_depth: 8,
                timeout: Duration::from_secs(1),
            },
        ))
    }

    #[test]
    fn test_register_resolve_deregister() {
        let table = RouteTable::new();
        assert!(table.register("/acme", empty_server("acme")));
        assert!(!table.register("/acme", empty_server("acme")));
        assert_eq!(table.resolve("acme").unwrap().tenant_id(), "acme");
        assert!(table.resolve("globex").is_none());
        assert!(table.deregister("/acme").is_some());
        assert!(table.is_empty());
    }
}
