//! Import resolution filtered through the capability policy.
//!
//! Static validation rejects bad imports before a tool is compiled; the gate
//! enforces the same table at run time, so a module handle a namespace hands
//! out never exposes more than the tenant's tier allows.

use std::sync::Arc;

use toolsmith_lang::runtime::{ImportResolver, ModuleHandle, ModuleRegistry};

use super::policy::{CapabilityPolicy, Strictness, SymbolAllowance, Tier};

pub struct PolicyImportGate {
    policy: Arc<CapabilityPolicy>,
    registry: Arc<ModuleRegistry>,
    tier: Tier,
}

impl PolicyImportGate {
    pub fn new(policy: Arc<CapabilityPolicy>, registry: Arc<ModuleRegistry>, tier: Tier) -> Self {
        Self {
            policy,
            registry,
            tier,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Handles for the modules every tier gets without an import.
    pub fn preloaded(&self) -> Vec<Arc<ModuleHandle>> {
        self.policy
            .always_allowed_modules()
            .filter_map(|module| self.resolve(module))
            .collect()
    }
}

impl ImportResolver for PolicyImportGate {
    fn resolve(&self, module: &str) -> Option<Arc<ModuleHandle>> {
        if self.policy.is_denied(module) {
            return None;
        }
        let handle = self.registry.get(module)?;
        if self.policy.strictness(self.tier) == Strictness::Extended {
            return Some(handle);
        }
        if self.policy.is_always_allowed(module) {
            return Some(handle);
        }
        match self.policy.allowance(self.tier, module)? {
            SymbolAllowance::All => Some(handle),
            SymbolAllowance::Only(symbols) => Some(Arc::new(handle.view(|member| {
                symbols.contains(member) && !self.policy.is_denied(member)
            }))),
        }
    }
}
