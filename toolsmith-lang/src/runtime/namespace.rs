//! The binding environment programs execute in.

use super::modules::ModuleHandle;
use super::values::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Decides which host modules an `import` inside a namespace can see.
///
/// Returning `None` makes the import fail; returning a reduced
/// [`ModuleHandle`] hides the members the caller may not use.
pub trait ImportResolver: Send + Sync {
    fn resolve(&self, module: &str) -> Option<Arc<ModuleHandle>>;
}

/// Module-level bindings shared by every program executed into it.
pub struct Namespace {
    owner: String,
    bindings: RwLock<HashMap<String, Value>>,
    resolver: Arc<dyn ImportResolver>,
}

impl Namespace {
    pub fn new(owner: impl Into<String>, resolver: Arc<dyn ImportResolver>) -> Self {
        Namespace {
            owner: owner.into(),
            bindings: RwLock::new(HashMap::new()),
            resolver,
        }
    }

    /// Who the namespace belongs to, for diagnostics.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.bindings.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.write().insert(name.into(), value);
    }

    /// Publish a batch of bindings at once.
    pub fn commit(&self, staged: HashMap<String, Value>) {
        if staged.is_empty() {
            return;
        }
        self.write().extend(staged);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn resolve_module(&self, module: &str) -> Option<Arc<ModuleHandle>> {
        self.resolver.resolve(module)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("owner", &self.owner)
            .field("bindings", &self.names())
            .finish()
    }
}
