//! Host modules: the only way a program reaches anything beyond plain
//! computation. Each module is a named table of native functions and
//! constants; nothing here touches the filesystem, the network or processes.

use super::native::{BuiltinFunction, NativeFn};
use super::namespace::ImportResolver;
use super::values::Value;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

mod base64;
mod datetime;
mod hashlib;
mod json;
mod math;
mod path;
mod random;
mod re;
mod text;
mod uuid;

/// An importable module, or a filtered view of one.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    pub name: String,
    pub members: IndexMap<String, Value>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleHandle {
            name: name.into(),
            members: IndexMap::new(),
        }
    }

    pub fn function(mut self, name: &str, func: NativeFn) -> Self {
        let qualified = format!("{}.{}", self.name, name);
        self.members.insert(
            name.to_string(),
            Value::Builtin(Arc::new(BuiltinFunction::new(qualified, func))),
        );
        self
    }

    pub fn constant(mut self, name: &str, value: Value) -> Self {
        self.members.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, member: &str) -> Option<&Value> {
        self.members.get(member)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// A copy that only exposes the members `allowed` accepts.
    pub fn view(&self, allowed: impl Fn(&str) -> bool) -> ModuleHandle {
        ModuleHandle {
            name: self.name.clone(),
            members: self
                .members
                .iter()
                .filter(|(name, _)| allowed(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Every host module the runtime knows how to provide.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<ModuleHandle>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with all built-in host modules registered.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(json::module());
        registry.register(datetime::module());
        registry.register(re::module());
        registry.register(path::module());
        registry.register(hashlib::module());
        registry.register(random::module());
        registry.register(uuid::module());
        registry.register(math::module());
        registry.register(base64::module());
        registry.register(text::module());
        registry
    }

    pub fn register(&mut self, module: ModuleHandle) {
        self.modules.insert(module.name.clone(), Arc::new(module));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleHandle>> {
        self.modules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

/// A registry resolves every module it holds, unfiltered.
impl ImportResolver for ModuleRegistry {
    fn resolve(&self, module: &str) -> Option<Arc<ModuleHandle>> {
        self.get(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_has_every_module() {
        let registry = ModuleRegistry::standard();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "base64", "datetime", "hashlib", "json", "math", "path", "random", "re", "text",
                "uuid"
            ]
        );
    }

    #[test]
    fn test_view_filters_members() {
        let registry = ModuleRegistry::standard();
        let text = registry.get("text").unwrap();
        let view = text.view(|name| name != "wrap");
        assert!(view.get("slugify").is_some());
        assert!(view.get("wrap").is_none());
        assert!(text.get("wrap").is_some());
    }
}
