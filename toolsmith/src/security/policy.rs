//! Capability policy
//!
//! Which host modules (and which of their symbols) each tier may import, plus
//! a global deny-set that no tier can override. The table is built once and
//! shared read-only behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capability level of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Restricted,
    Unrestricted,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Restricted => "restricted",
            Tier::Unrestricted => "unrestricted",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restricted" => Ok(Tier::Restricted),
            "unrestricted" => Ok(Tier::Unrestricted),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// How strictly a tier's tools are sandboxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Static validation runs and imports only expose the symbols the tier's
    /// allow entry lists.
    #[default]
    Strict,
    /// Static validation is skipped and imports expose full module exports.
    /// The deny-set still applies.
    Extended,
}

/// Symbols of a module a tier may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolAllowance {
    All,
    Only(BTreeSet<String>),
}

impl SymbolAllowance {
    pub fn only(symbols: &[&str]) -> Self {
        SymbolAllowance::Only(symbols.iter().map(|s| s.to_string()).collect())
    }

    pub fn permits(&self, symbol: &str) -> bool {
        match self {
            SymbolAllowance::All => true,
            SymbolAllowance::Only(symbols) => symbols.contains(symbol),
        }
    }
}

/// Modules every tier may import unconditionally.
pub const ALWAYS_ALLOWED_MODULES: &[&str] =
    &["json", "datetime", "re", "path", "hashlib", "random", "uuid"];

/// Module roots and bare identifiers that are never allowed.
pub const DENIED_IDENTIFIERS: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "socket",
    "shutil",
    "ctypes",
    "importlib",
    "pickle",
    "marshal",
    "builtins",
    "inspect",
    "gc",
    "signal",
    "multiprocessing",
    "threading",
    "eval",
    "exec",
    "compile",
    "open",
    "__import__",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "breakpoint",
];

/// Operations reachable as bare calls without any import.
pub const DANGEROUS_CALLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "open",
    "__import__",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "breakpoint",
];

#[derive(Debug, Clone)]
pub struct CapabilityPolicy {
    tiers: BTreeMap<Tier, BTreeMap<String, SymbolAllowance>>,
    always_allowed: BTreeSet<String>,
    denied: BTreeSet<String>,
    dangerous_calls: BTreeSet<String>,
    unrestricted_strictness: Strictness,
}

impl CapabilityPolicy {
    /// The built-in policy table.
    ///
    /// `restricted` gets the always-allowed modules plus `math`, `base64`
    /// and the string helpers of `text`; `unrestricted` gets every host
    /// module in full.
    pub fn standard() -> Self {
        let always_allowed: BTreeSet<String> =
            ALWAYS_ALLOWED_MODULES.iter().map(|m| m.to_string()).collect();

        let mut restricted: BTreeMap<String, SymbolAllowance> = always_allowed
            .iter()
            .map(|m| (m.clone(), SymbolAllowance::All))
            .collect();
        restricted.insert("math".to_string(), SymbolAllowance::All);
        restricted.insert("base64".to_string(), SymbolAllowance::All);
        restricted.insert(
            "text".to_string(),
            SymbolAllowance::only(&["slugify", "truncate"]),
        );

        let mut unrestricted = restricted.clone();
        unrestricted.insert("text".to_string(), SymbolAllowance::All);

        let mut tiers = BTreeMap::new();
        tiers.insert(Tier::Restricted, restricted);
        tiers.insert(Tier::Unrestricted, unrestricted);

        CapabilityPolicy {
            tiers,
            always_allowed,
            denied: DENIED_IDENTIFIERS.iter().map(|s| s.to_string()).collect(),
            dangerous_calls: DANGEROUS_CALLS.iter().map(|s| s.to_string()).collect(),
            unrestricted_strictness: Strictness::Extended,
        }
    }

    /// Override how the unrestricted tier is sandboxed. The restricted tier is
    /// always strict.
    pub fn with_unrestricted_strictness(mut self, strictness: Strictness) -> Self {
        self.unrestricted_strictness = strictness;
        self
    }

    pub fn strictness(&self, tier: Tier) -> Strictness {
        match tier {
            Tier::Restricted => Strictness::Strict,
            Tier::Unrestricted => self.unrestricted_strictness,
        }
    }

    pub fn requires_validation(&self, tier: Tier) -> bool {
        self.strictness(tier) == Strictness::Strict
    }

    /// True when `name`, or the first segment of a dotted `name`, is in the
    /// deny-set.
    pub fn is_denied(&self, name: &str) -> bool {
        let root = name.split('.').next().unwrap_or(name);
        self.denied.contains(root)
    }

    pub fn is_dangerous_call(&self, name: &str) -> bool {
        self.dangerous_calls.contains(name)
    }

    pub fn is_always_allowed(&self, module: &str) -> bool {
        self.always_allowed.contains(module)
    }

    pub fn always_allowed_modules(&self) -> impl Iterator<Item = &str> {
        self.always_allowed.iter().map(String::as_str)
    }

    /// The allow entry for `module` under `tier`, ignoring the deny-set.
    pub fn allowance(&self, tier: Tier, module: &str) -> Option<&SymbolAllowance> {
        self.tiers.get(&tier).and_then(|modules| modules.get(module))
    }

    pub fn is_module_allowed(&self, tier: Tier, module: &str) -> bool {
        if self.is_denied(module) {
            return false;
        }
        self.is_always_allowed(module) || self.allowance(tier, module).is_some()
    }

    pub fn is_symbol_allowed(&self, tier: Tier, module: &str, symbol: &str) -> bool {
        if self.is_denied(module) || self.is_denied(symbol) {
            return false;
        }
        if self.is_always_allowed(module) {
            return true;
        }
        self.allowance(tier, module)
            .map(|allowance| allowance.permits(symbol))
            .unwrap_or(false)
    }
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_set_wins_over_allow_entries() {
        let policy = CapabilityPolicy::standard();
        assert!(!policy.is_module_allowed(Tier::Unrestricted, "os"));
        assert!(!policy.is_module_allowed(Tier::Restricted, "os.path"));
        assert!(!policy.is_symbol_allowed(Tier::Unrestricted, "json", "eval"));
        assert!(!policy.is_symbol_allowed(Tier::Unrestricted, "subprocess", "run"));
    }

    #[test]
    fn test_tier_tables() {
        let policy = CapabilityPolicy::standard();
        for module in ALWAYS_ALLOWED_MODULES {
            assert!(policy.is_module_allowed(Tier::Restricted, module));
        }
        assert!(policy.is_module_allowed(Tier::Restricted, "math"));
        assert!(policy.is_symbol_allowed(Tier::Restricted, "text", "slugify"));
        assert!(!policy.is_symbol_allowed(Tier::Restricted, "text", "wrap"));
        assert!(policy.is_symbol_allowed(Tier::Unrestricted, "text", "wrap"));
        assert!(!policy.is_module_allowed(Tier::Restricted, "requests"));
    }

    #[test]
    fn test_strictness() {
        let policy = CapabilityPolicy::standard();
        assert!(policy.requires_validation(Tier::Restricted));
        assert!(!policy.requires_validation(Tier::Unrestricted));

        let strict = policy.with_unrestricted_strictness(Strictness::Strict);
        assert!(strict.requires_validation(Tier::Unrestricted));
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("restricted".parse::<Tier>(), Ok(Tier::Restricted));
        assert!("root".parse::<Tier>().is_err());
        assert_eq!(Tier::Unrestricted.to_string(), "unrestricted");
    }
}
