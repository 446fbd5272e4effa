use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::HostSettings;
use crate::security::{CapabilityPolicy, Strictness};
use crate::tools::{CompilerSettings, InvocationLimits};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Top-level host configuration, loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub sandbox: SandboxConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Path prefix tenant endpoints are served under.
    pub endpoint_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8840".to_string(),
            endpoint_prefix: "/mcp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-tenant bound on a mount during startup reconciliation.
    pub mount_timeout_ms: u64,
    pub reconcile_concurrency: usize,
    pub invocation_timeout_ms: u64,
    /// How long an unmount waits for in-flight tool calls.
    pub drain_timeout_ms: u64,
    pub session_idle_ttl_secs: u64,
    pub session_reap_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mount_timeout_ms: 10_000,
            reconcile_concurrency: 4,
            invocation_timeout_ms: 30_000,
            drain_timeout_ms: 5_000,
            session_idle_ttl_secs: 1_800,
            session_reap_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub max_call_depth: usize,
    /// Bound on running a tool's module-level statements at compile time.
    pub compile_timeout_ms: u64,
    pub unrestricted_strictness: Strictness,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_call_depth: toolsmith_lang::runtime::DEFAULT_MAX_CALL_DEPTH,
            compile_timeout_ms: 2_000,
            unrestricted_strictness: Strictness::Extended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    Static,
    AllowAll,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Bearer tokens accepted per tenant.
    pub tokens: HashMap<String, Vec<String>>,
}

impl HostConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.server.endpoint_prefix;
        if prefix.trim_matches('/').is_empty() || !prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.endpoint_prefix must be a non-root path starting with '/', got '{}'",
                prefix
            )));
        }
        let positive = [
            ("runtime.mount_timeout_ms", self.runtime.mount_timeout_ms),
            ("runtime.invocation_timeout_ms", self.runtime.invocation_timeout_ms),
            ("runtime.drain_timeout_ms", self.runtime.drain_timeout_ms),
            ("runtime.session_idle_ttl_secs", self.runtime.session_idle_ttl_secs),
            (
                "runtime.session_reap_interval_secs",
                self.runtime.session_reap_interval_secs,
            ),
            ("sandbox.compile_timeout_ms", self.sandbox.compile_timeout_ms),
            (
                "runtime.reconcile_concurrency",
                self.runtime.reconcile_concurrency as u64,
            ),
            ("sandbox.max_call_depth", self.sandbox.max_call_depth as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> CapabilityPolicy {
        CapabilityPolicy::standard().with_unrestricted_strictness(self.sandbox.unrestricted_strictness)
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            max_call_depth: self.sandbox.max_call_depth,
            compile_timeout: Duration::from_millis(self.sandbox.compile_timeout_ms),
        }
    }

    pub fn host_settings(&self) -> HostSettings {
        HostSettings {
            mount_timeout: Duration::from_millis(self.runtime.mount_timeout_ms),
            reconcile_concurrency: self.runtime.reconcile_concurrency,
            drain_timeout: Duration::from_millis(self.runtime.drain_timeout_ms),
            session_idle_ttl: Duration::from_secs(self.runtime.session_idle_ttl_secs),
            session_reap_interval: Duration::from_secs(self.runtime.session_reap_interval_secs),
            invocation: InvocationLimits {
                max_call_depth: self.sandbox.max_call_depth,
                timeout: Duration::from_millis(self.runtime.invocation_timeout_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HostConfig::from_toml_str("").unwrap();
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.runtime.reconcile_concurrency, 4);
        assert_eq!(config.host_settings().mount_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config() {
        let config = HostConfig::from_toml_str(
            r#"
[server]
endpoint_prefix = "/tools"

[sandbox]
unrestricted_strictness = "strict"

[auth]
mode = "static"
tokens = { acme = ["secret-1", "secret-2"] }
"#,
        )
        .unwrap();
        assert_eq!(config.server.endpoint_prefix, "/tools");
        assert_eq!(config.server.bind_addr, "127.0.0.1:8840");
        assert_eq!(config.sandbox.unrestricted_strictness, Strictness::Strict);
        assert_eq!(config.auth.tokens["acme"].len(), 2);
    }

    #[test]
    fn test_validation_rejects_zero_timeouts_and_root_prefix() {
        let err = HostConfig::from_toml_str("[runtime]\nmount_timeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("runtime.mount_timeout_ms"));

        let err = HostConfig::from_toml_str("[server]\nendpoint_prefix = \"/\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.toml");
        std::fs::write(&path, "[runtime]\nreconcile_concurrency = 8\n").unwrap();
        assert_eq!(HostConfig::load(&path).unwrap().runtime.reconcile_concurrency, 8);

        let missing = HostConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
