use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{ActiveDeployment, RepositoryError, ToolRepository};
use crate::security::Tier;
use crate::tools::ToolSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTarget {
    #[default]
    Shared,
    Dedicated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    #[serde(default)]
    pub target: DeploymentTarget,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedTenant {
    pub id: String,
    pub tier: Tier,
    #[serde(default)]
    pub deployment: Option<DeploymentRecord>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

/// JSON document describing tenants, their deployment and their tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub tenants: Vec<SeedTenant>,
}

#[derive(Debug, Clone)]
struct TenantRecord {
    tier: Tier,
    deployment: Option<DeploymentRecord>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    tenants: BTreeMap<String, TenantRecord>,
    tools: BTreeMap<String, ToolSpec>,
}

/// Repository kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<RepositoryState>,
    unavailable: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedDocument) -> Result<Self, RepositoryError> {
        let mut state = RepositoryState::default();
        for tenant in seed.tenants {
            if state.tenants.contains_key(&tenant.id) {
                return Err(RepositoryError::Seed(format!("duplicate tenant '{}'", tenant.id)));
            }
            for mut tool in tenant.tools {
                if state.tools.contains_key(&tool.id) {
                    return Err(RepositoryError::Seed(format!("duplicate tool id '{}'", tool.id)));
                }
                if tool.tenant_id.is_empty() {
                    tool.tenant_id = tenant.id.clone();
                } else if tool.tenant_id != tenant.id {
                    return Err(RepositoryError::Seed(format!(
                        "tool '{}' listed under tenant '{}' belongs to '{}'",
                        tool.id, tenant.id, tool.tenant_id
                    )));
                }
                state.tools.insert(tool.id.clone(), tool);
            }
            state.tenants.insert(
                tenant.id,
                TenantRecord {
                    tier: tenant.tier,
                    deployment: tenant.deployment,
                },
            );
        }
        Ok(Self {
            state: RwLock::new(state),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, RepositoryError> {
        let seed: SeedDocument =
            serde_json::from_str(content).map_err(|e| RepositoryError::Seed(e.to_string()))?;
        Self::from_seed(seed)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RepositoryError::Seed(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub async fn upsert_tenant(&self, tenant_id: &str, tier: Tier) {
        let mut state = self.state.write().await;
        state
            .tenants
            .entry(tenant_id.to_string())
            .and_modify(|record| record.tier = tier)
            .or_insert(TenantRecord {
                tier,
                deployment: None,
            });
    }

    pub async fn set_deployment(
        &self,
        tenant_id: &str,
        target: DeploymentTarget,
        active: bool,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let record = state
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tenant '{}'", tenant_id)))?;
        record.deployment = Some(DeploymentRecord { target, active });
        Ok(())
    }

    pub async fn upsert_tool(&self, spec: ToolSpec) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.tenants.contains_key(&spec.tenant_id) {
            return Err(RepositoryError::NotFound(format!("tenant '{}'", spec.tenant_id)));
        }
        state.tools.insert(spec.id.clone(), spec);
        Ok(())
    }

    pub async fn tool(&self, tool_id: &str) -> Option<ToolSpec> {
        self.state.read().await.tools.get(tool_id).cloned()
    }

    pub async fn tier_of(&self, tenant_id: &str) -> Option<Tier> {
        self.state.read().await.tenants.get(tenant_id).map(|t| t.tier)
    }

    /// Make every call fail as if the backing store were unreachable.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(RepositoryError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ToolRepository for InMemoryRepository {
    async fn get_tool_specs(&self, tenant_id: &str) -> Result<Vec<ToolSpec>, RepositoryError> {
        self.check_available()?;
        let state = self.state.read().await;
        if !state.tenants.contains_key(tenant_id) {
            return Err(RepositoryError::NotFound(format!("tenant '{}'", tenant_id)));
        }
        Ok(state
            .tools
            .values()
            .filter(|tool| tool.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_active_shared_deployments(&self) -> Result<Vec<ActiveDeployment>, RepositoryError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .tenants
            .iter()
            .filter(|(_, record)| {
                matches!(
                    record.deployment,
                    Some(DeploymentRecord {
                        target: DeploymentTarget::Shared,
                        active: true,
                    })
                )
            })
            .map(|(tenant_id, record)| ActiveDeployment {
                tenant_id: tenant_id.clone(),
                tier: record.tier,
            })
            .collect())
    }

    async fn update_validation_result(
        &self,
        tool_id: &str,
        validated: bool,
        errors: Vec<String>,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let tool = state
            .tools
            .get_mut(tool_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("tool '{}'", tool_id)))?;
        tool.validated = validated;
        tool.validation_errors = if errors.is_empty() { None } else { Some(errors) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEED: &str = r#"{
        "tenants": [
            {
                "id": "acme",
                "tier": "restricted",
                "deployment": {"target": "shared", "active": true},
                "tools": [
                    {"id": "t1", "name": "hello", "source_text": "return \"hello\""}
                ]
            },
            {
                "id": "globex",
                "tier": "unrestricted",
                "deployment": {"target": "dedicated", "active": true}
            },
            {"id": "initech", "tier": "restricted"}
        ]
    }"#;

    #[tokio::test]
    async fn test_seed_and_queries() {
        let repo = InMemoryRepository::from_json_str(SEED).unwrap();
        let active = repo.get_active_shared_deployments().await.unwrap();
        assert_eq!(
            active,
            vec![ActiveDeployment {
                tenant_id: "acme".into(),
                tier: Tier::Restricted
            }]
        );
        let tools = repo.get_tool_specs("acme").await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].tenant_id, "acme");
        assert!(repo.get_tool_specs("initech").await.unwrap().is_empty());
        assert!(matches!(
            repo.get_tool_specs("nobody").await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_write_back() {
        let repo = InMemoryRepository::from_json_str(SEED).unwrap();
        repo.update_validation_result("t1", false, vec!["bad".into()])
            .await
            .unwrap();
        let tool = repo.tool("t1").await.unwrap();
        assert!(!tool.validated);
        assert_eq!(tool.validation_errors, Some(vec!["bad".to_string()]));

        repo.update_validation_result("t1", true, vec![]).await.unwrap();
        let tool = repo.tool("t1").await.unwrap();
        assert!(tool.validated);
        assert_eq!(tool.validation_errors, None);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let repo = InMemoryRepository::new();
        repo.set_available(false);
        assert!(matches!(
            repo.get_active_shared_deployments().await,
            Err(RepositoryError::Unavailable(_))
        ));
    }

    #[test]
    fn test_seed_rejects_duplicates() {
        let seed = r#"{"tenants": [{"id": "a", "tier": "restricted"}, {"id": "a", "tier": "restricted"}]}"#;
        assert!(matches!(
            InMemoryRepository::from_json_str(seed),
            Err(RepositoryError::Seed(_))
        ));
    }
}
