//! Persistence collaborator
//!
//! The host only reads tool specs and active deployments and writes back
//! validation results; storage of tenants, tools and deployments lives behind
//! [`ToolRepository`].

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::Tier;
use crate::tools::ToolSpec;

pub use memory::{InMemoryRepository, SeedDocument};

#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid seed data: {0}")]
    Seed(String),
}

/// A tenant whose deployment on the shared target is marked active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDeployment {
    pub tenant_id: String,
    pub tier: Tier,
}

#[async_trait]
pub trait ToolRepository: Send + Sync {
    async fn get_tool_specs(&self, tenant_id: &str) -> Result<Vec<ToolSpec>, RepositoryError>;

    async fn get_active_shared_deployments(&self) -> Result<Vec<ActiveDeployment>, RepositoryError>;

    async fn update_validation_result(
        &self,
        tool_id: &str,
        validated: bool,
        errors: Vec<String>,
    ) -> Result<(), RepositoryError>;
}
