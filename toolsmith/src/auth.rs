//! Caller authorization for tenant endpoints.
//!
//! Token issuance lives elsewhere; the host only asks whether a presented
//! credential may reach a tenant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::{AuthConfig, AuthMode};

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, tenant_id: &str, credential: Option<&str>) -> bool;
}

/// Accepts a fixed set of bearer tokens per tenant. Only digests are kept.
#[derive(Debug, Default)]
pub struct StaticTokenAuthorizer {
    digests: HashMap<String, Vec<[u8; 32]>>,
}

impl StaticTokenAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: &HashMap<String, Vec<String>>) -> Self {
        let mut authorizer = Self::new();
        for (tenant_id, tenant_tokens) in tokens {
            for token in tenant_tokens {
                authorizer.add_token(tenant_id, token);
            }
        }
        authorizer
    }

    pub fn add_token(&mut self, tenant_id: &str, token: &str) {
        self.digests
            .entry(tenant_id.to_string())
            .or_default()
            .push(digest(token));
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn authorize(&self, tenant_id: &str, credential: Option<&str>) -> bool {
        let (Some(credential), Some(accepted)) = (credential, self.digests.get(tenant_id)) else {
            return false;
        };
        let presented = digest(credential);
        accepted
            .iter()
            .fold(false, |matched, expected| {
                matched | bool::from(expected.ct_eq(&presented))
            })
    }
}

/// Lets every caller through. Local development only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn authorize(&self, _tenant_id: &str, _credential: Option<&str>) -> bool {
        true
    }
}

pub fn from_config(config: &AuthConfig) -> Arc<dyn Authorizer> {
    match config.mode {
        AuthMode::Static => Arc::new(StaticTokenAuthorizer::from_tokens(&config.tokens)),
        AuthMode::AllowAll => Arc::new(AllowAllAuthorizer),
    }
}

/// The token of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_tokens_are_scoped_to_tenant() {
        let mut tokens = HashMap::new();
        tokens.insert("acme".to_string(), vec!["s3cret".to_string()]);
        let auth = StaticTokenAuthorizer::from_tokens(&tokens);
        assert!(auth.authorize("acme", Some("s3cret")).await);
        assert!(!auth.authorize("acme", Some("wrong")).await);
        assert!(!auth.authorize("acme", None).await);
        assert!(!auth.authorize("globex", Some("s3cret")).await);
    }

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAllAuthorizer.authorize("anyone", None).await);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
