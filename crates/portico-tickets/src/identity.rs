//! Caller authentication and entitlement lookups.
//!
//! Both are owned by the host's user directory; the issuer only consumes
//! them through these traits.

use crate::error::{Result, TicketError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub uid: String,
}

impl CallerIdentity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// Resolves a bearer credential to a caller.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Fails with [`TicketError::InvalidCredential`] for unknown or expired credentials.
    async fn verify(&self, credential: &str) -> Result<CallerIdentity>;
}

/// Answers which plugins a user may load.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn entitlements(&self, uid: &str) -> Result<HashSet<String>>;
}

/// Fixed token -> user table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, uid: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), uid.into());
        self
    }

    pub fn from_map(tokens: &BTreeMap<String, String>) -> Self {
        Self {
            tokens: tokens.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, credential: &str) -> Result<CallerIdentity> {
        self.tokens
            .get(credential)
            .map(CallerIdentity::new)
            .ok_or(TicketError::InvalidCredential)
    }
}

/// Fixed user -> plugins table.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlements {
    grants: HashMap<String, HashSet<String>>,
}

impl StaticEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, uid: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        self.grants
            .entry(uid.into())
            .or_default()
            .insert(plugin_id.into());
        self
    }

    pub fn from_map(grants: &BTreeMap<String, Vec<String>>) -> Self {
        Self {
            grants: grants
                .iter()
                .map(|(uid, plugins)| (uid.clone(), plugins.iter().cloned().collect()))
                .collect(),
        }
    }
}

#[async_trait]
impl EntitlementStore for StaticEntitlements {
    async fn entitlements(&self, uid: &str) -> Result<HashSet<String>> {
        Ok(self.grants.get(uid).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credentials() {
        let creds = StaticCredentials::new().with_token("tok", "u1");
        assert_eq!(creds.verify("tok").await.unwrap().uid, "u1");
        assert_eq!(creds.verify("nope").await, Err(TicketError::InvalidCredential));
    }

    #[tokio::test]
    async fn test_static_entitlements_from_map() {
        let mut map = BTreeMap::new();
        map.insert("u1".to_string(), vec!["crm".to_string(), "wiki".to_string()]);
        let store = StaticEntitlements::from_map(&map);

        let grants = store.entitlements("u1").await.unwrap();
        assert!(grants.contains("crm") && grants.contains("wiki"));
        assert!(store.entitlements("u2").await.unwrap().is_empty());
    }
}
