//! In-memory key registry.
//!
//! Backs the standalone binary and the test suites. Production
//! deployments substitute the platform's own [`KeyResolver`] wired to
//! account storage and the provisioning system.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::acme::auth::{KeyResolver, KeyResolverError, MacKey};
use crate::acme::envelope::Jwk;

/// Process-local key registry: account JWKs by key id and pre-provisioned
/// external-binding MAC keys by key id.
#[derive(Default)]
pub struct MemoryKeyRegistry {
    accounts: RwLock<HashMap<String, Jwk>>,
    eab_keys: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry seeded with pre-provisioned binding keys.
    pub fn with_eab_keys(keys: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            eab_keys: RwLock::new(keys.into_iter().collect()),
        }
    }

    /// Register an account public key under its key id.
    pub async fn register_account(&self, key_id: impl Into<String>, jwk: Jwk) {
        self.accounts.write().await.insert(key_id.into(), jwk);
    }

    /// Provision an external-binding MAC key under its key id.
    pub async fn provision_eab_key(&self, key_id: impl Into<String>, mac_key: Vec<u8>) {
        self.eab_keys.write().await.insert(key_id.into(), mac_key);
    }
}

#[async_trait]
impl KeyResolver for MemoryKeyRegistry {
    async fn account_key(&self, key_id: &str) -> Result<Option<Jwk>, KeyResolverError> {
        Ok(self.accounts.read().await.get(key_id).cloned())
    }

    async fn eab_mac_key(&self, key_id: &str) -> Result<Option<MacKey>, KeyResolverError> {
        Ok(self
            .eab_keys
            .read()
            .await
            .get(key_id)
            .cloned()
            .map(MacKey::new))
    }
}
