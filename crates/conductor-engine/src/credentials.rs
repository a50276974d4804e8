//! Credential provider contract.
//!
//! Executors that need secrets resolve them through this seam; the core
//! never touches credential material itself. Decryption and at-rest storage
//! live behind the provider, outside this workspace.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

/// Decrypted secret map for one credential.
pub type CredentialData = HashMap<String, String>;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Credential backend error: {0}")]
    Backend(String),
}

/// Lookup of decrypted credential data by credential id.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, credential_id: &str) -> Result<CredentialData, CredentialError>;
}

/// In-memory provider for tests and development.
#[derive(Default)]
pub struct InMemoryCredentialProvider {
    entries: RwLock<HashMap<String, CredentialData>>,
}

impl InMemoryCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, credential_id: impl Into<String>, data: CredentialData) {
        self.entries.write().insert(credential_id.into(), data);
    }
}

#[async_trait]
impl CredentialProvider for InMemoryCredentialProvider {
    async fn resolve(&self, credential_id: &str) -> Result<CredentialData, CredentialError> {
        self.entries
            .read()
            .get(credential_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(credential_id.to_string()))
    }
}
