//! In-memory credential store for testing.

use std::sync::RwLock;

use crate::session::{CredentialPair, CredentialStore, CredentialStoreError};

/// Credential store with no persistence, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialPair>, CredentialStoreError> {
        Ok(self.pair.read().expect("store lock poisoned").clone())
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), CredentialStoreError> {
        *self.pair.write().expect("store lock poisoned") = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        *self.pair.write().expect("store lock poisoned") = None;
        Ok(())
    }
}
