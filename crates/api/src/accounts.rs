//! In-process implementation of the linked-account port.
//!
//! The real platform resolves accounts from its own credential service; this
//! store is the seam where that service plugs in. It also serves operator
//! seeding (accounts loaded from a JSON document at startup) and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use hookwire_core::account::{LinkedAccount, LinkedAccountStore};
use hookwire_core::error::CoreError;
use hookwire_core::types::Id;

/// Thread-safe in-memory linked-account store.
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<Id, LinkedAccount>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Load accounts from a JSON array of [`LinkedAccount`] documents.
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let accounts: Vec<LinkedAccount> = serde_json::from_str(raw)
            .map_err(|e| CoreError::Validation(format!("invalid linked accounts JSON: {e}")))?;
        let store = Self::new();
        for account in accounts {
            store.insert(account);
        }
        Ok(store)
    }

    /// Insert or replace an account.
    pub fn insert(&self, account: LinkedAccount) {
        self.accounts
            .write()
            .expect("account store lock poisoned")
            .insert(account.id, account);
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkedAccountStore for InMemoryAccountStore {
    async fn get(&self, id: Id) -> Result<LinkedAccount, CoreError> {
        self.accounts
            .read()
            .expect("account store lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "LinkedAccount",
                id,
            })
    }
}
