//! In-memory token store
//!
//! Keeps token material for the lifetime of the process only. Clones share
//! the same slot, so a test can hand one clone to a token manager and inspect
//! what it saved through another.

use crate::storage::traits::{StorageResult, TokenStore};
use crate::storage::StoredTokens;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slot: Arc<Mutex<StoredTokens>>,
    saves: Arc<Mutex<u64>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `tokens`
    pub fn with_tokens(tokens: StoredTokens) -> Self {
        Self {
            slot: Arc::new(Mutex::new(tokens)),
            saves: Arc::new(Mutex::new(0)),
        }
    }

    /// Current contents
    pub fn snapshot(&self) -> StoredTokens {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `save_tokens` calls so far
    pub fn save_count(&self) -> u64 {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load_tokens(&self) -> StorageResult<StoredTokens> {
        Ok(self.snapshot())
    }

    fn save_tokens(&mut self, tokens: &StoredTokens) -> StorageResult<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = tokens.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
