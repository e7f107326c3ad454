use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chatrelay_core::Turn;
use log::debug;

use crate::transcript::store::{TranscriptStore, TranscriptStoreError};

/// In-memory implementation of TranscriptStore
#[derive(Debug, Default)]
pub struct InMemoryTranscriptStore {
    /// Thread-safe storage of turns in append order
    turns: Arc<RwLock<Vec<Turn>>>,
}

impl InMemoryTranscriptStore {
    /// Create a new, empty InMemoryTranscriptStore
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append(&self, turn: Turn) -> Result<(), TranscriptStoreError> {
        let mut turns = self.turns.write().map_err(|e| {
            TranscriptStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        debug!("Appending {:?} turn ({} chars)", turn.role, turn.content.len());
        turns.push(turn);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Turn>, TranscriptStoreError> {
        let turns = self.turns.read().map_err(|e| {
            TranscriptStoreError::StorageError(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(turns.clone())
    }

    async fn clear(&self) -> Result<usize, TranscriptStoreError> {
        let mut turns = self.turns.write().map_err(|e| {
            TranscriptStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        let count = turns.len();
        turns.clear();
        debug!("Cleared {} turns", count);
        Ok(count)
    }

    async fn len(&self) -> Result<usize, TranscriptStoreError> {
        let turns = self.turns.read().map_err(|e| {
            TranscriptStoreError::StorageError(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(turns.len())
    }
}
