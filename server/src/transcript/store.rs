use std::error::Error;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use chatrelay_core::Turn;

/// Error type for transcript store operations
#[derive(Debug)]
pub enum TranscriptStoreError {
    /// Error occurred during a store operation
    StorageError(String),
}

impl Display for TranscriptStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptStoreError::StorageError(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl Error for TranscriptStoreError {}

/// Trait defining the interface for transcript stores
#[async_trait]
pub trait TranscriptStore: Send + Sync + Debug {
    /// Append a turn to the end of the transcript
    async fn append(&self, turn: Turn) -> Result<(), TranscriptStoreError>;

    /// All turns in append order
    async fn list(&self) -> Result<Vec<Turn>, TranscriptStoreError>;

    /// Remove every turn, returning how many were removed
    async fn clear(&self) -> Result<usize, TranscriptStoreError>;

    /// Number of turns currently stored
    async fn len(&self) -> Result<usize, TranscriptStoreError>;

    /// Whether the transcript holds no turns
    async fn is_empty(&self) -> Result<bool, TranscriptStoreError> {
        Ok(self.len().await? == 0)
    }
}

/// Type alias for Arc-wrapped TranscriptStore trait objects
pub type TranscriptStoreRef = Arc<dyn TranscriptStore>;
