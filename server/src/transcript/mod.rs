//! Transcript storage for the relay
//!
//! This module defines the `TranscriptStore` trait that the conversation service
//! writes turns through, plus the adapters that implement it. Only an in-memory
//! adapter exists today; the trait keeps the service independent of where turns live.

pub mod adapters;
pub mod store;

pub use adapters::InMemoryTranscriptStore;
pub use store::{TranscriptStore, TranscriptStoreError, TranscriptStoreRef};
