// This crate contains the provider-facing half of chatrelay:
// - Completion provider trait and the OpenAI-compatible HTTP client
// - Transcript and request/response data structures
// - Configuration loading
// - Shared error types

// Export client module - completion provider trait and HTTP client
pub mod client;
pub use client::*;

// Export types module - Turn, CompletionRequest, CompletionResponse
pub mod types;
pub use types::*;

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;
