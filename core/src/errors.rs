use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::TOKEN_ENV_VAR;

/// Message recorded as the assistant reply while no credential is configured
pub const NOT_CONFIGURED_MESSAGE: &str =
    "AI_BUILDER_TOKEN is not configured. Please check your .env file.";

/// Category of a failed exchange, independent of the message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No credential was configured at startup
    Configuration,
    /// Network, timeout, non-2xx or authentication failure from the provider
    Upstream,
    /// The provider answered without an extractable reply
    MalformedResponse,
    /// The transcript store could not be read or written
    Storage,
}

/// Errors raised while talking to a completion provider
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("{} is not configured", TOKEN_ENV_VAR)]
    NotConfigured,

    #[error("Request Error: {0}")]
    Request(String),

    #[error("Request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("HTTP Error: {status_code} - {message}")]
    Http { status_code: u16, message: String },

    #[error("Response Error: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CompletionError::NotConfigured => FailureKind::Configuration,
            CompletionError::Request(_)
            | CompletionError::Timeout(_)
            | CompletionError::Http { .. } => FailureKind::Upstream,
            CompletionError::MalformedResponse(_) => FailureKind::MalformedResponse,
        }
    }

    /// True when the provider rejected the credential
    pub fn is_auth_failure(&self) -> bool {
        match self {
            CompletionError::Http {
                status_code,
                message,
            } => *status_code == 401 || message.contains("Invalid credentials"),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CompletionError::MalformedResponse(format!("Failed to parse response: {}", e))
        } else {
            CompletionError::Request(format!("Failed to send request: {}", e))
        }
    }
}

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Result type for completion calls
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
