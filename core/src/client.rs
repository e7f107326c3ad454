use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::errors::{CompletionError, CompletionResult};
use crate::types::{ApiErrorResponse, CompletionRequest, CompletionResponse};

/// Common trait for completion providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce the assistant reply for the given transcript
    async fn complete(&self, request: &CompletionRequest) -> CompletionResult<String>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Client for OpenAI-compatible `chat/completions` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    base_url: String,
    timeout: Duration,
    http_client: Client,
}

impl OpenAiCompatClient {
    /// Create a new client with bearer authentication and bounded timeouts
    pub fn new(
        api_key: &str,
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> CompletionResult<Self> {
        if api_key.trim().is_empty() {
            return Err(CompletionError::NotConfigured);
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|e| CompletionError::Request(format!("Invalid API key format: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| CompletionError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            http_client,
        })
    }

    /// Build a client from provider configuration; fails when no credential is set
    pub fn from_config(config: &ProviderConfig) -> CompletionResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or(CompletionError::NotConfigured)?;
        Self::new(
            api_key,
            &config.base_url,
            config.timeout(),
            config.connect_timeout(),
        )
    }

    /// Build the chat completions URL
    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_send_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.timeout)
        } else {
            CompletionError::from(e)
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn complete(&self, request: &CompletionRequest) -> CompletionResult<String> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(self.api_url())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            // Try to parse as error response
            let message = match serde_json::from_str::<ApiErrorResponse>(&response_text) {
                Ok(error_response) => match error_response.error.error_type {
                    Some(error_type) => {
                        format!("{} (type: {})", error_response.error.message, error_type)
                    }
                    None => error_response.error.message,
                },
                Err(_) => response_text,
            };
            return Err(CompletionError::Http {
                status_code: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = serde_json::from_str(&response_text).map_err(|e| {
            CompletionError::MalformedResponse(format!("Failed to parse response: {}", e))
        })?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                total = usage.total_tokens,
                "Token usage"
            );
        }

        if let Some(reason) = completion
            .choices
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            if reason != "stop" {
                warn!(finish_reason = reason, "Completion did not finish normally");
            }
        }

        completion
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| CompletionError::MalformedResponse("No content in first choice".to_string()))
    }
}
