use std::sync::Arc;

use chatrelay_core::{
    CompletionError, CompletionProvider, CompletionRequest, FailureKind, Turn,
    NOT_CONFIGURED_MESSAGE,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::transcript::{TranscriptStoreError, TranscriptStoreRef};

/// Outcome of a single exchange with the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The provider produced a reply
    Completed(String),
    /// The exchange failed; `message` is the assistant text, recorded in the
    /// transcript unless the store itself failed
    Failed { kind: FailureKind, message: String },
}

impl Reply {
    fn from_error(e: &CompletionError) -> Self {
        let message = match e {
            CompletionError::NotConfigured => NOT_CONFIGURED_MESSAGE.to_string(),
            other => format!("Error communicating with AI: {}", other),
        };
        Reply::Failed {
            kind: e.kind(),
            message,
        }
    }

    /// The text recorded as the assistant turn
    pub fn text(&self) -> &str {
        match self {
            Reply::Completed(text) => text,
            Reply::Failed { message, .. } => message,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Completed(text) => text,
            Reply::Failed { message, .. } => message,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Reply::Completed(_) => None,
            Reply::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Owns the transcript and mediates every completion request.
///
/// Whether a provider is present is decided once at construction and never
/// changes. Without one every `submit` short-circuits to the configuration
/// message.
pub struct ConversationService {
    store: TranscriptStoreRef,
    provider: Option<Arc<dyn CompletionProvider>>,
    default_model: String,
    // Held across a whole exchange and across clear
    exchange_gate: Mutex<()>,
}

impl std::fmt::Debug for ConversationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationService")
            .field("store", &self.store)
            .field(
                "provider",
                &self.provider.as_ref().map(|p| p.provider_name()),
            )
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl ConversationService {
    pub fn new(
        store: TranscriptStoreRef,
        provider: Option<Arc<dyn CompletionProvider>>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            default_model: default_model.into(),
            exchange_gate: Mutex::new(()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Record `message`, ask the provider for a reply over the full transcript,
    /// record the reply and return it.
    ///
    /// Never fails: every error becomes a `Reply::Failed`. Its message is
    /// recorded as the assistant turn whenever the store accepts it.
    pub async fn submit(&self, message: &str, model: Option<&str>) -> Reply {
        let _exchange = self.exchange_gate.lock().await;
        let model = model.unwrap_or(self.default_model.as_str());

        if let Err(e) = self.store.append(Turn::user(message)).await {
            return self.storage_failure(e).await;
        }

        let reply = match &self.provider {
            None => {
                warn!("Provider credential missing, skipping completion request");
                Reply::from_error(&CompletionError::NotConfigured)
            }
            Some(provider) => match self.store.list().await {
                Ok(messages) => {
                    let request = CompletionRequest::new(model, messages);
                    self.complete(&**provider, &request).await
                }
                Err(e) => return self.storage_failure(e).await,
            },
        };

        if let Err(e) = self.store.append(Turn::assistant(reply.text())).await {
            error!(error = %e, "Failed to record assistant turn");
            return Reply::Failed {
                kind: FailureKind::Storage,
                message: format!("Error recording reply: {}", e),
            };
        }

        reply
    }

    async fn complete(
        &self,
        provider: &dyn CompletionProvider,
        request: &CompletionRequest,
    ) -> Reply {
        info!(
            provider = provider.provider_name(),
            model = %request.model,
            turns = request.messages.len(),
            "Requesting completion"
        );

        match provider.complete(request).await {
            Ok(text) => {
                debug!(reply_len = text.len(), "Received completion");
                Reply::Completed(text)
            }
            Err(e) => {
                error!(error = %e, kind = ?e.kind(), "API error");
                if e.is_auth_failure() {
                    warn!(
                        "Authentication error: the AI_BUILDER_TOKEN appears to be invalid or expired"
                    );
                }
                Reply::from_error(&e)
            }
        }
    }

    // Best effort: try to keep the two-turn shape even when the store misbehaves
    async fn storage_failure(&self, e: TranscriptStoreError) -> Reply {
        error!(error = %e, "Transcript store failure during submit");
        let reply = Reply::Failed {
            kind: FailureKind::Storage,
            message: format!("Error recording conversation: {}", e),
        };
        if let Err(e) = self.store.append(Turn::assistant(reply.text())).await {
            error!(error = %e, "Failed to record storage failure");
        }
        reply
    }

    /// The full transcript in append order
    pub async fn list_history(&self) -> Result<Vec<Turn>, TranscriptStoreError> {
        self.store.list().await
    }

    /// Empty the transcript. Waits for any in-flight exchange to finish first.
    pub async fn clear_history(&self) -> Result<(), TranscriptStoreError> {
        let _exchange = self.exchange_gate.lock().await;
        let removed = self.store.clear().await?;
        info!(removed, "Cleared chat history");
        Ok(())
    }
}
