use crate::conversation::ConversationService;
use crate::transcript::TranscriptStoreError;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use chatrelay_core::{EnvFile, FailureKind, ProviderConfig, Turn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const WELCOME_MESSAGE: &str = "Welcome to the chatrelay backend!";

/// Application state shared with all routes
#[derive(Clone)]
pub struct AppState {
    conversation: Arc<ConversationService>,
    token_status: Arc<TokenStatus>,
    static_dir: Option<Arc<PathBuf>>,
}

impl AppState {
    pub fn new(
        conversation: Arc<ConversationService>,
        token_status: TokenStatus,
        static_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            conversation,
            token_status: Arc::new(token_status),
            static_dir: static_dir.map(Arc::new),
        }
    }
}

/// Credential diagnostics served on `/debug/token`; never exposes more than a preview
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    token_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    env_file: Option<String>,
    env_file_exists: bool,
}

impl TokenStatus {
    /// `token_loaded` follows the service, which stays unconfigured when the
    /// client could not be built from an otherwise present token
    pub fn new(
        conversation: &ConversationService,
        provider: &ProviderConfig,
        env_file: &EnvFile,
    ) -> Self {
        Self {
            token_loaded: conversation.is_configured(),
            token_length: provider.api_key.as_ref().map(|t| t.len()),
            token_preview: provider.token_preview(),
            env_file: env_file.path.as_ref().map(|p| p.display().to_string()),
            env_file_exists: env_file.exists(),
        }
    }
}

/// Request model for chat messages
#[derive(Deserialize)]
pub struct ChatRequest {
    message: String,
    #[serde(default)]
    model: Option<String>,
}

/// Response model for chat messages
#[derive(Serialize)]
pub struct ChatResponse {
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<FailureKind>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    history: Vec<Turn>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
}

/// Error type for HTTP server
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    InternalError(anyhow::Error),
}

impl From<TranscriptStoreError> for ApiError {
    fn from(e: TranscriptStoreError) -> Self {
        ApiError::InternalError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => {
                let body = Json(ErrorResponse {
                    error: "Not found".to_string(),
                });
                (StatusCode::NOT_FOUND, body).into_response()
            }
            Self::InternalError(e) => {
                error!(error = %e, "Internal server error");
                let body = Json(ErrorResponse {
                    error: format!("Internal server error: {}", e),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

/// Build the router: API routes, CORS, request tracing and the static frontend
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/", get(index))
        .route("/chat", post(handle_chat))
        .route("/history", get(get_history))
        .route("/clear_history", post(clear_history))
        .route("/debug/token", get(debug_token))
        .route("/api/*path", any(api_not_found));

    // Unknown paths serve assets, falling back to index.html for client-side routing
    let router = match &state.static_dir {
        Some(dir) => {
            let index_file = ServeFile::new(dir.join("index.html"));
            router.fallback_service(ServeDir::new(dir.as_path()).fallback(index_file))
        }
        None => router.fallback(api_not_found),
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn run_server<F>(
    state: AppState,
    cors_origins: &[String],
    addr: SocketAddr,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting HTTP server on {}", addr);

    let app = build_router(state, cors_origins);

    axum::Server::try_bind(&addr)
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
}

/// Serve the built frontend's index.html, or a welcome message without one
async fn index(State(state): State<AppState>) -> Response {
    if let Some(dir) = &state.static_dir {
        let index_path = dir.join("index.html");
        match tokio::fs::read_to_string(&index_path).await {
            Ok(html) => return Html(html).into_response(),
            Err(e) => debug!(path = %index_path.display(), error = %e, "No frontend index"),
        }
    }
    Json(MessageResponse {
        message: WELCOME_MESSAGE,
    })
    .into_response()
}

/// Handler for chat messages. Upstream failures are reported in the body, not the status.
async fn handle_chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let reply = state
        .conversation
        .submit(&payload.message, payload.model.as_deref())
        .await;
    let error = reply.failure_kind();

    Json(ChatResponse {
        response: reply.into_text(),
        error,
    })
}

async fn get_history(State(state): State<AppState>) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state.conversation.list_history().await?;
    Ok(Json(HistoryResponse { history }))
}

async fn clear_history(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    state.conversation.clear_history().await?;
    Ok(Json(MessageResponse {
        message: "Chat history cleared.",
    }))
}

async fn debug_token(State(state): State<AppState>) -> Json<TokenStatus> {
    Json(state.token_status.as_ref().clone())
}

async fn api_not_found() -> ApiError {
    ApiError::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{InMemoryTranscriptStore, TranscriptStore, TranscriptStoreRef};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chatrelay_core::{
        CompletionError, CompletionProvider, CompletionRequest, CompletionResult,
        NOT_CONFIGURED_MESSAGE,
    };
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(&self, _request: &CompletionRequest) -> CompletionResult<String> {
            Ok(self.0.to_string())
        }

        fn provider_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct UnreachableProvider;

    #[async_trait]
    impl CompletionProvider for UnreachableProvider {
        async fn complete(&self, _request: &CompletionRequest) -> CompletionResult<String> {
            Err(CompletionError::Request("connection refused".to_string()))
        }

        fn provider_name(&self) -> &'static str {
            "unreachable"
        }
    }

    /// Fails every operation
    #[derive(Debug)]
    struct BrokenStore;

    fn broken() -> TranscriptStoreError {
        TranscriptStoreError::StorageError("poisoned".to_string())
    }

    #[async_trait]
    impl TranscriptStore for BrokenStore {
        async fn append(&self, _turn: Turn) -> Result<(), TranscriptStoreError> {
            Err(broken())
        }

        async fn list(&self) -> Result<Vec<Turn>, TranscriptStoreError> {
            Err(broken())
        }

        async fn clear(&self) -> Result<usize, TranscriptStoreError> {
            Err(broken())
        }

        async fn len(&self) -> Result<usize, TranscriptStoreError> {
            Err(broken())
        }
    }

    fn test_app(
        provider: Option<Arc<dyn CompletionProvider>>,
        static_dir: Option<PathBuf>,
    ) -> Router {
        test_app_with_store(Arc::new(InMemoryTranscriptStore::new()), provider, static_dir)
    }

    fn test_app_with_store(
        store: TranscriptStoreRef,
        provider: Option<Arc<dyn CompletionProvider>>,
        static_dir: Option<PathBuf>,
    ) -> Router {
        let conversation = Arc::new(ConversationService::new(store, provider, "deepseek"));
        let provider_config = ProviderConfig {
            api_key: Some("sk-abcdefghijklmnop".to_string()),
            ..ProviderConfig::default()
        };
        let token_status =
            TokenStatus::new(&conversation, &provider_config, &EnvFile::default());
        build_router(
            AppState::new(conversation, token_status, static_dir),
            &["http://localhost:3000".to_string()],
        )
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn frontend() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<html>chat ui</html>").unwrap();
        fs::create_dir_all(dir.path().join("static/js")).unwrap();
        fs::write(dir.path().join("static/js/main.js"), "console.log('hi');").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_chat_then_history() {
        let app = test_app(Some(Arc::new(FixedProvider("Hi there"))), None);

        let (status, body) =
            send_json(&app, "POST", "/chat", Some(json!({"message": "Hello", "model": "deepseek"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"response": "Hi there"}));

        let (status, body) = send_json(&app, "GET", "/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"history": [
                {"role": "user", "content": "Hello"},
                {"role": "assistant", "content": "Hi there"}
            ]})
        );
    }

    #[tokio::test]
    async fn test_chat_model_is_optional() {
        let app = test_app(Some(Arc::new(FixedProvider("ok"))), None);

        let (status, body) = send_json(&app, "POST", "/chat", Some(json!({"message": "Hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "ok");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_still_200() {
        let app = test_app(Some(Arc::new(UnreachableProvider)), None);

        let (status, body) = send_json(&app, "POST", "/chat", Some(json!({"message": "Hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "upstream");
        let response = body["response"].as_str().unwrap();
        assert!(response.starts_with("Error communicating with AI:"));

        let (_, history) = send_json(&app, "GET", "/history", None).await;
        assert_eq!(history["history"][1]["content"], response);
    }

    #[tokio::test]
    async fn test_unconfigured_chat() {
        let app = test_app(None, None);

        let (status, body) = send_json(&app, "POST", "/chat", Some(json!({"message": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], NOT_CONFIGURED_MESSAGE);
        assert_eq!(body["error"], "configuration");
    }

    #[tokio::test]
    async fn test_clear_history() {
        let app = test_app(Some(Arc::new(FixedProvider("ok"))), None);
        send_json(&app, "POST", "/chat", Some(json!({"message": "Hello"}))).await;

        let (status, body) = send_json(&app, "POST", "/clear_history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Chat history cleared."}));

        let (_, body) = send_json(&app, "GET", "/history", None).await;
        assert_eq!(body, json!({"history": []}));

        // Clearing again is fine
        let (status, _) = send_json(&app, "POST", "/clear_history", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_root_without_frontend() {
        let app = test_app(None, None);

        let (status, body) = send_json(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": WELCOME_MESSAGE}));
    }

    #[tokio::test]
    async fn test_frontend_routing() {
        let dir = frontend();
        let app = test_app(None, Some(dir.path().to_path_buf()));

        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<html>chat ui</html>");

        let (status, body) = send(&app, "GET", "/static/js/main.js", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"console.log('hi');");

        // Client-side routes fall back to index.html
        let (status, body) = send(&app, "GET", "/conversations/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<html>chat ui</html>");
    }

    #[tokio::test]
    async fn test_api_prefix_never_serves_frontend() {
        let dir = frontend();
        let app = test_app(None, Some(dir.path().to_path_buf()));

        let (status, body) = send_json(&app, "GET", "/api/models", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not found"}));
    }

    #[tokio::test]
    async fn test_api_paths_are_not_frontend_routes() {
        let dir = frontend();
        let app = test_app(None, Some(dir.path().to_path_buf()));

        let (status, _) = send(&app, "GET", "/chat", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_debug_token_preview() {
        let app = test_app(Some(Arc::new(FixedProvider("ok"))), None);

        let (status, body) = send_json(&app, "GET", "/debug/token", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_loaded"], true);
        assert_eq!(body["token_length"], 19);
        assert_eq!(body["token_preview"], "sk-abcdefg...");
        assert_eq!(body["env_file_exists"], false);
    }

    #[tokio::test]
    async fn test_debug_token_follows_service_state() {
        // A token is present but no client could be built from it
        let app = test_app(None, None);

        let (status, body) = send_json(&app, "GET", "/debug/token", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_loaded"], false);
        assert_eq!(body["token_preview"], "sk-abcdefg...");

        let (_, body) = send_json(&app, "POST", "/chat", Some(json!({"message": "hi"}))).await;
        assert_eq!(body["error"], "configuration");
    }

    #[tokio::test]
    async fn test_store_failure_on_history_routes_is_500() {
        let app = test_app_with_store(Arc::new(BrokenStore), None, None);

        let (status, body) = send_json(&app, "GET", "/history", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"error": "Internal server error: Storage error: poisoned"})
        );

        let (status, body) = send_json(&app, "POST", "/clear_history", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("Storage error"));
    }

    #[tokio::test]
    async fn test_store_failure_on_chat_is_reported_not_raised() {
        let app = test_app_with_store(
            Arc::new(BrokenStore),
            Some(Arc::new(FixedProvider("unused"))),
            None,
        );

        let (status, body) = send_json(&app, "POST", "/chat", Some(json!({"message": "Hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "storage");
        assert_eq!(
            body["response"],
            "Error recording conversation: Storage error: poisoned"
        );
    }

    #[tokio::test]
    async fn test_chat_rejects_missing_message() {
        let app = test_app(None, None);

        let (status, _) = send(&app, "POST", "/chat", Some(json!({"model": "deepseek"}))).await;
        assert!(status.is_client_error());
    }
}
