use anyhow::{anyhow, Result};
use chatrelay_core::{
    load_env_file, normalize_token, CompletionProvider, OpenAiCompatClient, RelayConfig,
};
use chatrelay_server::conversation::ConversationService;
use chatrelay_server::http_server::{self, AppState, TokenStatus};
use chatrelay_server::transcript::InMemoryTranscriptStore;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "chatrelay-daemon",
    about = "Chat relay backend: proxies messages to a hosted model and serves the frontend",
    version
)]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to searching from the working directory)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Provider API token (overrides AI_BUILDER_TOKEN)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Provider base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Model used when a request does not name one
    #[arg(short, long)]
    model: Option<String>,

    /// Provider request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// HTTP server address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Directory holding the built frontend
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CHATRELAY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load .env before anything reads the environment
    let env_file = load_env_file(args.env_file.as_deref());

    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("Starting chatrelay daemon");

    // Load config from file or use defaults
    let mut config = match &args.config {
        Some(config_path) => RelayConfig::load_from_file(config_path).map_err(|e| {
            error!("Failed to load configuration from {}: {}", config_path.display(), e);
            anyhow!("Configuration error: {}", e)
        })?,
        None => RelayConfig::load_from_default().unwrap_or_else(|e| {
            warn!(error = %e, "Could not load default configuration, using defaults");
            RelayConfig::default()
        }),
    };

    // Environment, then CLI args
    config.provider.apply_env();
    if let Some(api_key) = normalize_token(args.api_key) {
        config.provider.api_key = Some(api_key);
    }
    if let Some(base_url) = args.base_url {
        config.provider.base_url = base_url;
    }
    if let Some(model) = args.model {
        config.provider.default_model = model;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.provider.timeout_secs = timeout_secs;
    }
    if let Some(http_addr) = args.http_addr {
        config.server.http_addr = http_addr;
    }
    if args.static_dir.is_some() {
        config.server.static_dir = args.static_dir;
    }

    match config.provider.token_preview() {
        Some(preview) => info!(
            length = config.provider.api_key.as_ref().map(|t| t.len()).unwrap_or(0),
            preview = %preview,
            "AI_BUILDER_TOKEN loaded"
        ),
        None => warn!(
            env_file = ?env_file.path,
            env_file_exists = env_file.exists(),
            cwd = ?std::env::current_dir().ok(),
            "AI_BUILDER_TOKEN not found; chat requests will return a configuration error"
        ),
    }

    // Initialize the provider client; without one the service runs unconfigured
    let provider: Option<Arc<dyn CompletionProvider>> = if config.provider.is_configured() {
        match OpenAiCompatClient::from_config(&config.provider) {
            Ok(client) => {
                info!(base_url = %config.provider.base_url, "Initialized provider client");
                Some(Arc::new(client))
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize provider client, running unconfigured");
                None
            }
        }
    } else {
        None
    };

    let conversation = Arc::new(ConversationService::new(
        Arc::new(InMemoryTranscriptStore::new()),
        provider,
        config.provider.default_model.clone(),
    ));
    info!(
        default_model = conversation.default_model(),
        configured = conversation.is_configured(),
        "Conversation service ready"
    );

    let static_dir = config.server.resolve_static_dir();
    match &static_dir {
        Some(dir) => info!("Serving frontend from {}", dir.display()),
        None => info!("No built frontend found, serving API only"),
    }

    let token_status = TokenStatus::new(&conversation, &config.provider, &env_file);
    let state = AppState::new(conversation, token_status, static_dir);

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
    };

    http_server::run_server(
        state,
        &config.server.cors_origins,
        config.server.http_addr,
        shutdown,
    )
    .await?;

    info!("chatrelay daemon shutting down");
    Ok(())
}
