use crate::errors::{ConfigError, ConfigResult};
use crate::types::DEFAULT_MODEL;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable holding the provider credential
pub const TOKEN_ENV_VAR: &str = "AI_BUILDER_TOKEN";
/// Environment variable overriding the provider base URL
pub const BASE_URL_ENV_VAR: &str = "CHATRELAY_BASE_URL";
/// Environment variable overriding the default model
pub const MODEL_ENV_VAR: &str = "CHATRELAY_MODEL";

pub const DEFAULT_BASE_URL: &str = "https://space.ai-builders.com/backend/v1";

/// Floor for both provider timeouts; zero would fail every request
const MIN_TIMEOUT_SECS: u64 = 1;

/// Directories searched for a built frontend when none is configured
const STATIC_DIR_CANDIDATES: &[&str] = &["frontend/build", "../frontend/build"];

/// Top-level configuration for the relay
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub provider: ProviderConfig,
    pub server: ServerConfig,
}

/// Configuration for the upstream completion provider
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    /// Whether a usable credential is present
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// First ten characters of the credential followed by an ellipsis
    pub fn token_preview(&self) -> Option<String> {
        self.api_key.as_deref().map(preview)
    }

    /// Request timeout; never shorter than one second
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(MIN_TIMEOUT_SECS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(MIN_TIMEOUT_SECS))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = normalize_token(lookup(TOKEN_ENV_VAR)) {
            self.api_key = Some(token);
        }
        if let Some(base_url) = lookup(BASE_URL_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url.trim().to_string();
        }
        if let Some(model) = lookup(MODEL_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            self.default_model = model.trim().to_string();
        }
        self.api_key = normalize_token(self.api_key.take());
    }
}

/// Configuration for the HTTP surface
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub static_dir: Option<PathBuf>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            static_dir: None,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    /// Locate the built frontend directory, if any
    pub fn resolve_static_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.static_dir {
            return dir.is_dir().then(|| dir.clone());
        }
        STATIC_DIR_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|dir| dir.is_dir())
    }
}

impl RelayConfig {
    /// Loads configuration from a file if it exists, otherwise returns the default config
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!(path = %path.display(), "Loaded configuration file");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from `~/.config/chatrelay/config.toml`
    pub fn load_from_default() -> ConfigResult<Self> {
        let path = get_default_config_file("chatrelay")?;
        Self::load_from_file(&path)
    }

}

/// Where the `.env` file was looked for and whether it was loaded
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    pub path: Option<PathBuf>,
    pub loaded: bool,
}

impl EnvFile {
    pub fn exists(&self) -> bool {
        self.path.as_deref().map(Path::exists).unwrap_or(false)
    }
}

/// Load a `.env` file into the process environment.
///
/// An explicit path is loaded as given; otherwise dotenvy searches from the
/// working directory upwards. A missing file is not an error.
pub fn load_env_file(explicit: Option<&Path>) -> EnvFile {
    match explicit {
        Some(path) => EnvFile {
            path: Some(path.to_path_buf()),
            loaded: dotenvy::from_path(path).is_ok(),
        },
        None => match dotenvy::dotenv() {
            Ok(path) => EnvFile {
                path: Some(path),
                loaded: true,
            },
            Err(_) => EnvFile {
                path: std::env::current_dir().ok().map(|dir| dir.join(".env")),
                loaded: false,
            },
        },
    }
}

/// Trim a raw credential, treating blank values as absent
pub fn normalize_token(raw: Option<String>) -> Option<String> {
    raw.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn preview(token: &str) -> String {
    if token.chars().count() > 10 {
        format!("{}...", token.chars().take(10).collect::<String>())
    } else {
        token.to_string()
    }
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> ConfigResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> ConfigResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}
