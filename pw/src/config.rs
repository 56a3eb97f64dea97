//! Planwright configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `backend.max-retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Main Planwright configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Research service connection
    pub backend: BackendConfig,

    /// Auto-continuation behaviour
    pub research: ResearchConfig,

    /// Local plan/session cache
    pub storage: StorageConfig,

    /// Signed-in identity
    pub user: UserConfig,

    /// Log level override (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if url.is_empty() {
            return Err(eyre::eyre!("backend.base-url must not be empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(eyre::eyre!("backend.base-url must be an http(s) URL, got {}", url));
        }
        if self.backend.max_retries > MAX_RETRIES_LIMIT {
            return Err(eyre::eyre!(
                "backend.max-retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT,
                self.backend.max_retries
            ));
        }
        if self.research.continuation_message.trim().is_empty() {
            return Err(eyre::eyre!("research.continuation-message must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .planwright.yml
        let local_config = PathBuf::from(".planwright.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/planwright/planwright.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("planwright").join("planwright.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Research service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Service base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries for idempotent reads
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Initial retry backoff, doubled per attempt
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 300_000,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Auto-continuation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Delay before each hidden continuation request
    #[serde(rename = "continuation-delay-ms")]
    pub continuation_delay_ms: u64,

    /// Sentinel text sent with hidden continuation requests
    #[serde(rename = "continuation-message")]
    pub continuation_message: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            continuation_delay_ms: 1000,
            continuation_message: "continue".to_string(),
        }
    }
}

impl ResearchConfig {
    pub fn continuation_delay(&self) -> Duration {
        Duration::from_millis(self.continuation_delay_ms)
    }
}

/// Local cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for cached plans and session records
    #[serde(rename = "store-dir")]
    pub store_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/planwright on Linux)
        let store_dir = dirs::data_dir()
            .map(|d| d.join("planwright"))
            .unwrap_or_else(|| PathBuf::from(".planwright"))
            .to_string_lossy()
            .into_owned();

        Self { store_dir }
    }
}

impl StorageConfig {
    /// Expand a leading `~/`
    pub fn expanded_dir(&self) -> PathBuf {
        match self.store_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.store_dir)),
            None => PathBuf::from(&self.store_dir),
        }
    }
}

/// Signed-in identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}
