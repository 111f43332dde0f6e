//! Bot configuration
//!
//! Two layers: [`BotConfig`] is read once from the environment at startup;
//! [`RuntimeConfig`] is a versioned JSON document of tunables that the
//! `reload` subroutine can swap while the bot is running.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid runtime config: {0}")]
    Invalid(String),
}

/// Static configuration, read from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// The bot's own user id on the transport
    pub bot_user_id: String,
    pub rules_dir: PathBuf,
    pub runtime_config_path: PathBuf,
    pub db_path: PathBuf,
    /// Directory of locally stored media for `fetchLocalMedia`
    pub media_dir: PathBuf,
    pub giphy_api_key: Option<String>,
    pub random_seed: Option<u64>,
    /// Replaces the built-in profanity list when set
    pub profanity_words: Option<Vec<String>>,
}

impl BotConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("BOT_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.support-bot/messages.db")
        });

        Self {
            bot_user_id: std::env::var("BOT_USER_ID").unwrap_or_else(|_| "bot".to_string()),
            rules_dir: env_path("BOT_RULES_DIR", "brain"),
            runtime_config_path: env_path("BOT_RUNTIME_CONFIG", "data/bot_data.json"),
            db_path: PathBuf::from(db_path),
            media_dir: env_path("BOT_MEDIA_DIR", "data/gifs"),
            giphy_api_key: std::env::var("GIPHY_API_KEY").ok().filter(|k| !k.is_empty()),
            random_seed: std::env::var("BOT_RANDOM_SEED")
                .ok()
                .and_then(|s| s.parse().ok()),
            profanity_words: std::env::var("BOT_PROFANITY_WORDS")
                .ok()
                .map(|s| split_words(&s))
                .filter(|words| !words.is_empty()),
        }
    }
}

fn split_words(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}

/// Tunable values, reloadable as a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub version: u32,
    /// Chance of engaging with an otherwise ignored group message
    pub react_frequency: f64,
    /// Chance that an engagement reaction is `love` rather than `like`
    pub love_frequency: f64,
    /// Chance that an engagement also produces a full reply
    pub cheer_frequency: f64,
    pub police_swearing: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: 0,
            react_frequency: 0.05,
            love_frequency: 0.2,
            cheer_frequency: 0.1,
            police_swearing: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig =
            serde_json::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(path, &text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("react_frequency", self.react_frequency),
            ("love_frequency", self.love_frequency),
            ("cheer_frequency", self.cheer_frequency),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Shared handle to the live runtime config
///
/// Readers take an `Arc` snapshot, so a reload never exposes a half-updated
/// config and in-flight routings finish with the snapshot they started with.
#[derive(Debug)]
pub struct RuntimeConfigHandle {
    path: PathBuf,
    current: RwLock<Arc<RuntimeConfig>>,
}

impl RuntimeConfigHandle {
    pub fn new(path: impl Into<PathBuf>, initial: RuntimeConfig) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Load from disk, falling back to defaults if the file cannot be used
    pub async fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = match RuntimeConfig::load(&path).await {
            Ok(config) => {
                tracing::info!(version = config.version, path = %path.display(), "Loaded runtime config");
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "Using default runtime config");
                RuntimeConfig::default()
            }
        };
        Self::new(path, initial)
    }

    pub fn snapshot(&self) -> Arc<RuntimeConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Read the config file without applying it
    pub async fn read_from_disk(&self) -> Result<RuntimeConfig, ConfigError> {
        RuntimeConfig::load(&self.path).await
    }

    pub fn replace(&self, config: RuntimeConfig) {
        tracing::info!(version = config.version, "Runtime config updated");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
