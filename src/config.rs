//! Startup configuration.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. CLI flags / environment variables ([`Cli`])
//! 2. An optional YAML file (`--config`)
//! 3. Built-in defaults
//!
//! The result is validated once at startup and then shared read-only.
//!
//! # YAML layout
//!
//! ```yaml
//! llm:
//!   model: gpt-4o
//!   base_url: https://api.openai.com/v1
//!   timeout_secs: 90
//!   max_retries: 3
//!   stream: false
//!   temperature: 0.7
//! bots:
//!   poll_interval_secs: 60
//!   seen_capacity: 10000
//!   seen_window_secs: 86400
//! ```

use crate::cli::Cli;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Optional overrides read from the YAML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub llm: LlmFileConfig,
    pub bots: BotFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmFileConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<usize>,
    pub stream: Option<bool>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotFileConfig {
    pub poll_interval_secs: Option<u64>,
    pub seen_capacity: Option<usize>,
    pub seen_window_secs: Option<u64>,
}

/// Chat-completion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries after the first attempt, transient failures only.
    pub max_retries: usize,
    pub stream: bool,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 90,
            max_retries: 3,
            stream: false,
            temperature: 0.7,
        }
    }
}

/// Polling and dedup settings shared by both bots.
#[derive(Debug, Clone, PartialEq)]
pub struct BotSettings {
    pub poll_interval: Duration,
    pub seen_capacity: usize,
    pub seen_window: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            seen_capacity: 10_000,
            seen_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstagramCredentials {
    pub page_access_token: String,
    pub app_id: String,
    pub api_version: String,
    pub base_url: String,
}

/// Fully resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub port: u16,
    pub cors_origin: String,
    /// Base URL the bots use to reach `/summarize`.
    pub api_url: String,
    pub llm: LlmSettings,
    pub bots: BotSettings,
    pub reddit: Option<RedditCredentials>,
    pub instagram: Option<InstagramCredentials>,
}

impl AppConfig {
    /// Resolve the configuration from parsed CLI arguments, reading the YAML
    /// file they point at, if any.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge CLI values over `file` over defaults, then validate.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let openai_api_key = cli.openai_api_key.trim().to_string();
        if openai_api_key.is_empty() {
            return Err(ConfigError::Missing("OPENAI_API_KEY"));
        }
        if cli.port == 0 {
            return Err(ConfigError::Invalid {
                field: "PORT",
                reason: "must be non-zero".to_string(),
            });
        }

        let defaults = LlmSettings::default();
        let llm = LlmSettings {
            model: cli
                .model
                .clone()
                .or(file.llm.model)
                .unwrap_or(defaults.model),
            base_url: cli
                .openai_base_url
                .clone()
                .or(file.llm.base_url)
                .unwrap_or(defaults.base_url),
            timeout_secs: file.llm.timeout_secs.unwrap_or(defaults.timeout_secs),
            max_retries: file.llm.max_retries.unwrap_or(defaults.max_retries),
            stream: cli.stream || file.llm.stream.unwrap_or(defaults.stream),
            temperature: file.llm.temperature.unwrap_or(defaults.temperature),
        };
        validate_url("OPENAI_BASE_URL", &llm.base_url)?;
        if llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "llm.timeout_secs",
                reason: "must be non-zero".to_string(),
            });
        }

        let bot_defaults = BotSettings::default();
        let bots = BotSettings {
            poll_interval: file
                .bots
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(bot_defaults.poll_interval),
            seen_capacity: file.bots.seen_capacity.unwrap_or(bot_defaults.seen_capacity),
            seen_window: file
                .bots
                .seen_window_secs
                .map(Duration::from_secs)
                .unwrap_or(bot_defaults.seen_window),
        };
        if bots.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "bots.poll_interval_secs",
                reason: "must be non-zero".to_string(),
            });
        }
        if bots.seen_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "bots.seen_capacity",
                reason: "must be non-zero".to_string(),
            });
        }
        // Handled ids are only kept while successive polls keep seeing them.
        if bots.seen_window <= bots.poll_interval {
            return Err(ConfigError::Invalid {
                field: "bots.seen_window_secs",
                reason: format!(
                    "must be longer than the poll interval ({}s)",
                    bots.poll_interval.as_secs()
                ),
            });
        }

        let api_url = cli
            .api_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", cli.port));
        validate_url("API_URL", &api_url)?;

        if cli.cors_origin != "*" {
            validate_url("CORS_ORIGIN", &cli.cors_origin)?;
        }

        Ok(Self {
            openai_api_key,
            port: cli.port,
            cors_origin: cli.cors_origin.clone(),
            api_url: api_url.trim_end_matches('/').to_string(),
            llm,
            bots,
            reddit: reddit_credentials(cli),
            instagram: instagram_credentials(cli),
        })
    }
}

/// Read and parse the YAML config file at `path`.
pub fn load_file(path: &str) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let file = parse_file(&text)?;
    info!(config_path = path, "Loaded configuration file");
    Ok(file)
}

pub fn parse_file(text: &str) -> Result<FileConfig, ConfigError> {
    if text.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            field,
            reason: format!("{value:?}: {e}"),
        })
}

/// A trimmed, non-empty value.
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn reddit_credentials(cli: &Cli) -> Option<RedditCredentials> {
    let fields = [
        present(&cli.reddit_client_id),
        present(&cli.reddit_client_secret),
        present(&cli.reddit_username),
        present(&cli.reddit_password),
    ];
    let any_given = fields.iter().any(Option::is_some);
    match fields {
        [Some(client_id), Some(client_secret), Some(username), Some(password)] => {
            Some(RedditCredentials {
                client_id,
                client_secret,
                username,
                password,
                user_agent: cli.reddit_user_agent.clone(),
            })
        }
        _ => {
            if any_given {
                warn!("Reddit configuration incomplete; Reddit bot disabled");
            } else {
                info!("No Reddit credentials; Reddit bot disabled");
            }
            None
        }
    }
}

fn instagram_credentials(cli: &Cli) -> Option<InstagramCredentials> {
    match (
        present(&cli.instagram_page_access_token),
        present(&cli.instagram_app_id),
    ) {
        (Some(page_access_token), Some(app_id)) => Some(InstagramCredentials {
            page_access_token,
            app_id,
            api_version: cli.instagram_api_version.clone(),
            base_url: cli.instagram_base_url.trim_end_matches('/').to_string(),
        }),
        (None, None) => {
            info!("No Instagram credentials; Instagram bot disabled");
            None
        }
        _ => {
            warn!("Instagram configuration incomplete; Instagram bot disabled");
            None
        }
    }
}
