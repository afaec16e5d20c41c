//! Application settings and Telegram configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::diagnosis::DiagnosisStyle;
use crate::directory::FallbackPolicy;

/// Telegram API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by `@BotFather`.
    pub bot_token: String,

    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("diagnosis_bot.session")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(bot_token: String, api_id: i32, api_hash: String) -> Self {
        Self {
            bot_token,
            api_id,
            api_hash,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `BOT_TOKEN` (or `TELEGRAM_TOKEN`), `TG_API_ID` and
    /// `TG_API_HASH` to be set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_var)
    }

    /// Creates configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty_var = |name: &str| non_empty(&lookup, name);

        let bot_token = non_empty_var("BOT_TOKEN")
            .or_else(|| non_empty_var("TELEGRAM_TOKEN"))
            .ok_or(ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let api_id: i32 = non_empty_var("TG_API_ID")
            .ok_or(ConfigError::MissingEnvVar("TG_API_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;

        if api_id <= 0 {
            return Err(ConfigError::InvalidApiId);
        }

        let api_hash = non_empty_var("TG_API_HASH").ok_or(ConfigError::MissingEnvVar("TG_API_HASH"))?;

        let session_path = non_empty_var("TG_SESSION_PATH").map_or_else(default_session_path, PathBuf::from);

        Ok(Self {
            bot_token,
            api_id,
            api_hash,
            session_path,
        })
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("session_path", &self.session_path)
            .finish_non_exhaustive()
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// How long a member snapshot is trusted before it is refreshed.
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,

    /// How many recent messages the history fallback scans.
    #[serde(default = "default_history_scan_limit")]
    pub history_scan_limit: usize,

    /// Upper bound for a single flood-wait suspension.
    #[serde(default = "default_rate_limit_cap")]
    pub rate_limit_cap_secs: u64,

    /// Timeout applied to every platform call.
    #[serde(default = "default_platform_timeout")]
    pub platform_timeout_secs: u64,

    /// Order in which member retrieval strategies are tried.
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,

    /// How composed diagnoses are rendered.
    #[serde(default)]
    pub diagnosis_style: DiagnosisStyle,

    /// Optional JSON file overriding the built-in word tables.
    #[serde(default)]
    pub diagnoses_path: Option<PathBuf>,
}

fn default_snapshot_ttl() -> u64 {
    30 * 60
}

fn default_history_scan_limit() -> usize {
    200
}

fn default_rate_limit_cap() -> u64 {
    60
}

fn default_platform_timeout() -> u64 {
    30
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: default_snapshot_ttl(),
            history_scan_limit: default_history_scan_limit(),
            rate_limit_cap_secs: default_rate_limit_cap(),
            platform_timeout_secs: default_platform_timeout(),
            fallback_policy: FallbackPolicy::default(),
            diagnosis_style: DiagnosisStyle::default(),
            diagnoses_path: None,
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    ///
    /// Unparseable values are logged and replaced by their defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self::from_lookup(env_var)
    }

    /// Creates bot settings from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty_var = |name: &str| non_empty(&lookup, name);

        let history_scan_limit = parsed(&lookup, "HISTORY_SCAN_LIMIT").unwrap_or_else(default_history_scan_limit);

        let fallback_policy = non_empty_var("FALLBACK_ORDER")
            .and_then(|raw| match FallbackPolicy::parse(&raw, history_scan_limit) {
                Ok(policy) => Some(policy),
                Err(e) => {
                    warn!("Ignoring FALLBACK_ORDER: {}", e);
                    None
                }
            })
            .unwrap_or_else(|| FallbackPolicy::standard(history_scan_limit));

        Self {
            snapshot_ttl_secs: parsed(&lookup, "SNAPSHOT_TTL_SECS").unwrap_or_else(default_snapshot_ttl),
            history_scan_limit,
            rate_limit_cap_secs: parsed(&lookup, "RATE_LIMIT_CAP_SECS").unwrap_or_else(default_rate_limit_cap),
            platform_timeout_secs: parsed::<u64>(&lookup, "PLATFORM_TIMEOUT_SECS")
                .filter(|&secs| secs > 0)
                .unwrap_or_else(default_platform_timeout),
            fallback_policy,
            diagnosis_style: parsed(&lookup, "DIAGNOSIS_STYLE").unwrap_or_default(),
            diagnoses_path: non_empty_var("DIAGNOSES_PATH").map(PathBuf::from),
        }
    }

    /// Snapshot freshness window.
    #[must_use]
    pub const fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    /// Flood-wait suspension cap.
    #[must_use]
    pub const fn rate_limit_cap(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cap_secs)
    }

    /// Per-call platform timeout.
    #[must_use]
    pub const fn platform_timeout(&self) -> Duration {
        Duration::from_secs(self.platform_timeout_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = non_empty(lookup, name)?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        warn!("Ignoring unparseable {}={:?}", name, raw);
    }
    parsed
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,
}
