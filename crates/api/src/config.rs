//! Layered configuration for the relay server.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. YAML file (`RELAY_CONFIG`, default `config.yaml`; optional)
//! 3. `RELAY_*` environment variables (`__` separates sections, e.g.
//!    `RELAY_RELAY__POLL_INTERVAL=5s`)
//! 4. Provider overrides: `OPENAI_API_KEY`, `OPENAI_PROXY_URL`,
//!    `OPENAI_DEFAULT_MODEL`, plus `HOST` and `PORT`, applied only when
//!    set to a non-empty value.
//!
//! Durations are strings such as `"500ms"`, `"30s"`, `"5m"`, `"1h"` or bare
//! seconds (`"30"`). They are validated once, at startup, by
//! [`RelayConfig::timings`].

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default config file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Environment variables that override single provider fields.
const PROVIDER_ENV_OVERRIDES: [&str; 3] =
    ["OPENAI_API_KEY", "OPENAI_PROXY_URL", "OPENAI_DEFAULT_MODEL"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub chat_models: ChatModelsConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub relay: RelaySettings,
}

/// Upstream provider selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatModelsConfig {
    pub platform: String,
    #[serde(default)]
    pub configs: ProviderConfig,
}

impl Default for ChatModelsConfig {
    fn default() -> Self {
        Self {
            platform: "novita".into(),
            configs: ProviderConfig::default(),
        }
    }
}

/// Credentials and model identifiers for the upstream provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    /// Base URL of the upstream API (or a proxy in front of it).
    pub proxy_url: String,
    pub default_model: String,
    #[serde(default)]
    pub summary_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            proxy_url: "https://api.novita.ai".into(),
            default_model: "sd_xl_base_1.0.safetensors".into(),
            summary_model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingsConfig {
    pub max_tokens: u32,
    /// Forward intermediate content deltas. When off, clients only get the
    /// accepted frame and the terminal frame.
    pub stream: bool,
    /// Per-request deadline for upstream calls.
    pub timeout: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            stream: true,
            timeout: "30s".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL; the upstream is told to POST
    /// webhooks to `{public_url}/webhook`. Empty disables webhook
    /// registration.
    pub public_url: String,
    /// Timeout for producing a response head, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            public_url: "http://localhost:8080".into(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelaySettings {
    /// Wall-clock window a relay connection waits for a terminal state.
    pub stream_timeout: String,
    /// Delay between status polls while a relay connection is open.
    pub poll_interval: String,
    /// Consecutive retryable poll failures tolerated before giving up.
    pub max_poll_retries: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            stream_timeout: "300s".into(),
            poll_interval: "3s".into(),
            max_poll_retries: 3,
        }
    }
}

/// Parsed, validated durations and limits used at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimings {
    pub upstream_timeout: Duration,
    pub stream_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_retries: u32,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl RelayConfig {
    /// Load from `RELAY_CONFIG` (or [`DEFAULT_CONFIG_PATH`]) and the
    /// environment, after loading `.env` if present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path =
            std::env::var("RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Load from a specific YAML file (missing files are skipped) and the
    /// environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config: Self = Self::figment(path).extract()?;
        config.apply_env_overrides();
        config.timings()?;
        Ok(config)
    }

    /// Defaults, the YAML file, then `RELAY_*` variables.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("RELAY_").ignore(&["CONFIG"]).split("__"))
    }

    /// Apply the provider and server overrides that take precedence over
    /// the file when set.
    fn apply_env_overrides(&mut self) {
        for var in PROVIDER_ENV_OVERRIDES {
            let Some(value) = non_empty_env(var) else {
                continue;
            };
            let provider = &mut self.chat_models.configs;
            match var {
                "OPENAI_API_KEY" => provider.api_key = value,
                "OPENAI_PROXY_URL" => provider.proxy_url = value,
                _ => provider.default_model = value,
            }
        }

        if let Some(host) = non_empty_env("HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty_env("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Parse every duration setting.
    pub fn timings(&self) -> Result<RelayTimings, ConfigError> {
        Ok(RelayTimings {
            upstream_timeout: parse_duration("settings.timeout", &self.settings.timeout)?,
            stream_timeout: parse_duration("relay.stream_timeout", &self.relay.stream_timeout)?,
            poll_interval: parse_duration("relay.poll_interval", &self.relay.poll_interval)?,
            max_poll_retries: self.relay.max_poll_retries,
        })
    }

    /// URL the upstream should POST task events to, if webhooks are enabled.
    pub fn webhook_url(&self) -> Option<String> {
        let base = self.server.public_url.trim().trim_end_matches('/');
        (!base.is_empty()).then(|| format!("{base}/webhook"))
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `"500ms"`, `"30s"`, `"5m"`, `"1h"` or bare seconds.
///
/// Zero durations are rejected.
pub fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("{reason} (got {raw:?})"),
    };

    let value = raw.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| invalid("expected a number followed by ms, s, m or h"))?;

    let seconds = |per_unit: u64| {
        amount
            .checked_mul(per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| invalid("duration is too large"))
    };
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => seconds(60)?,
        "h" => seconds(3600)?,
        _ => return Err(invalid("unknown duration unit")),
    };

    if duration.is_zero() {
        return Err(invalid("duration must be positive"));
    }
    Ok(duration)
}
