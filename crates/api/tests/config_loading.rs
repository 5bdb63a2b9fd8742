//! Integration tests for YAML configuration loading and environment
//! overrides.
//!
//! Uses figment::Jail for sandboxed files and env vars.

use std::time::Duration;

use assert_matches::assert_matches;
use figment::Jail;
use relay_api::config::{ConfigError, RelayConfig};

const CONFIG_YAML: &str = r#"
chat_models:
  platform: novita
  configs:
    api_key: "file-key"
    proxy_url: "https://proxy.test"
    default_model: "file-model"
    summary_model: "summary-model"
settings:
  max_tokens: 1024
  stream: false
  timeout: "10s"
server:
  host: "127.0.0.1"
  port: 9090
  public_url: "https://relay.test"
relay:
  stream_timeout: "2m"
  poll_interval: "500ms"
  max_poll_retries: 5
"#;

/// Blank out the single-field overrides so the host environment cannot leak
/// into assertions about file values.
fn clear_overrides(jail: &mut Jail) {
    for var in [
        "OPENAI_API_KEY",
        "OPENAI_PROXY_URL",
        "OPENAI_DEFAULT_MODEL",
        "HOST",
        "PORT",
    ] {
        jail.set_env(var, "");
    }
}

// ---------------------------------------------------------------------------
// Test: every section is read from the YAML file
// ---------------------------------------------------------------------------

#[test]
fn loads_all_sections_from_yaml() {
    Jail::expect_with(|jail| {
        clear_overrides(jail);
        jail.create_file("config.yaml", CONFIG_YAML)?;

        let config = RelayConfig::load_from("config.yaml").unwrap();

        assert_eq!(config.chat_models.platform, "novita");
        assert_eq!(config.chat_models.configs.api_key, "file-key");
        assert_eq!(config.chat_models.configs.proxy_url, "https://proxy.test");
        assert_eq!(config.chat_models.configs.default_model, "file-model");
        assert_eq!(config.chat_models.configs.summary_model, "summary-model");
        assert_eq!(config.settings.max_tokens, 1024);
        assert!(!config.settings.stream);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(
            config.webhook_url().as_deref(),
            Some("https://relay.test/webhook")
        );

        let timings = config.timings().unwrap();
        assert_eq!(timings.upstream_timeout, Duration::from_secs(10));
        assert_eq!(timings.stream_timeout, Duration::from_secs(120));
        assert_eq!(timings.poll_interval, Duration::from_millis(500));
        assert_eq!(timings.max_poll_retries, 5);
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Test: a missing file falls back to defaults
// ---------------------------------------------------------------------------

#[test]
fn missing_file_uses_defaults() {
    Jail::expect_with(|jail| {
        clear_overrides(jail);

        let config = RelayConfig::load_from("does-not-exist.yaml").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chat_models.configs.proxy_url, "https://api.novita.ai");
        assert!(config.settings.stream);
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Test: provider env vars override the file, empty ones are ignored
// ---------------------------------------------------------------------------

#[test]
fn provider_env_overrides_file_values() {
    Jail::expect_with(|jail| {
        clear_overrides(jail);
        jail.create_file("config.yaml", CONFIG_YAML)?;
        jail.set_env("OPENAI_API_KEY", "env-key");
        jail.set_env("OPENAI_PROXY_URL", "https://env-proxy.test");
        jail.set_env("PORT", "7070");

        let config = RelayConfig::load_from("config.yaml").unwrap();

        assert_eq!(config.chat_models.configs.api_key, "env-key");
        assert_eq!(config.chat_models.configs.proxy_url, "https://env-proxy.test");
        // Set to empty by clear_overrides, so the file value stands.
        assert_eq!(config.chat_models.configs.default_model, "file-model");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7070);
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Test: RELAY_* variables override nested keys
// ---------------------------------------------------------------------------

#[test]
fn prefixed_env_overrides_nested_keys() {
    Jail::expect_with(|jail| {
        clear_overrides(jail);
        jail.create_file("config.yaml", CONFIG_YAML)?;
        jail.set_env("RELAY_RELAY__POLL_INTERVAL", "5s");
        jail.set_env("RELAY_SETTINGS__STREAM", "true");

        let config = RelayConfig::load_from("config.yaml").unwrap();

        assert_eq!(config.relay.poll_interval, "5s");
        assert!(config.settings.stream);
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Test: RELAY_CONFIG selects the file loaded by load()
// ---------------------------------------------------------------------------

#[test]
fn relay_config_env_selects_file() {
    Jail::expect_with(|jail| {
        clear_overrides(jail);
        jail.create_file("custom.yaml", CONFIG_YAML)?;
        jail.set_env("RELAY_CONFIG", "custom.yaml");

        let config = RelayConfig::load().unwrap();

        assert_eq!(config.server.port, 9090);
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Test: invalid durations fail loading and name the field
// ---------------------------------------------------------------------------

#[test]
fn invalid_duration_fails_loading() {
    Jail::expect_with(|jail| {
        clear_overrides(jail);
        jail.create_file(
            "config.yaml",
            r#"
relay:
  stream_timeout: "forever"
"#,
        )?;

        let err = RelayConfig::load_from("config.yaml").unwrap_err();

        assert_matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "relay.stream_timeout"
        );
        Ok(())
    });
}
