use std::sync::Arc;

use relay_novita::TaskSource;
use relay_registry::TaskRegistry;

use crate::config::{ConfigError, RelayConfig, RelayTimings};
use crate::relay::{RelayContext, RelayOptions};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Constructed once at startup and cheaply cloneable (inner data is behind
/// `Arc` or is `Copy`). Nothing in the relay reaches for globals.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<RelayConfig>,
    /// Durations parsed from `config`.
    pub timings: RelayTimings,
    /// Single owner of every task record.
    pub registry: Arc<TaskRegistry>,
    /// Upstream task API used for submission and polling.
    pub upstream: Arc<dyn TaskSource>,
}

impl AppState {
    /// Validate `config` and assemble the shared state.
    pub fn new(
        config: RelayConfig,
        registry: Arc<TaskRegistry>,
        upstream: Arc<dyn TaskSource>,
    ) -> Result<Self, ConfigError> {
        let timings = config.timings()?;
        Ok(Self {
            config: Arc::new(config),
            timings,
            registry,
            upstream,
        })
    }

    /// Webhook URL handed to the upstream on submission and polls.
    pub fn webhook_url(&self) -> Option<String> {
        self.config.webhook_url()
    }

    /// Everything a relay connection needs, detached from the HTTP layer.
    pub fn relay_context(&self) -> RelayContext {
        RelayContext {
            registry: Arc::clone(&self.registry),
            upstream: Arc::clone(&self.upstream),
            options: RelayOptions {
                stream_timeout: self.timings.stream_timeout,
                poll_interval: self.timings.poll_interval,
                upstream_timeout: self.timings.upstream_timeout,
                max_poll_retries: self.timings.max_poll_retries,
                forward_deltas: self.config.settings.stream,
                callback_url: self.webhook_url(),
            },
        }
    }
}
