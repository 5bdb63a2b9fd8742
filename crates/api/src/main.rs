use std::net::SocketAddr;
use std::sync::Arc;

use relay_api::config::RelayConfig;
use relay_api::router::build_app_router;
use relay_api::state::AppState;
use relay_novita::NovitaApi;
use relay_registry::TaskRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_api=debug,relay_novita=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = RelayConfig::load().expect("Failed to load configuration");
    let timings = config.timings().expect("Invalid relay timings");
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        platform = %config.chat_models.platform,
        default_model = %config.chat_models.configs.default_model,
        max_tokens = config.settings.max_tokens,
        stream = config.settings.stream,
        "Loaded relay configuration",
    );

    if config.chat_models.platform != "novita" {
        tracing::warn!(
            platform = %config.chat_models.platform,
            "Unsupported platform configured, using the novita task API",
        );
    }
    if config.chat_models.configs.api_key.is_empty() {
        tracing::warn!("No upstream API key configured; upstream calls will be rejected");
    }
    if !config.chat_models.configs.summary_model.is_empty() {
        tracing::debug!(
            summary_model = %config.chat_models.configs.summary_model,
            "Summary model configured but unused by the task relay",
        );
    }

    match config.webhook_url() {
        Some(url) => tracing::info!(%url, "Webhook registration enabled"),
        None => tracing::info!("No public URL configured; relying on polling only"),
    }

    // --- Upstream client ---
    let http = reqwest::Client::builder()
        .connect_timeout(timings.upstream_timeout)
        .build()
        .expect("Failed to build HTTP client");
    let upstream = NovitaApi::with_client(
        http,
        config.chat_models.configs.proxy_url.clone(),
        config.chat_models.configs.api_key.clone(),
    )
    .with_submit_timeout(timings.upstream_timeout);
    tracing::info!(base_url = upstream.base_url(), "Upstream client created");

    // --- Task registry ---
    let registry = Arc::new(TaskRegistry::default());

    // --- App state ---
    let addr = SocketAddr::new(
        config.server.host.parse().expect("Invalid HOST address"),
        config.server.port,
    );
    let state = AppState::new(config, Arc::clone(&registry), Arc::new(upstream))
        .expect("Invalid configuration");

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!(tasks = registry.len().await, "Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
