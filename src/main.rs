//! itemguard HTTP server
//!
//! Resolves the signing key and login credentials through the configured
//! secrets provider (`SECRETS_PROVIDER`, default `env`), then serves
//! `/login`, `/items` and `/health` on `LISTEN_ADDR:PORT` (default
//! `0.0.0.0:9292`).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use itemguard::observability::{self, ObservabilityConfig, SecurityEvent};
use itemguard::{routes, secrets, AppConfig, AppState};
use tracing::info;

const LOCKOUT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init(&ObservabilityConfig::from_env())
        .context("failed to initialize logging")?;

    let provider = secrets::provider_from_env().context("failed to configure secrets provider")?;
    let config = AppConfig::load(provider.as_ref())
        .await
        .context("failed to load configuration")?;

    let state = AppState::new(&config);
    spawn_lockout_cleanup(&state);

    let app = routes::app(state, &config.http);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    itemguard::security_event!(
        SecurityEvent::SystemStartup,
        address = %addr,
        environment = %config.environment,
        secrets_provider = provider.name(),
        token_lifetime_secs = config.token_lifetime.as_secs(),
        "Server listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    itemguard::security_event!(SecurityEvent::SystemShutdown, "Server stopped");
    Ok(())
}

/// Prune idle lockout records so attacker-chosen usernames do not pile up.
fn spawn_lockout_cleanup(state: &AppState) {
    let tracker = state.login_tracker.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOCKOUT_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            tracker.cleanup();
            let (users, ips) = tracker.tracked();
            tracing::debug!(users, ips, "Lockout records pruned");
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
