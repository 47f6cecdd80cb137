//! Server startup and graceful shutdown

use crate::constants::SHUTDOWN_GRACE_MARGIN_SECS;
use crate::state::AppState;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;

/// Start the server with graceful shutdown.
///
/// After the listener stops, in-flight provisioning runs get up to one site-creation
/// timeout (plus a margin) to finish before the process exits.
pub async fn start_server(state: Arc<AppState>, app: Router) -> Result<()> {
    let config = state.config.clone();
    let addr = format!("0.0.0.0:{}", config.server_port());
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        backend = state.registry.backend_name(),
        root_domain = %config.root_domain(),
        default_apps = %config.default_apps().join(","),
        site_create_timeout_secs = config.site_create_timeout().as_secs(),
        sync_provision_timeout_secs = config.sync_provision_timeout().as_secs(),
        setup_nginx = config.setup_nginx(),
        "Server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let grace = config.site_create_timeout() + Duration::from_secs(SHUTDOWN_GRACE_MARGIN_SECS);
    let in_flight = state.runner.in_flight();
    if in_flight > 0 {
        tracing::info!(in_flight, grace_secs = grace.as_secs(), "Waiting for provisioning runs");
    }
    if !state.runner.shutdown(grace).await {
        tracing::warn!(
            in_flight = state.runner.in_flight(),
            "Provisioning runs still in flight at exit; their tenants stay pending and can be resumed"
        );
    }

    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
