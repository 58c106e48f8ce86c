//! Server startup and shutdown.

use crate::router::create_router;
use crate::state::ApiState;
use portico_core::{PorticoConfig, SharedClock, SystemClock};
use portico_tickets::TicketSigner;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How often consumed ticket ids past their expiry are dropped.
const REPLAY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Run the API server until Ctrl+C or SIGTERM.
pub async fn run(config: PorticoConfig, signer: Arc<TicketSigner>) -> anyhow::Result<()> {
    let bind: SocketAddr = config.server.bind.parse()?;
    let clock: SharedClock = Arc::new(SystemClock);
    let state = ApiState::from_config(&config, signer, clock);

    if let Some(replay) = state.replay.clone() {
        let clock = state.clock.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REPLAY_PURGE_INTERVAL);
            loop {
                interval.tick().await;
                let purged = replay.purge_expired(clock.now_secs());
                if purged > 0 {
                    debug!(category = "api", purged, remaining = replay.len(), "Purged consumed tickets");
                }
            }
        });
    }

    info!(
        category = "api",
        plugins = state.gates.len(),
        ttl_secs = config.tickets.ttl_secs,
        "Ticket gates configured"
    );
    let app = create_router(state, &config.host_origin()?);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(category = "api", "Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(category = "api", "Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
