//! Server startup and lifecycle

use crate::{routes, AppState, RelayConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Bind the configured address and serve until `shutdown_signal` resolves.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn run_server_with_shutdown(
    config: RelayConfig,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config)?);
    let primary = state.registry.current_name();
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, %primary, "cidrelay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Relay shutdown complete");
    Ok(())
}
