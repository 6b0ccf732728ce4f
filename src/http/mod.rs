//! Overlay and status server
//!
//! The overlay is a small page rendered in a browser window:
//! - GET / - Overlay page
//! - GET /events - Display events (server-sent events)
//! - GET /status - Agent status
//! - POST /shutdown - Stop the agent
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

pub use routes::create_router;
pub use state::AppState;

/// Serve the overlay until the stop signal fires
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let stop = state.stop.clone();
    let addr = listener.local_addr().context("Overlay listener has no address")?;
    info!("Overlay available at http://{}/", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { stop.stopped().await })
        .await
        .context("Overlay server failed")
}
