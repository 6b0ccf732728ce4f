use super::state::AppState;
use crate::agent::AgentStatus;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Json,
    },
};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const OVERLAY_PAGE: &str = include_str!("../../ui/overlay.html");

#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    pub status: String,
}

/// GET /
/// The overlay page
pub async fn overlay_page() -> Html<&'static str> {
    Html(OVERLAY_PAGE)
}

/// GET /events
/// Display events as server-sent events, until shutdown
pub async fn display_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Overlay connected");
    let receiver = state.overlay.subscribe();
    let stop = state.stop.clone();

    let events = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let data = match serde_json::to_string(&event) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!("Failed to encode display event: {}", e);
                            continue;
                        }
                    };
                    return Some((Ok(Event::default().data(data)), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Overlay fell behind, {} display events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .take_until(async move { stop.stopped().await });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// GET /status
/// Current session state and the last session report
pub async fn agent_status(State(state): State<AppState>) -> Json<AgentStatus> {
    let status = state
        .status
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    Json(status)
}

/// POST /shutdown
/// Stop the agent (the overlay's close button)
pub async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    info!("Shutdown requested over HTTP");
    state.stop.trigger();
    (
        StatusCode::ACCEPTED,
        Json(ShutdownResponse {
            status: "stopping".to_string(),
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
