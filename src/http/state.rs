use crate::agent::{AgentStatus, SharedStatus};
use crate::display::OverlayDisplay;
use crate::signal::StopSignal;
use std::sync::{Arc, RwLock};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Source of display events pushed to overlay pages
    pub overlay: OverlayDisplay,

    /// Agent status, updated by the session listener
    pub status: SharedStatus,

    /// Global shutdown signal
    pub stop: StopSignal,
}

impl AppState {
    pub fn new(overlay: OverlayDisplay, status: SharedStatus, stop: StopSignal) -> Self {
        Self {
            overlay,
            status,
            stop,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            OverlayDisplay::new(),
            Arc::new(RwLock::new(AgentStatus::default())),
            StopSignal::new(),
        )
    }
}
