//! Recognition session management
//!
//! This module provides:
//! - `SessionSupervisor`: one session's state machine (open, stream, reset on silence, close)
//! - `ReconnectLoop`: back-to-back sessions with a fixed, cancellable backoff
//! - `SessionListener`: notifications for utterances and state changes
//! - Session statistics and exit reasons

mod config;
mod reconnect;
mod state;
mod stats;
mod supervisor;

pub use config::SessionConfig;
pub use reconnect::{ReconnectLoop, SessionComponents};
pub use state::{SessionListener, SessionState};
pub use stats::{SessionExit, SessionStats, Utterance};
pub use supervisor::SessionSupervisor;
