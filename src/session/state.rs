use serde::{Deserialize, Serialize};
use std::fmt;

use super::stats::{SessionStats, Utterance};

/// Lifecycle of one recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Recognizer started, waiting for the stream to open and the device
    Opening,
    /// Streaming frames
    Listening,
    /// Releasing the device and the stream
    Closing,
    /// The session could not be opened
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Listening => "listening",
            SessionState::Closing => "closing",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Receives session notifications
///
/// Called from the session's read loop, so implementations must return
/// quickly and hand long work (like generating a reply) to another task.
pub trait SessionListener: Send + Sync {
    /// A finalized, non-empty utterance was recognized
    fn on_utterance(&self, utterance: Utterance);

    /// The session entered `Listening`
    fn on_listening(&self) {}

    /// Every state transition, including `Listening`
    fn on_state(&self, _state: SessionState) {}

    /// A session finished and released its resources
    fn on_session_end(&self, _stats: &SessionStats) {}
}
