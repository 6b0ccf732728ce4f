use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionExit {
    /// Shutdown was requested
    Stopped,
    /// No speech for longer than the silence timeout; self-initiated reset
    SilenceTimeout,
    /// The audio device stopped delivering frames
    DeviceLost,
    /// The recognition service reported an error or a send failed
    RemoteError(String),
    /// The recognition service closed the stream
    RemoteClosed,
    /// The recognizer or the audio device could not be opened
    OpenFailed(String),
}

impl SessionExit {
    /// Whether this exit counts as a lost connection
    pub fn is_connection_lost(&self) -> bool {
        !matches!(self, SessionExit::Stopped | SessionExit::SilenceTimeout)
    }
}

/// Statistics about a finished recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Frames forwarded to the recognizer
    pub frames_sent: u64,

    /// Frames classified as speech
    pub speech_frames: u64,

    /// Finalized utterances surfaced to the listener
    pub utterances: u64,

    pub exit: SessionExit,
}

/// A finalized recognized sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Recognized text, exactly as delivered by the recognizer
    pub text: String,

    /// When this utterance was received
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
