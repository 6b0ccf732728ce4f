use thiserror::Error;

/// Failures talking to the chat-completion service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("network connection failed: {0}")]
    Connection(String),

    #[error("request rate too high, try again later")]
    RateLimited,

    #[error("chat service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed reply stream: {0}")]
    Malformed(String),
}
