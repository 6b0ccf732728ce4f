//! Streaming speech recognition
//!
//! A recognizer accepts raw PCM frames and pushes lifecycle and result
//! notifications back over a channel. The session supervisor consumes that
//! channel alongside the audio frames, so no callback ever touches session
//! state directly.
//!
//! Backends:
//! - DashScope realtime ASR over WebSocket
//! - NATS, for a self-hosted STT service

pub mod dashscope;
pub mod messages;
pub mod nats;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::{Config, RecognitionBackendKind};

pub use dashscope::DashScopeRecognizer;
pub use messages::{AudioFrameMessage, TranscriptMessage};
pub use nats::NatsRecognizer;

/// Events buffered between a recognizer's reader and the session
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A recognized sentence, partial or final
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub text: String,
    /// Whether this is the finalized form of the sentence
    pub sentence_end: bool,
    pub begin_ms: Option<u64>,
    pub end_ms: Option<u64>,
}

/// Notifications pushed by a recognition stream
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// The remote task is ready to accept audio
    Open,
    /// A (possibly partial) recognition result
    Sentence(Sentence),
    /// The remote reported a failure; the stream is unusable
    Error(String),
    /// The stream closed
    Close,
}

/// Streaming recognition backend
#[async_trait::async_trait]
pub trait Recognizer: Send {
    /// Connect and begin a recognition task
    ///
    /// Returns the event channel. `Open` is delivered once the remote is ready;
    /// the channel ends after `Close` or `Error`.
    async fn start(&mut self) -> Result<mpsc::Receiver<RecognitionEvent>>;

    /// Send one frame of little-endian i16 PCM
    async fn send_frame(&mut self, pcm: &[u8]) -> Result<()>;

    /// Finish the task and release the connection. Idempotent.
    async fn stop(&mut self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Build the recognizer selected in configuration
pub fn create_recognizer(config: &Config, api_key: &str) -> Result<Box<dyn Recognizer>> {
    match config.recognition.backend {
        RecognitionBackendKind::DashScope => Ok(Box::new(DashScopeRecognizer::new(
            config.recognition.url.clone(),
            api_key.to_string(),
            config.recognition.model.clone(),
            config.audio.sample_rate,
        ))),
        RecognitionBackendKind::Nats => Ok(Box::new(NatsRecognizer::new(
            config.recognition.nats_url.clone(),
            format!("session-{}", uuid::Uuid::new_v4()),
            config.audio.sample_rate,
            config.audio.channels,
        ))),
    }
}
