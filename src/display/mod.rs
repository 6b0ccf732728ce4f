//! Rendering of listening status, user utterances and streamed replies

mod console;
mod overlay;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use console::ConsoleDisplay;
pub use overlay::OverlayDisplay;

/// Something that can show the conversation
///
/// Calls may arrive concurrently from overlapping reply tasks.
pub trait DisplaySink: Send + Sync {
    fn show_listening(&self);

    fn add_user_message(&self, text: &str);

    /// Begin a new streamed reply
    fn start_reply(&self);

    /// Append a chunk to the reply in progress
    fn append_reply(&self, text: &str);

    /// Mark the reply in progress as complete
    fn finish_reply(&self);
}

/// One display command, as pushed to the overlay page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayEvent {
    Listening,
    UserMessage { text: String },
    ReplyStart,
    ReplyDelta { text: String },
    ReplyFinish,
}

impl DisplayEvent {
    /// Replay this event on a sink
    pub fn apply(&self, sink: &dyn DisplaySink) {
        match self {
            DisplayEvent::Listening => sink.show_listening(),
            DisplayEvent::UserMessage { text } => sink.add_user_message(text),
            DisplayEvent::ReplyStart => sink.start_reply(),
            DisplayEvent::ReplyDelta { text } => sink.append_reply(text),
            DisplayEvent::ReplyFinish => sink.finish_reply(),
        }
    }
}

/// Scoped streamed reply
///
/// `start_reply` is sent on creation and `finish_reply` exactly once, either
/// through `finish` or on drop, so an interrupted reply is still closed.
pub struct ReplyGuard {
    sink: Arc<dyn DisplaySink>,
    text: String,
    finished: bool,
}

impl ReplyGuard {
    pub fn start(sink: Arc<dyn DisplaySink>) -> Self {
        sink.start_reply();
        Self {
            sink,
            text: String::new(),
            finished: false,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        self.sink.append_reply(chunk);
        self.text.push_str(chunk);
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Close the reply and return the full text
    pub fn finish(mut self) -> String {
        self.close();
        std::mem::take(&mut self.text)
    }

    fn close(&mut self) {
        if !self.finished {
            self.finished = true;
            self.sink.finish_reply();
        }
    }
}

impl Drop for ReplyGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forwards every command to several sinks
pub struct DisplayFanout {
    sinks: Vec<Arc<dyn DisplaySink>>,
}

impl DisplayFanout {
    pub fn new(sinks: Vec<Arc<dyn DisplaySink>>) -> Self {
        Self { sinks }
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl DisplaySink for DisplayFanout {
    fn show_listening(&self) {
        self.sinks.iter().for_each(|s| s.show_listening());
    }

    fn add_user_message(&self, text: &str) {
        self.sinks.iter().for_each(|s| s.add_user_message(text));
    }

    fn start_reply(&self) {
        self.sinks.iter().for_each(|s| s.start_reply());
    }

    fn append_reply(&self, text: &str) {
        self.sinks.iter().for_each(|s| s.append_reply(text));
    }

    fn finish_reply(&self) {
        self.sinks.iter().for_each(|s| s.finish_reply());
    }
}
