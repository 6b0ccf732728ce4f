use tokio::sync::broadcast;
use tracing::trace;

use super::{DisplayEvent, DisplaySink};

/// Events buffered for slow overlay pages before they start lagging
const EVENT_BUFFER: usize = 256;

/// Publishes display commands to connected overlay pages
///
/// The HTTP server subscribes each page to the broadcast channel. With no
/// page connected, events are dropped.
#[derive(Debug, Clone)]
pub struct OverlayDisplay {
    events: broadcast::Sender<DisplayEvent>,
}

impl OverlayDisplay {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: DisplayEvent) {
        if self.events.send(event).is_err() {
            trace!("No overlay connected");
        }
    }
}

impl Default for OverlayDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for OverlayDisplay {
    fn show_listening(&self) {
        self.publish(DisplayEvent::Listening);
    }

    fn add_user_message(&self, text: &str) {
        self.publish(DisplayEvent::UserMessage {
            text: text.to_string(),
        });
    }

    fn start_reply(&self) {
        self.publish(DisplayEvent::ReplyStart);
    }

    fn append_reply(&self, text: &str) {
        self.publish(DisplayEvent::ReplyDelta {
            text: text.to_string(),
        });
    }

    fn finish_reply(&self) {
        self.publish(DisplayEvent::ReplyFinish);
    }
}
