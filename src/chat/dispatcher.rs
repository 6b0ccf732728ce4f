use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::client::{ChatClient, ChatMessage, ChatRequest};
use super::error::ChatError;
use crate::display::{DisplaySink, ReplyGuard};
use crate::session::Utterance;

/// Turns recognized utterances into streamed replies on the display
#[derive(Clone)]
pub struct ResponseDispatcher {
    chat: Arc<dyn ChatClient>,
    display: Arc<dyn DisplaySink>,
    model: String,
    system_prompt: String,
}

impl ResponseDispatcher {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        display: Arc<dyn DisplaySink>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            display,
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// The two-message request for an utterance
    pub fn request_for(&self, utterance: &Utterance) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(&self.system_prompt),
                ChatMessage::user(&utterance.text),
            ],
            stream: true,
        }
    }

    /// Generate a reply on a separate task
    ///
    /// The handle resolves to the full reply, or `None` if the chat service
    /// failed. Failures are logged and never retried.
    pub fn dispatch(&self, utterance: Utterance) -> JoinHandle<Option<String>> {
        let this = self.clone();
        tokio::spawn(async move { this.respond(utterance).await })
    }

    async fn respond(&self, utterance: Utterance) -> Option<String> {
        let request = self.request_for(&utterance);
        let mut reply = ReplyGuard::start(Arc::clone(&self.display));

        let mut stream = match self.chat.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => {
                log_failure(&e);
                return None;
            }
        };

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) if text.is_empty() => {}
                Ok(text) => reply.append(&text),
                Err(e) => {
                    log_failure(&e);
                    return None;
                }
            }
        }

        let text = reply.finish();
        info!("AI reply: {}", text);
        Some(text)
    }
}

fn log_failure(e: &ChatError) {
    match e {
        ChatError::Connection(_) => error!("Network error, check your connection: {}", e),
        ChatError::RateLimited => warn!("Rate limited by the chat service, reply skipped"),
        ChatError::Status { .. } | ChatError::Malformed(_) => error!("Chat request failed: {}", e),
    }
}
