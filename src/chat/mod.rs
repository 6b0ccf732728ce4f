//! Streaming replies from a chat-completion service

mod client;
mod dispatcher;
mod error;
pub mod sse;

pub use client::{ChatClient, ChatMessage, ChatRequest, OpenAiCompatClient, ReplyStream};
pub use dispatcher::ResponseDispatcher;
pub use error::ChatError;
pub use sse::SseDecoder;
