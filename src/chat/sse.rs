//! Incremental decoding of OpenAI-style server-sent event bodies

use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;

use super::error::ChatError;

/// Splits a byte stream into SSE `data:` payloads
///
/// Network chunks can end anywhere, including inside a line or a multi-byte
/// character, so bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns the payloads of every completed `data:` line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a final line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    line.strip_prefix("data:")
        .map(|data| data.strip_prefix(' ').unwrap_or(data).to_string())
}

/// One decoded `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseChunk {
    /// Text appended to the reply
    Delta(String),
    /// A chunk without content (role announcement, usage, finish reason)
    Empty,
    /// The `[DONE]` terminator
    Done,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

pub fn parse_chunk(data: &str) -> Result<SseChunk, ChatError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseChunk::Done);
    }
    if data.is_empty() {
        return Ok(SseChunk::Empty);
    }

    let chunk: CompletionChunk =
        serde_json::from_str(data).map_err(|e| ChatError::Malformed(e.to_string()))?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|text| !text.is_empty());

    Ok(match content {
        Some(text) => SseChunk::Delta(text),
        None => SseChunk::Empty,
    })
}

struct DecodeState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    exhausted: bool,
}

/// Turn a streamed completion body into a stream of text deltas
///
/// Ends at `[DONE]` or at the end of the body. A transport or parse error is
/// yielded once and ends the stream.
pub fn reply_stream<S, B, E>(body: S) -> BoxStream<'static, Result<String, ChatError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(data) = st.pending.pop_front() {
                match parse_chunk(&data) {
                    Ok(SseChunk::Delta(text)) => return Some((Ok(text), st)),
                    Ok(SseChunk::Empty) => continue,
                    Ok(SseChunk::Done) => return None,
                    Err(e) => {
                        st.pending.clear();
                        st.exhausted = true;
                        return Some((Err(e), st));
                    }
                }
            }

            if st.exhausted {
                return None;
            }

            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let payloads = st.decoder.push(bytes.as_ref());
                    st.pending.extend(payloads);
                }
                Some(Err(e)) => {
                    st.exhausted = true;
                    return Some((Err(ChatError::Connection(e.to_string())), st));
                }
                None => {
                    st.exhausted = true;
                    let payloads = st.decoder.finish();
                    st.pending.extend(payloads);
                }
            }
        }
    })
    .boxed()
}
