// DashScope realtime speech recognition over WebSocket
//
// Protocol: the client sends a `run-task` command, waits for `task-started`,
// streams binary PCM frames, and ends with `finish-task`. The server answers
// with `result-generated` events carrying a sentence, then `task-finished`
// (or `task-failed` at any point).

use anyhow::{bail, Context, Result};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{RecognitionEvent, Recognizer, Sentence, EVENT_CHANNEL_CAPACITY};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// How long `stop` waits for the server to flush final results
const FINISH_GRACE: Duration = Duration::from_secs(5);

pub struct DashScopeRecognizer {
    url: String,
    api_key: String,
    model: String,
    sample_rate: u32,
    task_id: String,
    sink: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
}

impl DashScopeRecognizer {
    pub fn new(url: String, api_key: String, model: String, sample_rate: u32) -> Self {
        Self {
            url,
            api_key,
            model,
            sample_rate,
            task_id: String::new(),
            sink: None,
            reader: None,
        }
    }
}

/// `run-task` command that opens a duplex recognition task
pub fn run_task_command(task_id: &str, model: &str, sample_rate: u32) -> serde_json::Value {
    serde_json::json!({
        "header": {
            "action": "run-task",
            "task_id": task_id,
            "streaming": "duplex"
        },
        "payload": {
            "task_group": "audio",
            "task": "asr",
            "function": "recognition",
            "model": model,
            "parameters": {
                "format": "pcm",
                "sample_rate": sample_rate
            },
            "input": {}
        }
    })
}

/// `finish-task` command; the server flushes pending results and closes the task
pub fn finish_task_command(task_id: &str) -> serde_json::Value {
    serde_json::json!({
        "header": {
            "action": "finish-task",
            "task_id": task_id,
            "streaming": "duplex"
        },
        "payload": {
            "input": {}
        }
    })
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    header: ServerHeader,
    #[serde(default)]
    payload: Option<ServerPayload>,
}

#[derive(Debug, Deserialize)]
struct ServerHeader {
    event: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerPayload {
    #[serde(default)]
    output: Option<ServerOutput>,
}

#[derive(Debug, Deserialize)]
struct ServerOutput {
    #[serde(default)]
    sentence: Option<ServerSentence>,
}

#[derive(Debug, Deserialize)]
struct ServerSentence {
    #[serde(default)]
    text: String,
    #[serde(default)]
    sentence_end: bool,
    #[serde(default)]
    begin_time: Option<u64>,
    #[serde(default)]
    end_time: Option<u64>,
}

/// Translate one server text message into a recognition event
///
/// Returns `Ok(None)` for events that carry nothing the session cares about.
pub fn parse_server_message(text: &str) -> Result<Option<RecognitionEvent>> {
    let message: ServerMessage =
        serde_json::from_str(text).context("Malformed recognition server message")?;

    let event = match message.header.event.as_str() {
        "task-started" => Some(RecognitionEvent::Open),
        "task-finished" => Some(RecognitionEvent::Close),
        "task-failed" => {
            let code = message.header.error_code.unwrap_or_else(|| "unknown".to_string());
            let detail = message.header.error_message.unwrap_or_default();
            Some(RecognitionEvent::Error(format!("{}: {}", code, detail)))
        }
        "result-generated" => message
            .payload
            .and_then(|p| p.output)
            .and_then(|o| o.sentence)
            .map(|s| {
                RecognitionEvent::Sentence(Sentence {
                    text: s.text,
                    sentence_end: s.sentence_end,
                    begin_ms: s.begin_time,
                    end_ms: s.end_time,
                })
            }),
        other => {
            debug!("Ignoring recognition event: {}", other);
            None
        }
    };

    Ok(event)
}

#[async_trait::async_trait]
impl Recognizer for DashScopeRecognizer {
    async fn start(&mut self) -> Result<mpsc::Receiver<RecognitionEvent>> {
        if self.sink.is_some() {
            bail!("Recognition already started");
        }

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .context("Invalid recognition service URL")?;
        let auth = HeaderValue::from_str(&format!("bearer {}", self.api_key))
            .context("API key is not a valid header value")?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        info!("Connecting to recognition service at {}", self.url);

        let (ws, _) = connect_async(request)
            .await
            .context("Failed to connect to recognition service")?;
        let (mut sink, mut stream) = ws.split();

        self.task_id = uuid::Uuid::new_v4().simple().to_string();
        let command = run_task_command(&self.task_id, &self.model, self.sample_rate);
        sink.send(Message::Text(command.to_string()))
            .await
            .context("Failed to send run-task")?;

        debug!("Sent run-task {} (model={})", self.task_id, self.model);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(async move {
            loop {
                let event = match stream.next().await {
                    Some(Ok(Message::Text(text))) => match parse_server_message(&text) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!("{:#}", e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => RecognitionEvent::Close,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => RecognitionEvent::Error(e.to_string()),
                };

                let terminal = matches!(event, RecognitionEvent::Close | RecognitionEvent::Error(_));
                if tx.send(event).await.is_err() || terminal {
                    return;
                }
            }
        });

        self.sink = Some(sink);
        self.reader = Some(reader);

        Ok(rx)
    }

    async fn send_frame(&mut self, pcm: &[u8]) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            bail!("Recognition is not running");
        };

        sink.send(Message::Binary(pcm.to_vec()))
            .await
            .context("Failed to send audio frame")
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };

        info!("Finishing recognition task {}", self.task_id);

        let finish = finish_task_command(&self.task_id);
        if let Err(e) = sink.send(Message::Text(finish.to_string())).await {
            warn!("Failed to send finish-task: {}", e);
        }

        if let Some(mut reader) = self.reader.take() {
            match tokio::time::timeout(FINISH_GRACE, &mut reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Recognition reader panicked: {}", e),
                Err(_) => {
                    warn!("Recognition task did not finish within {:?}", FINISH_GRACE);
                    reader.abort();
                }
            }
        }

        if let Err(e) = sink.close().await {
            debug!("WebSocket close: {}", e);
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "DashScope"
    }
}
