use anyhow::{bail, Context, Result};
use async_nats::Client;
use base64::Engine;
use futures::stream::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::messages::{AudioFrameMessage, TranscriptMessage};
use super::{RecognitionEvent, Recognizer, Sentence, EVENT_CHANNEL_CAPACITY};
use crate::signal::StopSignal;

/// How long `stop` waits for the final transcript before dropping the subscription
pub const READER_GRACE: Duration = Duration::from_secs(2);

/// Recognizer backed by a self-hosted STT service reachable over NATS
///
/// Audio goes out on `audio.frame.<session>`; transcripts come back on
/// `stt.text.>` and are filtered by session id.
pub struct NatsRecognizer {
    url: String,
    session_id: String,
    sample_rate: u32,
    channels: u16,
    client: Option<Client>,
    sequence: u32,
    finish: StopSignal,
    reader: Option<JoinHandle<()>>,
}

impl NatsRecognizer {
    pub fn new(url: String, session_id: String, sample_rate: u32, channels: u16) -> Self {
        Self {
            url,
            session_id,
            sample_rate,
            channels,
            client: None,
            sequence: 0,
            finish: StopSignal::new(),
            reader: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn audio_subject(&self) -> String {
        format!("audio.frame.{}", self.session_id)
    }

    async fn publish_audio_frame(&mut self, pcm_bytes: &[u8], is_final: bool) -> Result<()> {
        let subject = self.audio_subject();
        let Some(client) = self.client.as_ref() else {
            bail!("NATS recognizer is not connected");
        };

        let message = AudioFrameMessage {
            session_id: self.session_id.clone(),
            sequence: self.sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        client.publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (sequence={}, bytes={}, final={})",
            subject, self.sequence, pcm_bytes.len(), is_final
        );

        self.sequence = self.sequence.wrapping_add(1);
        Ok(())
    }
}

/// Map a transcript message to a recognition event, if it belongs to `session_id`
pub fn transcript_event(message: &TranscriptMessage, session_id: &str) -> Option<RecognitionEvent> {
    if message.session_id != session_id {
        return None;
    }

    Some(RecognitionEvent::Sentence(Sentence {
        text: message.text.clone(),
        sentence_end: !message.partial,
        begin_ms: None,
        end_ms: None,
    }))
}

/// Forward this session's transcripts until the subscription ends
///
/// Once `finish` fires, reading continues until the service answers the final
/// audio frame with a finalized transcript. A `Close` event is sent last.
pub async fn forward_transcripts<S, B>(
    mut messages: S,
    session_id: String,
    events: mpsc::Sender<RecognitionEvent>,
    finish: StopSignal,
) where
    S: Stream<Item = B> + Unpin,
    B: AsRef<[u8]>,
{
    let mut finishing = false;

    loop {
        let payload = tokio::select! {
            biased;
            _ = finish.stopped(), if !finishing => {
                finishing = true;
                debug!("Waiting for final transcripts of session {}", session_id);
                continue;
            }
            payload = messages.next() => payload,
        };

        let Some(payload) = payload else {
            break;
        };

        let transcript = match serde_json::from_slice::<TranscriptMessage>(payload.as_ref()) {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Failed to parse transcript message: {}", e);
                continue;
            }
        };

        let Some(event) = transcript_event(&transcript, &session_id) else {
            continue;
        };
        let is_final = !transcript.partial;
        if events.send(event).await.is_err() {
            return;
        }
        if finishing && is_final {
            break;
        }
    }

    let _ = events.try_send(RecognitionEvent::Close);
}

#[async_trait::async_trait]
impl Recognizer for NatsRecognizer {
    async fn start(&mut self) -> Result<mpsc::Receiver<RecognitionEvent>> {
        if self.client.is_some() {
            bail!("Recognition already started");
        }

        info!("Connecting to NATS at {}", self.url);

        let client = async_nats::connect(self.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        // The STT service publishes on stt.text.partial and stt.text.final
        let subject = "stt.text.>".to_string();
        let subscriber = client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to transcripts")?;

        info!("Subscribed to {} for session {}", subject, self.session_id);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let finish = StopSignal::new();
        self.finish = finish.clone();

        // Pub/sub has no handshake: the task is ready as soon as we are subscribed.
        tx.send(RecognitionEvent::Open)
            .await
            .context("Event receiver dropped")?;

        let reader = tokio::spawn(forward_transcripts(
            subscriber.map(|msg| msg.payload).boxed(),
            self.session_id.clone(),
            tx,
            finish,
        ));

        self.client = Some(client);
        self.reader = Some(reader);
        self.sequence = 0;

        Ok(rx)
    }

    async fn send_frame(&mut self, pcm: &[u8]) -> Result<()> {
        self.publish_audio_frame(pcm, false).await
    }

    async fn stop(&mut self) -> Result<()> {
        if self.client.is_none() {
            return Ok(());
        }

        info!("Closing NATS recognition for session {}", self.session_id);

        if let Err(e) = self.publish_audio_frame(&[], true).await {
            error!("Failed to send final frame: {}", e);
        }
        if let Some(client) = self.client.as_ref() {
            if let Err(e) = client.flush().await {
                warn!("Failed to flush NATS connection: {}", e);
            }
        }

        // The reader exits on the service's final transcript; give up after the grace period
        self.finish.trigger();
        if let Some(mut reader) = self.reader.take() {
            match tokio::time::timeout(READER_GRACE, &mut reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Transcript reader panicked: {}", e),
                Err(_) => {
                    warn!("No final transcript within {:?}", READER_GRACE);
                    reader.abort();
                }
            }
        }

        self.client = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "NATS"
    }
}
