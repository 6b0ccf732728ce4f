// Scripted stand-ins for the audio device, the recognition service, the chat
// service and the display, shared by the integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use rebuttal_agent::chat::{ChatClient, ChatError, ChatRequest, ReplyStream};
use rebuttal_agent::display::{DisplayEvent, DisplaySink};
use rebuttal_agent::recognition::{RecognitionEvent, Recognizer, Sentence};
use rebuttal_agent::session::{
    SessionComponents, SessionListener, SessionState, SessionStats, Utterance,
};
use rebuttal_agent::{AudioBackend, AudioFrame};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const FRAME_SAMPLES: usize = 3200;
pub const FRAME_INTERVAL: Duration = Duration::from_millis(200);

/// A frame whose RMS energy is far below the default threshold.
/// The first sample carries `tag` so forwarded frames can be told apart.
pub fn silent_frame(tag: i16) -> Vec<i16> {
    let mut samples = vec![0i16; FRAME_SAMPLES];
    samples[0] = tag;
    samples
}

pub fn loud_frame(tag: i16) -> Vec<i16> {
    let mut samples = vec![1000i16; FRAME_SAMPLES];
    samples[0] = tag;
    samples
}

/// First sample of a forwarded little-endian PCM frame
pub fn frame_tag(pcm: &[u8]) -> i16 {
    i16::from_le_bytes([pcm[0], pcm[1]])
}

pub fn sentence(text: &str, sentence_end: bool) -> RecognitionEvent {
    RecognitionEvent::Sentence(Sentence {
        text: text.to_string(),
        sentence_end,
        begin_ms: None,
        end_ms: None,
    })
}

// ----------------------------------------------------------------------------
// Audio
// ----------------------------------------------------------------------------

/// Delivers a fixed list of frames, one every `FRAME_INTERVAL`
pub struct ScriptedAudio {
    frames: Vec<Vec<i16>>,
    hold_open: bool,
    fail_start: bool,
    hang_start: bool,
    task: Option<JoinHandle<()>>,
    stops: Arc<AtomicUsize>,
}

impl ScriptedAudio {
    /// The channel closes after the last frame, like a lost device
    pub fn frames(frames: Vec<Vec<i16>>) -> Self {
        Self {
            frames,
            hold_open: false,
            fail_start: false,
            hang_start: false,
            task: None,
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The channel stays open after the last frame until stopped
    pub fn frames_then_hold(frames: Vec<Vec<i16>>) -> Self {
        Self {
            hold_open: true,
            ..Self::frames(frames)
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::frames(Vec::new())
        }
    }

    /// Opening the device never completes
    pub fn hanging() -> Self {
        Self {
            hang_start: true,
            ..Self::frames(Vec::new())
        }
    }

    pub fn stop_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }
}

#[async_trait]
impl AudioBackend for ScriptedAudio {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.fail_start {
            bail!("device busy");
        }
        if self.hang_start {
            std::future::pending::<()>().await;
        }

        let (tx, rx) = mpsc::channel(4);
        let frames = std::mem::take(&mut self.frames);
        let hold_open = self.hold_open;

        self.task = Some(tokio::spawn(async move {
            for (i, samples) in frames.into_iter().enumerate() {
                tokio::time::sleep(FRAME_INTERVAL).await;
                let frame = AudioFrame {
                    samples,
                    sample_rate: 16000,
                    channels: 1,
                    timestamp_ms: i as u64 * 200,
                };
                if tx.send(frame).await.is_err() {
                    return;
                }
            }
            if hold_open {
                tx.closed().await;
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "scripted audio"
    }
}

// ----------------------------------------------------------------------------
// Recognition
// ----------------------------------------------------------------------------

/// What a `ScriptedRecognizer` saw, readable after it has been moved into a session
#[derive(Clone, Default)]
pub struct RecognizerTrace {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl RecognizerTrace {
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Emits a fixed list of events as soon as it starts
pub struct ScriptedRecognizer {
    script: Vec<RecognitionEvent>,
    on_stop: Vec<RecognitionEvent>,
    fail_start: bool,
    hang_start: bool,
    events: Option<mpsc::Sender<RecognitionEvent>>,
    trace: RecognizerTrace,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<RecognitionEvent>) -> (Self, RecognizerTrace) {
        let trace = RecognizerTrace::default();
        let recognizer = Self {
            script,
            on_stop: Vec::new(),
            fail_start: false,
            hang_start: false,
            events: None,
            trace: trace.clone(),
        };
        (recognizer, trace)
    }

    /// Opens and then stays quiet
    pub fn open() -> (Self, RecognizerTrace) {
        Self::new(vec![RecognitionEvent::Open])
    }

    pub fn failing() -> (Self, RecognizerTrace) {
        let (mut recognizer, trace) = Self::new(Vec::new());
        recognizer.fail_start = true;
        (recognizer, trace)
    }

    /// Connecting never completes, like a stalled handshake
    pub fn hanging() -> (Self, RecognizerTrace) {
        let (mut recognizer, trace) = Self::new(Vec::new());
        recognizer.hang_start = true;
        (recognizer, trace)
    }

    /// Emit `events` while stopping, like results flushed by `finish-task`
    pub fn flushing_on_stop(mut self, events: Vec<RecognitionEvent>) -> Self {
        self.on_stop = events;
        self
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn start(&mut self) -> Result<mpsc::Receiver<RecognitionEvent>> {
        self.trace.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            bail!("connection refused");
        }
        if self.hang_start {
            std::future::pending::<()>().await;
        }

        let (tx, rx) = mpsc::channel(64);
        for event in self.script.drain(..) {
            tx.try_send(event)?;
        }
        self.events = Some(tx);
        Ok(rx)
    }

    async fn send_frame(&mut self, pcm: &[u8]) -> Result<()> {
        self.trace.sent.lock().unwrap().push(pcm.to_vec());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.events.take() {
            for event in self.on_stop.drain(..) {
                tx.try_send(event)?;
            }
        }
        self.trace.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted recognizer"
    }
}

// ----------------------------------------------------------------------------
// Session listener and components
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingListener {
    pub utterances: Mutex<Vec<String>>,
    pub states: Mutex<Vec<SessionState>>,
    pub listening: AtomicUsize,
    pub ended: Mutex<Vec<(Instant, SessionStats)>>,
}

impl RecordingListener {
    pub fn utterances(&self) -> Vec<String> {
        self.utterances.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn ended(&self) -> Vec<(Instant, SessionStats)> {
        self.ended.lock().unwrap().clone()
    }
}

impl SessionListener for RecordingListener {
    fn on_utterance(&self, utterance: Utterance) {
        self.utterances.lock().unwrap().push(utterance.text);
    }

    fn on_listening(&self) {
        self.listening.fetch_add(1, Ordering::SeqCst);
    }

    fn on_state(&self, state: SessionState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_session_end(&self, stats: &SessionStats) {
        self.ended.lock().unwrap().push((Instant::now(), stats.clone()));
    }
}

type AudioFactory = Box<dyn Fn() -> ScriptedAudio + Send + Sync>;
type ScriptFactory = Box<dyn Fn() -> Vec<RecognitionEvent> + Send + Sync>;

/// Builds a fresh scripted session each time and records when
pub struct ScriptedComponents {
    audio: AudioFactory,
    script: ScriptFactory,
    pub built: Mutex<Vec<Instant>>,
}

impl ScriptedComponents {
    pub fn new(
        audio: impl Fn() -> ScriptedAudio + Send + Sync + 'static,
        script: impl Fn() -> Vec<RecognitionEvent> + Send + Sync + 'static,
    ) -> Self {
        Self {
            audio: Box::new(audio),
            script: Box::new(script),
            built: Mutex::new(Vec::new()),
        }
    }

    pub fn built(&self) -> Vec<Instant> {
        self.built.lock().unwrap().clone()
    }
}

impl SessionComponents for ScriptedComponents {
    fn audio_backend(&self) -> Result<Box<dyn AudioBackend>> {
        self.built.lock().unwrap().push(Instant::now());
        Ok(Box::new((self.audio)()))
    }

    fn recognizer(&self) -> Result<Box<dyn Recognizer>> {
        let (recognizer, _trace) = ScriptedRecognizer::new((self.script)());
        Ok(Box::new(recognizer))
    }
}

// ----------------------------------------------------------------------------
// Chat and display
// ----------------------------------------------------------------------------

/// Replies with fixed chunks, optionally failing
pub struct ScriptedChat {
    chunks: Vec<Result<String, ChatError>>,
    request_error: Option<ChatError>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn replying(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
            request_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Yields `chunks`, then fails with `error`
    pub fn breaking(chunks: &[&str], error: ChatError) -> Self {
        let mut chat = Self::replying(chunks);
        chat.chunks.push(Err(error));
        chat
    }

    /// The request itself fails
    pub fn failing(error: ChatError) -> Self {
        Self {
            chunks: Vec::new(),
            request_error: Some(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ReplyStream, ChatError> {
        self.requests.lock().unwrap().push(request);
        if let Some(error) = &self.request_error {
            return Err(error.clone());
        }
        let chunks = self.chunks.clone();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Records every display command in order
#[derive(Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<DisplayEvent>>,
}

impl RecordingDisplay {
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: DisplayEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl DisplaySink for RecordingDisplay {
    fn show_listening(&self) {
        self.record(DisplayEvent::Listening);
    }

    fn add_user_message(&self, text: &str) {
        self.record(DisplayEvent::UserMessage {
            text: text.to_string(),
        });
    }

    fn start_reply(&self) {
        self.record(DisplayEvent::ReplyStart);
    }

    fn append_reply(&self, text: &str) {
        self.record(DisplayEvent::ReplyDelta {
            text: text.to_string(),
        });
    }

    fn finish_reply(&self) {
        self.record(DisplayEvent::ReplyFinish);
    }
}
