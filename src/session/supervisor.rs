use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{SessionListener, SessionState};
use super::stats::{SessionExit, SessionStats, Utterance};
use crate::audio::{AudioBackend, AudioFrame};
use crate::recognition::{RecognitionEvent, Recognizer, Sentence};
use crate::signal::StopSignal;
use crate::vad;

#[derive(Debug, Default)]
struct Counters {
    frames_sent: u64,
    speech_frames: u64,
    utterances: u64,
}

/// Supervises one recognition session
///
/// Owns the audio backend and the recognizer for the session's lifetime.
/// Device and stream failures end the session but never escape `run`; they
/// are reported through the returned `SessionStats` and the connection-lost
/// flag.
pub struct SessionSupervisor {
    id: String,
    config: SessionConfig,
    audio: Box<dyn AudioBackend>,
    recognizer: Box<dyn Recognizer>,
    listener: Arc<dyn SessionListener>,
    stop: StopSignal,
    connection_lost: Arc<AtomicBool>,
    state: SessionState,
}

impl SessionSupervisor {
    pub fn new(
        config: SessionConfig,
        audio: Box<dyn AudioBackend>,
        recognizer: Box<dyn Recognizer>,
        listener: Arc<dyn SessionListener>,
        stop: StopSignal,
    ) -> Self {
        Self {
            id: format!("session-{}", uuid::Uuid::new_v4()),
            config,
            audio,
            recognizer,
            listener,
            stop,
            connection_lost: Arc::new(AtomicBool::new(false)),
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the device or the remote stream failed during this session
    pub fn connection_lost(&self) -> bool {
        self.connection_lost.load(Ordering::SeqCst)
    }

    /// Handle that stops this session (and anything sharing the signal) from any thread
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.trigger();
    }

    /// Run the session to completion
    pub async fn run(&mut self) -> SessionStats {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut counters = Counters::default();

        let exit = self.run_session(&mut counters).await;

        let stats = SessionStats {
            session_id: self.id.clone(),
            started_at,
            duration_secs: clock.elapsed().as_secs_f64(),
            frames_sent: counters.frames_sent,
            speech_frames: counters.speech_frames,
            utterances: counters.utterances,
            exit,
        };

        info!(
            "Session {} ended after {:.1}s: {:?} ({} frames sent, {} speech, {} utterances)",
            stats.session_id,
            stats.duration_secs,
            stats.exit,
            stats.frames_sent,
            stats.speech_frames,
            stats.utterances
        );

        stats
    }

    async fn run_session(&mut self, counters: &mut Counters) -> SessionExit {
        if self.stop.is_stopped() {
            return SessionExit::Stopped;
        }

        self.transition(SessionState::Opening);

        let stop = self.stop.clone();

        // Connecting can stall on the network, so it races the stop signal
        let started = tokio::select! {
            biased;
            _ = stop.stopped() => None,
            started = self.recognizer.start() => Some(started),
        };
        let mut events = match started {
            Some(Ok(events)) => events,
            Some(Err(e)) => {
                warn!("Failed to start {} recognition: {:#}", self.recognizer.name(), e);
                return self.fail(SessionExit::OpenFailed(format!("{:#}", e))).await;
            }
            None => {
                info!("Stop requested while connecting to {} recognition", self.recognizer.name());
                return self.abandon_opening().await;
            }
        };

        match self.await_open(&mut events).await {
            Ok(()) => {}
            Err(SessionExit::Stopped) => return self.abandon_opening().await,
            Err(exit) => return self.fail(exit).await,
        }

        info!("Recognition service connected ({})", self.recognizer.name());

        let opened = tokio::select! {
            biased;
            _ = stop.stopped() => None,
            opened = self.audio.start() => Some(opened),
        };
        let mut frames = match opened {
            Some(Ok(frames)) => frames,
            Some(Err(e)) => {
                error!("Failed to open audio device ({}): {:#}", self.audio.name(), e);
                return self.fail(SessionExit::OpenFailed(format!("{:#}", e))).await;
            }
            None => {
                info!("Stop requested while opening {}", self.audio.name());
                return self.abandon_opening().await;
            }
        };

        self.transition(SessionState::Listening);
        self.listener.on_listening();

        let exit = self.listen(&mut frames, &mut events, counters).await;
        drop(frames);

        self.transition(SessionState::Closing);
        let deliver_pending = exit != SessionExit::Stopped;
        self.release(&mut events, deliver_pending, counters).await;
        self.transition(SessionState::Idle);

        exit
    }

    /// Wait for the recognizer's `Open` event
    async fn await_open(
        &mut self,
        events: &mut mpsc::Receiver<RecognitionEvent>,
    ) -> Result<(), SessionExit> {
        let stop = self.stop.clone();

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => return Err(SessionExit::Stopped),
                event = events.recv() => match event {
                    Some(RecognitionEvent::Open) => return Ok(()),
                    Some(RecognitionEvent::Error(message)) => {
                        warn!("Recognition failed before opening: {}", message);
                        return Err(SessionExit::RemoteError(message));
                    }
                    Some(RecognitionEvent::Close) | None => {
                        warn!("Recognition stream closed before opening");
                        return Err(SessionExit::RemoteClosed);
                    }
                    Some(RecognitionEvent::Sentence(_)) => {}
                },
            }
        }
    }

    /// The read / classify / forward loop
    async fn listen(
        &mut self,
        frames: &mut mpsc::Receiver<AudioFrame>,
        events: &mut mpsc::Receiver<RecognitionEvent>,
        counters: &mut Counters,
    ) -> SessionExit {
        let stop = self.stop.clone();
        let threshold = self.config.energy_threshold;
        let silence_timeout = self.config.silence_timeout;
        let mut last_speech = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    info!("Stop requested, ending session {}", self.id);
                    return SessionExit::Stopped;
                }
                event = events.recv() => match event {
                    Some(RecognitionEvent::Sentence(sentence)) => self.surface(sentence, counters),
                    Some(RecognitionEvent::Open) => {}
                    Some(RecognitionEvent::Error(message)) => {
                        error!("Recognition error: {}", message);
                        self.connection_lost.store(true, Ordering::SeqCst);
                        return SessionExit::RemoteError(message);
                    }
                    Some(RecognitionEvent::Close) | None => {
                        warn!("Recognition service closed the stream");
                        self.connection_lost.store(true, Ordering::SeqCst);
                        return SessionExit::RemoteClosed;
                    }
                },
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        error!("Audio read failed: {} stopped delivering frames", self.audio.name());
                        self.connection_lost.store(true, Ordering::SeqCst);
                        return SessionExit::DeviceLost;
                    };

                    let activity = vad::classify(&frame.samples, threshold);
                    if activity.is_speech {
                        last_speech = Instant::now();
                        counters.speech_frames += 1;
                    }

                    // Silent frames are forwarded too; the service needs them to find sentence ends.
                    if let Err(e) = self.recognizer.send_frame(&frame.to_pcm_bytes()).await {
                        error!("Failed to forward audio frame: {:#}", e);
                        self.connection_lost.store(true, Ordering::SeqCst);
                        return SessionExit::RemoteError(format!("{:#}", e));
                    }
                    counters.frames_sent += 1;

                    debug!(
                        energy = activity.energy,
                        speech = activity.is_speech,
                        timestamp_ms = frame.timestamp_ms,
                        "Forwarded frame"
                    );

                    if last_speech.elapsed() > silence_timeout {
                        info!(
                            "No speech for more than {:?}, resetting the recognition connection",
                            silence_timeout
                        );
                        return SessionExit::SilenceTimeout;
                    }
                }
            }
        }
    }

    /// Hand a finalized, non-empty sentence to the listener
    fn surface(&self, sentence: Sentence, counters: &mut Counters) {
        if !sentence.sentence_end {
            debug!("Partial result: {}", sentence.text);
            return;
        }
        if sentence.text.trim().is_empty() {
            return;
        }

        info!("Recognized: {}", sentence.text);
        counters.utterances += 1;
        self.listener.on_utterance(Utterance::new(sentence.text));
    }

    /// Release the device and the stream, then surface results flushed on close
    async fn release(
        &mut self,
        events: &mut mpsc::Receiver<RecognitionEvent>,
        deliver_pending: bool,
        counters: &mut Counters,
    ) {
        self.release_handles().await;

        while let Ok(event) = events.try_recv() {
            if let RecognitionEvent::Sentence(sentence) = event {
                if deliver_pending {
                    self.surface(sentence, counters);
                }
            }
        }
    }

    /// Stopped before reaching `Listening`; nothing is surfaced
    async fn abandon_opening(&mut self) -> SessionExit {
        self.transition(SessionState::Closing);
        self.release_handles().await;
        self.transition(SessionState::Idle);
        SessionExit::Stopped
    }

    async fn fail(&mut self, exit: SessionExit) -> SessionExit {
        self.connection_lost.store(true, Ordering::SeqCst);
        self.transition(SessionState::Failed);
        self.release_handles().await;
        exit
    }

    async fn release_handles(&mut self) {
        if self.audio.is_capturing() {
            if let Err(e) = self.audio.stop().await {
                warn!("Failed to stop audio capture: {:#}", e);
            }
        }
        if let Err(e) = self.recognizer.stop().await {
            warn!("Failed to stop {} recognition: {:#}", self.recognizer.name(), e);
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.listener.on_state(next);
    }
}
