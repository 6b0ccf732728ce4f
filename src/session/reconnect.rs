use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use super::config::SessionConfig;
use super::state::SessionListener;
use super::supervisor::SessionSupervisor;
use crate::audio::AudioBackend;
use crate::recognition::Recognizer;
use crate::signal::StopSignal;

/// Builds fresh per-session resources
pub trait SessionComponents: Send + Sync {
    fn audio_backend(&self) -> Result<Box<dyn AudioBackend>>;

    fn recognizer(&self) -> Result<Box<dyn Recognizer>>;
}

/// Keeps a recognition session alive indefinitely
///
/// Runs one `SessionSupervisor` at a time and starts a new one a fixed
/// backoff after the previous one ends, whatever the reason. There is no
/// retry cap and no growth in the delay. Only the stop signal ends the loop,
/// and it interrupts the backoff wait as well as the running session.
pub struct ReconnectLoop {
    config: SessionConfig,
    components: Arc<dyn SessionComponents>,
    listener: Arc<dyn SessionListener>,
    stop: StopSignal,
}

impl ReconnectLoop {
    pub fn new(
        config: SessionConfig,
        components: Arc<dyn SessionComponents>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        Self::with_stop_signal(config, components, listener, StopSignal::new())
    }

    /// Share an existing stop signal (e.g. one also wired to Ctrl-C)
    pub fn with_stop_signal(
        config: SessionConfig,
        components: Arc<dyn SessionComponents>,
        listener: Arc<dyn SessionListener>,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            components,
            listener,
            stop,
        }
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Stop the active session and the loop. Safe from any thread.
    pub fn stop(&self) {
        info!("Stopping reconnect loop");
        self.stop.trigger();
    }

    /// Run sessions until stopped; returns the number of sessions started
    pub async fn run(&self) -> u64 {
        let mut sessions = 0u64;
        info!("Listening agent started");

        while !self.stop.is_stopped() {
            sessions += 1;
            info!("==================== Starting session #{} ====================", sessions);

            match self.build_session() {
                Ok(mut supervisor) => {
                    let stats = supervisor.run().await;
                    // The supervisor is dropped here, so the device and stream are
                    // released before the next session is built.
                    drop(supervisor);
                    self.listener.on_session_end(&stats);
                }
                Err(e) => error!("Failed to set up session #{}: {:#}", sessions, e),
            }

            if self.stop.is_stopped() {
                break;
            }

            info!("Reconnecting in {:?}...", self.config.reconnect_backoff);
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
                _ = self.stop.stopped() => break,
            }
        }

        info!("Listening agent stopped after {} sessions", sessions);
        sessions
    }

    fn build_session(&self) -> Result<SessionSupervisor> {
        let audio = self.components.audio_backend()?;
        let recognizer = self.components.recognizer()?;

        Ok(SessionSupervisor::new(
            self.config.clone(),
            audio,
            recognizer,
            Arc::clone(&self.listener),
            self.stop.clone(),
        ))
    }
}
