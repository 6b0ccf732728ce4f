//! Wiring between the listening sessions, the reply generator and the display

use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::audio::{AudioBackend, AudioBackendFactory};
use crate::chat::ResponseDispatcher;
use crate::config::Config;
use crate::display::DisplaySink;
use crate::recognition::{create_recognizer, Recognizer};
use crate::session::{SessionComponents, SessionListener, SessionState, SessionStats, Utterance};

/// Snapshot of the agent, served on `/status`
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub state: SessionState,
    pub sessions_started: u64,
    pub utterances: u64,
    pub last_session: Option<SessionStats>,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            sessions_started: 0,
            utterances: 0,
            last_session: None,
        }
    }
}

pub type SharedStatus = Arc<RwLock<AgentStatus>>;

/// Reacts to session events: shows status and answers every utterance
pub struct AgentListener {
    display: Arc<dyn DisplaySink>,
    dispatcher: ResponseDispatcher,
    status: SharedStatus,
}

impl AgentListener {
    pub fn new(
        display: Arc<dyn DisplaySink>,
        dispatcher: ResponseDispatcher,
        status: SharedStatus,
    ) -> Self {
        Self {
            display,
            dispatcher,
            status,
        }
    }

    fn update(&self, f: impl FnOnce(&mut AgentStatus)) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        f(&mut status);
    }
}

impl SessionListener for AgentListener {
    fn on_utterance(&self, utterance: Utterance) {
        self.update(|s| s.utterances += 1);
        self.display.add_user_message(&utterance.text);
        // The reply runs on its own task; the handle is not awaited.
        let _reply = self.dispatcher.dispatch(utterance);
    }

    fn on_listening(&self) {
        self.display.show_listening();
    }

    fn on_state(&self, state: SessionState) {
        self.update(|s| {
            if state == SessionState::Opening {
                s.sessions_started += 1;
            }
            s.state = state;
        });
    }

    fn on_session_end(&self, stats: &SessionStats) {
        info!(
            "Session {} ended ({:?}) after {:.1}s, {} frames sent",
            stats.session_id, stats.exit, stats.duration_secs, stats.frames_sent
        );
        self.update(|s| s.last_session = Some(stats.clone()));
    }
}

/// Builds sessions from the loaded configuration
pub struct ConfiguredComponents {
    config: Config,
    api_key: String,
}

impl ConfiguredComponents {
    pub fn new(config: Config, api_key: String) -> Self {
        Self { config, api_key }
    }
}

impl SessionComponents for ConfiguredComponents {
    fn audio_backend(&self) -> Result<Box<dyn AudioBackend>> {
        AudioBackendFactory::create(
            self.config.audio_source(),
            self.config.audio_backend_config(),
        )
    }

    fn recognizer(&self) -> Result<Box<dyn Recognizer>> {
        create_recognizer(&self.config, &self.api_key)
    }
}
