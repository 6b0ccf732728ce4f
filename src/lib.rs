pub mod agent;
pub mod audio;
pub mod chat;
pub mod config;
pub mod display;
pub mod http;
pub mod recognition;
pub mod session;
pub mod signal;
pub mod vad;

pub use agent::{AgentListener, AgentStatus, ConfiguredComponents, SharedStatus};
pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    FrameAssembler,
};
pub use chat::{ChatClient, ChatError, OpenAiCompatClient, ResponseDispatcher};
pub use config::Config;
pub use display::{ConsoleDisplay, DisplayFanout, DisplaySink, OverlayDisplay};
pub use http::{create_router, AppState};
pub use recognition::{RecognitionEvent, Recognizer, Sentence};
pub use session::{
    ReconnectLoop, SessionComponents, SessionConfig, SessionExit, SessionListener, SessionState,
    SessionStats, SessionSupervisor, Utterance,
};
pub use signal::StopSignal;
