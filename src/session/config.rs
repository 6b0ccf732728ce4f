use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::vad::DEFAULT_ENERGY_THRESHOLD;

/// Configuration for recognition sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// RMS energy above which a frame counts as speech
    pub energy_threshold: f64,

    /// Continuous silence after which the session resets itself
    /// Default: 20 seconds
    pub silence_timeout: Duration,

    /// Fixed delay between sessions
    /// Default: 2 seconds
    pub reconnect_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
            silence_timeout: Duration::from_secs(20),
            reconnect_backoff: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            energy_threshold: config.vad.energy_threshold,
            silence_timeout: config.session.silence_timeout(),
            reconnect_backoff: config.session.reconnect_backoff(),
        }
    }
}
