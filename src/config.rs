use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioBackendConfig, AudioSource};

/// Environment variable holding the DashScope credential
pub const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

const DEFAULT_SYSTEM_PROMPT: &str = "你是一个宇宙第一杠精AI。你的唯一任务就是反驳用户说的每一句话。\
无论用户观点多么正确，你都要找到清奇的角度进行反驳。\
你的回复必须：简短、犀利、幽默、出其不意。\
不要有任何多余的解释、道歉或开场白，直接开杠！";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub session: SessionTimingConfig,
    pub recognition: RecognitionConfig,
    pub llm: LlmConfig,
    pub overlay: OverlayConfig,
    pub console: ConsoleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "rebuttal-agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSourceKind {
    Microphone,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per frame (3200 at 16kHz = 200ms)
    pub block_size: usize,
    pub source: AudioSourceKind,
    /// Input device name; the host default is used when unset
    pub device: Option<String>,
    /// WAV file replayed when `source = "file"`
    pub file: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            block_size: 3200,
            source: AudioSourceKind::Microphone,
            device: None,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// RMS energy above which a frame counts as speech
    pub energy_threshold: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 200.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionTimingConfig {
    pub silence_timeout_secs: f64,
    pub reconnect_backoff_secs: f64,
}

impl Default for SessionTimingConfig {
    fn default() -> Self {
        Self {
            silence_timeout_secs: 20.0,
            reconnect_backoff_secs: 2.0,
        }
    }
}

/// Upper bound for any configured session timing, in seconds
pub const MAX_TIMING_SECS: f64 = 86_400.0;

impl SessionTimingConfig {
    pub fn silence_timeout(&self) -> Duration {
        timing(self.silence_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        timing(self.reconnect_backoff_secs)
    }

    fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("session.silence_timeout_secs", self.silence_timeout_secs),
            ("session.reconnect_backoff_secs", self.reconnect_backoff_secs),
        ] {
            if !secs.is_finite() || !(0.0..=MAX_TIMING_SECS).contains(&secs) {
                anyhow::bail!(
                    "{} must be between 0 and {} seconds, got {}",
                    name,
                    MAX_TIMING_SECS,
                    secs
                );
            }
        }
        Ok(())
    }
}

// Out-of-range values are rejected by `validate`; clamp so conversion never panics.
fn timing(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_TIMING_SECS)).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionBackendKind {
    DashScope,
    Nats,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub backend: RecognitionBackendKind,
    pub model: String,
    pub url: String,
    pub nats_url: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            backend: RecognitionBackendKind::DashScope,
            model: "paraformer-realtime-v2".to_string(),
            url: "wss://dashscope.aliyuncs.com/api-ws/v1/inference".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen-plus-2025-07-14".to_string(),
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to daily files under `dir`
    ///
    /// Files roll over at midnight and only the newest `max_files` are kept,
    /// which bounds disk use on an agent that runs for weeks. There is no
    /// size cap within a day; the file shares `RUST_LOG`, so per-frame debug
    /// lines only land there when explicitly enabled.
    pub file: bool,
    pub dir: PathBuf,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            dir: PathBuf::from("logs"),
            max_files: 5,
        }
    }
}

impl Config {
    /// Load configuration from an optional file plus `REBUTTAL__*` environment overrides
    ///
    /// Call `validate` once command-line overrides have been applied.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("REBUTTAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.block_size == 0 {
            anyhow::bail!("audio.block_size must be greater than zero");
        }
        if self.audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be greater than zero");
        }
        if self.audio.channels == 0 {
            anyhow::bail!("audio.channels must be greater than zero");
        }
        if !self.vad.energy_threshold.is_finite() || self.vad.energy_threshold < 0.0 {
            anyhow::bail!("vad.energy_threshold must be a non-negative number");
        }
        if self.audio.source == AudioSourceKind::File && self.audio.file.is_none() {
            anyhow::bail!("audio.file is required when audio.source = \"file\"");
        }
        self.session.validate()?;
        if self.logging.file && self.logging.max_files == 0 {
            anyhow::bail!("logging.max_files must be at least 1");
        }
        Ok(())
    }

    pub fn audio_source(&self) -> AudioSource {
        match (self.audio.source, &self.audio.file) {
            (AudioSourceKind::File, Some(path)) => AudioSource::File(path.clone()),
            _ => AudioSource::Microphone(self.audio.device.clone()),
        }
    }

    pub fn audio_backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: self.audio.channels,
            block_size: self.audio.block_size,
        }
    }
}

/// Read the API credential, loading `.env` first if present
pub fn load_api_key() -> Result<String> {
    // A missing .env file is fine; the variable may come from the environment.
    let _ = dotenvy::dotenv();

    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => anyhow::bail!(
            "{} not found in .env or the environment",
            API_KEY_ENV
        ),
    }
}
