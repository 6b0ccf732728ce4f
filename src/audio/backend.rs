use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Little-endian PCM bytes, the wire format recognizers expect
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Playback duration of this frame
    pub fn duration(&self) -> Duration {
        let per_second = u64::from(self.sample_rate) * u64::from(self.channels.max(1));
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / per_second)
    }
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate in Hz
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono)
    pub target_channels: u16,
    /// Samples per delivered frame
    pub block_size: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for speech recognition
            target_channels: 1,        // Mono
            block_size: 3200,          // 200ms frames
        }
    }
}

impl AudioBackendConfig {
    /// Duration covered by one full frame
    pub fn frame_duration(&self) -> Duration {
        let per_second =
            u64::from(self.target_sample_rate) * u64::from(self.target_channels.max(1));
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.block_size as u64 * 1_000_000 / per_second)
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal input stream on a dedicated capture thread
/// - File: paced WAV replay (for testing and demos)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that yields fixed-size frames. The channel
    /// closing means the device was lost.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone input, optionally a named device
    Microphone(Option<String>),
    /// WAV file replay
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create an audio backend for the given source
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone(device) => {
                let backend = super::microphone::MicrophoneBackend::new(config, device);
                Ok(Box::new(backend))
            }
            AudioSource::File(path) => {
                let backend = super::file::WavFileBackend::new(path, config);
                Ok(Box::new(backend))
            }
        }
    }
}

/// Splits an arbitrary stream of mono samples into fixed-size frames
#[derive(Debug)]
pub struct FrameAssembler {
    block_size: usize,
    sample_rate: u32,
    pending: Vec<i16>,
    emitted_samples: u64,
}

impl FrameAssembler {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        Self {
            block_size: block_size.max(1),
            sample_rate,
            pending: Vec::with_capacity(block_size.max(1)),
            emitted_samples: 0,
        }
    }

    /// Append samples and return every frame that became complete
    pub fn push(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let block = std::mem::replace(&mut self.pending, rest);
            frames.push(self.make_frame(block));
        }
        frames
    }

    /// Number of samples waiting for a full frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn make_frame(&mut self, samples: Vec<i16>) -> AudioFrame {
        let timestamp_ms = if self.sample_rate == 0 {
            0
        } else {
            self.emitted_samples * 1000 / u64::from(self.sample_rate)
        };
        self.emitted_samples += samples.len() as u64;

        AudioFrame {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
            timestamp_ms,
        }
    }
}

/// Average interleaved channels down to mono
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}
