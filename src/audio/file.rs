use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{downmix_to_mono, AudioBackend, AudioBackendConfig, AudioFrame, FrameAssembler};
use crate::signal::StopSignal;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            bail!(
                "Unsupported WAV format: expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at `target_rate`
    ///
    /// Channels are averaged, then the signal is decimated. The source rate
    /// must be an integer multiple of the target rate.
    pub fn to_mono(&self, target_rate: u32) -> Result<Vec<i16>> {
        if target_rate == 0 || self.sample_rate % target_rate != 0 {
            bail!(
                "Cannot convert {}Hz to {}Hz: source rate must be an integer multiple of the target",
                self.sample_rate,
                target_rate
            );
        }

        let mono = downmix_to_mono(&self.samples, self.channels);
        let ratio = (self.sample_rate / target_rate) as usize;
        if ratio == 1 {
            return Ok(mono);
        }

        // Decimate: take every Nth sample
        Ok(mono.into_iter().step_by(ratio).collect())
    }
}

/// Replays a WAV file in real time as if it were a microphone
///
/// After the recording ends the backend keeps producing silent frames until
/// stopped, like a microphone in a quiet room.
pub struct WavFileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    stop: StopSignal,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            stop: StopSignal::new(),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            bail!("Already capturing");
        }

        let file = AudioFile::open(&self.path)?;
        let samples = file.to_mono(self.config.target_sample_rate)?;

        let mut assembler = FrameAssembler::new(self.config.block_size, self.config.target_sample_rate);
        let mut frames = assembler.push(&samples);
        let remainder = assembler.pending_len();
        if remainder > 0 {
            let padding = vec![0i16; self.config.block_size - remainder];
            frames.extend(assembler.push(&padding));
        }
        let recorded = frames.len();

        let (tx, rx) = mpsc::channel(16);
        let stop = StopSignal::new();
        self.stop = stop.clone();

        let block_size = self.config.block_size;
        let frame_duration = self.config.frame_duration();
        let name = file.path.clone();

        let task = tokio::spawn(async move {
            let mut recorded = frames.into_iter();
            let mut ticker = tokio::time::interval(frame_duration);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.stopped() => break,
                    _ = ticker.tick() => {}
                }

                let frame = match recorded.next() {
                    Some(frame) => frame,
                    None => {
                        let silence = vec![0i16; block_size];
                        match assembler.push(&silence).pop() {
                            Some(frame) => frame,
                            None => break,
                        }
                    }
                };

                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, ending replay of {}", name);
                    break;
                }
            }
        });

        self.task = Some(task);

        info!(
            "Replaying {} ({} frames of {} samples)",
            self.path.display(),
            recorded,
            self.config.block_size
        );

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.stop.trigger();
        if let Err(e) = task.await {
            warn!("File replay task panicked: {}", e);
        }

        info!("File replay stopped: {}", self.path.display());
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
