// Microphone capture backend using cpal
//
// cpal streams are not Send on every platform, so the stream is built, played
// and dropped on a dedicated capture thread. Samples are assembled into
// fixed-size frames inside the input callback and handed to the async side
// over a bounded channel.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{downmix_to_mono, AudioBackend, AudioBackendConfig, AudioFrame, FrameAssembler};

/// Frames buffered between the capture thread and the session (~3s at 200ms)
const FRAME_CHANNEL_CAPACITY: usize = 16;

type FrameSender = Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>;

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    device_name: Option<String>,
    shutdown: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig, device_name: Option<String>) -> Self {
        Self {
            config,
            device_name,
            shutdown: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread.is_some() {
            bail!("Already capturing");
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<String>>();
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();

        let config = self.config.clone();
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let sender: FrameSender = Arc::new(Mutex::new(Some(frame_tx)));
                match open_input_stream(&config, device_name.as_deref(), sender) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        // Park until stop() or until the backend is dropped.
                        let _ = shutdown_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .context("Failed to spawn capture thread")?;

        let opened = ready_rx
            .await
            .map_err(|_| anyhow!("Capture thread exited before reporting readiness"))
            .and_then(|result| result);

        match opened {
            Ok(device) => {
                info!(
                    "Microphone capture started: {} ({}Hz, {} samples/frame)",
                    device, self.config.target_sample_rate, self.config.block_size
                );
                self.shutdown = Some(shutdown_tx);
                self.thread = Some(thread);
                Ok(frame_rx)
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        tokio::task::spawn_blocking(move || thread.join())
            .await
            .context("Failed to join capture thread")?
            .map_err(|_| anyhow!("Capture thread panicked"))?;

        info!("Microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Find an input device by name, falling back to the host default
fn find_input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let found = host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));
        match found {
            Some(device) => return Ok(device),
            None => warn!("Requested device '{}' not found, falling back to default", name),
        }
    }

    host.default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))
}

fn open_input_stream(
    config: &AudioBackendConfig,
    device_name: Option<&str>,
    sender: FrameSender,
) -> Result<(Stream, String)> {
    let device = find_input_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "unknown device".to_string());
    let rate = SampleRate(config.target_sample_rate);

    let supported = device
        .supported_input_configs()
        .context("Failed to query input configs")?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(|c| {
            // Prefer the requested channel count, then native i16
            let channel_penalty = u32::from(c.channels() != config.target_channels);
            let format_penalty = u32::from(c.sample_format() != SampleFormat::I16);
            channel_penalty * 2 + format_penalty
        })
        .ok_or_else(|| {
            anyhow!(
                "Device '{}' does not support {}Hz capture",
                name,
                config.target_sample_rate
            )
        })?
        .with_sample_rate(rate);

    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.config();
    let channels = stream_config.channels;

    debug!(
        device = %name,
        sample_rate = config.target_sample_rate,
        channels,
        format = ?sample_format,
        "Opening input stream"
    );

    let assembler = Arc::new(Mutex::new(FrameAssembler::new(
        config.block_size,
        config.target_sample_rate,
    )));

    let error_sender = Arc::clone(&sender);
    let on_error = move |err: cpal::StreamError| {
        error!("Audio input stream error: {}", err);
        // Dropping the sender closes the channel, which the session treats as device loss.
        if let Ok(mut slot) = error_sender.lock() {
            slot.take();
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => {
            let sink = CallbackSink { assembler, sender, channels };
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| sink.push(data),
                on_error,
                None,
            )
        }
        SampleFormat::F32 => {
            let sink = CallbackSink { assembler, sender, channels };
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
                        .collect();
                    sink.push(&converted);
                },
                on_error,
                None,
            )
        }
        SampleFormat::U16 => {
            let sink = CallbackSink { assembler, sender, channels };
            device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (i32::from(s) - 32768) as i16)
                        .collect();
                    sink.push(&converted);
                },
                on_error,
                None,
            )
        }
        other => bail!("Unsupported sample format: {:?}", other),
    }
    .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;

    Ok((stream, name))
}

/// State shared with the cpal input callback
struct CallbackSink {
    assembler: Arc<Mutex<FrameAssembler>>,
    sender: FrameSender,
    channels: u16,
}

impl CallbackSink {
    fn push(&self, data: &[i16]) {
        let mono = downmix_to_mono(data, self.channels);

        let frames = match self.assembler.lock() {
            Ok(mut assembler) => assembler.push(&mono),
            Err(_) => return,
        };

        let Ok(mut slot) = self.sender.lock() else {
            return;
        };
        let Some(tx) = slot.as_ref() else {
            return;
        };

        let mut closed = false;
        for frame in frames {
            match tx.try_send(frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Frame channel full, dropping audio frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            slot.take();
        }
    }
}
