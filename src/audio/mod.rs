pub mod backend;
pub mod file;
pub mod microphone;

pub use backend::{
    downmix_to_mono, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame,
    AudioSource, FrameAssembler,
};
pub use file::{AudioFile, WavFileBackend};
pub use microphone::MicrophoneBackend;
