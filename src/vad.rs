//! Energy-based voice activity detection
//!
//! A single fixed RMS threshold separates speech from silence. The result only
//! drives the idle-connection reset; silent frames are still streamed.

/// Default RMS energy threshold for 16-bit PCM
pub const DEFAULT_ENERGY_THRESHOLD: f64 = 200.0;

/// Classification of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceActivity {
    /// RMS energy of the frame, in raw i16 sample units
    pub energy: f64,
    /// Whether `energy` exceeded the threshold
    pub is_speech: bool,
}

/// Root-mean-square energy of i16 samples
///
/// Samples are promoted to f64 before squaring so that full-scale input
/// cannot overflow. Returns 0.0 for an empty slice.
pub fn rms_energy(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt()
}

/// Classify a frame as speech or silence against `threshold`
pub fn classify(samples: &[i16], threshold: f64) -> VoiceActivity {
    let energy = rms_energy(samples);
    VoiceActivity {
        energy,
        is_speech: energy > threshold,
    }
}
