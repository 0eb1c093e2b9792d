//! Voice activity detection
//!
//! Two related jobs share this module:
//! - [`EnergyVad`] decides after the fact whether a recording contains
//!   speech at all, so silence-only recordings are dropped before they
//!   reach the engine (Whisper hallucinates on silence).
//! - [`EndpointDetector`] watches the live sample stream and reports
//!   when an utterance has ended, driving continuous dictation.
//!
//! Both work on RMS energy over 20ms frames. No model files needed.

mod endpoint;
mod energy;

pub use endpoint::{EndpointDetector, EndpointEvent};
pub use energy::EnergyVad;

/// Audio is analyzed in 20ms frames at 16kHz (320 samples)
pub(crate) const FRAME_SIZE: usize = 16000 * 20 / 1000;
pub(crate) const FRAME_MS: u32 = 20;

/// Result of voice activity detection over a complete recording
#[derive(Debug, Clone)]
pub struct VadResult {
    /// Whether speech was detected in the audio
    pub has_speech: bool,

    /// Total duration of detected speech in seconds
    pub speech_duration_secs: f32,

    /// Ratio of speech frames to total frames (0.0 - 1.0)
    pub speech_ratio: f32,

    /// Average RMS energy across all frames
    pub rms_energy: f32,
}

/// RMS energy of a sample slice
pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Map the config threshold (0.0-1.0) to an RMS energy threshold
///
/// - 0.0 = very sensitive (energy threshold ~0.001, detects quiet whispers)
/// - 0.5 = balanced (energy threshold ~0.01, filters silence)
/// - 1.0 = aggressive (energy threshold ~0.1, requires louder speech)
pub(crate) fn map_threshold_to_energy(config_threshold: f32) -> f32 {
    let t = config_threshold.clamp(0.0, 1.0);
    0.001 * (100.0_f32).powf(t)
}
