//! Energy-based voice activity detection
//!
//! Analyzes audio in short frames and reports speech presence based on
//! RMS energy exceeding a threshold. Good enough to filter out silent
//! or near-silent recordings without any model download.

use super::{map_threshold_to_energy, rms, VadResult, FRAME_MS, FRAME_SIZE};
use crate::config::VadConfig;

pub struct EnergyVad {
    /// RMS energy above which a frame counts as speech
    threshold: f32,
    /// Minimum total speech duration for a recording to pass
    min_speech_duration_ms: u32,
}

impl EnergyVad {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: map_threshold_to_energy(config.threshold),
            min_speech_duration_ms: config.min_speech_duration_ms,
        }
    }

    /// Detect voice activity in 16kHz mono samples normalized to [-1.0, 1.0]
    pub fn detect(&self, samples: &[f32]) -> VadResult {
        if samples.is_empty() {
            return VadResult {
                has_speech: false,
                speech_duration_secs: 0.0,
                speech_ratio: 0.0,
                rms_energy: 0.0,
            };
        }

        let mut speech_frames = 0usize;
        let mut total_frames = 0usize;
        let mut total_energy = 0.0f32;

        for frame in samples.chunks(FRAME_SIZE) {
            let frame_rms = rms(frame);
            total_energy += frame_rms;
            total_frames += 1;
            if frame_rms >= self.threshold {
                speech_frames += 1;
            }
        }

        let speech_duration_secs = (speech_frames as u32 * FRAME_MS) as f32 / 1000.0;
        let speech_ratio = speech_frames as f32 / total_frames as f32;
        let min_speech_secs = self.min_speech_duration_ms as f32 / 1000.0;
        let has_speech = speech_duration_secs >= min_speech_secs;

        tracing::debug!(
            "VAD: has_speech={}, speech={:.2}s ({} frames), ratio={:.1}%, threshold={:.4}",
            has_speech,
            speech_duration_secs,
            speech_frames,
            speech_ratio * 100.0,
            self.threshold
        );

        VadResult {
            has_speech,
            speech_duration_secs,
            speech_ratio,
            rms_energy: total_energy / total_frames as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(samples: usize, amplitude: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16000.0).sin() * amplitude)
            .collect()
    }

    #[test]
    fn test_detect_silence() {
        let vad = EnergyVad::new(&VadConfig::default());
        let result = vad.detect(&vec![0.0; 16000]);

        assert!(!result.has_speech);
        assert_eq!(result.speech_duration_secs, 0.0);
        assert_eq!(result.rms_energy, 0.0);
    }

    #[test]
    fn test_detect_loud_audio() {
        let vad = EnergyVad::new(&VadConfig::default());
        let result = vad.detect(&sine(16000, 0.5));

        assert!(result.has_speech);
        assert!(result.speech_ratio > 0.9);
        assert!(result.rms_energy > 0.1);
    }

    #[test]
    fn test_detect_quiet_audio() {
        let vad = EnergyVad::new(&VadConfig::default());
        // well below the default threshold
        let result = vad.detect(&sine(16000, 0.001));
        assert!(!result.has_speech);
    }

    #[test]
    fn test_detect_empty_audio() {
        let vad = EnergyVad::new(&VadConfig::default());
        let result = vad.detect(&[]);
        assert!(!result.has_speech);
        assert_eq!(result.speech_duration_secs, 0.0);
    }

    #[test]
    fn test_min_speech_duration() {
        let config = VadConfig {
            min_speech_duration_ms: 500,
            ..VadConfig::default()
        };
        let vad = EnergyVad::new(&config);

        // 200ms of speech then 800ms of silence, below the 500ms minimum
        let mut samples = sine(3200, 0.5);
        samples.extend(vec![0.0; 12800]);

        let result = vad.detect(&samples);
        assert!(!result.has_speech);
        assert!(result.speech_duration_secs < 0.5);
    }
}
