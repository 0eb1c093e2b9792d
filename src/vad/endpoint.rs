//! Streaming utterance-end detection
//!
//! Watches the live sample stream and fires an event once speech has
//! been followed by enough sustained silence. The hold time comes from
//! the endpointing sensitivity setting: 0.0 waits 1.8s before closing
//! an utterance, 1.0 waits only 0.4s.

use super::{map_threshold_to_energy, rms, FRAME_SIZE};
use crate::config::VadConfig;

const MAX_HOLD_MS: f32 = 1800.0;
const MIN_HOLD_MS: f32 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointEvent {
    /// Enough speech accumulated to arm the detector
    SpeechStart,
    /// Armed and silence held long enough; the utterance is over
    UtteranceEnd,
}

pub struct EndpointDetector {
    energy_threshold: f32,
    min_speech_frames: usize,
    hold_frames: usize,

    speech_frames: usize,
    silence_frames: usize,
    armed: bool,
    pending: Vec<f32>,
}

impl EndpointDetector {
    pub fn new(config: &VadConfig) -> Self {
        let sensitivity = config.endpointing_sensitivity.clamp(0.0, 1.0);
        let hold_ms = MAX_HOLD_MS - (MAX_HOLD_MS - MIN_HOLD_MS) * sensitivity;
        let frame_ms = 1000 * FRAME_SIZE / 16000;

        Self {
            energy_threshold: map_threshold_to_energy(config.threshold),
            min_speech_frames: (config.min_speech_duration_ms as usize / frame_ms).max(1),
            hold_frames: (hold_ms as usize / frame_ms).max(1),
            speech_frames: 0,
            silence_frames: 0,
            armed: false,
            pending: Vec::with_capacity(FRAME_SIZE * 2),
        }
    }

    /// Feed a chunk of samples, returning the last event it triggered.
    ///
    /// Chunks can be any length; leftover samples smaller than a frame
    /// are carried over to the next call.
    pub fn feed(&mut self, samples: &[f32]) -> Option<EndpointEvent> {
        self.pending.extend_from_slice(samples);

        let mut event = None;
        let mut offset = 0;
        while self.pending.len() - offset >= FRAME_SIZE {
            let frame = &self.pending[offset..offset + FRAME_SIZE];
            offset += FRAME_SIZE;

            if rms(frame) >= self.energy_threshold {
                self.speech_frames += 1;
                self.silence_frames = 0;
                if !self.armed && self.speech_frames >= self.min_speech_frames {
                    self.armed = true;
                    event = Some(EndpointEvent::SpeechStart);
                }
            } else {
                self.silence_frames += 1;
                if self.armed && self.silence_frames >= self.hold_frames {
                    self.reset_counters();
                    event = Some(EndpointEvent::UtteranceEnd);
                }
            }
        }
        self.pending.drain(..offset);
        event
    }

    /// Whether speech has been heard and the detector is waiting for
    /// the closing silence
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Forget everything, including buffered samples. Used when the
    /// user stops recording manually.
    pub fn reset(&mut self) {
        self.reset_counters();
        self.pending.clear();
    }

    fn reset_counters(&mut self) {
        self.speech_frames = 0;
        self.silence_frames = 0;
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(sensitivity: f32) -> EndpointDetector {
        let config = VadConfig {
            endpointing_sensitivity: sensitivity,
            min_speech_duration_ms: 100,
            ..VadConfig::default()
        };
        EndpointDetector::new(&config)
    }

    fn speech(ms: usize) -> Vec<f32> {
        (0..16 * ms)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16000.0).sin() * 0.5)
            .collect()
    }

    fn silence(ms: usize) -> Vec<f32> {
        vec![0.0; 16 * ms]
    }

    #[test]
    fn test_silence_alone_never_fires() {
        let mut detector = detector(1.0);
        assert_eq!(detector.feed(&silence(5000)), None);
        assert!(!detector.is_armed());
    }

    #[test]
    fn test_speech_arms_then_silence_ends_utterance() {
        let mut detector = detector(1.0);

        assert_eq!(detector.feed(&speech(200)), Some(EndpointEvent::SpeechStart));
        assert!(detector.is_armed());

        // hold at sensitivity 1.0 is 400ms
        assert_eq!(detector.feed(&silence(200)), None);
        assert_eq!(
            detector.feed(&silence(300)),
            Some(EndpointEvent::UtteranceEnd)
        );
        assert!(!detector.is_armed());
    }

    #[test]
    fn test_low_sensitivity_waits_longer() {
        let mut snappy = detector(1.0);
        let mut patient = detector(0.0);

        snappy.feed(&speech(200));
        patient.feed(&speech(200));

        // 600ms of silence ends the utterance only for the snappy one
        assert_eq!(snappy.feed(&silence(600)), Some(EndpointEvent::UtteranceEnd));
        assert_eq!(patient.feed(&silence(600)), None);

        // the patient detector needs the full 1.8s
        assert_eq!(
            patient.feed(&silence(1300)),
            Some(EndpointEvent::UtteranceEnd)
        );
    }

    #[test]
    fn test_brief_pause_does_not_end_utterance() {
        let mut detector = detector(1.0);
        detector.feed(&speech(200));

        assert_eq!(detector.feed(&silence(200)), None);
        // speech resumes, silence counter starts over
        assert_eq!(detector.feed(&speech(100)), None);
        assert_eq!(detector.feed(&silence(200)), None);
        assert!(detector.is_armed());
    }

    #[test]
    fn test_short_noise_does_not_arm() {
        let config = VadConfig {
            endpointing_sensitivity: 1.0,
            min_speech_duration_ms: 300,
            ..VadConfig::default()
        };
        let mut detector = EndpointDetector::new(&config);

        // a 60ms click is below the 300ms arming requirement
        assert_eq!(detector.feed(&speech(60)), None);
        assert!(!detector.is_armed());
        assert_eq!(detector.feed(&silence(2000)), None);
    }

    #[test]
    fn test_reset_disarms() {
        let mut detector = detector(1.0);
        detector.feed(&speech(200));
        assert!(detector.is_armed());

        detector.reset();
        assert!(!detector.is_armed());
        assert_eq!(detector.feed(&silence(1000)), None);
    }

    #[test]
    fn test_partial_frames_carry_over() {
        let mut detector = detector(1.0);
        let chunk = speech(200);

        // feed in odd-sized pieces smaller than a frame
        let mut event = None;
        for piece in chunk.chunks(100) {
            if let Some(e) = detector.feed(piece) {
                event = Some(e);
            }
        }
        assert_eq!(event, Some(EndpointEvent::SpeechStart));
    }
}
