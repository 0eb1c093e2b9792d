//! Deterministic mock speech engine
//!
//! Produces canned phrases on a fixed cadence so the full pipeline can
//! be exercised without a model, a microphone, or a network. Streaming
//! sessions emit growing partials and close each simulated utterance
//! with a final; everything is a pure function of how much audio has
//! been fed, so tests are reproducible.

use super::{SpeechEngine, StreamSession, TranscriptionResult};
use crate::error::TranscribeError;

const PHRASES: [&str; 10] = [
    "Hello world",
    "This is a test transcription",
    "The quick brown fox jumps over the lazy dog",
    "Testing voice recognition",
    "How are you today",
    "This is working great",
    "Voice input is active",
    "Fake transcription result",
    "Machine learning is fascinating",
    "Speech recognition technology",
];

/// One partial step per half second of 16kHz audio
const STEP_SAMPLES: usize = 8000;

/// Steps per simulated utterance (a final every 2 seconds)
const STEPS_PER_UTTERANCE: usize = 4;

pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn transcribe_buffer(&self, samples: &[f32]) -> Result<TranscriptionResult, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::AudioFormat(
                "Empty audio buffer".to_string(),
            ));
        }
        // phrase keyed to recording length so different takes differ
        let idx = (samples.len() / 16000) % PHRASES.len();
        Ok(TranscriptionResult::final_result(PHRASES[idx], 0.92))
    }

    fn start_session(&self) -> Result<Box<dyn StreamSession>, TranscribeError> {
        Ok(Box::new(MockSession {
            pending: 0,
            progress: 0,
            utterances: 0,
        }))
    }
}

struct MockSession {
    /// Samples fed but not yet consumed by a step
    pending: usize,
    /// Partial steps taken within the current utterance
    progress: usize,
    /// Completed utterances, selects the phrase
    utterances: usize,
}

impl MockSession {
    fn phrase(&self) -> &'static str {
        PHRASES[self.utterances % PHRASES.len()]
    }

    fn final_confidence(&self) -> f32 {
        0.8 + 0.02 * (self.utterances % 10) as f32
    }

    fn emit_final(&mut self) -> TranscriptionResult {
        let result = TranscriptionResult::final_result(self.phrase(), self.final_confidence());
        self.progress = 0;
        self.utterances += 1;
        result
    }
}

impl StreamSession for MockSession {
    fn feed(&mut self, samples: &[f32]) -> Result<Vec<TranscriptionResult>, TranscribeError> {
        self.pending += samples.len();

        let mut results = Vec::new();
        while self.pending >= STEP_SAMPLES {
            self.pending -= STEP_SAMPLES;
            self.progress += 1;

            if self.progress >= STEPS_PER_UTTERANCE {
                results.push(self.emit_final());
            } else {
                let words: Vec<&str> = self.phrase().split_whitespace().collect();
                let take = ((words.len() * self.progress) / STEPS_PER_UTTERANCE).max(1);
                let text = words[..take.min(words.len())].join(" ");
                let confidence = 0.4 + 0.3 * (self.progress as f32 / STEPS_PER_UTTERANCE as f32);
                results.push(TranscriptionResult::partial(text, confidence));
            }
        }
        Ok(results)
    }

    fn finish(&mut self) -> Result<Option<TranscriptionResult>, TranscribeError> {
        self.pending = 0;
        if self.progress == 0 {
            // nothing meaningful was heard this utterance
            return Ok(None);
        }
        Ok(Some(self.emit_final()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_transcription_is_deterministic() {
        let engine = MockEngine::new();
        let audio = vec![0.1f32; 16000];

        let a = engine.transcribe_buffer(&audio).unwrap();
        let b = engine.transcribe_buffer(&audio).unwrap();
        assert_eq!(a, b);
        assert!(a.is_final);
        assert_eq!(a.text, PHRASES[1]);
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let engine = MockEngine::new();
        assert!(engine.transcribe_buffer(&[]).is_err());
    }

    #[test]
    fn test_session_emits_partials_then_final() {
        let engine = MockEngine::new();
        let mut session = engine.start_session().unwrap();

        let mut partials = 0;
        let mut finals = Vec::new();
        // exactly one utterance worth of audio
        for _ in 0..STEPS_PER_UTTERANCE {
            for result in session.feed(&vec![0.0f32; STEP_SAMPLES]).unwrap() {
                if result.is_partial {
                    partials += 1;
                    assert!(finals.is_empty(), "partial after final within utterance");
                } else {
                    finals.push(result);
                }
            }
        }

        assert_eq!(partials, STEPS_PER_UTTERANCE - 1);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, PHRASES[0]);
    }

    #[test]
    fn test_partials_grow_toward_the_phrase() {
        let engine = MockEngine::new();
        let mut session = engine.start_session().unwrap();

        let mut last_len = 0;
        for _ in 0..(STEPS_PER_UTTERANCE - 1) {
            let results = session.feed(&vec![0.0f32; STEP_SAMPLES]).unwrap();
            assert_eq!(results.len(), 1);
            let partial = &results[0];
            assert!(partial.is_partial);
            assert!(partial.text.len() >= last_len);
            assert!(PHRASES[0].starts_with(&partial.text));
            last_len = partial.text.len();
        }
    }

    #[test]
    fn test_finish_flushes_in_progress_utterance() {
        let engine = MockEngine::new();
        let mut session = engine.start_session().unwrap();

        session.feed(&vec![0.0f32; STEP_SAMPLES]).unwrap();
        let fin = session.finish().unwrap().unwrap();
        assert!(fin.is_final);
        assert_eq!(fin.text, PHRASES[0]);
    }

    #[test]
    fn test_finish_with_too_little_audio_returns_none() {
        let engine = MockEngine::new();
        let mut session = engine.start_session().unwrap();

        session.feed(&vec![0.0f32; 100]).unwrap();
        assert!(session.finish().unwrap().is_none());
    }

    #[test]
    fn test_phrases_cycle_across_utterances() {
        let engine = MockEngine::new();
        let mut session = engine.start_session().unwrap();

        let mut finals = Vec::new();
        for _ in 0..(STEPS_PER_UTTERANCE * 3) {
            for result in session.feed(&vec![0.0f32; STEP_SAMPLES]).unwrap() {
                if result.is_final {
                    finals.push(result.text);
                }
            }
        }
        assert_eq!(finals, vec![PHRASES[0], PHRASES[1], PHRASES[2]]);
    }

    #[test]
    fn test_confidences_stay_in_range() {
        let engine = MockEngine::new();
        let mut session = engine.start_session().unwrap();

        for _ in 0..(STEPS_PER_UTTERANCE * 12) {
            for result in session.feed(&vec![0.0f32; STEP_SAMPLES]).unwrap() {
                assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
            }
        }
    }
}
