//! Speech-to-text engines
//!
//! [`SpeechEngine`] is the contract every backend implements: one-shot
//! transcription of a finished recording, plus streaming sessions that
//! consume live audio and emit results as recognition progresses.
//!
//! Three backends exist:
//! - `whisper`: local inference via whisper.cpp (whisper-rs crate)
//! - `remote`: an OpenAI-compatible HTTP transcription API
//! - `mock`: deterministic canned phrases for tests and demos
//!
//! Engines are synchronous; inference is CPU-bound and callers run it
//! on a blocking thread. Construction loads the model (or validates
//! the endpoint), and dropping the engine releases it.

pub mod mock;
pub mod remote;
pub mod whisper;

use crate::config::{Config, EngineBackend};
use crate::error::TranscribeError;

/// Sessions with less audio than this (0.3s at 16 kHz) are discarded on
/// finish; whisper hallucinates on fragments and remote calls are not
/// worth the round trip
pub(crate) const MIN_SESSION_SAMPLES: usize = 4800;

/// A single recognition result
///
/// Exactly one of `is_partial` / `is_final` is set. Partials are
/// provisional and will be replaced; finals are committed text.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub is_partial: bool,
    pub is_final: bool,
    /// Engine confidence in [0.0, 1.0]
    pub confidence: f32,
}

impl TranscriptionResult {
    pub fn partial(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_partial: true,
            is_final: false,
            confidence,
        }
    }

    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_partial: false,
            is_final: true,
            confidence,
        }
    }
}

/// Contract for speech recognition backends
pub trait SpeechEngine: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &str;

    /// Transcribe a complete recording (f32 samples, mono, 16kHz)
    fn transcribe_buffer(&self, samples: &[f32]) -> Result<TranscriptionResult, TranscribeError>;

    /// Begin a streaming session for live audio
    fn start_session(&self) -> Result<Box<dyn StreamSession>, TranscribeError>;
}

/// One utterance-in-progress
///
/// Backends that cannot produce honest partial results return an empty
/// vec from `feed` and do all their work in `finish`.
pub trait StreamSession: Send {
    /// Feed a chunk of live audio, receiving any new results
    fn feed(&mut self, samples: &[f32]) -> Result<Vec<TranscriptionResult>, TranscribeError>;

    /// Close the session. Returns the final result, or None when the
    /// audio was too short or contained nothing recognizable.
    fn finish(&mut self) -> Result<Option<TranscriptionResult>, TranscribeError>;
}

/// Factory function to create the engine selected in the configuration
pub fn create_engine(config: &Config) -> Result<Box<dyn SpeechEngine>, TranscribeError> {
    match config.engine.backend {
        EngineBackend::Whisper => {
            tracing::info!(
                "Using local whisper backend with model={}",
                config.engine.model
            );
            Ok(Box::new(whisper::WhisperEngine::new(&config.engine)?))
        }
        EngineBackend::Remote => {
            tracing::info!("Using remote transcription backend");
            Ok(Box::new(remote::RemoteEngine::new(&config.engine)?))
        }
        EngineBackend::Mock => {
            tracing::info!("Using mock transcription backend");
            Ok(Box::new(mock::MockEngine::new()))
        }
    }
}

/// Create the configured engine, falling back to the mock engine when
/// it cannot be initialized (model missing, endpoint misconfigured).
/// Dictation keeps working either way; the problem is logged.
pub fn create_engine_with_fallback(config: &Config) -> Box<dyn SpeechEngine> {
    match create_engine(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::warn!("Speech engine unavailable, falling back to mock: {e}");
            Box::new(mock::MockEngine::new())
        }
    }
}

/// Geometric mean of token probabilities, used as result confidence
pub(crate) fn geometric_mean(probabilities: &[f32]) -> f32 {
    if probabilities.is_empty() {
        return f32::NAN;
    }
    let product: f32 = probabilities.iter().product();
    product.powf(1.0 / probabilities.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        let partial = TranscriptionResult::partial("hello", 0.5);
        assert!(partial.is_partial);
        assert!(!partial.is_final);

        let fin = TranscriptionResult::final_result("hello world", 0.9);
        assert!(fin.is_final);
        assert!(!fin.is_partial);
        assert_eq!(fin.text, "hello world");
    }

    #[test]
    fn test_geometric_mean() {
        assert!((geometric_mean(&[0.5, 0.5]) - 0.5).abs() < 1e-6);
        assert!((geometric_mean(&[1.0, 0.25]) - 0.5).abs() < 1e-6);
        assert!(geometric_mean(&[]).is_nan());
    }

    #[test]
    fn test_mock_backend_selected() {
        let mut config = Config::default();
        config.engine.backend = EngineBackend::Mock;
        let engine = create_engine(&config).unwrap();
        assert_eq!(engine.name(), "mock");
    }
}
