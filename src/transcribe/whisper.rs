//! Local whisper.cpp inference
//!
//! Uses whisper.cpp via the whisper-rs crate. The context (loaded
//! model) is shared between the engine and its sessions; each
//! inference run gets its own state.
//!
//! Whisper is not an incremental recognizer, so streaming sessions
//! accumulate audio and transcribe once on finish. No partial results
//! are emitted; inventing them from re-decoding prefixes produces
//! flickering garbage and is worse than silence.

use super::{geometric_mean, SpeechEngine, StreamSession, TranscriptionResult, MIN_SESSION_SAMPLES};
use crate::config::EngineConfig;
use crate::error::TranscribeError;
use crate::models::catalog;
use std::path::PathBuf;
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

#[derive(Clone)]
struct InferenceOptions {
    language: Option<String>,
    translate: bool,
    threads: i32,
}

pub struct WhisperEngine {
    ctx: Arc<WhisperContext>,
    options: InferenceOptions,
}

impl WhisperEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, TranscribeError> {
        let model_path = resolve_model_path(&config.model)?;

        tracing::info!("Loading whisper model from {:?}", model_path);
        let start = std::time::Instant::now();

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| TranscribeError::ModelNotFound("Invalid model path".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| TranscribeError::InitFailed(e.to_string()))?;

        tracing::info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());

        let language = if config.auto_detect_language || config.language == "auto" {
            None
        } else {
            Some(config.language.clone())
        };
        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4)) as i32;

        Ok(Self {
            ctx: Arc::new(ctx),
            options: InferenceOptions {
                language,
                translate: config.translate,
                threads,
            },
        })
    }
}

impl SpeechEngine for WhisperEngine {
    fn name(&self) -> &str {
        "whisper"
    }

    fn transcribe_buffer(&self, samples: &[f32]) -> Result<TranscriptionResult, TranscribeError> {
        run_inference(&self.ctx, &self.options, samples)
    }

    fn start_session(&self) -> Result<Box<dyn StreamSession>, TranscribeError> {
        Ok(Box::new(WhisperSession {
            ctx: self.ctx.clone(),
            options: self.options.clone(),
            audio: Vec::new(),
        }))
    }
}

struct WhisperSession {
    ctx: Arc<WhisperContext>,
    options: InferenceOptions,
    audio: Vec<f32>,
}

impl StreamSession for WhisperSession {
    fn feed(&mut self, samples: &[f32]) -> Result<Vec<TranscriptionResult>, TranscribeError> {
        self.audio.extend_from_slice(samples);
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Option<TranscriptionResult>, TranscribeError> {
        let audio = std::mem::take(&mut self.audio);
        if audio.len() < MIN_SESSION_SAMPLES {
            tracing::debug!(
                "Discarding {:.2}s utterance, too short to transcribe",
                audio.len() as f32 / 16000.0
            );
            return Ok(None);
        }
        let result = run_inference(&self.ctx, &self.options, &audio)?;
        if result.text.is_empty() {
            return Ok(None);
        }
        Ok(Some(result))
    }
}

fn run_inference(
    ctx: &WhisperContext,
    options: &InferenceOptions,
    samples: &[f32],
) -> Result<TranscriptionResult, TranscribeError> {
    if samples.is_empty() {
        return Err(TranscribeError::AudioFormat(
            "Empty audio buffer".to_string(),
        ));
    }

    let duration_secs = samples.len() as f32 / 16000.0;
    tracing::debug!(
        "Transcribing {:.2}s of audio ({} samples)",
        duration_secs,
        samples.len()
    );
    let start = std::time::Instant::now();

    let mut state = ctx
        .create_state()
        .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(options.language.as_deref());
    params.set_translate(options.translate);
    params.set_n_threads(options.threads);

    // Disable output we don't need
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    // Improve transcription quality
    params.set_suppress_blank(true);
    params.set_suppress_nst(true);

    // Short utterances decode faster as a single segment
    if duration_secs < 30.0 {
        params.set_single_segment(true);
    }

    if let Some(audio_ctx) = calculate_audio_ctx(duration_secs) {
        params.set_audio_ctx(audio_ctx);
        tracing::debug!(
            "Audio context optimization: audio_ctx={} for {:.2}s clip",
            audio_ctx,
            duration_secs
        );
    }

    state
        .full(params, samples)
        .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

    let mut text = String::new();
    let mut token_probs = Vec::new();
    for segment in state.as_iter() {
        text.push_str(
            segment
                .to_str()
                .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?,
        );
        for i in 0..segment.n_tokens() {
            if let Some(token) = segment.get_token(i) {
                token_probs.push(token.token_probability());
            }
        }
    }

    let text = text.trim().to_string();
    let confidence = {
        let g = geometric_mean(&token_probs);
        if g.is_nan() {
            0.0
        } else {
            g.clamp(0.0, 1.0)
        }
    };

    tracing::info!(
        "Transcription completed in {:.2}s ({:.0}% confidence)",
        start.elapsed().as_secs_f32(),
        confidence * 100.0
    );

    Ok(TranscriptionResult::final_result(text, confidence))
}

/// Resolve a model setting to a file path.
///
/// Accepts a catalog id ("small", "base-multi", ...) or a direct path
/// to a ggml .bin file.
fn resolve_model_path(model: &str) -> Result<PathBuf, TranscribeError> {
    if model.ends_with(".bin") {
        let path = PathBuf::from(model);
        if path.exists() {
            return Ok(path);
        }
        return Err(TranscribeError::ModelNotFound(path.display().to_string()));
    }

    let spec = catalog::find(model).ok_or_else(|| {
        TranscribeError::ModelNotFound(format!(
            "Unknown model '{}'. Valid models: {}",
            model,
            catalog::id_list()
        ))
    })?;

    let path = spec
        .path()
        .map_err(|e| TranscribeError::ConfigError(e.to_string()))?;
    if path.exists() {
        Ok(path)
    } else {
        Err(TranscribeError::ModelNotFound(format!(
            "{} ({})",
            spec.id,
            path.display()
        )))
    }
}

/// Trimmed encoder context for short clips (≤22.5s), a large speedup
/// on CPU. Formula: duration_seconds * 50 + 64
fn calculate_audio_ctx(duration_secs: f32) -> Option<i32> {
    if duration_secs <= 22.5 {
        Some((duration_secs * 50.0) as i32 + 64)
    } else {
        None
    }
}
