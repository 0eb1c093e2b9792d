//! Remote transcription via an OpenAI-compatible API
//!
//! Sends recorded audio to a whisper.cpp server, OpenAI, or any
//! compatible endpoint, for setups where inference runs on a GPU box
//! elsewhere. The API key is read from the environment variable named
//! in the config and is never written to disk.
//!
//! The API is request/response, so sessions accumulate audio and do
//! one POST on finish. No partial results.

use super::{SpeechEngine, StreamSession, TranscriptionResult, MIN_SESSION_SAMPLES};
use crate::config::EngineConfig;
use crate::error::TranscribeError;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Remote APIs report no token probabilities; results carry this fixed
/// confidence
const REMOTE_CONFIDENCE: f32 = 0.8;

#[derive(Debug)]
struct RemoteShared {
    url: String,
    model: String,
    language: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug)]
pub struct RemoteEngine {
    shared: Arc<RemoteShared>,
}

impl RemoteEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, TranscribeError> {
        let remote = &config.remote;

        if remote.url.is_empty() {
            return Err(TranscribeError::ConfigError(
                "engine.remote.url is required when backend = 'remote'".into(),
            ));
        }
        if !remote.url.starts_with("http://") && !remote.url.starts_with("https://") {
            return Err(TranscribeError::ConfigError(format!(
                "engine.remote.url must start with http:// or https://, got: {}",
                remote.url
            )));
        }
        if remote.url.starts_with("http://")
            && !remote.url.contains("localhost")
            && !remote.url.contains("127.0.0.1")
            && !remote.url.contains("[::1]")
        {
            tracing::warn!(
                "Remote endpoint uses HTTP without TLS. Audio will be transmitted unencrypted!"
            );
        }

        let api_key = std::env::var(&remote.api_key_env).ok();
        if api_key.is_none() {
            tracing::debug!("No API key found in ${}", remote.api_key_env);
        }

        let language = if config.auto_detect_language || config.language == "auto" {
            None
        } else {
            Some(config.language.clone())
        };

        let url = resolve_url(&remote.url, config.translate);

        tracing::info!(
            "Configured remote transcriber: url={}, model={}, timeout={}s",
            url,
            remote.model,
            remote.timeout_secs
        );

        Ok(Self {
            shared: Arc::new(RemoteShared {
                url,
                model: remote.model.clone(),
                language,
                api_key,
                timeout: Duration::from_secs(remote.timeout_secs),
            }),
        })
    }
}

impl SpeechEngine for RemoteEngine {
    fn name(&self) -> &str {
        "remote"
    }

    fn transcribe_buffer(&self, samples: &[f32]) -> Result<TranscriptionResult, TranscribeError> {
        self.shared.transcribe(samples)
    }

    fn start_session(&self) -> Result<Box<dyn StreamSession>, TranscribeError> {
        Ok(Box::new(RemoteSession {
            shared: self.shared.clone(),
            audio: Vec::new(),
        }))
    }
}

struct RemoteSession {
    shared: Arc<RemoteShared>,
    audio: Vec<f32>,
}

impl StreamSession for RemoteSession {
    fn feed(&mut self, samples: &[f32]) -> Result<Vec<TranscriptionResult>, TranscribeError> {
        self.audio.extend_from_slice(samples);
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Option<TranscriptionResult>, TranscribeError> {
        let audio = std::mem::take(&mut self.audio);
        if audio.len() < MIN_SESSION_SAMPLES {
            return Ok(None);
        }
        let result = self.shared.transcribe(&audio)?;
        if result.text.is_empty() {
            return Ok(None);
        }
        Ok(Some(result))
    }
}

impl RemoteShared {
    fn transcribe(&self, samples: &[f32]) -> Result<TranscriptionResult, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::AudioFormat("Empty audio buffer".into()));
        }

        let duration_secs = samples.len() as f32 / 16000.0;
        tracing::debug!(
            "Sending {:.2}s of audio to remote server ({} samples)",
            duration_secs,
            samples.len()
        );
        let start = std::time::Instant::now();

        let wav_data = encode_wav(samples)?;
        let (boundary, body) = self.build_multipart_body(&wav_data);

        let mut request = ureq::post(&self.url).timeout(self.timeout).set(
            "Content-Type",
            &format!("multipart/form-data; boundary={}", boundary),
        );
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request.send_bytes(&body).map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let mut message = resp.into_string().unwrap_or_default();
                message.truncate(500);
                TranscribeError::RemoteError {
                    status: code,
                    message,
                }
            }
            ureq::Error::Transport(t) => {
                TranscribeError::NetworkError(format!("Request failed: {}", t))
            }
        })?;

        let json: serde_json::Value = response
            .into_json()
            .map_err(|e| TranscribeError::NetworkError(format!("Failed to parse response: {e}")))?;

        let text = json
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TranscribeError::RemoteError {
                status: 200,
                message: format!("Response missing 'text' field: {json}"),
            })?
            .trim()
            .to_string();

        tracing::info!(
            "Remote transcription completed in {:.2}s",
            start.elapsed().as_secs_f32()
        );

        Ok(TranscriptionResult::final_result(text, REMOTE_CONFIDENCE))
    }

    /// Build the multipart form body for the API request
    fn build_multipart_body(&self, wav_data: &[u8]) -> (String, Vec<u8>) {
        let boundary = format!(
            "----VoxkeyBoundary{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        let mut body = Vec::new();

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
        body.extend_from_slice(wav_data);
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"model\"\r\n\r\n");
        body.extend_from_slice(self.model.as_bytes());
        body.extend_from_slice(b"\r\n");

        if let Some(ref language) = self.language {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(b"Content-Disposition: form-data; name=\"language\"\r\n\r\n");
            body.extend_from_slice(language.as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"response_format\"\r\n\r\n");
        body.extend_from_slice(b"json\r\n");

        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        (boundary, body)
    }
}

/// Encode f32 samples as 16-bit PCM WAV
fn encode_wav(samples: &[f32]) -> Result<Vec<u8>, TranscribeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| TranscribeError::AudioFormat(format!("Failed to create WAV writer: {e}")))?;

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * i16::MAX as f32) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| TranscribeError::AudioFormat(format!("Failed to write sample: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| TranscribeError::AudioFormat(format!("Failed to finalize WAV: {e}")))?;

    Ok(buffer.into_inner())
}

/// Switch the standard transcriptions path to translations when
/// translation is requested
fn resolve_url(url: &str, translate: bool) -> String {
    let trimmed = url.trim_end_matches('/');
    if translate {
        if let Some(base) = trimmed.strip_suffix("/transcriptions") {
            return format!("{base}/translations");
        }
        tracing::warn!("translate = true, but the remote URL has no /transcriptions suffix");
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;

    fn engine_config(url: &str) -> EngineConfig {
        EngineConfig {
            remote: RemoteConfig {
                url: url.to_string(),
                ..RemoteConfig::default()
            },
            auto_detect_language: false,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_encode_wav_basic() {
        let samples: Vec<f32> = (0..16000)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16000.0).sin() * 0.5)
            .collect();

        let wav = encode_wav(&samples).unwrap();

        // 44-byte WAV header, then 16000 samples * 2 bytes
        assert_eq!(wav.len(), 44 + 32000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_config_validation_empty_url() {
        let result = RemoteEngine::new(&engine_config(""));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("url"));
    }

    #[test]
    fn test_config_validation_invalid_url() {
        let result = RemoteEngine::new(&engine_config("not-a-url"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("http://"));
    }

    #[test]
    fn test_multipart_body_structure() {
        let engine = RemoteEngine::new(&engine_config("http://localhost:8080/v1/audio/transcriptions")).unwrap();
        let wav_data = vec![0u8; 100];

        let (boundary, body) = engine.shared.build_multipart_body(&wav_data);
        let body_str = String::from_utf8_lossy(&body);

        assert!(body_str.contains(&boundary));
        assert!(body_str.contains("name=\"file\""));
        assert!(body_str.contains("filename=\"audio.wav\""));
        assert!(body_str.contains("name=\"model\""));
        assert!(body_str.contains("whisper-1"));
        assert!(body_str.contains("name=\"language\""));
        assert!(body_str.contains("name=\"response_format\""));
        assert!(body_str.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[test]
    fn test_language_field_omitted_when_auto() {
        let mut config = engine_config("http://localhost:8080/v1/audio/transcriptions");
        config.auto_detect_language = true;
        let engine = RemoteEngine::new(&config).unwrap();

        let (_, body) = engine.shared.build_multipart_body(&[]);
        assert!(!String::from_utf8_lossy(&body).contains("name=\"language\""));
    }

    #[test]
    fn test_translate_swaps_endpoint_path() {
        assert_eq!(
            resolve_url("https://api.openai.com/v1/audio/transcriptions", true),
            "https://api.openai.com/v1/audio/translations"
        );
        assert_eq!(
            resolve_url("https://api.openai.com/v1/audio/transcriptions", false),
            "https://api.openai.com/v1/audio/transcriptions"
        );
        // unknown shapes are left alone
        assert_eq!(
            resolve_url("http://localhost:8080/transcribe", true),
            "http://localhost:8080/transcribe"
        );
    }

    #[test]
    fn test_timeout_comes_from_config() {
        let mut config = engine_config("http://localhost:8080/v1/audio/transcriptions");
        config.remote.timeout_secs = 60;
        let engine = RemoteEngine::new(&config).unwrap();
        assert_eq!(engine.shared.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_short_session_returns_none() {
        let engine = RemoteEngine::new(&engine_config("http://localhost:8080/v1/audio/transcriptions")).unwrap();
        let mut session = engine.start_session().unwrap();
        session.feed(&vec![0.0f32; 100]).unwrap();
        // finishes without a network round trip
        assert!(session.finish().unwrap().is_none());
    }
}
