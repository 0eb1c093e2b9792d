//! Audio capture engine
//!
//! Provides audio recording using cpal, which works with PipeWire,
//! PulseAudio, and ALSA backends.
//!
//! [`AudioEngine`] owns the capture lifecycle and publishes three feeds
//! that consumers subscribe to independently:
//! - a smoothed input level (0.0 - 1.0) for meters,
//! - a voice activity flag derived from the level,
//! - the live 16kHz mono sample stream.
//!
//! The sample stream is a broadcast channel: a subscriber that falls
//! behind skips ahead instead of stalling capture.

mod capture;

pub use capture::resample;

use crate::config::{AudioConfig, VadConfig};
use crate::error::AudioError;
use crate::vad::map_threshold_to_energy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};

/// Chunks buffered per subscriber before it starts lagging
const CHUNK_CHANNEL_CAPACITY: usize = 64;

pub struct AudioEngine {
    config: AudioConfig,
    energy_threshold: f32,
    level_tx: Arc<watch::Sender<f32>>,
    activity_tx: Arc<watch::Sender<bool>>,
    chunk_tx: broadcast::Sender<Vec<f32>>,
    capture: Option<capture::CaptureHandle>,
}

impl AudioEngine {
    pub fn new(audio: &AudioConfig, vad: &VadConfig) -> Self {
        let (level_tx, _) = watch::channel(0.0f32);
        let (activity_tx, _) = watch::channel(false);
        let (chunk_tx, _) = broadcast::channel(CHUNK_CHANNEL_CAPACITY);
        Self {
            config: audio.clone(),
            energy_threshold: map_threshold_to_energy(vad.threshold),
            level_tx: Arc::new(level_tx),
            activity_tx: Arc::new(activity_tx),
            chunk_tx,
            capture: None,
        }
    }

    /// Smoothed input level, 0.0 when idle
    pub fn level(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }

    /// Whether the input currently sounds like speech
    pub fn voice_activity(&self) -> watch::Receiver<bool> {
        self.activity_tx.subscribe()
    }

    /// Live sample stream (f32 mono at the configured rate)
    pub fn samples(&self) -> broadcast::Receiver<Vec<f32>> {
        self.chunk_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    /// Start capturing. Calling this while already running is a no-op.
    pub async fn start(&mut self) -> Result<(), AudioError> {
        if self.capture.is_some() {
            tracing::debug!("Audio engine already running");
            return Ok(());
        }
        let handle = capture::start_capture(
            &self.config,
            self.energy_threshold,
            self.chunk_tx.clone(),
            self.level_tx.clone(),
            self.activity_tx.clone(),
        )
        .await?;
        self.capture = Some(handle);
        Ok(())
    }

    /// Stop capturing and return the complete take.
    ///
    /// Resets level and voice activity to their idle values. No more
    /// chunks are emitted once this returns; subscribers only drain
    /// what was already queued. Calling this while stopped returns an
    /// empty take.
    pub async fn stop(&mut self) -> Result<Vec<f32>, AudioError> {
        let Some(handle) = self.capture.take() else {
            return Ok(Vec::new());
        };

        let (response_tx, response_rx) = oneshot::channel();
        let result = if handle
            .cmd_tx
            .send(capture::CaptureCommand::Stop(response_tx))
            .is_ok()
        {
            match tokio::time::timeout(Duration::from_secs(2), response_rx).await {
                Ok(Ok(samples)) => {
                    let _ = handle.thread.join();
                    Ok(samples)
                }
                Ok(Err(_)) => Err(AudioError::StreamError(
                    "Capture thread exited unexpectedly".to_string(),
                )),
                Err(_) => Err(AudioError::Timeout(2)),
            }
        } else {
            Ok(Vec::new())
        };

        let _ = self.level_tx.send(0.0);
        let _ = self.activity_tx.send(false);

        let samples = result?;
        tracing::debug!(
            "Audio capture stopped: {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f32 / self.config.sample_rate as f32
        );
        Ok(samples)
    }

    /// Swap in new settings. Takes effect on the next start.
    pub fn update_config(&mut self, audio: &AudioConfig, vad: &VadConfig) {
        self.config = audio.clone();
        self.energy_threshold = map_threshold_to_energy(vad.threshold);
    }
}
