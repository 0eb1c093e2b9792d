//! cpal-based capture internals
//!
//! Uses the cpal crate for audio input, which works with PipeWire,
//! PulseAudio, and ALSA backends.
//!
//! Note: cpal::Stream is not Send, so the stream lives on a dedicated
//! thread and everything else talks to it via channels. The stream
//! callback mixes down to mono, resamples to the target rate, then
//! feeds three outputs: the accumulating take, the live chunk
//! broadcast, and the smoothed level / voice activity watches.

use crate::config::AudioConfig;
use crate::error::AudioError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};

/// Full scale on the level meter corresponds to this RMS
const LEVEL_GAIN: f32 = 4.0;

/// EMA coefficient for level smoothing (higher = snappier meter)
const LEVEL_SMOOTHING: f32 = 0.25;

/// Commands sent to the capture thread
pub(super) enum CaptureCommand {
    Stop(oneshot::Sender<Vec<f32>>),
}

/// Running capture thread plus its command channel
pub(super) struct CaptureHandle {
    pub cmd_tx: std::sync::mpsc::Sender<CaptureCommand>,
    pub thread: thread::JoinHandle<()>,
}

/// Sinks the stream callback writes into
struct StreamOutputs {
    samples: Arc<Mutex<Vec<f32>>>,
    chunk_tx: broadcast::Sender<Vec<f32>>,
    level_tx: Arc<watch::Sender<f32>>,
    activity_tx: Arc<watch::Sender<bool>>,
    energy_threshold: f32,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
}

/// Open the configured device and start the capture thread.
///
/// Device and format problems are reported here; once this returns Ok
/// the stream is playing.
pub(super) async fn start_capture(
    config: &AudioConfig,
    energy_threshold: f32,
    chunk_tx: broadcast::Sender<Vec<f32>>,
    level_tx: Arc<watch::Sender<f32>>,
    activity_tx: Arc<watch::Sender<bool>>,
) -> Result<CaptureHandle, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = if config.device == "default" {
        host.default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?
    } else {
        find_audio_device(&host, &config.device)?
    };

    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("Using audio device: {}", device_name);

    let supported_config = device
        .default_input_config()
        .map_err(|e| AudioError::Connection(e.to_string()))?;

    let source_rate = supported_config.sample_rate().0;
    let source_channels = supported_config.channels() as usize;
    let sample_format = supported_config.sample_format();
    let target_rate = config.sample_rate;

    tracing::debug!(
        "Device config: {} Hz, {} channel(s), format: {:?}",
        source_rate,
        source_channels,
        sample_format
    );

    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<CaptureCommand>();
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AudioError>>();

    let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
    let samples_thread = samples.clone();

    let thread = thread::spawn(move || {
        let stream_config = cpal::StreamConfig {
            channels: supported_config.channels(),
            sample_rate: supported_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_fn = |err| tracing::error!("Audio stream error: {}", err);

        let outputs = StreamOutputs {
            samples: samples_thread.clone(),
            chunk_tx,
            level_tx,
            activity_tx,
            energy_threshold,
            source_rate,
            target_rate,
            source_channels,
        };

        let stream_result = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, outputs, err_fn),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, outputs, err_fn),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, outputs, err_fn),
            format => Err(AudioError::StreamError(format!(
                "Unsupported sample format: {format:?}"
            ))),
        };

        let stream = match stream_result {
            Ok(s) => s,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
            return;
        }

        let _ = ready_tx.send(Ok(()));
        tracing::debug!("Audio capture thread started");

        // Hold the stream alive until told to stop
        if let Ok(CaptureCommand::Stop(response_tx)) = cmd_rx.recv() {
            drop(stream);
            let collected = samples_thread
                .lock()
                .map(|guard| guard.clone())
                .unwrap_or_default();
            let _ = response_tx.send(collected);
        }

        tracing::debug!("Audio capture thread stopped");
    });

    match tokio::time::timeout(Duration::from_secs(2), ready_rx).await {
        Ok(Ok(Ok(()))) => Ok(CaptureHandle { cmd_tx, thread }),
        Ok(Ok(Err(e))) => {
            let _ = thread.join();
            Err(e)
        }
        Ok(Err(_)) => {
            let _ = thread.join();
            Err(AudioError::StreamError(
                "Capture thread exited before starting".to_string(),
            ))
        }
        Err(_) => Err(AudioError::Timeout(2)),
    }
}

/// Find an audio input device by name with flexible matching.
///
/// Tries, in order: exact match, case-insensitive match, then
/// case-insensitive substring match. This accepts full cpal names
/// ("alsa_input.pci-0000_00_1f.3.analog-stereo"), PipeWire short
/// names, or fragments like "analog-stereo".
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .collect();

    let names: Vec<Option<String>> = devices.iter().map(|d| d.name().ok()).collect();
    let search_lower = device_name.to_lowercase();

    let exact = names.iter().position(|n| n.as_deref() == Some(device_name));
    let fold_case = || {
        names.iter().position(|n| {
            n.as_deref()
                .map(|s| s.to_lowercase() == search_lower)
                .unwrap_or(false)
        })
    };
    let substring = || {
        names.iter().position(|n| {
            n.as_deref()
                .map(|s| s.to_lowercase().contains(&search_lower))
                .unwrap_or(false)
        })
    };

    if let Some(idx) = exact.or_else(fold_case).or_else(substring) {
        let name = names[idx].as_deref().unwrap_or("unknown");
        tracing::debug!(
            "Matched audio device: {} (searched for: {})",
            name,
            device_name
        );
        return devices
            .into_iter()
            .nth(idx)
            .ok_or_else(|| AudioError::DeviceNotFound(device_name.to_string()));
    }

    let available: Vec<String> = names.into_iter().flatten().collect();
    let available = if available.is_empty() {
        "No audio input devices found.".to_string()
    } else {
        format!(
            "Available devices:\n{}",
            available
                .iter()
                .map(|n| format!("  - {}", n))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    Err(AudioError::DeviceNotFoundWithList {
        requested: device_name.to_string(),
        available,
    })
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    outputs: StreamOutputs,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let StreamOutputs {
        samples,
        chunk_tx,
        level_tx,
        activity_tx,
        energy_threshold,
        source_rate,
        target_rate,
        source_channels,
    } = outputs;

    let mut smoothed_rms = 0.0f32;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to f32 and mix to mono
                let mono_f32: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = if source_rate != target_rate {
                    resample(&mono_f32, source_rate, target_rate)
                } else {
                    mono_f32
                };

                let chunk_rms = crate::vad::rms(&resampled);
                smoothed_rms += LEVEL_SMOOTHING * (chunk_rms - smoothed_rms);
                let _ = level_tx.send((smoothed_rms * LEVEL_GAIN).clamp(0.0, 1.0));
                let _ = activity_tx.send(smoothed_rms >= energy_threshold);

                if let Ok(mut guard) = samples.lock() {
                    guard.extend_from_slice(&resampled);
                }

                // Slow subscribers lag and skip ahead rather than
                // blocking the audio callback
                let _ = chunk_tx.send(resampled);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}

/// Linear interpolation resampling
/// For better quality, consider using the `rubato` crate
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 48000 -> 16000 is 3:1 ratio, so 8 samples -> ~3 samples
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        // 8000 -> 16000 is 1:2 ratio, so 2 samples -> 4 samples
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        let samples: Vec<f32> = vec![];
        let result = resample(&samples, 48000, 16000);
        assert!(result.is_empty());
    }
}
