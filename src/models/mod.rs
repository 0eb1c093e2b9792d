//! Model repository: download, verify, delete
//!
//! Downloads stream into a `.part` file next to the final location and
//! resume from wherever the last attempt stopped, using an HTTP Range
//! request. The SHA-1 checksum is verified before the file is renamed
//! into place, so a model is never usable until its bytes are known
//! good. A checksum mismatch deletes the file; the user retries
//! explicitly.
//!
//! Everything here is blocking I/O. Async callers go through
//! `spawn_blocking`, same as transcription.

pub mod catalog;

pub use catalog::{find, ModelSpec};

use crate::error::ModelError;
use sha1::{Digest, Sha1};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Copy buffer for downloads and hashing
const CHUNK_SIZE: usize = 8192;

/// Minimum interval between progress reports
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelState {
    NotDownloaded,
    Downloading,
    Verifying,
    Downloaded,
    Error,
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ModelState::NotDownloaded => "not-downloaded",
            ModelState::Downloading => "downloading",
            ModelState::Verifying => "verifying",
            ModelState::Downloaded => "downloaded",
            ModelState::Error => "error",
        };
        f.pad(tag)
    }
}

/// Point-in-time view of one catalog model
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStatus {
    pub model_id: String,
    pub state: ModelState,
    /// 0.0 to 1.0
    pub progress: f32,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub error: Option<String>,
}

impl ModelStatus {
    fn new(id: &str, state: ModelState) -> Self {
        Self {
            model_id: id.to_string(),
            state,
            progress: 0.0,
            bytes_downloaded: 0,
            total_bytes: 0,
            error: None,
        }
    }

    fn not_downloaded(id: &str) -> Self {
        Self::new(id, ModelState::NotDownloaded)
    }

    fn downloaded(id: &str, bytes: u64) -> Self {
        Self {
            progress: 1.0,
            bytes_downloaded: bytes,
            total_bytes: bytes,
            ..Self::new(id, ModelState::Downloaded)
        }
    }

    fn downloading(id: &str, bytes: u64, total: u64) -> Self {
        Self {
            progress: fraction(bytes, total),
            bytes_downloaded: bytes,
            total_bytes: total,
            ..Self::new(id, ModelState::Downloading)
        }
    }

    fn verifying(id: &str, bytes: u64) -> Self {
        Self {
            progress: 1.0,
            bytes_downloaded: bytes,
            total_bytes: bytes,
            ..Self::new(id, ModelState::Verifying)
        }
    }

    pub fn error(id: &str, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(id, ModelState::Error)
        }
    }
}

fn fraction(bytes: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    ((bytes as f64 / total as f64) as f32).clamp(0.0, 1.0)
}

/// Progress observer for downloads
pub type ProgressFn<'a> = &'a mut dyn FnMut(&ModelStatus);

pub struct ModelRepository {
    models_dir: PathBuf,
}

impl ModelRepository {
    pub fn new(models_dir: PathBuf) -> Self {
        Self { models_dir }
    }

    pub fn from_config() -> crate::error::Result<Self> {
        Ok(Self::new(crate::config::Config::models_dir()?))
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    fn spec(&self, id: &str) -> Result<&'static ModelSpec, ModelError> {
        catalog::find(id).ok_or_else(|| ModelError::UnknownModel(id.to_string()))
    }

    fn final_path(&self, spec: &ModelSpec) -> PathBuf {
        self.models_dir.join(spec.filename)
    }

    fn partial_path(&self, spec: &ModelSpec) -> PathBuf {
        self.models_dir.join(format!("{}.part", spec.filename))
    }

    /// Disk-derived status for one model
    pub fn status(&self, id: &str) -> Result<ModelStatus, ModelError> {
        let spec = self.spec(id)?;
        let final_path = self.final_path(spec);
        if let Ok(meta) = fs::metadata(&final_path) {
            return Ok(ModelStatus::downloaded(id, meta.len()));
        }
        let partial = self.partial_path(spec);
        if let Ok(meta) = fs::metadata(&partial) {
            // Paused download; the catalog size is close enough for a
            // progress estimate until the next attempt learns the real
            // total
            let estimated = u64::from(spec.size_mb) * 1024 * 1024;
            return Ok(ModelStatus::downloading(id, meta.len(), estimated));
        }
        Ok(ModelStatus::not_downloaded(id))
    }

    pub fn status_all(&self) -> Vec<ModelStatus> {
        catalog::all()
            .iter()
            .map(|m| {
                self.status(m.id)
                    .unwrap_or_else(|e| ModelStatus::error(m.id, e.to_string()))
            })
            .collect()
    }

    /// Download a model, resuming any earlier partial transfer
    ///
    /// `force` re-downloads even if the file is already installed. The
    /// checksum is verified before the file is moved into place.
    pub fn download(
        &self,
        id: &str,
        force: bool,
        on_progress: ProgressFn<'_>,
    ) -> Result<ModelStatus, ModelError> {
        let spec = self.spec(id)?;
        let final_path = self.final_path(spec);
        let partial = self.partial_path(spec);

        if final_path.exists() {
            if !force {
                let bytes = fs::metadata(&final_path)?.len();
                tracing::debug!("Model '{}' already downloaded", id);
                return Ok(ModelStatus::downloaded(id, bytes));
            }
            fs::remove_file(&final_path)?;
        }
        fs::create_dir_all(&self.models_dir)?;
        if force && partial.exists() {
            fs::remove_file(&partial)?;
        }

        let existing = fs::metadata(&partial).map(|m| m.len()).unwrap_or(0);
        tracing::info!(
            "Downloading model '{}' from {} (resuming at {} bytes)",
            id,
            spec.url,
            existing
        );

        self.fetch(spec, &partial, existing, on_progress)?;

        on_progress(&ModelStatus::verifying(
            id,
            fs::metadata(&partial).map(|m| m.len()).unwrap_or(0),
        ));
        let actual = sha1_hex_file(&partial)?;
        if actual != spec.sha1 {
            // Never leave a bad file where a resume would pick it up
            let _ = fs::remove_file(&partial);
            tracing::warn!(
                "Checksum mismatch for '{}': expected {}, got {}",
                id,
                spec.sha1,
                actual
            );
            return Err(ModelError::ChecksumMismatch {
                model_id: id.to_string(),
                expected: spec.sha1.to_string(),
                actual,
            });
        }

        fs::rename(&partial, &final_path)?;
        let bytes = fs::metadata(&final_path)?.len();
        let status = ModelStatus::downloaded(id, bytes);
        on_progress(&status);
        tracing::info!("Model '{}' downloaded and verified ({} bytes)", id, bytes);
        Ok(status)
    }

    /// Stream the remote file into the partial path
    fn fetch(
        &self,
        spec: &ModelSpec,
        partial: &Path,
        existing: u64,
        on_progress: ProgressFn<'_>,
    ) -> Result<(), ModelError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();

        let mut request = agent.get(spec.url);
        if existing > 0 {
            request = request.set("Range", &format!("bytes={}-", existing));
        }

        let response = match request.call() {
            Ok(resp) => resp,
            // The whole file is already in the partial; jump to verify
            Err(ureq::Error::Status(416, _)) if existing > 0 => {
                tracing::debug!("Server reports range already satisfied, verifying");
                return Ok(());
            }
            Err(ureq::Error::Status(code, resp)) => {
                let mut message = resp.into_string().unwrap_or_default();
                message.truncate(200);
                return Err(ModelError::Http {
                    status: code,
                    message,
                });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(ModelError::DownloadFailed(t.to_string()));
            }
        };

        // 206 appends to the partial, 200 means the server ignored the
        // range (or there was none) and we start over
        let (mut file, mut bytes_done, total) = match response.status() {
            206 => {
                let total = content_total(&response, existing);
                let file = fs::OpenOptions::new().append(true).open(partial)?;
                (file, existing, total)
            }
            200 => {
                let total = content_total(&response, 0);
                let file = fs::File::create(partial)?;
                (file, 0u64, total)
            }
            code => {
                return Err(ModelError::Http {
                    status: code,
                    message: "unexpected response".to_string(),
                });
            }
        };

        let mut reader = response.into_reader();
        let mut buf = [0u8; CHUNK_SIZE];
        let mut last_report = Instant::now();
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| ModelError::DownloadFailed(e.to_string()))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            bytes_done += n as u64;

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                on_progress(&ModelStatus::downloading(spec.id, bytes_done, total));
                last_report = Instant::now();
            }
        }
        file.flush()?;
        on_progress(&ModelStatus::downloading(spec.id, bytes_done, total));
        Ok(())
    }

    /// Re-hash an installed model; a mismatch deletes it
    pub fn verify(&self, id: &str) -> Result<ModelStatus, ModelError> {
        let spec = self.spec(id)?;
        let path = self.final_path(spec);
        if !path.exists() {
            return Err(ModelError::NotDownloaded(id.to_string()));
        }

        let actual = sha1_hex_file(&path)?;
        if actual != spec.sha1 {
            let _ = fs::remove_file(&path);
            return Err(ModelError::ChecksumMismatch {
                model_id: id.to_string(),
                expected: spec.sha1.to_string(),
                actual,
            });
        }

        let bytes = fs::metadata(&path)?.len();
        Ok(ModelStatus::downloaded(id, bytes))
    }

    /// Remove the installed file and any partial download
    ///
    /// Returns the bytes freed.
    pub fn delete(&self, id: &str) -> Result<u64, ModelError> {
        let spec = self.spec(id)?;
        let mut freed = 0u64;
        for path in [self.final_path(spec), self.partial_path(spec)] {
            if let Ok(meta) = fs::metadata(&path) {
                freed += meta.len();
                fs::remove_file(&path)?;
            }
        }
        tracing::info!("Deleted model '{}' ({} bytes)", id, freed);
        Ok(freed)
    }

    /// Total bytes under the models directory, partials included
    pub fn storage_used(&self) -> u64 {
        let entries = match fs::read_dir(&self.models_dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        entries
            .flatten()
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum()
    }
}

/// Parse the total size from Content-Range, falling back to
/// Content-Length plus whatever was already on disk
fn content_total(response: &ureq::Response, existing: u64) -> u64 {
    if let Some(range) = response.header("Content-Range") {
        // "bytes 1000-349999999/350000000"
        if let Some(total) = range.rsplit('/').next().and_then(|t| t.parse().ok()) {
            return total;
        }
    }
    response
        .header("Content-Length")
        .and_then(|l| l.parse::<u64>().ok())
        .map(|len| existing + len)
        .unwrap_or(0)
}

/// SHA-1 of a file as lowercase hex
fn sha1_hex_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}
