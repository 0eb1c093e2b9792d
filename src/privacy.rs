//! Privacy enforcement
//!
//! Keeps runtime behavior consistent with the privacy settings: maps
//! logging preferences onto the file logger, wipes stored data on
//! request, and prunes files past the retention window. All reporting
//! flags (telemetry, crash reports, analytics) default to off and
//! nothing in this codebase transmits data when they are off.

use crate::config::Config;
use crate::logging::FileLogger;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageSummary {
    pub logs_bytes: u64,
    pub cache_bytes: u64,
    pub models_bytes: u64,
}

impl StorageSummary {
    pub fn total(&self) -> u64 {
        self.logs_bytes + self.cache_bytes + self.models_bytes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

pub struct PrivacyManager {
    logs_dir: PathBuf,
    cache_dir: PathBuf,
    models_dir: PathBuf,
}

impl PrivacyManager {
    pub fn new(logs_dir: PathBuf, cache_dir: PathBuf, models_dir: PathBuf) -> Self {
        Self {
            logs_dir,
            cache_dir,
            models_dir,
        }
    }

    pub fn from_default_dirs() -> crate::error::Result<Self> {
        Ok(Self::new(
            Config::logs_dir()?,
            Config::cache_dir()?,
            Config::models_dir()?,
        ))
    }

    /// Push the logging-related settings onto the file logger
    pub fn apply(&self, config: &Config, logger: &FileLogger) {
        logger.set_verbosity(config.logging.level);
        logger.set_enabled(config.logging.file_enabled);
    }

    pub fn storage_summary(&self) -> StorageSummary {
        StorageSummary {
            logs_bytes: dir_size(&self.logs_dir),
            cache_bytes: dir_size(&self.cache_dir),
            models_bytes: dir_size(&self.models_dir),
        }
    }

    /// Delete logs and cached files, and optionally downloaded models.
    ///
    /// Failures on individual files are logged and skipped so one
    /// stubborn file cannot abort the wipe.
    pub fn clear_all_data(&self, include_models: bool) -> ClearSummary {
        let mut summary = ClearSummary::default();
        remove_dir_contents(&self.logs_dir, &mut summary);
        remove_dir_contents(&self.cache_dir, &mut summary);
        if include_models {
            remove_dir_contents(&self.models_dir, &mut summary);
        }
        summary
    }

    /// Delete log and cache files older than the retention window
    pub fn enforce_retention(&self, retention_days: u32) -> ClearSummary {
        let mut summary = ClearSummary::default();
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(retention_days) * 86400);
        remove_older_than(&self.logs_dir, cutoff, &mut summary);
        remove_older_than(&self.cache_dir, cutoff, &mut summary);
        summary
    }
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            size += dir_size(&entry.path());
        } else {
            size += meta.len();
        }
    }
    size
}

fn remove_dir_contents(path: &Path, summary: &mut ClearSummary) {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            remove_dir_contents(&entry_path, summary);
            let _ = std::fs::remove_dir(&entry_path);
        } else {
            match std::fs::remove_file(&entry_path) {
                Ok(()) => {
                    summary.files_removed += 1;
                    summary.bytes_freed += meta.len();
                }
                Err(e) => {
                    tracing::warn!("Could not remove {}: {e}", entry_path.display());
                }
            }
        }
    }
}

fn remove_older_than(path: &Path, cutoff: SystemTime, summary: &mut ClearSummary) {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            remove_older_than(&entry_path, cutoff, summary);
            continue;
        }
        let Ok(mtime) = meta.modified() else { continue };
        if mtime < cutoff {
            match std::fs::remove_file(&entry_path) {
                Ok(()) => {
                    summary.files_removed += 1;
                    summary.bytes_freed += meta.len();
                }
                Err(e) => {
                    tracing::warn!("Could not remove {}: {e}", entry_path.display());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PrivacyManager) {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let cache = dir.path().join("cache");
        let models = dir.path().join("models");
        for d in [&logs, &cache, &models] {
            std::fs::create_dir_all(d).unwrap();
        }
        let manager = PrivacyManager::new(logs, cache, models);
        (dir, manager)
    }

    #[test]
    fn test_storage_summary_sums_directories() {
        let (dir, manager) = setup();
        std::fs::write(dir.path().join("logs/voxkey-2025-01-01.log"), "12345").unwrap();
        std::fs::write(dir.path().join("cache/tmp.wav"), "1234567890").unwrap();
        std::fs::write(dir.path().join("models/ggml-tiny.bin"), "123").unwrap();

        let summary = manager.storage_summary();
        assert_eq!(summary.logs_bytes, 5);
        assert_eq!(summary.cache_bytes, 10);
        assert_eq!(summary.models_bytes, 3);
        assert_eq!(summary.total(), 18);
    }

    #[test]
    fn test_missing_directories_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PrivacyManager::new(
            dir.path().join("nope1"),
            dir.path().join("nope2"),
            dir.path().join("nope3"),
        );
        assert_eq!(manager.storage_summary().total(), 0);
        assert_eq!(manager.clear_all_data(true), ClearSummary::default());
    }

    #[test]
    fn test_clear_all_data_keeps_models_by_default() {
        let (dir, manager) = setup();
        std::fs::write(dir.path().join("logs/voxkey-2025-01-01.log"), "log").unwrap();
        std::fs::write(dir.path().join("cache/tmp.wav"), "cache").unwrap();
        std::fs::write(dir.path().join("models/ggml-small.bin"), "model").unwrap();

        let summary = manager.clear_all_data(false);
        assert_eq!(summary.files_removed, 2);
        assert_eq!(summary.bytes_freed, 8);
        assert!(dir.path().join("models/ggml-small.bin").exists());

        let summary = manager.clear_all_data(true);
        assert_eq!(summary.files_removed, 1);
        assert!(!dir.path().join("models/ggml-small.bin").exists());
    }

    #[test]
    fn test_clear_all_data_recurses_subdirectories() {
        let (dir, manager) = setup();
        std::fs::create_dir_all(dir.path().join("cache/sub")).unwrap();
        std::fs::write(dir.path().join("cache/sub/deep.bin"), "deep").unwrap();

        let summary = manager.clear_all_data(false);
        assert_eq!(summary.files_removed, 1);
        assert!(!dir.path().join("cache/sub").exists());
    }

    #[test]
    fn test_retention_removes_only_old_files() {
        let (dir, manager) = setup();
        std::fs::write(dir.path().join("logs/voxkey-2025-01-01.log"), "old").unwrap();

        // generous window keeps everything
        let summary = manager.enforce_retention(365);
        assert_eq!(summary.files_removed, 0);
        assert!(dir.path().join("logs/voxkey-2025-01-01.log").exists());

        // zero-day window removes anything written before now
        std::thread::sleep(Duration::from_millis(20));
        let summary = manager.enforce_retention(0);
        assert_eq!(summary.files_removed, 1);
        assert!(!dir.path().join("logs/voxkey-2025-01-01.log").exists());
    }
}
