//! Live settings store
//!
//! Wraps [`Config`] with change notification and atomic persistence.
//! The daemon and CLI share one store; subscribers see every committed
//! change through a watch channel, and an optional file watcher picks
//! up external edits to config.toml.

use crate::config::{Config, Verbosity};
use crate::error::{Result, VoxkeyError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<Config>,
}

impl SettingsStore {
    /// Create a store from an already-loaded config, without touching disk
    /// until the first update
    pub fn with_config(path: PathBuf, config: Config) -> Self {
        let (tx, _) = watch::channel(config);
        Self { path, tx }
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> Config {
        self.tx.borrow().clone()
    }

    /// Receiver that yields a new value after every committed change
    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Apply a mutation, clamp it, persist it, then notify subscribers
    ///
    /// Subscribers only see the change after the file write succeeded,
    /// so a crash cannot leave disk and memory disagreeing.
    pub fn update<F>(&self, mutate: F) -> Result<Config>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.get();
        mutate(&mut config);
        config.normalize();
        self.persist(&config)?;
        self.tx.send_replace(config.clone());
        Ok(config)
    }

    /// Replace everything with built-in defaults
    pub fn reset_to_defaults(&self) -> Result<Config> {
        let config = Config::default();
        self.persist(&config)?;
        self.tx.send_replace(config.clone());
        Ok(config)
    }

    /// One-shot privacy hardening: reporting off, logging to errors only,
    /// shortest retention
    pub fn apply_maximum_privacy(&self) -> Result<Config> {
        self.update(|c| {
            c.privacy.telemetry = false;
            c.privacy.crash_reports = false;
            c.privacy.analytics = false;
            c.privacy.retention_days = 1;
            c.logging.level = Verbosity::ErrorOnly;
            c.logging.file_enabled = false;
        })
    }

    /// Re-read the config file, notifying subscribers if it changed.
    /// Returns whether anything changed.
    pub fn reload(&self) -> Result<bool> {
        let fresh = Config::load(Some(self.path.clone()))?;
        let changed = self.tx.send_if_modified(|current| {
            if *current == fresh {
                false
            } else {
                *current = fresh.clone();
                true
            }
        });
        Ok(changed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write via a temp file in the same directory, then rename over the
    /// target so readers never observe a half-written config
    fn persist(&self, config: &Config) -> Result<()> {
        let toml = config.to_toml()?;
        let parent = self
            .path
            .parent()
            .ok_or_else(|| VoxkeyError::Config("Config path has no parent".to_string()))?;
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(toml.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| VoxkeyError::Io(e.error))?;
        Ok(())
    }
}

/// Watch the config file for external edits and reload the store.
///
/// Watches the parent directory because editors typically replace the
/// file (write temp + rename), which would invalidate a file watch.
pub fn spawn_config_watcher(store: Arc<SettingsStore>) -> Result<std::thread::JoinHandle<()>> {
    use notify::{RecursiveMode, Watcher};

    let path = store.path().to_path_buf();
    let parent = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let handle = std::thread::Builder::new()
        .name("voxkey-config-watch".to_string())
        .spawn(move || {
            let (tx, rx) = std::sync::mpsc::channel();
            let mut watcher = match notify::recommended_watcher(move |res| {
                let _ = tx.send(res);
            }) {
                Ok(w) => w,
                Err(e) => {
                    tracing::warn!("Config watcher unavailable: {e}");
                    return;
                }
            };
            if let Err(e) = watcher.watch(&parent, RecursiveMode::NonRecursive) {
                tracing::warn!("Failed to watch {}: {e}", parent.display());
                return;
            }

            loop {
                match rx.recv() {
                    Ok(Ok(event)) => {
                        if !event.paths.iter().any(|p| p == &path) {
                            continue;
                        }
                        // editors emit several events per save
                        std::thread::sleep(Duration::from_millis(100));
                        while rx.try_recv().is_ok() {}
                        match store.reload() {
                            Ok(true) => {
                                tracing::info!("Reloaded config from {}", path.display())
                            }
                            Ok(false) => {}
                            Err(e) => tracing::warn!("Failed to reload config: {e}"),
                        }
                    }
                    Ok(Err(e)) => tracing::warn!("Config watcher error: {e}"),
                    Err(_) => break,
                }
            }
        })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputMode;

    fn temp_store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let store = SettingsStore::with_config(path, Config::default());
        (dir, store)
    }

    #[test]
    fn test_update_persists_and_notifies() {
        let (_dir, store) = temp_store();
        let mut rx = store.subscribe();

        store
            .update(|c| c.output.mode = OutputMode::Buffered)
            .unwrap();

        assert_eq!(store.get().output.mode, OutputMode::Buffered);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().output.mode, OutputMode::Buffered);

        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        let parsed = Config::from_toml(&on_disk).unwrap();
        assert_eq!(parsed.output.mode, OutputMode::Buffered);
    }

    #[test]
    fn test_update_clamps_values() {
        let (_dir, store) = temp_store();
        let config = store.update(|c| c.vad.threshold = 9.0).unwrap();
        assert_eq!(config.vad.threshold, 1.0);
    }

    #[test]
    fn test_reset_to_defaults() {
        let (_dir, store) = temp_store();
        store.update(|c| c.engine.model = "medium".to_string()).unwrap();
        let config = store.reset_to_defaults().unwrap();
        assert_eq!(config.engine.model, "small");
        assert_eq!(store.get().engine.model, "small");
    }

    #[test]
    fn test_apply_maximum_privacy() {
        let (_dir, store) = temp_store();
        store
            .update(|c| {
                c.privacy.telemetry = true;
                c.privacy.analytics = true;
                c.logging.level = Verbosity::Extensive;
                c.logging.file_enabled = true;
                c.privacy.retention_days = 90;
            })
            .unwrap();

        let config = store.apply_maximum_privacy().unwrap();
        assert!(!config.privacy.telemetry);
        assert!(!config.privacy.crash_reports);
        assert!(!config.privacy.analytics);
        assert_eq!(config.privacy.retention_days, 1);
        assert_eq!(config.logging.level, Verbosity::ErrorOnly);
        assert!(!config.logging.file_enabled);
    }

    #[test]
    fn test_reload_detects_changes() {
        let (_dir, store) = temp_store();
        store.update(|c| c.engine.model = "base".to_string()).unwrap();

        // no change on disk
        assert!(!store.reload().unwrap());

        let mut external = store.get();
        external.engine.model = "tiny".to_string();
        std::fs::write(store.path(), external.to_toml().unwrap()).unwrap();

        assert!(store.reload().unwrap());
        assert_eq!(store.get().engine.model, "tiny");
    }
}
