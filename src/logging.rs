//! Rotating file logger
//!
//! Console diagnostics go through `tracing`; this module is the
//! persistent session log the user can export for bug reports. Records
//! are written in batches by a background task so the audio and output
//! paths never block on disk IO. Files rotate daily and by size, and
//! old files are pruned.
//!
//! Write failures are never propagated to callers. The writer warns on
//! the console and retries after a backoff.

use crate::config::Verbosity;
use crate::error::{Result, VoxkeyError};
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Keep at most this many log files after rotation
const MAX_LOG_FILES: usize = 5;

/// Rotate the current file once it grows past this size
const MAX_LOG_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Flush when this many records are pending, even before the tick
const MAX_BATCH: usize = 50;

/// Drop oldest pending records past this point (disk unavailable)
const MAX_PENDING: usize = 1000;

/// Wait this long after a write failure before trying again
const WRITE_BACKOFF: Duration = Duration::from_secs(5);

/// Number of newest files included in an export
const EXPORT_FILE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
            Severity::Debug => 4,
        }
    }
}

/// Whether a record at `severity` is written under `verbosity`
pub fn allows(verbosity: Verbosity, severity: Severity) -> bool {
    (verbosity as u8) >= severity.rank()
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub tag: String,
    pub message: String,
}

impl LogRecord {
    fn format_line(&self) -> String {
        format!(
            "{} [{:5}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.severity.label(),
            self.tag,
            self.message
        )
    }
}

enum LogCommand {
    Write(LogRecord),
    Flush(oneshot::Sender<()>),
}

struct Shared {
    verbosity: AtomicU8,
    enabled: AtomicBool,
}

/// Cheap cloneable handle to the background log writer
#[derive(Clone)]
pub struct FileLogger {
    tx: mpsc::UnboundedSender<LogCommand>,
    shared: Arc<Shared>,
}

impl FileLogger {
    /// Spawn the writer task. Requires a tokio runtime.
    pub fn spawn(logs_dir: PathBuf, verbosity: Verbosity, enabled: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            verbosity: AtomicU8::new(verbosity as u8),
            enabled: AtomicBool::new(enabled),
        });
        let writer = LogWriter::new(logs_dir);
        tokio::spawn(run_writer(writer, rx));
        Self { tx, shared }
    }

    /// Handle that drops everything, for contexts without file logging
    pub fn disabled() -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<LogCommand>();
        drop(rx);
        Self {
            tx,
            shared: Arc::new(Shared {
                verbosity: AtomicU8::new(Verbosity::Off as u8),
                enabled: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_verbosity(&self, verbosity: Verbosity) {
        self.shared
            .verbosity
            .store(verbosity as u8, Ordering::Relaxed);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn verbosity(&self) -> Verbosity {
        match self.shared.verbosity.load(Ordering::Relaxed) {
            0 => Verbosity::Off,
            1 => Verbosity::ErrorOnly,
            2 => Verbosity::Minimal,
            3 => Verbosity::Standard,
            _ => Verbosity::Extensive,
        }
    }

    fn allows_now(&self, severity: Severity) -> bool {
        self.shared.enabled.load(Ordering::Relaxed) && allows(self.verbosity(), severity)
    }

    /// Queue a record. Filtered records cost one atomic load and no
    /// allocation, so callers can log unconditionally.
    pub fn log(&self, severity: Severity, tag: &str, message: impl Into<String>) {
        if !self.allows_now(severity) {
            return;
        }
        let record = LogRecord {
            timestamp: Local::now(),
            severity,
            tag: tag.to_string(),
            message: message.into(),
        };
        let _ = self.tx.send(LogCommand::Write(record));
    }

    pub fn error(&self, tag: &str, message: impl Into<String>) {
        self.log(Severity::Error, tag, message);
    }

    pub fn warn(&self, tag: &str, message: impl Into<String>) {
        self.log(Severity::Warning, tag, message);
    }

    pub fn info(&self, tag: &str, message: impl Into<String>) {
        self.log(Severity::Info, tag, message);
    }

    pub fn debug(&self, tag: &str, message: impl Into<String>) {
        self.log(Severity::Debug, tag, message);
    }

    /// Wait until everything queued so far has been written
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(LogCommand::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_writer(mut writer: LogWriter, mut rx: mpsc::UnboundedReceiver<LogCommand>) {
    let mut pending: VecDeque<LogRecord> = VecDeque::new();
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut backoff_until: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(LogCommand::Write(record)) => {
                    if pending.len() >= MAX_PENDING {
                        pending.pop_front();
                    }
                    pending.push_back(record);
                    if pending.len() >= MAX_BATCH {
                        try_flush(&mut writer, &mut pending, &mut backoff_until);
                    }
                }
                Some(LogCommand::Flush(reply)) => {
                    // ignore backoff for explicit flushes (daemon shutdown)
                    backoff_until = None;
                    try_flush(&mut writer, &mut pending, &mut backoff_until);
                    let _ = reply.send(());
                }
                None => {
                    backoff_until = None;
                    try_flush(&mut writer, &mut pending, &mut backoff_until);
                    break;
                }
            },
            _ = tick.tick() => {
                if !pending.is_empty() {
                    try_flush(&mut writer, &mut pending, &mut backoff_until);
                }
            }
        }
    }
}

fn try_flush(
    writer: &mut LogWriter,
    pending: &mut VecDeque<LogRecord>,
    backoff_until: &mut Option<tokio::time::Instant>,
) {
    if let Some(until) = *backoff_until {
        if tokio::time::Instant::now() < until {
            return;
        }
        *backoff_until = None;
    }
    if pending.is_empty() {
        return;
    }
    let batch: Vec<LogRecord> = pending.iter().cloned().collect();
    match writer.write_batch(&batch) {
        Ok(()) => pending.clear(),
        Err(e) => {
            tracing::warn!("Log write failed, retrying in {}s: {e}", WRITE_BACKOFF.as_secs());
            *backoff_until = Some(tokio::time::Instant::now() + WRITE_BACKOFF);
        }
    }
}

/// Synchronous log file management: writing, rotation, pruning, export.
/// The daemon drives this through [`FileLogger`]; CLI subcommands use
/// it directly.
pub struct LogWriter {
    dir: PathBuf,
    max_file_bytes: u64,
    max_files: usize,
}

impl LogWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            max_file_bytes: MAX_LOG_SIZE_BYTES,
            max_files: MAX_LOG_FILES,
        }
    }

    #[cfg(test)]
    fn with_limits(dir: PathBuf, max_file_bytes: u64, max_files: usize) -> Self {
        Self {
            dir,
            max_file_bytes,
            max_files,
        }
    }

    fn current_path(&self, now: DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("voxkey-{}.log", now.format("%Y-%m-%d")))
    }

    /// Append a batch to today's file, rotating first if it is full
    pub fn write_batch(&mut self, records: &[LogRecord]) -> std::io::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.current_path(Local::now());

        if let Ok(meta) = std::fs::metadata(&path) {
            if meta.len() >= self.max_file_bytes {
                self.rotate(&path)?;
            }
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut out = String::new();
        for record in records {
            out.push_str(&record.format_line());
            out.push('\n');
        }
        file.write_all(out.as_bytes())?;
        self.cleanup()?;
        Ok(())
    }

    /// Rename a full file aside with a time suffix, e.g.
    /// voxkey-2025-01-15.log -> voxkey-2025-01-15-143205.log
    fn rotate(&self, path: &Path) -> std::io::Result<()> {
        let suffix = Local::now().format("%H%M%S");
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("voxkey");
        let rotated = self.dir.join(format!("{stem}-{suffix}.log"));
        std::fs::rename(path, rotated)
    }

    /// Delete oldest files beyond the retention count. Returns how many
    /// were removed.
    pub fn cleanup(&self) -> std::io::Result<usize> {
        let mut files = self.log_files()?;
        if files.len() <= self.max_files {
            return Ok(0);
        }
        // newest first; everything past max_files goes
        let excess = files.split_off(self.max_files);
        let mut removed = 0;
        for (path, _) in excess {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Log files sorted newest first by modification time
    pub fn log_files(&self) -> std::io::Result<Vec<(PathBuf, std::time::SystemTime)>> {
        let mut files = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if !name.starts_with("voxkey-") || !name.ends_with(".log") {
                continue;
            }
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            files.push((path, mtime));
        }
        files.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(files)
    }

    /// Concatenate the newest files into a single export with a header.
    /// Returns the destination path.
    pub fn export(&self, dest: &Path) -> Result<PathBuf> {
        let files = self.log_files().map_err(VoxkeyError::Io)?;
        if files.is_empty() {
            return Err(VoxkeyError::Config(
                "No log files to export. Enable file logging first.".to_string(),
            ));
        }

        let mut out = String::new();
        out.push_str("# voxkey log export\n");
        out.push_str(&format!(
            "# generated: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("# version: {}\n", env!("CARGO_PKG_VERSION")));

        // newest EXPORT_FILE_COUNT files, concatenated oldest first so
        // the export reads chronologically
        let selected: Vec<_> = files.iter().take(EXPORT_FILE_COUNT).collect();
        for (path, _) in selected.iter().rev() {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown");
            out.push_str(&format!("\n# --- {name} ---\n"));
            let content = std::fs::read_to_string(path).map_err(VoxkeyError::Io)?;
            out.push_str(&content);
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(VoxkeyError::Io)?;
        }
        std::fs::write(dest, out).map_err(VoxkeyError::Io)?;
        Ok(dest.to_path_buf())
    }

    /// Delete every log file. Returns bytes freed.
    pub fn clear(&self) -> Result<u64> {
        let files = self.log_files().map_err(VoxkeyError::Io)?;
        let mut freed = 0u64;
        for (path, _) in files {
            if let Ok(meta) = std::fs::metadata(&path) {
                freed += meta.len();
            }
            std::fs::remove_file(&path).map_err(VoxkeyError::Io)?;
        }
        Ok(freed)
    }

    /// Combined size of all log files in bytes
    pub fn total_size(&self) -> u64 {
        self.log_files()
            .map(|files| {
                files
                    .iter()
                    .filter_map(|(p, _)| std::fs::metadata(p).ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}
