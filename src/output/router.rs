//! The output router
//!
//! Single arbiter of where transcription text goes, given the current
//! output mode and whether a live sink is bound. Driven by one logical
//! stream of results from the active session, so it needs no locking.
//!
//! The routing rules:
//! - Direct mode with a sink: partials replace each other in place,
//!   finals are committed permanently.
//! - Direct mode without a sink: text goes to the clipboard, reported
//!   as a fallback outcome, never dropped silently.
//! - Buffered mode: finals append to the transcript buffer, partials
//!   are discarded and never buffered.
//!
//! Pasting the buffer is valid only in buffered mode. A successful
//! paste clears the buffer; a clipboard fallback keeps it so the user
//! can paste again once a target is available.

use super::clipboard::Clipboard;
use super::sink::OutputSink;
use crate::config::{OutputConfig, OutputMode};
use crate::error::OutputError;
use crate::transcribe::TranscriptionResult;
use chrono::{DateTime, Local};

/// Where a transcript buffer entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Voice,
    Ocr,
    Manual,
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntrySource::Voice => write!(f, "voice"),
            EntrySource::Ocr => write!(f, "ocr"),
            EntrySource::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for EntrySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "voice" => Ok(EntrySource::Voice),
            "ocr" => Ok(EntrySource::Ocr),
            "manual" => Ok(EntrySource::Manual),
            _ => Err(format!(
                "Invalid source: '{}'. Valid sources: voice, ocr, manual",
                s
            )),
        }
    }
}

/// One entry in the transcript buffer
///
/// Created per final voice result or manual addition, destroyed on
/// paste or clear. Never persisted.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub text: String,
    pub timestamp: DateTime<Local>,
    pub source: EntrySource,
    pub confidence: f32,
}

impl TranscriptEntry {
    fn voice(text: String, confidence: f32) -> Self {
        Self {
            text,
            timestamp: Local::now(),
            source: EntrySource::Voice,
            confidence,
        }
    }

    fn with_source(text: String, source: EntrySource) -> Self {
        Self {
            text,
            timestamp: Local::now(),
            source,
            confidence: 1.0,
        }
    }
}

/// What `process_transcription` did with a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Final text committed to the bound sink
    Committed { chars: usize },
    /// Partial text replaced in the bound sink
    ReplacedPartial { chars: usize },
    /// No sink was usable; text went to the clipboard
    CopiedToClipboard { chars: usize },
    /// Final appended to the transcript buffer
    Buffered { entries: usize },
    /// Partial arrived in buffered mode and was dropped
    DiscardedPartial,
}

/// What `paste_buffer` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteOutcome {
    /// Buffer committed to the sink and cleared
    Pasted { entries: usize, chars: usize },
    /// No sink was usable; text went to the clipboard, buffer kept
    CopiedToClipboard { chars: usize },
    /// Nothing to paste; no state was changed
    EmptyBuffer,
    /// Pasting is a buffered-mode operation
    DirectMode,
}

pub struct OutputRouter {
    mode: OutputMode,
    sink: Option<Box<dyn OutputSink>>,
    buffer: Vec<TranscriptEntry>,
    clipboard: Box<dyn Clipboard>,
    auto_copy: bool,
    timestamps_on_copy: bool,
}

impl OutputRouter {
    pub fn new(config: &OutputConfig, clipboard: Box<dyn Clipboard>) -> Self {
        Self {
            mode: config.mode,
            sink: None,
            buffer: Vec::new(),
            clipboard,
            auto_copy: config.auto_copy_to_clipboard,
            timestamps_on_copy: config.timestamps_on_copy,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Pure state update; takes effect on the next result. Never
    /// flushes or converts existing buffer contents.
    pub fn set_output_mode(&mut self, mode: OutputMode) {
        if self.mode != mode {
            tracing::info!("Output mode changed: {} -> {}", self.mode, mode);
        }
        self.mode = mode;
    }

    /// Rebind the live output target. `None` means direct-mode writes
    /// fall back to the clipboard.
    pub fn set_sink(&mut self, sink: Option<Box<dyn OutputSink>>) {
        self.sink = sink;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Characters of provisional text currently in the sink
    pub fn pending_partial_chars(&self) -> usize {
        self.sink
            .as_ref()
            .map(|s| s.pending_partial_chars())
            .unwrap_or(0)
    }

    /// Apply settings that can change at runtime
    pub fn apply_config(&mut self, config: &OutputConfig) {
        self.set_output_mode(config.mode);
        self.auto_copy = config.auto_copy_to_clipboard;
        self.timestamps_on_copy = config.timestamps_on_copy;
    }

    /// Route one recognition result according to the current mode
    pub async fn process_transcription(
        &mut self,
        result: &TranscriptionResult,
    ) -> Result<RouteOutcome, OutputError> {
        let chars = result.text.chars().count();

        match self.mode {
            OutputMode::Buffered => {
                if result.is_partial {
                    return Ok(RouteOutcome::DiscardedPartial);
                }
                self.buffer
                    .push(TranscriptEntry::voice(result.text.clone(), result.confidence));
                tracing::debug!(
                    "Buffered final ({} chars, {} entries)",
                    chars,
                    self.buffer.len()
                );
                Ok(RouteOutcome::Buffered {
                    entries: self.buffer.len(),
                })
            }
            OutputMode::Direct => match self.sink {
                Some(ref mut sink) => {
                    if result.is_partial {
                        sink.replace_partial_text(&result.text).await?;
                        Ok(RouteOutcome::ReplacedPartial { chars })
                    } else {
                        match sink.commit_text(&result.text).await {
                            Ok(()) => {
                                if self.auto_copy {
                                    if let Err(e) = self.clipboard.copy(&result.text).await {
                                        tracing::warn!("Auto-copy to clipboard failed: {}", e);
                                    }
                                }
                                Ok(RouteOutcome::Committed { chars })
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "Commit failed ({}), falling back to clipboard",
                                    e
                                );
                                self.clipboard.copy(&result.text).await?;
                                Ok(RouteOutcome::CopiedToClipboard { chars })
                            }
                        }
                    }
                }
                None => {
                    // Partials overwrite each other on the clipboard just
                    // as they would replace each other in a sink
                    self.clipboard.copy(&result.text).await?;
                    Ok(RouteOutcome::CopiedToClipboard { chars })
                }
            },
        }
    }

    /// Commit the buffered transcript to the sink and clear it
    pub async fn paste_buffer(&mut self) -> Result<PasteOutcome, OutputError> {
        if self.mode == OutputMode::Direct {
            return Ok(PasteOutcome::DirectMode);
        }
        if self.buffer.is_empty() {
            return Ok(PasteOutcome::EmptyBuffer);
        }

        let text = self.buffered_text();
        let chars = text.chars().count();

        match self.sink {
            Some(ref mut sink) => match sink.commit_text(&text).await {
                Ok(()) => {
                    let entries = self.buffer.len();
                    self.buffer.clear();
                    tracing::info!("Pasted {} buffered entries ({} chars)", entries, chars);
                    Ok(PasteOutcome::Pasted { entries, chars })
                }
                Err(e) => {
                    tracing::warn!("Paste failed ({}), falling back to clipboard", e);
                    self.copy_buffer_to_clipboard().await?;
                    Ok(PasteOutcome::CopiedToClipboard { chars })
                }
            },
            None => {
                self.copy_buffer_to_clipboard().await?;
                Ok(PasteOutcome::CopiedToClipboard { chars })
            }
        }
    }

    /// Manual insertion path, appended unconditionally regardless of mode
    pub fn add_to_buffer(&mut self, text: &str, source: EntrySource) -> usize {
        self.buffer
            .push(TranscriptEntry::with_source(text.to_string(), source));
        self.buffer.len()
    }

    /// Read-only concatenation, single-space separator
    pub fn buffered_text(&self) -> String {
        self.buffer
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// One line per entry with a wall-clock prefix, for clipboard export
    pub fn buffered_text_timestamped(&self) -> String {
        self.buffer
            .iter()
            .map(|e| format!("[{}] {}", e.timestamp.format("%H:%M:%S"), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear_buffer(&mut self) -> usize {
        let removed = self.buffer.len();
        self.buffer.clear();
        removed
    }

    pub fn entry_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.buffer
    }

    async fn copy_buffer_to_clipboard(&self) -> Result<(), OutputError> {
        let text = if self.timestamps_on_copy {
            self.buffered_text_timestamped()
        } else {
            self.buffered_text()
        };
        self.clipboard.copy(&text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemoryClipboard {
        copies: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl Clipboard for MemoryClipboard {
        async fn copy(&self, text: &str) -> Result<(), OutputError> {
            self.copies.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Models a host text field as a string, honoring the sink contract
    #[derive(Clone, Default)]
    struct FieldSink {
        field: Arc<Mutex<String>>,
        pending: usize,
        fail_commits: bool,
    }

    #[async_trait::async_trait]
    impl OutputSink for FieldSink {
        async fn commit_text(&mut self, text: &str) -> Result<(), OutputError> {
            if self.fail_commits {
                return Err(OutputError::AllMethodsFailed);
            }
            let mut field = self.field.lock().unwrap();
            truncate_chars(&mut field, self.pending);
            field.push_str(text);
            self.pending = 0;
            Ok(())
        }

        async fn replace_partial_text(&mut self, text: &str) -> Result<(), OutputError> {
            let mut field = self.field.lock().unwrap();
            truncate_chars(&mut field, self.pending);
            field.push_str(text);
            self.pending = text.chars().count();
            Ok(())
        }

        fn pending_partial_chars(&self) -> usize {
            self.pending
        }
    }

    fn truncate_chars(s: &mut String, count: usize) {
        for _ in 0..count {
            s.pop();
        }
    }

    fn router_with_sink(mode: OutputMode) -> (OutputRouter, Arc<Mutex<String>>, MemoryClipboard) {
        let clipboard = MemoryClipboard::default();
        let sink = FieldSink::default();
        let field = sink.field.clone();
        let config = OutputConfig {
            mode,
            ..OutputConfig::default()
        };
        let mut router = OutputRouter::new(&config, Box::new(clipboard.clone()));
        router.set_sink(Some(Box::new(sink)));
        (router, field, clipboard)
    }

    fn partial(text: &str) -> TranscriptionResult {
        TranscriptionResult::partial(text.to_string(), 0.5)
    }

    fn final_result(text: &str) -> TranscriptionResult {
        TranscriptionResult::final_result(text.to_string(), 0.9)
    }

    #[tokio::test]
    async fn test_direct_partials_replace_in_place() {
        let (mut router, field, _) = router_with_sink(OutputMode::Direct);

        router.process_transcription(&partial("he")).await.unwrap();
        assert_eq!(*field.lock().unwrap(), "he");

        router.process_transcription(&partial("hello wor")).await.unwrap();
        assert_eq!(*field.lock().unwrap(), "hello wor");

        let outcome = router
            .process_transcription(&final_result("hello world"))
            .await
            .unwrap();
        assert_eq!(outcome, RouteOutcome::Committed { chars: 11 });
        assert_eq!(*field.lock().unwrap(), "hello world");
        assert_eq!(router.pending_partial_chars(), 0);
    }

    #[tokio::test]
    async fn test_direct_commit_appends_after_earlier_text() {
        let (mut router, field, _) = router_with_sink(OutputMode::Direct);

        router.process_transcription(&final_result("first.")).await.unwrap();
        router.process_transcription(&partial("sec")).await.unwrap();
        router
            .process_transcription(&final_result(" second."))
            .await
            .unwrap();

        // The partial was removed, the earlier commit untouched
        assert_eq!(*field.lock().unwrap(), "first. second.");
    }

    #[tokio::test]
    async fn test_direct_without_sink_copies_to_clipboard() {
        let clipboard = MemoryClipboard::default();
        let config = OutputConfig::default();
        let mut router = OutputRouter::new(&config, Box::new(clipboard.clone()));

        let outcome = router
            .process_transcription(&final_result("hello"))
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::CopiedToClipboard { chars: 5 });
        assert_eq!(*clipboard.copies.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_direct_commit_failure_falls_back_to_clipboard() {
        let clipboard = MemoryClipboard::default();
        let config = OutputConfig::default();
        let mut router = OutputRouter::new(&config, Box::new(clipboard.clone()));
        router.set_sink(Some(Box::new(FieldSink {
            fail_commits: true,
            ..Default::default()
        })));

        let outcome = router
            .process_transcription(&final_result("hello"))
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::CopiedToClipboard { chars: 5 });
        assert_eq!(*clipboard.copies.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_buffered_discards_partials() {
        let (mut router, field, _) = router_with_sink(OutputMode::Buffered);

        let outcome = router.process_transcription(&partial("hel")).await.unwrap();
        assert_eq!(outcome, RouteOutcome::DiscardedPartial);
        assert_eq!(router.entry_count(), 0);
        assert!(router.buffered_text().is_empty());
        // Buffered mode never touches the sink
        assert!(field.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buffered_finals_append_entries() {
        let (mut router, _, _) = router_with_sink(OutputMode::Buffered);

        router.process_transcription(&final_result("hello")).await.unwrap();
        let outcome = router
            .process_transcription(&final_result("world"))
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::Buffered { entries: 2 });
        assert_eq!(router.buffered_text(), "hello world");
        let entries = router.entries();
        assert_eq!(entries[0].source, EntrySource::Voice);
        assert!((entries[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_paste_commits_and_clears() {
        let (mut router, field, _) = router_with_sink(OutputMode::Buffered);

        router.process_transcription(&final_result("hello")).await.unwrap();
        router.process_transcription(&final_result("world")).await.unwrap();

        let outcome = router.paste_buffer().await.unwrap();
        assert_eq!(
            outcome,
            PasteOutcome::Pasted {
                entries: 2,
                chars: 11
            }
        );
        assert_eq!(*field.lock().unwrap(), "hello world");
        assert_eq!(router.buffered_text(), "");
        assert_eq!(router.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_paste_empty_buffer_changes_nothing() {
        let (mut router, field, clipboard) = router_with_sink(OutputMode::Buffered);

        let outcome = router.paste_buffer().await.unwrap();

        assert_eq!(outcome, PasteOutcome::EmptyBuffer);
        assert_eq!(router.mode(), OutputMode::Buffered);
        assert!(router.has_sink());
        assert!(field.lock().unwrap().is_empty());
        assert!(clipboard.copies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paste_in_direct_mode_is_rejected() {
        let (mut router, _, _) = router_with_sink(OutputMode::Direct);
        router.add_to_buffer("stashed", EntrySource::Manual);

        let outcome = router.paste_buffer().await.unwrap();

        assert_eq!(outcome, PasteOutcome::DirectMode);
        assert_eq!(router.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_paste_without_sink_keeps_buffer() {
        let clipboard = MemoryClipboard::default();
        let config = OutputConfig {
            mode: OutputMode::Buffered,
            ..OutputConfig::default()
        };
        let mut router = OutputRouter::new(&config, Box::new(clipboard.clone()));
        router.process_transcription(&final_result("hello")).await.unwrap();

        let outcome = router.paste_buffer().await.unwrap();

        assert_eq!(outcome, PasteOutcome::CopiedToClipboard { chars: 5 });
        assert_eq!(*clipboard.copies.lock().unwrap(), vec!["hello"]);
        // Kept so the user can paste again once a target exists
        assert_eq!(router.buffered_text(), "hello");
    }

    #[tokio::test]
    async fn test_mode_switch_never_moves_buffered_entries() {
        let (mut router, field, _) = router_with_sink(OutputMode::Buffered);

        router.process_transcription(&final_result("early")).await.unwrap();
        router.set_output_mode(OutputMode::Direct);
        router.process_transcription(&final_result("late")).await.unwrap();

        // The buffered entry stays buffered; only the new final was typed
        assert_eq!(router.buffered_text(), "early");
        assert_eq!(*field.lock().unwrap(), "late");
    }

    #[tokio::test]
    async fn test_add_to_buffer_ignores_mode() {
        let (mut router, _, _) = router_with_sink(OutputMode::Direct);

        let count = router.add_to_buffer("from clipboard", EntrySource::Ocr);

        assert_eq!(count, 1);
        assert_eq!(router.entries()[0].source, EntrySource::Ocr);
        assert!((router.entries()[0].confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_auto_copy_after_commit() {
        let clipboard = MemoryClipboard::default();
        let sink = FieldSink::default();
        let config = OutputConfig {
            auto_copy_to_clipboard: true,
            ..OutputConfig::default()
        };
        let mut router = OutputRouter::new(&config, Box::new(clipboard.clone()));
        router.set_sink(Some(Box::new(sink)));

        let outcome = router
            .process_transcription(&final_result("hello"))
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::Committed { chars: 5 });
        assert_eq!(*clipboard.copies.lock().unwrap(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_timestamped_copy_format() {
        let (mut router, _, _) = router_with_sink(OutputMode::Buffered);
        router.add_to_buffer("hello", EntrySource::Manual);

        let text = router.buffered_text_timestamped();
        // "[HH:MM:SS] hello"
        assert!(text.starts_with('['));
        assert!(text.ends_with("] hello"));
        assert_eq!(text.len(), "[00:00:00] hello".len());
    }

    #[test]
    fn test_entry_source_round_trip() {
        for source in [EntrySource::Voice, EntrySource::Ocr, EntrySource::Manual] {
            let parsed: EntrySource = source.to_string().parse().unwrap();
            assert_eq!(parsed, source);
        }
        assert!("keyboard".parse::<EntrySource>().is_err());
    }

    #[tokio::test]
    async fn test_clear_buffer_reports_removed_count() {
        let (mut router, _, _) = router_with_sink(OutputMode::Buffered);
        router.add_to_buffer("a", EntrySource::Manual);
        router.add_to_buffer("b", EntrySource::Manual);

        assert_eq!(router.clear_buffer(), 2);
        assert_eq!(router.entry_count(), 0);
    }
}
