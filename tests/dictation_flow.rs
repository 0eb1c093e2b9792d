//! End-to-end dictation flow without audio hardware
//!
//! Drives the mock speech engine's streaming sessions into the output
//! router the same way the daemon does, and checks what would have been
//! typed into the focused window, buffered, or copied to the clipboard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use voxkey::config::{Config, EngineBackend, OutputConfig, OutputMode, TextConfig};
use voxkey::error::OutputError;
use voxkey::output::{
    Clipboard, EntrySource, OutputRouter, OutputSink, PasteOutcome, RouteOutcome,
};
use voxkey::text::TextProcessor;
use voxkey::transcribe::{create_engine, TranscriptionResult};

/// One partial step of mock-engine audio (half a second at 16kHz)
const STEP: usize = 8000;

/// Records every sink call so tests can assert the exact keystroke
/// sequence a real injector would have produced
#[derive(Clone, Default)]
struct RecordingSink {
    ops: Arc<Mutex<Vec<String>>>,
    pending: usize,
    fail_commits: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl OutputSink for RecordingSink {
    async fn commit_text(&mut self, text: &str) -> Result<(), OutputError> {
        if self.fail_commits.load(Ordering::Relaxed) {
            return Err(OutputError::AllMethodsFailed);
        }
        if self.pending > 0 {
            self.ops.lock().unwrap().push(format!("delete:{}", self.pending));
            self.pending = 0;
        }
        self.ops.lock().unwrap().push(format!("type:{text}"));
        Ok(())
    }

    async fn replace_partial_text(&mut self, text: &str) -> Result<(), OutputError> {
        if self.pending > 0 {
            self.ops.lock().unwrap().push(format!("delete:{}", self.pending));
        }
        self.ops.lock().unwrap().push(format!("type:{text}"));
        self.pending = text.chars().count();
        Ok(())
    }

    fn pending_partial_chars(&self) -> usize {
        self.pending
    }
}

#[derive(Clone, Default)]
struct MemoryClipboard {
    copied: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Clipboard for MemoryClipboard {
    async fn copy(&self, text: &str) -> Result<(), OutputError> {
        self.copied.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn mock_config() -> Config {
    let mut config = Config::default();
    config.engine.backend = EngineBackend::Mock;
    config
}

fn router_with_sink(mode: OutputMode) -> (OutputRouter, Arc<Mutex<Vec<String>>>, MemoryClipboard) {
    let mut output = OutputConfig::default();
    output.mode = mode;
    let clipboard = MemoryClipboard::default();
    let mut router = OutputRouter::new(&output, Box::new(clipboard.clone()));

    let sink = RecordingSink::default();
    let ops = sink.ops.clone();
    router.set_sink(Some(Box::new(sink)));
    (router, ops, clipboard)
}

/// Feed one session result through the router, panicking on errors the
/// daemon would only log
async fn route(router: &mut OutputRouter, result: &TranscriptionResult) -> RouteOutcome {
    router.process_transcription(result).await.unwrap()
}

#[tokio::test]
async fn test_direct_mode_types_partials_then_commits_final() {
    let engine = create_engine(&mock_config()).unwrap();
    let mut session = engine.start_session().unwrap();
    let (mut router, ops, _clipboard) = router_with_sink(OutputMode::Direct);

    // three partial steps, then finish the utterance like a stop would
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        for result in session.feed(&vec![0.0f32; STEP]).unwrap() {
            outcomes.push(route(&mut router, &result).await);
        }
    }
    let fin = session.finish().unwrap().unwrap();
    outcomes.push(route(&mut router, &fin).await);

    // the mock's first phrase is "Hello world"; each partial is "Hello"
    assert_eq!(
        outcomes,
        vec![
            RouteOutcome::ReplacedPartial { chars: 5 },
            RouteOutcome::ReplacedPartial { chars: 5 },
            RouteOutcome::ReplacedPartial { chars: 5 },
            RouteOutcome::Committed { chars: 11 },
        ]
    );
    assert_eq!(
        *ops.lock().unwrap(),
        vec![
            "type:Hello",
            "delete:5",
            "type:Hello",
            "delete:5",
            "type:Hello",
            "delete:5",
            "type:Hello world",
        ]
    );
    assert_eq!(router.pending_partial_chars(), 0);
}

#[tokio::test]
async fn test_empty_final_withdraws_typed_partial() {
    let (mut router, ops, _clipboard) = router_with_sink(OutputMode::Direct);

    route(&mut router, &TranscriptionResult::partial("Hello", 0.5)).await;
    assert_eq!(router.pending_partial_chars(), 5);

    // the engine heard nothing after all; the daemon routes an empty
    // final so the provisional text disappears from the field
    let outcome = route(&mut router, &TranscriptionResult::final_result("", 1.0)).await;
    assert_eq!(outcome, RouteOutcome::Committed { chars: 0 });
    assert_eq!(*ops.lock().unwrap(), vec!["type:Hello", "delete:5", "type:"]);
    assert_eq!(router.pending_partial_chars(), 0);
}

#[tokio::test]
async fn test_buffered_mode_discards_partials_and_collects_finals() {
    let engine = create_engine(&mock_config()).unwrap();
    let mut session = engine.start_session().unwrap();
    let (mut router, ops, _clipboard) = router_with_sink(OutputMode::Buffered);

    // two full utterances of audio; finals arrive from feed itself
    let mut discarded = 0;
    let mut buffered = 0;
    for _ in 0..8 {
        for result in session.feed(&vec![0.0f32; STEP]).unwrap() {
            match route(&mut router, &result).await {
                RouteOutcome::DiscardedPartial => discarded += 1,
                RouteOutcome::Buffered { entries } => {
                    buffered += 1;
                    assert_eq!(entries, buffered);
                }
                other => panic!("unexpected outcome in buffered mode: {:?}", other),
            }
        }
    }

    assert_eq!(discarded, 6);
    assert_eq!(buffered, 2);
    assert_eq!(router.entry_count(), 2);
    // nothing reached the focused window
    assert!(ops.lock().unwrap().is_empty());
    assert_eq!(
        router.buffered_text(),
        "Hello world This is a test transcription"
    );
}

#[tokio::test]
async fn test_paste_types_buffer_and_clears_it() {
    let (mut router, ops, _clipboard) = router_with_sink(OutputMode::Buffered);

    router.add_to_buffer("Hello world", EntrySource::Voice);
    router.add_to_buffer("second thought", EntrySource::Manual);

    let outcome = router.paste_buffer().await.unwrap();
    assert_eq!(
        outcome,
        PasteOutcome::Pasted {
            entries: 2,
            chars: "Hello world second thought".chars().count(),
        }
    );
    assert_eq!(
        *ops.lock().unwrap(),
        vec!["type:Hello world second thought"]
    );
    assert_eq!(router.entry_count(), 0);
}

#[tokio::test]
async fn test_paste_failure_copies_buffer_and_keeps_it() {
    let mut output = OutputConfig::default();
    output.mode = OutputMode::Buffered;
    let clipboard = MemoryClipboard::default();
    let mut router = OutputRouter::new(&output, Box::new(clipboard.clone()));

    let sink = RecordingSink::default();
    sink.fail_commits.store(true, Ordering::Relaxed);
    router.set_sink(Some(Box::new(sink)));

    router.add_to_buffer("precious words", EntrySource::Voice);
    let outcome = router.paste_buffer().await.unwrap();

    assert_eq!(
        outcome,
        PasteOutcome::CopiedToClipboard {
            chars: "precious words".chars().count(),
        }
    );
    // the buffer survives a failed paste so nothing is lost
    assert_eq!(router.entry_count(), 1);
    assert_eq!(*clipboard.copied.lock().unwrap(), vec!["precious words"]);
}

#[tokio::test]
async fn test_direct_mode_without_sink_copies_finals_to_clipboard() {
    let output = OutputConfig::default();
    let clipboard = MemoryClipboard::default();
    let mut router = OutputRouter::new(&output, Box::new(clipboard.clone()));

    let outcome = route(
        &mut router,
        &TranscriptionResult::final_result("no typist here", 0.9),
    )
    .await;

    assert_eq!(outcome, RouteOutcome::CopiedToClipboard { chars: 14 });
    assert_eq!(*clipboard.copied.lock().unwrap(), vec!["no typist here"]);
}

#[tokio::test]
async fn test_commit_failure_falls_back_to_clipboard() {
    let output = OutputConfig::default();
    let clipboard = MemoryClipboard::default();
    let mut router = OutputRouter::new(&output, Box::new(clipboard.clone()));

    let sink = RecordingSink::default();
    sink.fail_commits.store(true, Ordering::Relaxed);
    router.set_sink(Some(Box::new(sink)));

    let outcome = route(
        &mut router,
        &TranscriptionResult::final_result("went sideways", 0.9),
    )
    .await;

    assert_eq!(outcome, RouteOutcome::CopiedToClipboard { chars: 13 });
    assert_eq!(*clipboard.copied.lock().unwrap(), vec!["went sideways"]);
}

#[tokio::test]
async fn test_mode_switch_mid_session_reroutes_output() {
    let (mut router, ops, _clipboard) = router_with_sink(OutputMode::Direct);

    let first = route(
        &mut router,
        &TranscriptionResult::final_result("typed live", 0.9),
    )
    .await;
    assert_eq!(first, RouteOutcome::Committed { chars: 10 });

    router.set_output_mode(OutputMode::Buffered);
    let second = route(
        &mut router,
        &TranscriptionResult::final_result("held back", 0.9),
    )
    .await;
    assert_eq!(second, RouteOutcome::Buffered { entries: 1 });

    // only the direct-mode final reached the window
    assert_eq!(*ops.lock().unwrap(), vec!["type:typed live"]);
}

#[tokio::test]
async fn test_batch_transcription_through_text_processing() {
    let config = mock_config();
    let engine = create_engine(&config).unwrap();
    assert_eq!(engine.name(), "mock");

    // two seconds of audio picks the third canned phrase
    let result = engine.transcribe_buffer(&vec![0.1f32; 32000]).unwrap();
    assert!(result.is_final);

    let mut text_config = TextConfig::default();
    text_config.prefix = "> ".to_string();
    let processor = TextProcessor::new(&text_config);

    let (mut router, ops, _clipboard) = router_with_sink(OutputMode::Direct);
    let processed = processor.process(&result.text);
    let outcome = route(
        &mut router,
        &TranscriptionResult::final_result(&processed, result.confidence),
    )
    .await;

    let expected = "> The quick brown fox jumps over the lazy dog";
    assert_eq!(
        outcome,
        RouteOutcome::Committed {
            chars: expected.chars().count(),
        }
    );
    assert_eq!(*ops.lock().unwrap(), vec![format!("type:{expected}")]);
}

#[tokio::test]
async fn test_consecutive_utterances_type_in_order() {
    let engine = create_engine(&mock_config()).unwrap();
    let (mut router, ops, _clipboard) = router_with_sink(OutputMode::Direct);

    // the daemon opens a fresh session per utterance while recording
    // continues; committed text from earlier utterances must survive
    for _ in 0..2 {
        let mut session = engine.start_session().unwrap();
        session.feed(&vec![0.0f32; STEP]).unwrap();
        let fin = session.finish().unwrap().unwrap();
        route(&mut router, &fin).await;
    }

    let ops = ops.lock().unwrap();
    let commits: Vec<_> = ops.iter().filter(|op| op.starts_with("type:")).collect();
    assert_eq!(commits, vec!["type:Hello world", "type:Hello world"]);
    // no deletes between utterances: finals are permanent
    assert!(!ops.iter().any(|op| op.starts_with("delete:")));
}
