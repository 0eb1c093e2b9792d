//! Text output: routing, sinks, and keystroke injection
//!
//! The [`router::OutputRouter`] is the single arbiter of where
//! transcription text goes. In direct mode text is typed into the
//! focused window through an [`OutputSink`]; in buffered mode final
//! results collect in a transcript buffer until pasted. When no sink is
//! usable the text goes to the clipboard instead, reported as a
//! fallback rather than an error.
//!
//! Injector fallback chain for direct output:
//! 1. wtype - Wayland-native, best Unicode/CJK support, no daemon needed
//! 2. ydotool - works on X11/Wayland/TTY, requires ydotoold

pub mod clipboard;
pub mod router;
pub mod sink;
pub mod wtype;
pub mod ydotool;

pub use clipboard::{Clipboard, WlClipboard};
pub use router::{EntrySource, OutputRouter, PasteOutcome, RouteOutcome, TranscriptEntry};
pub use sink::{InjectorSink, OutputSink};

use crate::config::OutputConfig;
use crate::error::OutputError;

/// A way to synthesize keyboard input into the focused window
#[async_trait::async_trait]
pub trait TextInjector: Send + Sync {
    /// Type the text as keyboard input
    async fn type_text(&self, text: &str) -> Result<(), OutputError>;

    /// Press backspace `count` times
    async fn delete_chars(&self, count: usize) -> Result<(), OutputError>;

    /// Check if this injector can be used right now
    async fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Build the injector fallback chain in preference order
pub fn create_injectors(config: &OutputConfig) -> Vec<Box<dyn TextInjector>> {
    vec![
        Box::new(wtype::WtypeInjector::new(config.type_delay_ms)),
        Box::new(ydotool::YdotoolInjector::new(config.type_delay_ms)),
    ]
}
