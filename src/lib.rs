//! Voxkey: speech-to-text keyboard daemon for Linux
//!
//! This library provides the core functionality for:
//! - Capturing audio via cpal (supports PipeWire, PulseAudio, ALSA)
//! - Energy-based voice activity detection and utterance endpointing
//! - Transcribing speech with whisper.cpp, a remote API, or a mock engine
//! - Routing text either straight into the focused window (direct mode)
//!   or into a review buffer for pasting later (buffered mode)
//! - Typing via wtype/ydotool with a wl-copy clipboard fallback
//! - Managing whisper model downloads with resume and checksum verification
//!
//! # Architecture
//!
//! ```text
//!                            ┌─────────────────────────────────────┐
//!                            │              Daemon                 │
//!                            └─────────────────────────────────────┘
//!                                            │
//!                   ┌────────────────────────┼────────────────────────┐
//!                   │                        │                        │
//!                   ▼                        ▼                        ▼
//!          ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//!          │   Control    │         │    Audio     │         │   Settings   │
//!          │ (socket/sig) │         │    (cpal)    │         │ (toml+watch) │
//!          └──────────────┘         └──────────────┘         └──────────────┘
//!                   │                        │
//!                   │  start / stop          │ sample chunks
//!                   ▼                        ▼
//!          ┌─────────────────────────────────────────────────────────────────┐
//!          │                         Dictation Flow                          │
//!          │  Start ──▶ Session.feed(chunks) ──▶ endpoint ──▶ Session.finish │
//!          └─────────────────────────────────────────────────────────────────┘
//!                         │ partial results                 │ final result
//!                         │                                 ▼
//!                         │                        ┌──────────────┐
//!                         │                        │     Text     │
//!                         │                        │  Processing  │
//!                         │                        └──────────────┘
//!                         │                                 │
//!                         ▼                                 ▼
//!                                   ┌──────────────┐
//!                                   │    Output    │
//!                                   │    Router    │
//!                                   └──────────────┘
//!                                  direct │ buffered
//!                          ┌──────────────┼──────────────┐
//!                          ▼              ▼              ▼
//!                  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!                  │  Injectors   │ │  Clipboard   │ │  Transcript  │
//!                  │wtype/ydotool │ │  (wl-copy)   │ │    Buffer    │
//!                  └──────────────┘ └──────────────┘ └──────────────┘
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod control;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod models;
pub mod notification;
pub mod output;
pub mod privacy;
pub mod settings;
pub mod state;
pub mod text;
pub mod transcribe;
pub mod vad;

pub use cli::{Cli, Commands, RecordAction};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, VoxkeyError};
