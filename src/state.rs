//! State machine for the voxkey daemon
//!
//! Defines the states for the dictation workflow:
//! Idle → Recording → Transcribing → Outputting → Idle
//!
//! In continuous dictation the daemon moves Recording → Transcribing →
//! Recording as utterances are finalized, returning to Idle only when
//! recording is stopped.

use std::time::Instant;

/// Application state
#[derive(Debug, Clone)]
pub enum State {
    /// Waiting for a start command or signal
    Idle,

    /// Capturing audio, streaming it to the speech engine
    Recording {
        /// When recording started
        started_at: Instant,
    },

    /// Finalizing an utterance
    Transcribing {
        /// Length of the audio being transcribed
        duration_secs: f32,
    },

    /// Transcription complete, routing text
    Outputting {
        /// Transcribed text
        text: String,
    },
}

impl State {
    /// Create a new idle state
    pub fn new() -> Self {
        State::Idle
    }

    /// Check if in idle state
    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    /// Check if in recording state
    pub fn is_recording(&self) -> bool {
        matches!(self, State::Recording { .. })
    }

    /// Get recording duration if currently recording
    pub fn recording_duration(&self) -> Option<std::time::Duration> {
        match self {
            State::Recording { started_at } => Some(started_at.elapsed()),
            _ => None,
        }
    }

    /// Short lowercase tag written to the state file for status bars
    pub fn as_tag(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Recording { .. } => "recording",
            State::Transcribing { .. } => "transcribing",
            State::Outputting { .. } => "outputting",
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::Recording { started_at } => {
                write!(f, "Recording ({:.1}s)", started_at.elapsed().as_secs_f32())
            }
            State::Transcribing { duration_secs } => {
                write!(f, "Transcribing ({:.1}s of audio)", duration_secs)
            }
            State::Outputting { text } => {
                // Use chars() to handle multi-byte UTF-8 characters
                let preview = if text.chars().count() > 20 {
                    format!("{}...", text.chars().take(20).collect::<String>())
                } else {
                    text.clone()
                };
                write!(f, "Outputting: {:?}", preview)
            }
        }
    }
}
