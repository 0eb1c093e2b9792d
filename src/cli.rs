// Command-line interface definitions for voxkey
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages. It only uses clap and std.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "voxkey")]
#[command(author, version, about = "Speech-to-text keyboard daemon for Linux")]
#[command(long_about = "
Voxkey is a speech-to-text keyboard daemon for Linux.
Record on demand, transcribe locally, and either type the text into the
focused window (direct mode) or collect it in a review buffer to paste
later (buffered mode).

SETUP:
  1. Install wtype (Wayland) or ydotool for typing support
  2. Run: voxkey setup (writes the default config, downloads a model)
  3. Run: voxkey (to start the daemon)
  4. Bind 'voxkey record toggle' to a key in your compositor

USAGE:
  Toggle recording with the keybinding, speak, toggle again (or pause and
  let endpointing finish the utterance). Text is typed at the cursor, or
  copied to the clipboard when no typing tool is available.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override speech model for this invocation (see: voxkey models list)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Override transcription language (ISO 639-1 code, or "auto")
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Override audio capture device name
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the dictation daemon (default if no command specified)
    Run,

    /// Control recording from external sources (compositor keybindings, scripts)
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Show daemon status (for Waybar/polybar integration)
    Status {
        /// Continuously output status changes (for Waybar exec)
        #[arg(long)]
        follow: bool,

        /// Output format: "text" (default) or "json" (for Waybar)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Inspect and manage the buffered-mode transcript buffer
    Buffer {
        #[command(subcommand)]
        action: BufferAction,
    },

    /// Show or change the output mode (direct or buffered)
    Mode {
        /// New mode; prints the current mode when omitted
        #[arg(value_parser = ["direct", "buffered"])]
        mode: Option<String>,
    },

    /// List, download, verify, or delete speech models
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Transcribe an audio file (WAV; resampled to 16kHz mono as needed)
    Transcribe {
        /// Path to audio file
        file: std::path::PathBuf,
    },

    /// Show current configuration
    Config {
        /// Write the commented default config file if none exists
        #[arg(long)]
        init: bool,

        /// Reset the config file to built-in defaults
        #[arg(long, conflicts_with = "init")]
        reset: bool,
    },

    /// First-run setup: write the default config and download the default model
    Setup {
        /// Skip the model download
        #[arg(long)]
        skip_model: bool,
    },

    /// Export or delete the daemon's log files
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },

    /// Privacy status and stored-data management
    Privacy {
        #[command(subcommand)]
        action: PrivacyAction,
    },
}

#[derive(Subcommand)]
pub enum RecordAction {
    /// Start recording (control socket, or SIGUSR1 fallback)
    Start,
    /// Stop recording and transcribe (control socket, or SIGUSR2 fallback)
    Stop,
    /// Toggle recording state
    Toggle,
}

#[derive(Subcommand)]
pub enum BufferAction {
    /// Print the buffered entries with timestamps
    Show,

    /// Append a text entry to the buffer
    Add {
        /// Text to append
        text: String,

        /// Where the entry came from
        #[arg(long, value_parser = ["voice", "ocr", "manual"], default_value = "manual")]
        source: String,
    },

    /// Discard all buffered entries
    Clear,

    /// Type out the whole buffer and clear it
    Paste,
}

#[derive(Subcommand)]
pub enum ModelsAction {
    /// List known models and their download state
    List,

    /// Download a model (the default model when ID is omitted)
    Download {
        /// Model ID (see: voxkey models list)
        id: Option<String>,

        /// Re-download even if the model is already installed
        #[arg(long)]
        force: bool,
    },

    /// Verify a downloaded model against its checksum
    Verify {
        /// Model ID; verifies every downloaded model when omitted
        id: Option<String>,
    },

    /// Delete a downloaded model file
    Delete {
        /// Model ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show whether the configured model is ready to use
    Status,
}

#[derive(Subcommand)]
pub enum LogsAction {
    /// Bundle the newest log files into a single export file
    Export {
        /// Destination file, or a directory to place a dated export in
        dest: std::path::PathBuf,
    },

    /// Delete all log files
    Clear,
}

#[derive(Subcommand)]
pub enum PrivacyAction {
    /// Show privacy flags and storage usage
    Status,

    /// Delete logs, cache, and temp files
    Wipe {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,

        /// Also delete downloaded models
        #[arg(long)]
        models: bool,
    },

    /// Turn every telemetry-class setting off and minimize file logging
    Max,
}
