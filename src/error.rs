//! Error types for voxkey
//!
//! Error messages include actionable fix instructions where possible,
//! since most failures are environment issues the user can resolve
//! (missing tools, missing models, audio device problems).

use thiserror::Error;

/// Top-level error type for voxkey operations
#[derive(Error, Debug)]
pub enum VoxkeyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Control socket error: {0}")]
    Control(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio capture errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to connect to audio system: {0}")]
    Connection(String),

    #[error(
        "Audio device not found: {0}\n\
        List available devices with: pactl list sources short"
    )]
    DeviceNotFound(String),

    #[error("Audio device not found: {requested}\n{available}")]
    DeviceNotFoundWithList { requested: String, available: String },

    #[error("Audio capture timed out after {0} seconds")]
    Timeout(u32),

    #[error("Audio stream error: {0}")]
    StreamError(String),
}

/// Transcription errors
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error(
        "Model file not found: {0}\n\
        Download it with: voxkey models download <id>\n\
        List available models with: voxkey models list"
    )]
    ModelNotFound(String),

    #[error("Failed to initialize speech engine: {0}")]
    InitFailed(String),

    #[error("Transcription failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid audio format: {0}")]
    AudioFormat(String),

    #[error("Engine configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Remote transcription service error (HTTP {status}): {message}")]
    RemoteError { status: u16, message: String },
}

/// Text output errors
#[derive(Error, Debug)]
pub enum OutputError {
    #[error(
        "ydotool daemon is not running.\n\
        Start it with: systemctl --user enable --now ydotool"
    )]
    YdotoolNotRunning,

    #[error(
        "ydotool not found.\n\
        Install it via your package manager (e.g. 'sudo pacman -S ydotool')"
    )]
    YdotoolNotFound,

    #[error(
        "wtype not found.\n\
        Install it via your package manager (e.g. 'sudo pacman -S wtype')"
    )]
    WtypeNotFound,

    #[error(
        "wl-copy not found.\n\
        Install wl-clipboard via your package manager"
    )]
    WlCopyNotFound,

    #[error("Text injection failed: {0}")]
    InjectionFailed(String),

    #[error("All output methods failed. Check that wtype or ydotool is installed.")]
    AllMethodsFailed,
}

/// Model repository errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(
        "Unknown model id: {0}\n\
        List available models with: voxkey models list"
    )]
    UnknownModel(String),

    #[error("Model '{0}' is not downloaded")]
    NotDownloaded(String),

    #[error(
        "Checksum mismatch for model '{model_id}': expected {expected}, got {actual}.\n\
        The file has been removed; retry with: voxkey models download {model_id}"
    )]
    ChecksumMismatch {
        model_id: String,
        expected: String,
        actual: String,
    },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Download failed (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using VoxkeyError
pub type Result<T> = std::result::Result<T, VoxkeyError>;
