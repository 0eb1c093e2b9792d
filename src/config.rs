//! Configuration loading and types for voxkey
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/voxkey/config.toml)
//! 3. Environment variables (VOXKEY_*)
//! 4. CLI arguments (highest priority)
//!
//! Out-of-range numeric values are clamped rather than rejected so a
//! hand-edited file never prevents startup.

use crate::error::{Result, VoxkeyError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Voxkey Configuration
#
# Location: ~/.config/voxkey/config.toml
# All settings can be overridden via CLI flags

[engine]
# Speech engine backend: "whisper" (local), "remote" (HTTP API), "mock" (testing)
backend = "whisper"

# Whisper model: tiny, tiny-multi, base, base-multi, small, medium, large-v3
# English-only variants (tiny, base) are faster; the others handle 99 languages
# Download with: voxkey models download <id>
model = "small"

# Language code ("en", "de", ...) used when auto detection is off
language = "en"

# Detect the spoken language instead of assuming `language`
auto_detect_language = true

# Translate non-English speech to English
translate = false

# Worker threads for inference (defaults to CPU count)
# threads = 4

[engine.remote]
# Endpoint used when backend = "remote" (OpenAI-compatible transcription API)
url = "https://api.openai.com/v1/audio/transcriptions"

# Environment variable holding the API key (never stored in this file)
api_key_env = "VOXKEY_API_KEY"

# Model name sent to the remote service
model = "whisper-1"

# Request timeout in seconds
timeout_secs = 30

[audio]
# Audio input device ("default" uses system default)
# List devices with: pactl list sources short
device = "default"

# Sample rate in Hz (whisper expects 16000)
sample_rate = 16000

# Maximum recording duration in seconds (safety limit, 5-300)
max_duration_secs = 60

[vad]
# Drop recordings that contain no detectable speech
enabled = true

# Speech detection threshold, 0.0 (permissive) to 1.0 (strict)
threshold = 0.5

# How eagerly an utterance is considered finished once you stop
# speaking, 0.0 (patient) to 1.0 (snappy)
endpointing_sensitivity = 0.5

# Minimum speech length to keep a recording, in milliseconds
min_speech_duration_ms = 300

[output]
# Output mode: "direct" or "buffered"
# - direct: type text into the focused window as it is recognized
# - buffered: collect utterances for review, paste with `voxkey buffer paste`
mode = "direct"

# Also copy committed text to the clipboard (wl-copy)
auto_copy_to_clipboard = false

# Prefix buffered entries with [HH:MM:SS] timestamps when copying
timestamps_on_copy = false

# Delay between injected keystrokes in milliseconds (0 = fastest)
type_delay_ms = 0

[output.notification]
# Desktop notifications via notify-send
enabled = true

# Notification display time in milliseconds
timeout_ms = 2000

[text]
# Text prepended / appended to every transcription
prefix = ""
suffix = ""

# Case handling: "normal", "lowercase", "uppercase", "sentence"
case = "normal"

# Convert spoken punctuation ("comma", "period", ...) to symbols
spoken_punctuation = false

# Word replacements applied to final transcriptions (case-insensitive,
# whole words only)
[text.replacements]
# "vox key" = "voxkey"

[logging]
# File log verbosity: "off", "error_only", "minimal", "standard", "extensive"
level = "minimal"

# Write logs to rotating files under ~/.local/share/voxkey/logs
file_enabled = false

[privacy]
# All reporting is off by default and stays off unless enabled here
telemetry = false
crash_reports = false
analytics = false

# Days to keep log files (1-365)
retention_days = 7

[daemon]
# State file for external integrations (Waybar, polybar, etc.)
# Use "auto" for default location ($XDG_RUNTIME_DIR/voxkey/state),
# a custom path, or "disabled" to turn off. The daemon writes state
# ("idle", "recording", "transcribing") to this file whenever it changes.
state_file = "auto"
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub output: OutputConfig,
    pub text: TextConfig,
    pub logging: LoggingConfig,
    pub privacy: PrivacyConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: EngineBackend,
    pub model: String,
    pub language: String,
    pub auto_detect_language: bool,
    pub translate: bool,
    pub threads: Option<usize>,
    pub remote: RemoteConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Whisper,
            model: "small".to_string(),
            language: "en".to_string(),
            auto_detect_language: true,
            translate: false,
            threads: None,
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    #[default]
    Whisper,
    Remote,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key_env: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key_env: "VOXKEY_API_KEY".to_string(),
            model: "whisper-1".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device: String,
    pub sample_rate: u32,
    pub max_duration_secs: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 16000,
            max_duration_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub endpointing_sensitivity: f32,
    pub min_speech_duration_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.5,
            endpointing_sensitivity: 0.5,
            min_speech_duration_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub auto_copy_to_clipboard: bool,
    pub timestamps_on_copy: bool,
    pub type_delay_ms: u32,
    pub notification: NotificationConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Direct,
            auto_copy_to_clipboard: false,
            timestamps_on_copy: false,
            type_delay_ms: 0,
            notification: NotificationConfig::default(),
        }
    }
}

/// Where recognized text goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Type into the focused window as text is recognized
    #[default]
    Direct,
    /// Collect utterances in a buffer until pasted
    Buffered,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Direct => write!(f, "direct"),
            OutputMode::Buffered => write!(f, "buffered"),
        }
    }
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(OutputMode::Direct),
            "buffered" => Ok(OutputMode::Buffered),
            other => Err(format!(
                "unknown output mode '{other}' (expected 'direct' or 'buffered')"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub timeout_ms: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TextConfig {
    pub prefix: String,
    pub suffix: String,
    pub case: CaseMode,
    pub spoken_punctuation: bool,
    pub replacements: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseMode {
    #[default]
    Normal,
    Lowercase,
    Uppercase,
    Sentence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Verbosity,
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Verbosity::Minimal,
            file_enabled: false,
        }
    }
}

/// File logger verbosity, ordered from silent to full debug output
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Off,
    ErrorOnly,
    #[default]
    Minimal,
    Standard,
    Extensive,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verbosity::Off => "off",
            Verbosity::ErrorOnly => "error_only",
            Verbosity::Minimal => "minimal",
            Verbosity::Standard => "standard",
            Verbosity::Extensive => "extensive",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "off" => Ok(Verbosity::Off),
            "error_only" => Ok(Verbosity::ErrorOnly),
            "minimal" => Ok(Verbosity::Minimal),
            "standard" => Ok(Verbosity::Standard),
            "extensive" => Ok(Verbosity::Extensive),
            other => Err(format!("unknown verbosity: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub telemetry: bool,
    pub crash_reports: bool,
    pub analytics: bool,
    pub retention_days: u32,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            telemetry: false,
            crash_reports: false,
            analytics: false,
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub state_file: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: Some("auto".to_string()),
        }
    }
}

impl Config {
    /// Load configuration with layering: defaults, file, environment
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::default_path()?,
        };

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                VoxkeyError::Config(format!("Failed to read {}: {}", config_path.display(), e))
            })?;
            toml::from_str(&content).map_err(|e| {
                VoxkeyError::Config(format!("Failed to parse {}: {}", config_path.display(), e))
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.normalize();
        Ok(config)
    }

    /// Parse configuration from a TOML string (no file or env layering)
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| VoxkeyError::Config(format!("Failed to parse config: {e}")))?;
        config.normalize();
        Ok(config)
    }

    /// Serialize the current configuration to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VoxkeyError::Config(format!("Failed to serialize config: {e}")))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("VOXKEY_MODEL") {
            self.engine.model = model;
        }
        if let Ok(language) = std::env::var("VOXKEY_LANGUAGE") {
            self.engine.language = language;
        }
        if let Ok(backend) = std::env::var("VOXKEY_BACKEND") {
            match backend.to_lowercase().as_str() {
                "whisper" => self.engine.backend = EngineBackend::Whisper,
                "remote" => self.engine.backend = EngineBackend::Remote,
                "mock" => self.engine.backend = EngineBackend::Mock,
                other => tracing::warn!("Ignoring unknown VOXKEY_BACKEND: {other}"),
            }
        }
        if let Ok(device) = std::env::var("VOXKEY_AUDIO_DEVICE") {
            self.audio.device = device;
        }
        if let Ok(mode) = std::env::var("VOXKEY_OUTPUT_MODE") {
            match mode.parse() {
                Ok(m) => self.output.mode = m,
                Err(e) => tracing::warn!("Ignoring VOXKEY_OUTPUT_MODE: {e}"),
            }
        }
    }

    /// Clamp out-of-range values instead of failing
    pub fn normalize(&mut self) {
        self.vad.threshold = self.vad.threshold.clamp(0.0, 1.0);
        self.vad.endpointing_sensitivity = self.vad.endpointing_sensitivity.clamp(0.0, 1.0);
        self.audio.max_duration_secs = self.audio.max_duration_secs.clamp(5, 300);
        self.privacy.retention_days = self.privacy.retention_days.clamp(1, 365);
    }

    /// Default config file path: ~/.config/voxkey/config.toml
    pub fn default_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Data directory for models and logs: ~/.local/share/voxkey
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Directory where downloaded models are stored
    pub fn models_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("models"))
    }

    /// Directory where rotating log files are written
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("logs"))
    }

    /// Cache directory for temporary artifacts
    pub fn cache_dir() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.cache_dir().to_path_buf())
    }

    /// Runtime directory for the state file, pid file and control socket
    pub fn runtime_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(dir).join("voxkey")
        } else {
            std::env::temp_dir().join("voxkey")
        }
    }

    /// Resolve the state file setting to a concrete path
    ///
    /// "auto" places it in the runtime dir; "disabled", "none", "off"
    /// and "false" turn it off; anything else is used as a path.
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        let setting = self.daemon.state_file.as_deref()?;
        match setting.to_lowercase().as_str() {
            "disabled" | "none" | "off" | "false" => None,
            "auto" => Some(Self::runtime_dir().join("state")),
            _ => Some(PathBuf::from(expand_tilde(setting))),
        }
    }

    /// Path of the daemon control socket
    pub fn control_socket_path() -> PathBuf {
        Self::runtime_dir().join("control.sock")
    }

    /// Path of the daemon pid file
    pub fn pid_file_path() -> PathBuf {
        Self::runtime_dir().join("voxkey.pid")
    }

    /// Create config, data, cache and runtime directories if missing
    pub fn ensure_directories() -> Result<()> {
        let dirs = project_dirs()?;
        std::fs::create_dir_all(dirs.config_dir())?;
        std::fs::create_dir_all(dirs.data_dir())?;
        std::fs::create_dir_all(dirs.cache_dir())?;
        std::fs::create_dir_all(Self::models_dir()?)?;
        std::fs::create_dir_all(Self::logs_dir()?)?;
        std::fs::create_dir_all(Self::runtime_dir())?;
        Ok(())
    }

    /// Write the default config template if no config file exists yet
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = Self::default_path()?;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, DEFAULT_CONFIG)?;
        }
        Ok(path)
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "voxkey")
        .ok_or_else(|| VoxkeyError::Config("Could not determine home directory".to_string()))
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_template_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.engine.model, "small");
        assert_eq!(config.engine.backend, EngineBackend::Whisper);
        assert_eq!(config.output.mode, OutputMode::Direct);
        assert_eq!(config.logging.level, Verbosity::Minimal);
        assert!(!config.privacy.telemetry);
        assert!(!config.privacy.crash_reports);
        assert!(!config.privacy.analytics);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.max_duration_secs, 60);
        assert_eq!(config.privacy.retention_days, 7);
        assert!(config.vad.enabled);
    }

    #[test]
    fn test_partial_config_merges_with_defaults() {
        let config = Config::from_toml(
            r#"
            [output]
            mode = "buffered"
        "#,
        )
        .unwrap();
        assert_eq!(config.output.mode, OutputMode::Buffered);
        assert_eq!(config.engine.model, "small");
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = Config::from_toml(
            r#"
            [vad]
            threshold = 3.5
            endpointing_sensitivity = -1.0

            [audio]
            max_duration_secs = 100000

            [privacy]
            retention_days = 0
        "#,
        )
        .unwrap();
        assert_eq!(config.vad.threshold, 1.0);
        assert_eq!(config.vad.endpointing_sensitivity, 0.0);
        assert_eq!(config.audio.max_duration_secs, 300);
        assert_eq!(config.privacy.retention_days, 1);
    }

    #[test]
    fn test_verbosity_ordering() {
        assert!(Verbosity::Off < Verbosity::ErrorOnly);
        assert!(Verbosity::ErrorOnly < Verbosity::Minimal);
        assert!(Verbosity::Minimal < Verbosity::Standard);
        assert!(Verbosity::Standard < Verbosity::Extensive);
    }

    #[test]
    fn test_output_mode_round_trip() {
        assert_eq!("direct".parse::<OutputMode>().unwrap(), OutputMode::Direct);
        assert_eq!(
            "Buffered".parse::<OutputMode>().unwrap(),
            OutputMode::Buffered
        );
        assert!("typewriter".parse::<OutputMode>().is_err());
    }

    #[test]
    fn test_state_file_resolution() {
        let mut config = Config::default();

        config.daemon.state_file = Some("disabled".to_string());
        assert!(config.resolve_state_file().is_none());

        config.daemon.state_file = Some("none".to_string());
        assert!(config.resolve_state_file().is_none());

        config.daemon.state_file = None;
        assert!(config.resolve_state_file().is_none());

        config.daemon.state_file = Some("auto".to_string());
        let auto = config.resolve_state_file().unwrap();
        assert!(auto.ends_with("state"));

        config.daemon.state_file = Some("/tmp/voxkey-state".to_string());
        assert_eq!(
            config.resolve_state_file().unwrap(),
            PathBuf::from("/tmp/voxkey-state")
        );
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.engine.model = "base".to_string();
        config.output.auto_copy_to_clipboard = true;
        config
            .text
            .replacements
            .insert("teh".to_string(), "the".to_string());

        let toml = config.to_toml().unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(parsed.engine.model, "base");
        assert!(parsed.output.auto_copy_to_clipboard);
        assert_eq!(parsed.text.replacements.get("teh").unwrap(), "the");
    }
}
