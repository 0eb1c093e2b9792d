//! Voxkey - speech-to-text keyboard daemon for Linux
//!
//! Run with `voxkey` or `voxkey run` to start the daemon.
//! Use `voxkey setup` to write the default config and download a model.
//! Use `voxkey record toggle` from a compositor keybinding to dictate.

use clap::Parser;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use voxkey::cli::{
    BufferAction, Cli, Commands, LogsAction, ModelsAction, PrivacyAction, RecordAction,
};
use voxkey::config::{Config, OutputMode};
use voxkey::control::{self, ControlRequest, ControlResponse};
use voxkey::daemon::Daemon;
use voxkey::logging::LogWriter;
use voxkey::models::{catalog, ModelRepository, ModelState, ModelStatus};
use voxkey::output::EntrySource;
use voxkey::privacy::PrivacyManager;
use voxkey::settings::SettingsStore;
use voxkey::text::TextProcessor;
use voxkey::transcribe;
use voxkey::vad::EnergyVad;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("voxkey={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load(Some(config_path.clone()))?;

    // Apply CLI overrides (in memory only, never persisted)
    if let Some(model) = cli.model {
        config.engine.model = model;
    }
    if let Some(language) = cli.language {
        if language.eq_ignore_ascii_case("auto") {
            config.engine.auto_detect_language = true;
        } else {
            config.engine.language = language;
            config.engine.auto_detect_language = false;
        }
    }
    if let Some(device) = cli.device {
        config.audio.device = device;
    }

    let store = Arc::new(SettingsStore::with_config(config_path, config));

    // Run the appropriate command
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let mut daemon = Daemon::new(store);
            daemon.run().await?;
        }

        Commands::Record { action } => {
            run_record(action).await?;
        }

        Commands::Status { follow, format } => {
            run_status(&store.get(), follow, &format).await?;
        }

        Commands::Buffer { action } => {
            run_buffer(action).await?;
        }

        Commands::Mode { mode } => {
            run_mode(&store, mode.as_deref()).await?;
        }

        Commands::Models { action } => {
            run_models(store.get(), action)?;
        }

        Commands::Transcribe { file } => {
            run_transcribe(store.get(), &file).await?;
        }

        Commands::Config { init, reset } => {
            run_config(&store, init, reset)?;
        }

        Commands::Setup { skip_model } => {
            run_setup(&store, skip_model)?;
        }

        Commands::Logs { action } => {
            run_logs(action)?;
        }

        Commands::Privacy { action } => {
            run_privacy(&store, action)?;
        }
    }

    Ok(())
}

/// Print a control response the way a human wants to read it
fn print_response(response: &ControlResponse) {
    if let Some(ref buffer) = response.buffer {
        if buffer.is_empty() {
            println!("(buffer is empty)");
        } else {
            println!("{}", buffer);
        }
        return;
    }
    if let Some(ref message) = response.message {
        println!("{}", message);
    } else {
        println!("{}", response.state);
    }
}

/// Send a recording command to the daemon
async fn run_record(action: RecordAction) -> anyhow::Result<()> {
    let request = match action {
        RecordAction::Start => ControlRequest::RecordStart,
        RecordAction::Stop => ControlRequest::RecordStop,
        RecordAction::Toggle => ControlRequest::RecordToggle,
    };

    match control::send_request(&request).await {
        Ok(response) => {
            print_response(&response);
            if !response.ok {
                std::process::exit(1);
            }
        }
        Err(socket_err) => {
            // Older setups drive the daemon with signals alone; keep
            // plain start/stop working through the pid file
            #[cfg(target_os = "linux")]
            {
                match request {
                    ControlRequest::RecordStart => return signal_daemon(true),
                    ControlRequest::RecordStop => return signal_daemon(false),
                    _ => {}
                }
            }
            return Err(socket_err.into());
        }
    }

    Ok(())
}

/// Signal the daemon directly (SIGUSR1 = start, SIGUSR2 = stop)
#[cfg(target_os = "linux")]
fn signal_daemon(start: bool) -> anyhow::Result<()> {
    use anyhow::Context;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid_path = Config::pid_file_path();
    let raw = std::fs::read_to_string(&pid_path).with_context(|| {
        format!(
            "No control socket and no pid file at {:?}. Is the daemon running? Start it with: voxkey run",
            pid_path
        )
    })?;
    let pid = raw
        .trim()
        .parse::<i32>()
        .context("Malformed pid file")?;
    let sig = if start {
        Signal::SIGUSR1
    } else {
        Signal::SIGUSR2
    };
    kill(Pid::from_raw(pid), sig)
        .with_context(|| format!("Failed to signal daemon (pid {})", pid))?;
    println!("Sent {} to daemon (pid {})", sig, pid);
    Ok(())
}

/// Run the status command - show current daemon state
async fn run_status(config: &Config, follow: bool, format: &str) -> anyhow::Result<()> {
    if !follow {
        // Ask the daemon over the socket for the richer view; fall back
        // to the state file when it is not answering
        match control::send_request(&ControlRequest::Status).await {
            Ok(response) => {
                if format == "json" {
                    println!("{}", format_state_json(&response.state));
                } else {
                    match response.level {
                        Some(level) => println!(
                            "state: {} (input level {:.0}%)",
                            response.state,
                            level * 100.0
                        ),
                        None => println!("state: {}", response.state),
                    }
                    println!(
                        "mode: {} ({} buffered entries)",
                        response.mode, response.entries
                    );
                    if let Some(message) = response.message {
                        println!("{}", message);
                    }
                }
            }
            Err(_) => {
                let state = read_state_file(config);
                if format == "json" {
                    println!("{}", format_state_json(&state));
                } else {
                    println!("{}", state);
                }
            }
        }
        return Ok(());
    }

    // Follow mode needs the state file
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: the state file is disabled in config.");
        eprintln!();
        eprintln!("To enable status monitoring, set in your config.toml:");
        eprintln!();
        eprintln!("  [daemon]");
        eprintln!("  state_file = \"auto\"");
        std::process::exit(1);
    };

    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
    use std::sync::mpsc::channel;
    use std::time::Duration;

    // Print initial state
    let state = std::fs::read_to_string(&state_path).unwrap_or_else(|_| "stopped".to_string());
    let mut last_state = state.trim().to_string();
    if format == "json" {
        println!("{}", format_state_json(&last_state));
    } else {
        println!("{}", last_state);
    }

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    // Watch the parent directory; the file may not exist yet
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }
    if state_path.exists() {
        let _ = watcher.watch(&state_path, RecursiveMode::NonRecursive);
    }

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                if let Ok(new_state) = std::fs::read_to_string(&state_path) {
                    let new_state = new_state.trim().to_string();
                    if new_state != last_state {
                        if format == "json" {
                            println!("{}", format_state_json(&new_state));
                        } else {
                            println!("{}", new_state);
                        }
                        last_state = new_state;
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // File deleted means the daemon stopped
                if !state_path.exists() && last_state != "stopped" {
                    if format == "json" {
                        println!("{}", format_state_json("stopped"));
                    } else {
                        println!("stopped");
                    }
                    last_state = "stopped".to_string();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    Ok(())
}

fn read_state_file(config: &Config) -> String {
    match config.resolve_state_file() {
        Some(path) => std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "stopped".to_string()),
        None => "stopped".to_string(),
    }
}

/// Format state as JSON for Waybar consumption
fn format_state_json(state: &str) -> String {
    let (text, class, tooltip) = match state {
        "recording" => ("🎤", "recording", "Recording..."),
        "transcribing" => ("⏳", "transcribing", "Transcribing..."),
        "outputting" => ("⌨", "outputting", "Typing text..."),
        "idle" => ("🎙", "idle", "Voxkey ready"),
        "stopped" => ("", "stopped", "Voxkey not running"),
        _ => ("?", "unknown", "Unknown state"),
    };

    format!(
        r#"{{"text": "{}", "class": "{}", "tooltip": "{}"}}"#,
        text, class, tooltip
    )
}

/// Send a buffer command to the daemon
async fn run_buffer(action: BufferAction) -> anyhow::Result<()> {
    let request = match action {
        BufferAction::Show => ControlRequest::ShowBuffer,
        BufferAction::Add { text, source } => {
            let source = source
                .parse::<EntrySource>()
                .map_err(anyhow::Error::msg)?;
            ControlRequest::AddToBuffer { text, source }
        }
        BufferAction::Clear => ControlRequest::ClearBuffer,
        BufferAction::Paste => ControlRequest::PasteBuffer,
    };

    let response = control::send_request(&request).await?;
    print_response(&response);
    if !response.ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Show or change the output mode
async fn run_mode(store: &SettingsStore, mode: Option<&str>) -> anyhow::Result<()> {
    match mode {
        None => match control::send_request(&ControlRequest::Status).await {
            Ok(response) => println!("{}", response.mode),
            Err(_) => println!("{}", store.get().output.mode),
        },
        Some(mode) => {
            let mode: OutputMode = mode.parse().map_err(anyhow::Error::msg)?;
            match control::send_request(&ControlRequest::SetMode { mode }).await {
                Ok(response) => print_response(&response),
                Err(_) => {
                    // No daemon; change the config file directly
                    store.update(|c| c.output.mode = mode)?;
                    println!("Output mode: {} (saved to config)", mode);
                }
            }
        }
    }
    Ok(())
}

/// Manage downloaded speech models
fn run_models(config: Config, action: ModelsAction) -> anyhow::Result<()> {
    let repo = ModelRepository::from_config()?;

    match action {
        ModelsAction::List => {
            println!(
                "{:<14} {:>8}  {:<12}  {}",
                "ID", "SIZE", "STATE", "DESCRIPTION"
            );
            for spec in catalog::all() {
                let status = repo.status(spec.id)?;
                println!(
                    "{:<14} {:>5} MB  {:<12}  {} ({})",
                    spec.id, spec.size_mb, status.state, spec.display_name, spec.description
                );
            }
            println!();
            println!(
                "Models directory: {:?} ({} used)",
                repo.models_dir(),
                format_size(repo.storage_used())
            );
            println!("Download with: voxkey models download <ID>");
        }

        ModelsAction::Download { id, force } => {
            let id = id.unwrap_or_else(|| catalog::DEFAULT_MODEL_ID.to_string());
            download_with_progress(&repo, &id, force)?;
        }

        ModelsAction::Verify { id } => {
            let ids: Vec<String> = match id {
                Some(id) => vec![id],
                None => repo
                    .status_all()
                    .into_iter()
                    .filter(|s| s.state == ModelState::Downloaded)
                    .map(|s| s.model_id)
                    .collect(),
            };
            if ids.is_empty() {
                println!("No downloaded models to verify");
                return Ok(());
            }
            let mut failed = false;
            for id in &ids {
                match repo.verify(id) {
                    Ok(_) => println!("{}: ok", id),
                    Err(e) => {
                        println!("{}: {}", id, e);
                        failed = true;
                    }
                }
            }
            if failed {
                std::process::exit(1);
            }
        }

        ModelsAction::Delete { id, yes } => {
            if !yes {
                print!("Delete model '{}'? [y/N] ", id);
                std::io::stdout().flush()?;
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)?;
                if !matches!(line.trim(), "y" | "Y" | "yes") {
                    println!("Aborted");
                    return Ok(());
                }
            }
            let bytes = repo.delete(&id)?;
            println!("Deleted '{}' ({} freed)", id, format_size(bytes));
        }

        ModelsAction::Status => {
            let id = &config.engine.model;
            match catalog::find(id) {
                Some(spec) => {
                    let status = repo.status(spec.id)?;
                    println!("Configured model: {} ({})", spec.id, spec.display_name);
                    println!("State: {}", status.state);
                    match status.state {
                        ModelState::Downloaded => {
                            println!("File: {:?}", spec.path()?);
                        }
                        ModelState::Downloading => {
                            println!(
                                "Partial download: {} of {}",
                                format_size(status.bytes_downloaded),
                                format_size(status.total_bytes)
                            );
                            println!("Resume with: voxkey models download {}", spec.id);
                        }
                        _ => {
                            println!("Install with: voxkey models download {}", spec.id);
                        }
                    }
                }
                None if Path::new(id).is_file() => {
                    println!("Configured model file: {} (not from the catalog)", id);
                }
                None => {
                    println!("Configured model '{}' is unknown and no such file exists", id);
                    println!("Pick one from: voxkey models list");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Download a model with a single-line progress display
fn download_with_progress(repo: &ModelRepository, id: &str, force: bool) -> anyhow::Result<()> {
    let mut last_percent = u32::MAX;
    let status = repo.download(id, force, &mut |status: &ModelStatus| match status.state {
        ModelState::Downloading => {
            let percent = (status.progress * 100.0) as u32;
            if percent != last_percent {
                print!(
                    "\rDownloading '{}': {:>3}% ({} / {})   ",
                    id,
                    percent,
                    format_size(status.bytes_downloaded),
                    format_size(status.total_bytes)
                );
                let _ = std::io::stdout().flush();
                last_percent = percent;
            }
        }
        ModelState::Verifying => {
            print!("\rVerifying checksum...                            ");
            let _ = std::io::stdout().flush();
        }
        _ => {}
    })?;

    println!(
        "\rModel '{}' installed ({})                        ",
        id,
        format_size(status.bytes_downloaded)
    );
    Ok(())
}

/// Transcribe an audio file
async fn run_transcribe(config: Config, path: &Path) -> anyhow::Result<()> {
    use hound::WavReader;

    println!("Loading audio file: {:?}", path);

    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    println!(
        "Audio format: {} Hz, {} channel(s), {:?}",
        spec.sample_rate, spec.channels, spec.sample_format
    );

    // Convert samples to f32
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
    };

    // Mix to mono if stereo
    let mono_samples: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    } else {
        samples
    };

    // Resample to 16kHz if needed
    let final_samples = if spec.sample_rate != 16000 {
        println!("Resampling from {} Hz to 16000 Hz...", spec.sample_rate);
        voxkey::audio::resample(&mono_samples, spec.sample_rate, 16000)
    } else {
        mono_samples
    };

    // Whisper hallucinates on silence, bail out early
    if config.vad.enabled {
        let check = EnergyVad::new(&config.vad).detect(&final_samples);
        if !check.has_speech {
            println!(
                "No speech detected ({:.1}s of audio, {:.0}% speech frames)",
                final_samples.len() as f32 / 16000.0,
                check.speech_ratio * 100.0
            );
            return Ok(());
        }
    }

    println!(
        "Processing {} samples ({:.2}s)...",
        final_samples.len(),
        final_samples.len() as f32 / 16000.0
    );

    let processor = TextProcessor::new(&config.text);
    let result = tokio::task::spawn_blocking(move || -> voxkey::error::Result<_> {
        let engine = transcribe::create_engine(&config)?;
        Ok(engine.transcribe_buffer(&final_samples)?)
    })
    .await??;

    println!("\n{}", processor.process(&result.text));
    Ok(())
}

/// Show or initialize the configuration
fn run_config(store: &SettingsStore, init: bool, reset: bool) -> anyhow::Result<()> {
    if init {
        let path = store.path();
        if path.exists() {
            println!("Config already exists: {:?}", path);
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, voxkey::config::DEFAULT_CONFIG)?;
            println!("Wrote default config: {:?}", path);
        }
        return Ok(());
    }

    if reset {
        store.reset_to_defaults()?;
        println!("Config reset to defaults: {:?}", store.path());
        return Ok(());
    }

    let config = store.get();
    println!("# Effective configuration (file: {:?})", store.path());
    println!();
    print!("{}", config.to_toml()?);
    println!();
    println!("# Models dir: {:?}", Config::models_dir()?);
    println!("# Logs dir:   {:?}", Config::logs_dir()?);
    Ok(())
}

/// Run the setup command
fn run_setup(store: &SettingsStore, skip_model: bool) -> anyhow::Result<()> {
    println!("Voxkey Setup");
    println!("============\n");

    println!("Creating directories...");
    Config::ensure_directories()?;
    println!("  ✓ Models directory: {:?}", Config::models_dir()?);
    println!("  ✓ Logs directory:   {:?}", Config::logs_dir()?);

    let config_path = Config::write_default_if_missing()?;
    println!("  ✓ Config file:      {:?}", config_path);

    println!("\nChecking typing tools...");
    let wtype = which("wtype");
    let ydotool = which("ydotool");
    if wtype {
        println!("  ✓ wtype found");
    }
    if ydotool {
        println!("  ✓ ydotool found");
    }
    if !wtype && !ydotool {
        println!("  ✗ Neither wtype nor ydotool found");
        println!("    Direct mode will fall back to the clipboard.");
        println!("    Install wtype (Wayland) or ydotool via your package manager.");
    }
    if which("wl-copy") {
        println!("  ✓ wl-copy found");
    } else {
        println!("  ✗ wl-copy not found (clipboard fallback unavailable)");
        println!("    Install wl-clipboard via your package manager");
    }

    println!("\nChecking speech model...");
    let config = store.get();
    if catalog::find(&config.engine.model).is_none() {
        println!(
            "  - Custom model '{}' configured; skipping download",
            config.engine.model
        );
    } else {
        let repo = ModelRepository::from_config()?;
        let status = repo.status(&config.engine.model)?;
        if status.state == ModelState::Downloaded {
            println!(
                "  ✓ Model '{}' installed ({})",
                config.engine.model,
                format_size(status.bytes_downloaded)
            );
        } else if skip_model {
            println!("  - Model '{}' not downloaded (skipped)", config.engine.model);
            println!(
                "    Download later with: voxkey models download {}",
                config.engine.model
            );
        } else {
            download_with_progress(&repo, &config.engine.model, false)?;
        }
    }

    println!("\n---");
    println!("Done. Start the daemon with: voxkey");
    println!("Bind 'voxkey record toggle' to a key in your compositor.");
    Ok(())
}

fn which(program: &str) -> bool {
    std::process::Command::new("which")
        .arg(program)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Export or delete log files
fn run_logs(action: LogsAction) -> anyhow::Result<()> {
    let writer = LogWriter::new(Config::logs_dir()?);

    match action {
        LogsAction::Export { dest } => {
            let dest = if dest.is_dir() {
                dest.join(format!(
                    "voxkey-logs-{}.log",
                    chrono::Local::now().format("%Y-%m-%d")
                ))
            } else {
                dest
            };
            let path = writer.export(&dest)?;
            println!("Exported logs to {:?}", path);
        }
        LogsAction::Clear => {
            if writer.total_size() == 0 {
                println!("No log files");
                return Ok(());
            }
            let bytes = writer.clear()?;
            println!("Deleted log files ({} freed)", format_size(bytes));
        }
    }
    Ok(())
}

/// Privacy status and data wiping
fn run_privacy(store: &SettingsStore, action: PrivacyAction) -> anyhow::Result<()> {
    match action {
        PrivacyAction::Status => {
            let config = store.get();
            let manager = PrivacyManager::from_default_dirs()?;
            let storage = manager.storage_summary();

            println!("Privacy");
            println!("  telemetry:      {}", on_off(config.privacy.telemetry));
            println!("  crash reports:  {}", on_off(config.privacy.crash_reports));
            println!("  analytics:      {}", on_off(config.privacy.analytics));
            println!(
                "  file logging:   {} ({})",
                on_off(config.logging.file_enabled),
                config.logging.level
            );
            println!("  retention:      {} days", config.privacy.retention_days);
            println!();
            println!("Storage");
            println!("  logs:    {}", format_size(storage.logs_bytes));
            println!("  cache:   {}", format_size(storage.cache_bytes));
            println!("  models:  {}", format_size(storage.models_bytes));
            println!("  total:   {}", format_size(storage.total()));
        }

        PrivacyAction::Wipe { yes, models } => {
            if !yes {
                let what = if models {
                    "logs, cache, temp files, and downloaded models"
                } else {
                    "logs, cache, and temp files"
                };
                print!("This deletes {}. Continue? [y/N] ", what);
                std::io::stdout().flush()?;
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)?;
                if !matches!(line.trim(), "y" | "Y" | "yes") {
                    println!("Aborted");
                    return Ok(());
                }
            }
            let manager = PrivacyManager::from_default_dirs()?;
            let summary = manager.clear_all_data(models);
            println!(
                "Removed {} files ({} freed)",
                summary.files_removed,
                format_size(summary.bytes_freed)
            );
        }

        PrivacyAction::Max => {
            store.apply_maximum_privacy()?;
            println!("Maximum privacy applied: telemetry-class flags off, file logging error-only");
        }
    }
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
