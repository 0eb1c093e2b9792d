//! Daemon main event loop
//!
//! Owns the audio engine, speech engine, endpoint detector and output
//! router, and coordinates them: live samples flow into the streaming
//! session, utterance ends trigger finalization, and finished text goes
//! through the text processor into the router.
//!
//! External control arrives three ways: the control socket (CLI
//! subcommands), SIGUSR1/SIGUSR2 (compositor keybindings), and the
//! config file watcher (settings edits apply live).

use crate::audio::AudioEngine;
use crate::config::{Config, EngineBackend, EngineConfig, OutputMode};
use crate::control::{ControlCommand, ControlRequest, ControlResponse, ControlServer};
use crate::error::{Result, VoxkeyError};
use crate::logging::FileLogger;
use crate::notification::{self, Notifier};
use crate::output::{self, InjectorSink, OutputRouter, PasteOutcome, RouteOutcome, WlClipboard};
use crate::privacy::PrivacyManager;
use crate::settings::{self, SettingsStore};
use crate::state::State;
use crate::text::TextProcessor;
use crate::transcribe::{self, SpeechEngine, StreamSession, TranscriptionResult};
use crate::vad::{EndpointDetector, EndpointEvent};
use pidlock::Pidlock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};

/// Write state to file for external integrations (e.g., Waybar)
fn write_state_file(path: &PathBuf, state: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

/// Remove state file on shutdown
fn cleanup_state_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Everything the event loop mutates while dictation is live
struct Dictation {
    state: State,
    audio: AudioEngine,
    session: Option<Box<dyn StreamSession>>,
    endpoint: EndpointDetector,
    router: OutputRouter,
    engine: Box<dyn SpeechEngine>,
    engine_cfg: EngineConfig,
    /// Whether the endpoint detector armed during the current session
    heard_speech: bool,
    /// Samples fed to the current session, for duration reporting
    utterance_samples: usize,
}

/// Main daemon that orchestrates all components
pub struct Daemon {
    settings: Arc<SettingsStore>,
    logger: FileLogger,
    privacy: Option<PrivacyManager>,
    notifier: Notifier,
    text_processor: TextProcessor,
    state_file_path: Option<PathBuf>,
}

impl Daemon {
    /// Create a new daemon around the shared settings store
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        let config = settings.get();

        let logger = match Config::logs_dir() {
            Ok(dir) => FileLogger::spawn(dir, config.logging.level, config.logging.file_enabled),
            Err(e) => {
                tracing::warn!("File logging unavailable: {}", e);
                FileLogger::disabled()
            }
        };

        let privacy = match PrivacyManager::from_default_dirs() {
            Ok(manager) => Some(manager),
            Err(e) => {
                tracing::warn!("Privacy manager unavailable: {}", e);
                None
            }
        };

        let text_processor = TextProcessor::new(&config.text);
        if config.text.spoken_punctuation {
            tracing::info!("Spoken punctuation enabled");
        }
        if !config.text.replacements.is_empty() {
            tracing::info!(
                "Word replacements configured: {} rules",
                config.text.replacements.len()
            );
        }

        let notifier = Notifier::new(&config.output.notification);
        let state_file_path = config.resolve_state_file();

        Self {
            settings,
            logger,
            privacy,
            notifier,
            text_processor,
            state_file_path,
        }
    }

    /// Update the state file if configured
    fn update_state(&self, state_name: &str) {
        if let Some(ref path) = self.state_file_path {
            write_state_file(path, state_name);
        }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting voxkey daemon");

        Config::ensure_directories()?;

        // Single instance guard; the lock file doubles as the pid file
        // for signal-based control
        let lock_path = Config::pid_file_path().to_string_lossy().to_string();
        let mut lock = Pidlock::new(&lock_path);
        if lock.acquire().is_err() {
            return Err(VoxkeyError::Config(
                "Another voxkey daemon is already running".to_string(),
            ));
        }

        let mut sigusr1 = signal(SignalKind::user_defined1()).map_err(|e| {
            VoxkeyError::Config(format!("Failed to set up SIGUSR1 handler: {}", e))
        })?;
        let mut sigusr2 = signal(SignalKind::user_defined2()).map_err(|e| {
            VoxkeyError::Config(format!("Failed to set up SIGUSR2 handler: {}", e))
        })?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            VoxkeyError::Config(format!("Failed to set up SIGTERM handler: {}", e))
        })?;

        let config = self.settings.get();

        if let Some(privacy) = &self.privacy {
            privacy.apply(&config, &self.logger);
            let pruned = privacy.enforce_retention(config.privacy.retention_days);
            if pruned.files_removed > 0 {
                tracing::info!(
                    "Retention cleanup removed {} files ({} bytes)",
                    pruned.files_removed,
                    pruned.bytes_freed
                );
            }
        }

        tracing::info!("Output mode: {}", config.output.mode);
        if let Some(ref path) = self.state_file_path {
            tracing::info!("State file: {:?}", path);
        }

        // Model loading can take seconds; do it off the runtime
        tracing::info!(
            "Loading speech engine ({:?}, model {})",
            config.engine.backend,
            config.engine.model
        );
        let engine_config = config.clone();
        let engine = tokio::task::spawn_blocking(move || {
            transcribe::create_engine_with_fallback(&engine_config)
        })
        .await
        .map_err(|e| VoxkeyError::Config(format!("Engine initialization failed: {}", e)))?;

        if engine.name() == "mock" && config.engine.backend != EngineBackend::Mock {
            self.notifier
                .send(
                    "Speech model unavailable",
                    "Dictation will echo canned text. Download a model with: voxkey models download",
                )
                .await;
        }
        tracing::info!("Speech engine ready ({})", engine.name());
        self.logger
            .info("daemon", format!("Daemon started (engine {})", engine.name()));

        let mut d = Dictation {
            state: State::Idle,
            audio: AudioEngine::new(&config.audio, &config.vad),
            session: None,
            endpoint: EndpointDetector::new(&config.vad),
            router: OutputRouter::new(&config.output, Box::new(WlClipboard)),
            engine,
            engine_cfg: config.engine.clone(),
            heard_speech: false,
            utterance_samples: 0,
        };
        self.refresh_sink(&mut d, &config).await;

        let mut samples_rx = d.audio.samples();

        let (control_tx, mut control_rx) = mpsc::channel::<ControlCommand>(16);
        let control_server = ControlServer::start(Config::control_socket_path(), control_tx)?;

        if let Err(e) = settings::spawn_config_watcher(self.settings.clone()) {
            tracing::warn!("Config file watching disabled: {}", e);
        }
        let mut settings_rx = self.settings.subscribe();

        let mut max_duration = Duration::from_secs(config.audio.max_duration_secs as u64);

        self.update_state("idle");
        tracing::info!("Ready (control: voxkey record start|stop|toggle, or SIGUSR1/SIGUSR2)");

        loop {
            tokio::select! {
                chunk = samples_rx.recv() => {
                    match chunk {
                        Ok(chunk) => self.on_audio_chunk(&mut d, &chunk).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("Audio consumer lagged, skipped {} chunks", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            // the sender lives in d.audio, so this only
                            // happens if the engine was replaced
                            samples_rx = d.audio.samples();
                        }
                    }
                }

                Some(command) = control_rx.recv() => {
                    let response = self
                        .handle_control(&mut d, &mut samples_rx, command.request)
                        .await;
                    let _ = command.reply.send(response);
                }

                // Check for recording timeout
                _ = tokio::time::sleep(Duration::from_millis(100)), if d.state.is_recording() => {
                    if let Some(duration) = d.state.recording_duration() {
                        if duration > max_duration {
                            tracing::warn!(
                                "Recording timeout ({:.0}s limit), stopping",
                                max_duration.as_secs_f32()
                            );
                            self.logger.warn(
                                "daemon",
                                format!(
                                    "Recording hit the {:.0}s limit, transcribing what was captured",
                                    max_duration.as_secs_f32()
                                ),
                            );
                            self.stop_recording(&mut d, &mut samples_rx).await;
                        }
                    }
                }

                changed = settings_rx.changed() => {
                    if changed.is_ok() {
                        let new = settings_rx.borrow_and_update().clone();
                        max_duration = Duration::from_secs(new.audio.max_duration_secs as u64);
                        self.apply_settings(&mut d, &new).await;
                    }
                }

                // SIGUSR1 - start recording (for compositor keybindings)
                _ = sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1 (start recording)");
                    self.start_recording(&mut d).await;
                }

                // SIGUSR2 - stop recording
                _ = sigusr2.recv() => {
                    tracing::debug!("Received SIGUSR2 (stop recording)");
                    self.stop_recording(&mut d, &mut samples_rx).await;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Finish the take in flight rather than dropping it
        if d.state.is_recording() {
            self.stop_recording(&mut d, &mut samples_rx).await;
        }

        control_server.shutdown().await;
        if let Some(ref path) = self.state_file_path {
            cleanup_state_file(path);
        }
        if let Err(e) = lock.release() {
            tracing::warn!("Failed to release pid lock: {:?}", e);
        }
        self.logger.info("daemon", "Daemon stopped");
        self.logger.flush().await;
        tracing::info!("Daemon stopped");

        Ok(())
    }

    /// Feed one chunk of live audio into the session and the endpoint
    /// detector
    async fn on_audio_chunk(&self, d: &mut Dictation, chunk: &[f32]) {
        if d.session.is_none() {
            return;
        }
        d.utterance_samples += chunk.len();

        if let Some(session) = d.session.as_mut() {
            match session.feed(chunk) {
                Ok(results) => {
                    for result in results {
                        if let Err(e) = d.router.process_transcription(&result).await {
                            tracing::warn!("Failed to route result: {}", e);
                        }
                    }
                }
                Err(e) => tracing::warn!("Session feed error: {}", e),
            }
        }

        match d.endpoint.feed(chunk) {
            Some(EndpointEvent::SpeechStart) => {
                d.heard_speech = true;
                tracing::debug!("Speech detected");
            }
            Some(EndpointEvent::UtteranceEnd) => {
                self.finalize_utterance(d).await;
            }
            None => {}
        }
    }

    /// Start capturing and open a streaming session
    async fn start_recording(&self, d: &mut Dictation) {
        if !d.state.is_idle() {
            tracing::debug!("Ignoring start, daemon is {}", d.state);
            return;
        }

        let config = self.settings.get();
        self.refresh_engine(d, &config).await;
        self.refresh_sink(d, &config).await;

        d.endpoint = EndpointDetector::new(&config.vad);
        d.heard_speech = false;
        d.utterance_samples = 0;

        if let Err(e) = d.audio.start().await {
            tracing::error!("Failed to start audio: {}", e);
            self.logger.error("audio", format!("Failed to start audio: {}", e));
            self.notifier.send("Recording failed", &e.to_string()).await;
            return;
        }

        match d.engine.start_session() {
            Ok(session) => {
                d.session = Some(session);
                d.state = State::Recording {
                    started_at: Instant::now(),
                };
                self.update_state("recording");
                tracing::info!("Recording started");
                self.logger.info("daemon", "Recording started");
            }
            Err(e) => {
                tracing::error!("Failed to start transcription session: {}", e);
                self.logger
                    .error("transcribe", format!("Failed to start session: {}", e));
                self.notifier.send("Recording failed", &e.to_string()).await;
                let _ = d.audio.stop().await;
            }
        }
    }

    /// Stop capturing, finish the open session, and return to idle
    async fn stop_recording(
        &self,
        d: &mut Dictation,
        samples_rx: &mut broadcast::Receiver<Vec<f32>>,
    ) {
        if !d.state.is_recording() {
            tracing::debug!("Ignoring stop, daemon is {}", d.state);
            return;
        }

        let duration = d.state.recording_duration().unwrap_or_default();
        tracing::info!("Recording stopped ({:.1}s)", duration.as_secs_f32());
        self.logger.info(
            "daemon",
            format!("Recording stopped after {:.1}s", duration.as_secs_f32()),
        );

        if let Err(e) = d.audio.stop().await {
            tracing::warn!("Recording error: {}", e);
        }
        d.endpoint.reset();

        // Chunks already broadcast but not yet polled would otherwise
        // miss the session; drain them so the tail of the take counts
        while let Ok(chunk) = samples_rx.try_recv() {
            if let Some(session) = d.session.as_mut() {
                d.utterance_samples += chunk.len();
                if let Err(e) = session.feed(&chunk) {
                    tracing::warn!("Session feed error: {}", e);
                    break;
                }
            }
        }

        if let Some(session) = d.session.take() {
            if self.settings.get().vad.enabled && !d.heard_speech {
                tracing::info!("No speech detected, discarding recording");
                self.logger
                    .info("dictation", "Recording discarded: no speech detected");
                self.clear_stale_partial(d).await;
            } else {
                self.finish_session(d, session).await;
            }
        }

        d.state = State::Idle;
        self.update_state("idle");
    }

    /// The endpoint detector closed an utterance mid-recording: finish
    /// the current session and open the next one
    async fn finalize_utterance(&self, d: &mut Dictation) {
        let Some(session) = d.session.take() else {
            return;
        };
        self.finish_session(d, session).await;

        if d.audio.is_running() {
            match d.engine.start_session() {
                Ok(session) => d.session = Some(session),
                Err(e) => tracing::error!("Failed to start next session: {}", e),
            }
            d.heard_speech = false;
            // An utterance boundary proves someone is dictating, so the
            // stuck-recording timeout starts over
            d.state = State::Recording {
                started_at: Instant::now(),
            };
            self.update_state("recording");
        }
    }

    /// Close a session and route whatever it recognized
    async fn finish_session(&self, d: &mut Dictation, session: Box<dyn StreamSession>) {
        let duration_secs = d.utterance_samples as f32 / 16000.0;
        d.utterance_samples = 0;
        d.state = State::Transcribing { duration_secs };
        self.update_state("transcribing");
        tracing::info!("Transcribing {:.1}s of audio...", duration_secs);

        let mut session = session;
        match tokio::task::spawn_blocking(move || session.finish()).await {
            Ok(Ok(Some(result))) => {
                let processed = self.text_processor.process(&result.text);
                if processed.is_empty() {
                    tracing::debug!("Transcription empty after processing");
                    self.clear_stale_partial(d).await;
                } else {
                    tracing::info!("Transcribed: {:?}", processed);
                    d.state = State::Outputting {
                        text: processed.clone(),
                    };
                    self.update_state("outputting");
                    self.deliver_final(d, &processed, result.confidence).await;
                }
            }
            Ok(Ok(None)) => {
                tracing::debug!("Utterance discarded (too short or nothing recognized)");
                self.clear_stale_partial(d).await;
            }
            Ok(Err(e)) => {
                tracing::error!("Transcription failed: {}", e);
                self.logger
                    .error("transcribe", format!("Transcription failed: {}", e));
                self.notifier.send("Transcription failed", &e.to_string()).await;
                self.clear_stale_partial(d).await;
            }
            Err(e) => {
                tracing::error!("Transcription task failed: {}", e);
            }
        }
    }

    /// Route a processed final result and surface the outcome
    async fn deliver_final(&self, d: &mut Dictation, text: &str, confidence: f32) {
        let result = TranscriptionResult::final_result(text, confidence);
        match d.router.process_transcription(&result).await {
            Ok(RouteOutcome::Committed { chars }) => {
                self.logger
                    .info("dictation", format!("Committed {} chars", chars));
                self.notifier
                    .send("Transcribed", &notification::preview(text, 120))
                    .await;
            }
            Ok(RouteOutcome::CopiedToClipboard { chars }) => {
                self.logger
                    .info("dictation", format!("Copied {} chars to clipboard", chars));
                self.notifier
                    .send("Copied to clipboard", &notification::preview(text, 120))
                    .await;
            }
            Ok(RouteOutcome::Buffered { entries }) => {
                self.logger
                    .info("dictation", format!("Buffered entry ({} pending)", entries));
                self.notifier
                    .send("Added to buffer", &format!("{} entries pending", entries))
                    .await;
            }
            Ok(RouteOutcome::ReplacedPartial { .. }) | Ok(RouteOutcome::DiscardedPartial) => {}
            Err(e) => {
                tracing::error!("Output failed: {}", e);
                self.logger.error("output", format!("Output failed: {}", e));
                self.notifier.send("Output failed", &e.to_string()).await;
            }
        }
    }

    /// A session can end with provisional text still in the field (the
    /// engine withdrew it); commit an empty final so it gets deleted
    async fn clear_stale_partial(&self, d: &mut Dictation) {
        if d.router.mode() == OutputMode::Direct && d.router.pending_partial_chars() > 0 {
            let empty = TranscriptionResult::final_result("", 1.0);
            if let Err(e) = d.router.process_transcription(&empty).await {
                tracing::warn!("Failed to clear stale partial text: {}", e);
            }
        }
    }

    /// Rebuild the speech engine if its settings drifted
    async fn refresh_engine(&self, d: &mut Dictation, config: &Config) {
        if config.engine == d.engine_cfg {
            return;
        }
        tracing::info!("Engine settings changed, reloading speech engine");
        let engine_config = config.clone();
        match tokio::task::spawn_blocking(move || {
            transcribe::create_engine_with_fallback(&engine_config)
        })
        .await
        {
            Ok(engine) => {
                d.engine = engine;
                d.engine_cfg = config.engine.clone();
                tracing::info!("Speech engine reloaded ({})", d.engine.name());
                self.logger.info(
                    "daemon",
                    format!("Speech engine reloaded ({})", d.engine.name()),
                );
            }
            Err(e) => tracing::error!("Engine reload task failed: {}", e),
        }
    }

    /// Probe the injectors and give the router a sink, or take it away
    /// when typing is unavailable
    async fn refresh_sink(&self, d: &mut Dictation, config: &Config) {
        if d.router.pending_partial_chars() > 0 {
            // swapping the sink now would lose the partial span tracking
            tracing::debug!("Deferring sink refresh, partial text pending");
            return;
        }

        let sink = InjectorSink::new(output::create_injectors(&config.output));
        if sink.any_available().await {
            if !d.router.has_sink() {
                tracing::info!("Text injection available");
            }
            d.router.set_sink(Some(Box::new(sink)));
        } else {
            if d.router.has_sink() {
                tracing::warn!("No text injector available, falling back to clipboard");
            }
            if !WlClipboard::is_available().await {
                tracing::warn!("wl-copy not found, direct output has nowhere to go");
            }
            d.router.set_sink(None);
        }
    }

    /// Push changed settings onto every component
    async fn apply_settings(&mut self, d: &mut Dictation, config: &Config) {
        self.text_processor = TextProcessor::new(&config.text);
        self.notifier.apply_config(&config.output.notification);
        if let Some(privacy) = &self.privacy {
            privacy.apply(config, &self.logger);
        } else {
            self.logger.set_verbosity(config.logging.level);
            self.logger.set_enabled(config.logging.file_enabled);
        }
        self.state_file_path = config.resolve_state_file();

        d.audio.update_config(&config.audio, &config.vad);
        d.router.set_output_mode(config.output.mode);
        d.router.apply_config(&config.output);
        self.refresh_sink(d, config).await;
        if d.state.is_idle() {
            self.refresh_engine(d, config).await;
        }
        tracing::debug!("Settings applied");
        self.logger.debug("daemon", "Settings reloaded and applied");
    }

    /// Answer one control socket request
    async fn handle_control(
        &self,
        d: &mut Dictation,
        samples_rx: &mut broadcast::Receiver<Vec<f32>>,
        request: ControlRequest,
    ) -> ControlResponse {
        let mut ok = true;
        let mut message = None;
        let mut buffer = None;

        match request {
            ControlRequest::RecordStart => {
                if d.state.is_idle() {
                    self.start_recording(d).await;
                    if !d.state.is_recording() {
                        ok = false;
                        message = Some("Failed to start recording (see daemon log)".to_string());
                    }
                } else {
                    message = Some("Already recording".to_string());
                }
            }
            ControlRequest::RecordStop => {
                if d.state.is_recording() {
                    self.stop_recording(d, samples_rx).await;
                } else {
                    message = Some("Not recording".to_string());
                }
            }
            ControlRequest::RecordToggle => {
                if d.state.is_idle() {
                    self.start_recording(d).await;
                    if !d.state.is_recording() {
                        ok = false;
                        message = Some("Failed to start recording (see daemon log)".to_string());
                    }
                } else if d.state.is_recording() {
                    self.stop_recording(d, samples_rx).await;
                } else {
                    ok = false;
                    message = Some(format!("Busy: {}", d.state));
                }
            }
            ControlRequest::PasteBuffer => match d.router.paste_buffer().await {
                Ok(PasteOutcome::Pasted { entries, chars }) => {
                    message = Some(format!("Pasted {} entries ({} chars)", entries, chars));
                    self.logger
                        .info("dictation", format!("Pasted {} buffered entries", entries));
                    self.notifier
                        .send("Buffer pasted", &format!("{} entries, {} chars", entries, chars))
                        .await;
                }
                Ok(PasteOutcome::CopiedToClipboard { chars }) => {
                    message = Some(format!(
                        "Typing failed, buffer copied to clipboard ({} chars)",
                        chars
                    ));
                    self.notifier
                        .send("Buffer copied to clipboard", "Typing was unavailable")
                        .await;
                }
                Ok(PasteOutcome::EmptyBuffer) => {
                    message = Some("Buffer is empty".to_string());
                }
                Ok(PasteOutcome::DirectMode) => {
                    ok = false;
                    message = Some(
                        "Paste works in buffered mode (switch with: voxkey mode buffered)"
                            .to_string(),
                    );
                }
                Err(e) => {
                    ok = false;
                    message = Some(e.to_string());
                }
            },
            ControlRequest::ClearBuffer => {
                let removed = d.router.clear_buffer();
                message = Some(format!("Cleared {} entries", removed));
            }
            ControlRequest::AddToBuffer { text, source } => {
                let entries = d.router.add_to_buffer(&text, source);
                message = Some(format!("Added ({} entries)", entries));
            }
            ControlRequest::ShowBuffer => {
                let listing: Vec<String> = d
                    .router
                    .entries()
                    .iter()
                    .map(|e| {
                        format!("[{}] ({}) {}", e.timestamp.format("%H:%M:%S"), e.source, e.text)
                    })
                    .collect();
                buffer = Some(listing.join("\n"));
            }
            ControlRequest::SetMode { mode } => {
                d.router.set_output_mode(mode);
                match self.settings.update(|c| c.output.mode = mode) {
                    Ok(_) => message = Some(format!("Output mode: {}", mode)),
                    Err(e) => {
                        ok = false;
                        message = Some(format!("Mode changed but not persisted: {}", e));
                    }
                }
            }
            ControlRequest::Status => {
                message = Some(format!("engine {}", d.engine.name()));
            }
        }

        ControlResponse {
            ok,
            state: d.state.as_tag().to_string(),
            mode: d.router.mode().to_string(),
            entries: d.router.entry_count(),
            level: d
                .state
                .is_recording()
                .then(|| *d.audio.level().borrow()),
            message,
            buffer,
        }
    }
}
