//! Daemon control socket
//!
//! Newline-delimited JSON over a Unix socket in the runtime directory.
//! CLI subcommands connect, send one request per line, and read one
//! response per line. The server forwards every request to the daemon
//! event loop over a channel, so all state changes happen on the loop
//! and connections never race each other.

use crate::config::{Config, OutputMode};
use crate::error::{Result, VoxkeyError};
use crate::output::EntrySource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

/// Requests the CLI can send to a running daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlRequest {
    RecordStart,
    RecordStop,
    RecordToggle,
    PasteBuffer,
    ClearBuffer,
    AddToBuffer { text: String, source: EntrySource },
    ShowBuffer,
    SetMode { mode: OutputMode },
    Status,
}

/// Response to a control request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    pub state: String,
    pub mode: String,
    pub entries: usize,
    /// Smoothed input level (0.0 - 1.0), present while recording
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,
}

impl ControlResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            state: String::new(),
            mode: String::new(),
            entries: 0,
            level: None,
            message: Some(message.into()),
            buffer: None,
        }
    }
}

/// A request paired with the channel its response goes back on
pub struct ControlCommand {
    pub request: ControlRequest,
    pub reply: oneshot::Sender<ControlResponse>,
}

/// Running control socket listener
pub struct ControlServer {
    path: PathBuf,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ControlServer {
    /// Bind the control socket and start accepting connections.
    ///
    /// Requests are forwarded to `commands`; the daemon event loop is
    /// expected to drain that channel and answer each reply sender.
    pub fn start(path: PathBuf, commands: mpsc::Sender<ControlCommand>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // A previous daemon that crashed leaves the socket file behind
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| {
            VoxkeyError::Control(format!("Failed to bind {}: {}", path.display(), e))
        })?;
        tracing::debug!("Control socket listening on {}", path.display());

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let commands = commands.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, commands).await {
                                        tracing::debug!("Control connection error: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::warn!("Control socket accept failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            path,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    /// Stop accepting connections and remove the socket file
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Control server task join error: {}", e);
        }
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove control socket: {}", e);
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    commands: mpsc::Sender<ControlCommand>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let command = ControlCommand {
                    request,
                    reply: reply_tx,
                };
                if commands.send(command).await.is_err() {
                    ControlResponse::error("Daemon is shutting down")
                } else {
                    match reply_rx.await {
                        Ok(response) => response,
                        Err(_) => ControlResponse::error("Daemon dropped the request"),
                    }
                }
            }
            Err(e) => ControlResponse::error(format!("Invalid request: {}", e)),
        };

        let mut payload = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
        payload.push(b'\n');
        write_half.write_all(&payload).await?;
        write_half.flush().await?;
    }

    Ok(())
}

/// Send one request to the daemon at the default socket path
pub async fn send_request(request: &ControlRequest) -> Result<ControlResponse> {
    send_request_to(&Config::control_socket_path(), request).await
}

/// Send one request to the daemon at a specific socket path
pub async fn send_request_to(path: &Path, request: &ControlRequest) -> Result<ControlResponse> {
    let stream = UnixStream::connect(path).await.map_err(|e| {
        VoxkeyError::Control(format!(
            "Cannot reach the daemon at {}: {}\nIs the daemon running? Start it with: voxkey run",
            path.display(),
            e
        ))
    })?;
    let (read_half, mut write_half) = stream.into_split();

    let mut payload = serde_json::to_vec(request)
        .map_err(|e| VoxkeyError::Control(format!("Failed to encode request: {}", e)))?;
    payload.push(b'\n');
    write_half
        .write_all(&payload)
        .await
        .map_err(|e| VoxkeyError::Control(format!("Failed to send request: {}", e)))?;
    write_half
        .flush()
        .await
        .map_err(|e| VoxkeyError::Control(format!("Failed to send request: {}", e)))?;

    let mut lines = BufReader::new(read_half).lines();
    let line = lines
        .next_line()
        .await
        .map_err(|e| VoxkeyError::Control(format!("Failed to read response: {}", e)))?
        .ok_or_else(|| VoxkeyError::Control("Daemon closed the connection".to_string()))?;

    serde_json::from_str(&line)
        .map_err(|e| VoxkeyError::Control(format!("Invalid response from daemon: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&ControlRequest::RecordStart).unwrap();
        assert_eq!(json, r#"{"cmd":"record_start"}"#);

        let json = serde_json::to_string(&ControlRequest::SetMode {
            mode: OutputMode::Buffered,
        })
        .unwrap();
        assert_eq!(json, r#"{"cmd":"set_mode","mode":"buffered"}"#);

        let json = serde_json::to_string(&ControlRequest::AddToBuffer {
            text: "note to self".to_string(),
            source: EntrySource::Manual,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"cmd":"add_to_buffer","text":"note to self","source":"manual"}"#
        );
    }

    #[test]
    fn test_request_parses_from_wire() {
        let request: ControlRequest =
            serde_json::from_str(r#"{"cmd":"paste_buffer"}"#).unwrap();
        assert_eq!(request, ControlRequest::PasteBuffer);

        let request: ControlRequest =
            serde_json::from_str(r#"{"cmd":"set_mode","mode":"direct"}"#).unwrap();
        assert_eq!(
            request,
            ControlRequest::SetMode {
                mode: OutputMode::Direct
            }
        );
    }

    #[test]
    fn test_response_omits_empty_optionals() {
        let response = ControlResponse {
            ok: true,
            state: "idle".to_string(),
            mode: "direct".to_string(),
            entries: 0,
            level: None,
            message: None,
            buffer: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("level"));
        assert!(!json.contains("message"));
        assert!(!json.contains("buffer"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("control.sock");

        let (tx, mut rx) = mpsc::channel::<ControlCommand>(8);
        let server = ControlServer::start(socket_path.clone(), tx).unwrap();

        // Stand-in for the daemon loop: answer every request with a
        // canned status
        let responder = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let response = ControlResponse {
                    ok: true,
                    state: "idle".to_string(),
                    mode: "buffered".to_string(),
                    entries: 3,
                    level: None,
                    message: None,
                    buffer: match command.request {
                        ControlRequest::ShowBuffer => Some("hello world".to_string()),
                        _ => None,
                    },
                };
                let _ = command.reply.send(response);
            }
        });

        let status = send_request_to(&socket_path, &ControlRequest::Status)
            .await
            .unwrap();
        assert!(status.ok);
        assert_eq!(status.state, "idle");
        assert_eq!(status.entries, 3);
        assert!(status.buffer.is_none());

        let show = send_request_to(&socket_path, &ControlRequest::ShowBuffer)
            .await
            .unwrap();
        assert_eq!(show.buffer.as_deref(), Some("hello world"));

        server.shutdown().await;
        responder.abort();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_connect_without_daemon_fails_with_hint() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("missing.sock");

        let err = send_request_to(&socket_path, &ControlRequest::Status)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Is the daemon running?"));
    }
}
