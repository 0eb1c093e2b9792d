//! Clipboard access via wl-copy
//!
//! The clipboard is the universal fallback: it works on every Wayland
//! compositor, needs no daemon, and never depends on which window has
//! focus.
//!
//! Requires: wl-clipboard package installed

use crate::error::OutputError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Something that can place text on the system clipboard
///
/// A trait so the router can be tested without touching the real
/// clipboard.
#[async_trait::async_trait]
pub trait Clipboard: Send + Sync {
    async fn copy(&self, text: &str) -> Result<(), OutputError>;
}

/// Wayland clipboard via the wl-copy binary
pub struct WlClipboard;

#[async_trait::async_trait]
impl Clipboard for WlClipboard {
    async fn copy(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        // Spawn wl-copy with stdin pipe
        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::WlCopyNotFound
                } else {
                    OutputError::InjectionFailed(e.to_string())
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| OutputError::InjectionFailed(e.to_string()))?;

            // Close stdin to signal EOF
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| OutputError::InjectionFailed(e.to_string()))?;

        if !status.success() {
            return Err(OutputError::InjectionFailed(
                "wl-copy exited with error".to_string(),
            ));
        }

        tracing::debug!("Text copied to clipboard ({} chars)", text.chars().count());
        Ok(())
    }
}

impl WlClipboard {
    pub async fn is_available() -> bool {
        Command::new("which")
            .arg("wl-copy")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
