//! ydotool-based keystroke injection
//!
//! Uses ydotool to simulate keyboard input. This works on all Wayland
//! compositors (and X11 and the TTY) because ydotool uses the uinput
//! kernel interface.
//!
//! Requires:
//! - ydotool installed
//! - ydotoold daemon running (systemctl --user start ydotool)
//! - User in 'input' group

use super::TextInjector;
use crate::error::OutputError;
use std::process::Stdio;
use tokio::process::Command;

/// Linux input event code for the backspace key
const KEY_BACKSPACE: u8 = 14;

/// ydotool-based keystroke injector
pub struct YdotoolInjector {
    /// Delay between keypresses in milliseconds
    delay_ms: u32,
}

impl YdotoolInjector {
    pub fn new(delay_ms: u32) -> Self {
        Self { delay_ms }
    }

    async fn run(&self, cmd: &mut Command) -> Result<(), OutputError> {
        let output = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::YdotoolNotFound
                } else {
                    OutputError::InjectionFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            // Check for common errors
            if stderr.contains("socket") || stderr.contains("connect") || stderr.contains("daemon")
            {
                return Err(OutputError::YdotoolNotRunning);
            }

            return Err(OutputError::InjectionFailed(stderr.to_string()));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl TextInjector for YdotoolInjector {
    async fn type_text(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        let mut cmd = Command::new("ydotool");
        cmd.arg("type");

        if self.delay_ms > 0 {
            cmd.arg("--key-delay").arg(self.delay_ms.to_string());
            cmd.arg("--key-hold").arg(self.delay_ms.to_string());
        }

        // The -- ensures text starting with - isn't treated as an option
        cmd.arg("--").arg(text);

        self.run(&mut cmd).await
    }

    async fn delete_chars(&self, count: usize) -> Result<(), OutputError> {
        if count == 0 {
            return Ok(());
        }

        // `ydotool key` takes keycode:state pairs; 1 = press, 0 = release
        let mut cmd = Command::new("ydotool");
        cmd.arg("key");
        if self.delay_ms > 0 {
            cmd.arg("--key-delay").arg(self.delay_ms.to_string());
        }
        for _ in 0..count {
            cmd.arg(format!("{}:1", KEY_BACKSPACE));
            cmd.arg(format!("{}:0", KEY_BACKSPACE));
        }

        self.run(&mut cmd).await
    }

    async fn is_available(&self) -> bool {
        // Check if ydotool exists in PATH
        let which_result = Command::new("which")
            .arg("ydotool")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if !which_result.map(|s| s.success()).unwrap_or(false) {
            return false;
        }

        // Check if ydotoold is running by trying a no-op.
        // ydotool type "" should succeed quickly if the daemon is up.
        Command::new("ydotool")
            .args(["type", ""])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "ydotool"
    }
}
