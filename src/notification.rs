//! Desktop notifications via notify-send
//!
//! Notifications are best-effort: failures are logged at debug level
//! and never propagate. The daemon uses them to surface what happened
//! to dictated text (typed, buffered, copied to clipboard).

use crate::config::NotificationConfig;
use std::process::Stdio;
use tokio::process::Command;

pub struct Notifier {
    enabled: bool,
    timeout_ms: u32,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            timeout_ms: config.timeout_ms,
        }
    }

    pub fn apply_config(&mut self, config: &NotificationConfig) {
        self.enabled = config.enabled;
        self.timeout_ms = config.timeout_ms;
    }

    /// Send a notification, if enabled
    pub async fn send(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }

        let result = Command::new("notify-send")
            .args([
                "--app-name=voxkey",
                &format!("--expire-time={}", self.timeout_ms),
                title,
                body,
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Err(e) = result {
            tracing::debug!("Failed to send notification: {}", e);
        }
    }
}

/// Shorten text for a notification body
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_does_nothing() {
        let notifier = Notifier::new(&NotificationConfig {
            enabled: false,
            timeout_ms: 2000,
        });
        // Must not spawn notify-send, so this passes on headless hosts
        notifier.send("Title", "Body").await;
    }

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("exactly ten", 11), "exactly ten");
        assert_eq!(preview("hello world", 5), "hello...");
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        // Slicing bytes here would split the final codepoint
        assert_eq!(preview("héllö wörld", 5), "héllö...");
    }
}
