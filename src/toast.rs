//! Transient user-facing messages.

use std::fmt;

use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl fmt::Display for Toast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self.level {
            ToastLevel::Success => "✓",
            ToastLevel::Error => "✗",
        };
        write!(f, "[{}] {}", mark, self.message)
    }
}

/// Fan-out of toasts to whoever is displaying them.
#[derive(Clone)]
pub struct Toaster {
    sender: broadcast::Sender<Toast>,
}

impl Default for Toaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Toaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        info!(toast = %message, "Toast");
        self.show(Toast { level: ToastLevel::Success, message });
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(toast = %message, "Toast");
        self.show(Toast { level: ToastLevel::Error, message });
    }

    fn show(&self, toast: Toast) {
        // Nobody watching is fine; the toast was logged.
        let _ = self.sender.send(toast);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.sender.subscribe()
    }
}
