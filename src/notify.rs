//! User-facing upload notifications.
//!
//! The upload context emits a transient "toast" when a file finishes
//! processing or is refused by the validation gate. Toasts are keyed by
//! filename and never persisted. Human and JSON toasts go to **stderr** so
//! stdout stays parseable for scripts.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

/// A single toast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A record reached `completed`.
    UploadSucceeded { id: String, name: String },
    /// A file was refused before it became a record.
    Rejected { name: String, message: String },
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Notification::UploadSucceeded { name, .. } => {
                format!("{} uploaded successfully!", name)
            }
            Notification::Rejected { message, .. } => message.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notification::Rejected { .. })
    }
}

/// Receives toasts from the upload context.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Human-friendly toasts on stderr: "✓ report.pdf uploaded successfully!".
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        let mark = if notification.is_error() { "✗" } else { "✓" };
        let line = format!("{} {}\n", mark, notification.message());
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable toasts: one JSON object per line on stderr.
pub struct JsonNotifier;

impl Notifier for JsonNotifier {
    fn notify(&self, notification: Notification) {
        let obj = serde_json::json!({
            "event": "notification",
            "level": if notification.is_error() { "error" } else { "success" },
            "message": notification.message(),
            "detail": notification,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op notifier when toasts are disabled.
pub struct NoNotifier;

impl Notifier for NoNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Keeps the most recent toasts in memory until drained.
///
/// Used by the HTTP server, where a client polls for pending toasts.
pub struct QueueNotifier {
    capacity: usize,
    pending: Mutex<VecDeque<Notification>>,
}

impl QueueNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Removes and returns every pending toast, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Notifier for QueueNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut pending) = self.pending.lock() {
            if pending.len() == self.capacity {
                pending.pop_front();
            }
            pending.push_back(notification);
        }
    }
}

/// Notification mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotifyMode {
    Off,
    Human,
    Json,
}

impl NotifyMode {
    /// Default: human toasts when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            NotifyMode::Human
        } else {
            NotifyMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(NotifyMode::Off),
            "human" => Some(NotifyMode::Human),
            "json" => Some(NotifyMode::Json),
            _ => None,
        }
    }

    /// Build a notifier for this mode.
    pub fn notifier(&self) -> Box<dyn Notifier> {
        match self {
            NotifyMode::Off => Box::new(NoNotifier),
            NotifyMode::Human => Box::new(StderrNotifier),
            NotifyMode::Json => Box::new(JsonNotifier),
        }
    }
}
