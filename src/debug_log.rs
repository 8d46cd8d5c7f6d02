use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Append-only, human-readable diagnostics log.
///
/// Every line is also forwarded to `tracing`, so the same text shows up on the
/// standard log stream when a subscriber is installed. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct DebugLog {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(target: "docsnap::debug", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "docsnap::debug", "{}", message),
            LogLevel::Error => tracing::error!(target: "docsnap::debug", "{}", message),
        }
        self.lines.lock().unwrap().push((level, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Lines logged at `level`.
    pub fn lines_at(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}
