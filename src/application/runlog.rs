//! Run log context: owned by the pipeline driver, shared with encoder
//! jobs, flushed once to `<cache>/.logs.log` at the end of a run.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

/// Cloning shares the same underlying log.
#[derive(Clone, Default)]
pub struct RunLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: &str, message: String) {
        let mut entries = self.entries.lock().expect("run log poisoned");
        entries.push(LogEntry {
            level: level.to_string(),
            message,
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}", message);
        self.push("debug", message);
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.push("log", message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.push("warn", message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.push("error", message);
    }

    /// Encoder chatter on its error stream; recorded, never fatal.
    pub fn encoder(&self, output: &Path, stderr: &str) {
        tracing::debug!(output = %output.display(), "encoder stderr: {}", stderr.trim_end());
        self.push("ffmpeg", format!("{}: {}", output.display(), stderr.trim_end()));
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().expect("run log poisoned").clone()
    }

    pub async fn flush_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(path, content).await
    }
}
