//! Error types for the bank build pipeline.

use crate::domain::wave::WaveError;
use std::fmt;
use std::path::PathBuf;

/// Fatal pipeline errors. Anything that surfaces here aborts the run before
/// the fingerprint index is promoted.
#[derive(Debug)]
pub enum PipelineError {
    /// Malformed configuration: bad channel count, dangling or cyclic
    /// `extends` reference, missing assembled records for a base project.
    Config(String),
    /// A source audio file failed container parsing.
    Wave { path: PathBuf, source: WaveError },
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// An encoder job task panicked or was cancelled.
    Join(tokio::task::JoinError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Wave { path, source } => {
                write!(f, "Malformed source file {}: {}", path.display(), source)
            }
            PipelineError::Io(e) => write!(f, "I/O error: {}", e),
            PipelineError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PipelineError::Join(e) => write!(f, "Job task error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Config(_) => None,
            PipelineError::Wave { source, .. } => Some(source),
            PipelineError::Io(e) => Some(e),
            PipelineError::Serialization(e) => Some(e),
            PipelineError::Join(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err)
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Join(err)
    }
}
