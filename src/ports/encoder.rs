use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Output;

/// Compressed formats the pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// Primary format: Opus in WebM
    Opus,
    /// Legacy fallback: AAC in MP4
    Aac,
}

impl AudioCodec {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "webm",
            AudioCodec::Aac => "mp4",
        }
    }
}

/// One external-encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub codec: AudioCodec,
    /// Target bitrate in kbit/s
    pub bitrate: u32,
    pub channels: u16,
    pub sample_rate: u32,
    /// Gain filter in dB; 0 means no filter
    pub gain_db: i32,
    /// Relax the encoder's own log level
    pub verbose: bool,
}

/// Seam to the external encoder process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderPort: Send + Sync {
    async fn encode(&self, job: &EncodeJob) -> io::Result<Output>;
}
