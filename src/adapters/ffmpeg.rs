//! ffmpeg adapter for the encoder port.

use crate::ports::encoder::{AudioCodec, EncodeJob, EncoderPort};
use async_trait::async_trait;
use std::io;
use std::process::Output;
use tokio::process::Command as TokioCommand;

#[derive(Clone, Copy)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn build_args(job: &EncodeJob) -> Vec<String> {
    let loglevel = if job.verbose { "verbose" } else { "warning" };

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-strict".into(),
        "very".into(),
        "-loglevel".into(),
        loglevel.into(),
        "-i".into(),
        job.input.to_string_lossy().into_owned(),
    ];

    match job.codec {
        AudioCodec::Opus => {
            args.extend([
                "-c:a".into(),
                "libopus".into(),
                "-b:a".into(),
                format!("{}k", job.bitrate),
                "-vbr".into(),
                "constrained".into(),
            ]);
        }
        AudioCodec::Aac => {
            args.extend([
                "-c:a".into(),
                "aac".into(),
                "-movflags".into(),
                "faststart".into(),
                "-b:a".into(),
                format!("{}k", job.bitrate),
            ]);
        }
    }

    args.extend([
        "-ac".into(),
        job.channels.to_string(),
        "-ar".into(),
        job.sample_rate.to_string(),
    ]);

    if job.gain_db != 0 {
        args.extend(["-filter:a".into(), format!("volume={}dB", job.gain_db)]);
    }

    args.extend(["-y".into(), job.output.to_string_lossy().into_owned()]);
    args
}

#[async_trait]
impl EncoderPort for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> io::Result<Output> {
        TokioCommand::new("ffmpeg")
            .args(build_args(job))
            .output()
            .await
    }
}
