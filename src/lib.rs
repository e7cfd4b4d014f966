//! Basie - Incremental Audio Bank Build Pipeline
//!
//! Transcodes a tree of source audio files into compressed, web-deliverable
//! banks, skipping whatever has not changed since the previous run.
//!
//! Hexagonal Architecture:
//! - domain/: Pure logic (wave container parsing, bank records)
//! - ports/: Trait definitions (external encoder)
//! - adapters/: Concrete implementations (ffmpeg, filesystem)
//! - application/: Services (fingerprinting, cache index, governor, driver)
//! - config: Run configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use adapters::ffmpeg::FfmpegEncoder;
pub use application::pipeline::PipelineService;
pub use config::{EncodeConfig, RunFlags};
pub use error::PipelineError;
