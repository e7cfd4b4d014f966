//! Run configuration: the bank definitions and the flags of one build.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Sentinel entry in `localization` meaning "discover every subdirectory of
/// the group as a language".
pub const LOCALIZATION_WILDCARD: &str = "*";

/// Encoding settings shared by all files of one media group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaGroup {
    /// Mono (1) or stereo (2)
    pub channels: u16,
    /// Target bitrate in kbit/s
    pub bitrate: u32,
    /// Language directory names, or a single `"*"` to discover them
    #[serde(default)]
    pub localization: Vec<String>,
}

/// One bank definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// URL-style prefix prepended to every record's load path
    pub base: String,
    /// Source directory of this project's audio files
    pub rootdir: PathBuf,
    /// Output directory of this project's encoded files
    pub outdir: PathBuf,
    /// Media groups keyed by group name
    pub media: BTreeMap<String, MediaGroup>,
    /// Name of a project whose records this one inherits and may override
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub default_language: String,
}

/// Top-level configuration, immutable for the duration of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Pipeline name, written into the run summary
    pub name: String,
    /// Cache directory holding the fingerprint index and assembled banks
    pub cache: PathBuf,
    /// Bank definitions keyed by project name
    pub banks: BTreeMap<String, ProjectConfig>,
    /// Global source root, fingerprinted as a whole for the fast path
    pub rootdir: PathBuf,
    /// Global output root the assembled banks are copied onto
    pub outdir: PathBuf,
    /// Also produce the legacy compressed format for every file
    #[serde(default)]
    pub legacy_support: bool,
    /// Concurrent encoder invocations; defaults to half the host parallelism
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl EncodeConfig {
    /// Load and validate a JSON configuration file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: EncodeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation: channel counts must be mono or stereo and
    /// every `extends` must resolve to an existing project without cycles.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (project_name, project) in &self.banks {
            for (group_name, group) in &project.media {
                if group.channels != 1 && group.channels != 2 {
                    return Err(PipelineError::Config(format!(
                        "group '{}/{}' has {} channels, expected 1 or 2",
                        project_name, group_name, group.channels
                    )));
                }
            }

            let mut visited = BTreeSet::new();
            visited.insert(project_name.as_str());
            let mut current = project;
            while let Some(extends) = &current.extends {
                let target = self.banks.get(extends).ok_or_else(|| {
                    PipelineError::Config(format!(
                        "project '{}' extends unknown project '{}'",
                        project_name, extends
                    ))
                })?;
                if !visited.insert(extends.as_str()) {
                    return Err(PipelineError::Config(format!(
                        "cyclic extends chain through project '{}'",
                        extends
                    )));
                }
                current = target;
            }
        }
        Ok(())
    }

    /// Project processing order with base projects ahead of the projects
    /// extending them, so a base's assembled records are always on disk
    /// before an extender asks for them.
    pub fn processing_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::with_capacity(self.banks.len());
        let mut remaining: Vec<&str> = self.banks.keys().map(String::as_str).collect();
        while !remaining.is_empty() {
            let before = order.len();
            remaining.retain(|&name| {
                let ready = match &self.banks[name].extends {
                    Some(base) => order.iter().any(|done| *done == base.as_str()),
                    None => true,
                };
                if ready {
                    order.push(name);
                }
                !ready
            });
            if order.len() == before {
                // validate() rejects cycles, so every round makes progress;
                // flush whatever is left rather than spin.
                order.append(&mut remaining);
            }
        }
        order
    }
}

/// Flags of one run, mapped from the CLI switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    /// Ignore every cache decision, clear the cache tree and rebuild
    pub force: bool,
    /// Delete the output tree before doing anything else
    pub clean: bool,
    /// With `clean`: continue building after the output tree was removed
    pub build: bool,
    /// Delete the cache tree before running
    pub clean_cache: bool,
    /// Verbose diagnostics; also relaxes the encoder's log level
    pub verbose: bool,
}

impl RunFlags {
    pub fn from_args(args: &[String]) -> Self {
        let has = |flag: &str| args.iter().any(|arg| arg == flag);
        Self {
            force: has("--force"),
            clean: has("--clean"),
            build: has("--build"),
            clean_cache: has("--clean-cache"),
            verbose: has("--verbose"),
        }
    }
}
