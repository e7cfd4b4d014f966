//! The pipeline driver: crawl, decide cache validity top-down, dispatch
//! bounded encoder jobs for whatever was invalidated, assemble banks and
//! promote the new fingerprint index.

use crate::adapters::fs::{copy_dir_recursive, copy_file, list_subdirectories, remove_tree};
use crate::application::cache::{load_base_records, load_cached_records, CacheIndex, CacheLayout};
use crate::application::fingerprint::{self, is_audio_file, path_key, TreeFingerprint};
use crate::application::governor::Governor;
use crate::application::runlog::RunLog;
use crate::config::{EncodeConfig, MediaGroup, ProjectConfig, RunFlags, LOCALIZATION_WILDCARD};
use crate::domain::bank::{assemble_bank, hash_bytes, merge_extends, upsert_record, MediaRecord};
use crate::domain::wave::parse_wave;
use crate::error::PipelineError;
use crate::ports::encoder::{AudioCodec, EncodeJob, EncoderPort};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every asset is resampled to this rate, independent of its source rate.
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Headroom applied when the source channel layout differs from the
/// target, so downmixing cannot clip.
pub const CHANNEL_MISMATCH_GAIN_DB: i32 = -3;

/// Run summary written to `<cache>/banks/project.json`.
#[derive(Serialize)]
struct RunSummary<'a> {
    name: &'a str,
    banks: Vec<&'a String>,
}

pub struct PipelineService<E> {
    config: EncodeConfig,
    flags: RunFlags,
    encoder: Arc<E>,
    governor: Governor,
    log: RunLog,
}

impl<E: EncoderPort + 'static> PipelineService<E> {
    pub fn new(config: EncodeConfig, flags: RunFlags, encoder: E) -> Result<Self, PipelineError> {
        config.validate()?;
        let governor = Governor::with_limit(config.concurrency);
        Ok(Self {
            config,
            flags,
            encoder: Arc::new(encoder),
            governor,
            log: RunLog::new(),
        })
    }

    /// The explicit logging context of this run; flushed to the cache's
    /// log file at the end of a successful build.
    pub fn run_log(&self) -> &RunLog {
        &self.log
    }

    pub async fn run(&self) -> Result<(), PipelineError> {
        let layout = CacheLayout::new(&self.config.cache);
        self.log
            .debug(format!("using concurrency {}", self.governor.limit()));

        if self.flags.clean_cache {
            self.log.info("cleaning cache");
            remove_tree(layout.root()).await?;
        }
        if self.flags.force {
            self.log.info("forcing rebuild");
            remove_tree(layout.root()).await?;
        }
        if self.flags.clean {
            self.log.info("cleaning output");
            remove_tree(&self.config.outdir).await?;
            if !self.flags.build {
                return Ok(());
            }
        }

        let cached = CacheIndex::load(&layout.hashes_file()).await;
        // one snapshot up front; every cache decision of this run is made
        // against this tree state
        let tree = fingerprint::crawl(&self.config.rootdir).await?;

        let root_key = path_key(&self.config.rootdir);
        if !self.flags.force && cached.matches(&root_key, &tree.root) {
            self.log.info("source tree unchanged, reusing previous output");
            copy_dir_recursive(&layout.banks_dir(), &self.config.outdir).await?;
            return Ok(());
        }

        for name in self.config.processing_order() {
            let project = &self.config.banks[name];
            self.process_project(name, project, &layout, &tree, &cached)
                .await?;
        }

        let summary = RunSummary {
            name: &self.config.name,
            banks: self.config.banks.keys().collect(),
        };
        write_json_pretty(&layout.summary_file(), &summary).await?;
        self.log.flush_to(&layout.log_file()).await?;
        copy_dir_recursive(&layout.banks_dir(), &self.config.outdir).await?;
        // promoted last: a failed run must not poison the next run's
        // cache decisions
        CacheIndex::persist(&layout.hashes_file(), &tree.entries).await?;
        Ok(())
    }

    async fn process_project(
        &self,
        name: &str,
        project: &ProjectConfig,
        layout: &CacheLayout,
        tree: &TreeFingerprint,
        cached: &CacheIndex,
    ) -> Result<(), PipelineError> {
        self.log.info(format!("processing project {}", name));
        let cache_dir = layout.project_dir(name);
        let srcdir_key = path_key(&project.rootdir);

        let unchanged = !self.flags.force
            && matches!(tree.get(&srcdir_key), Some(fresh) if cached.matches(&srcdir_key, fresh));
        if unchanged {
            self.log.debug(format!("project {} cached", name));
            copy_dir_recursive(&cache_dir, &project.outdir).await?;
            return Ok(());
        }

        let mut records = load_cached_records(&layout.media_file(name)).await;
        tokio::fs::create_dir_all(&cache_dir).await?;

        let mut languages_seen: Vec<String> = Vec::new();
        for (group_name, group) in &project.media {
            let languages = group_languages(project, group_name, group).await?;
            for language in &languages {
                if !languages_seen.contains(language) {
                    languages_seen.push(language.clone());
                }
            }
            for language in &languages {
                self.process_directory(
                    name,
                    project,
                    group_name,
                    group,
                    language,
                    layout,
                    tree,
                    cached,
                    &mut records,
                )
                .await?;
            }
        }

        if let Some(base_name) = &project.extends {
            let base_records = load_base_records(&layout.media_file(base_name))
                .await
                .map_err(|e| {
                    PipelineError::Config(format!(
                        "project '{}' extends '{}' but its assembled records are unavailable: {}",
                        name, base_name, e
                    ))
                })?;
            merge_extends(&mut records, base_records);
        }

        let groups: Vec<String> = project.media.keys().cloned().collect();
        let bank = assemble_bank(
            name,
            &project.base,
            &srcdir_key,
            groups,
            languages_seen,
            records,
        )?;

        write_json_pretty(&layout.media_file(name), &bank.media).await?;
        write_json_pretty(&layout.bank_file(name), &bank).await?;
        write_json_compact(&layout.bank_min_file(name), &bank).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_directory(
        &self,
        project_name: &str,
        project: &ProjectConfig,
        group_name: &str,
        group: &MediaGroup,
        language: &str,
        layout: &CacheLayout,
        tree: &TreeFingerprint,
        cached: &CacheIndex,
        records: &mut Vec<MediaRecord>,
    ) -> Result<(), PipelineError> {
        let relative = if language.is_empty() {
            group_name.to_string()
        } else {
            format!("{}/{}", group_name, language)
        };
        let indir = project.rootdir.join(&relative);
        let targetdir = project.outdir.join(&relative);
        let cachedir = layout.project_dir(project_name).join(&relative);
        let indir_key = path_key(&indir);

        let fresh = match tree.get(&indir_key) {
            // directory absent from the snapshot: nothing to scan, reuse
            // whatever the previous run produced
            None => {
                if tokio::fs::try_exists(&cachedir).await? {
                    copy_dir_recursive(&cachedir, &targetdir).await?;
                }
                return Ok(());
            }
            Some(fresh) => fresh,
        };

        if !self.flags.force && cached.matches(&indir_key, fresh) {
            if tokio::fs::try_exists(&cachedir).await? {
                copy_dir_recursive(&cachedir, &targetdir).await?;
                return Ok(());
            }
            self.log.warn(format!(
                "cache is missing output for unchanged directory {}, rescanning",
                indir_key
            ));
        }

        tokio::fs::create_dir_all(&cachedir).await?;

        let mut file_names = Vec::new();
        let mut listing = tokio::fs::read_dir(&indir).await?;
        while let Some(entry) = listing.next_entry().await? {
            if entry.file_type().await?.is_file() && is_audio_file(&entry.path()) {
                file_names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        file_names.sort();

        // a deleted source must not survive in the assembled bank
        let present: Vec<String> = file_names
            .iter()
            .map(|file_name| path_key(&indir.join(file_name)))
            .collect();
        records.retain(|record| {
            let direct_child = Path::new(&record.srcpath).parent() == Some(indir.as_path());
            !direct_child || present.contains(&record.srcpath)
        });

        let mut handles: Vec<tokio::task::JoinHandle<Result<Option<MediaRecord>, PipelineError>>> =
            Vec::new();
        for file_name in file_names {
            let infile = indir.join(&file_name);
            let srcpath = path_key(&infile);
            let name = match Path::new(&file_name).file_stem() {
                Some(stem) => stem.to_string_lossy().into_owned(),
                None => continue,
            };
            let primary_name = format!("{}.{}", name, AudioCodec::Opus.extension());
            let legacy_name = format!("{}.{}", name, AudioCodec::Aac.extension());
            let outfile = targetdir.join(&primary_name);
            let cached_primary = cachedir.join(&primary_name);
            let cached_legacy = cachedir.join(&legacy_name);

            let unchanged = !self.flags.force
                && matches!(tree.get(&srcpath), Some(fp) if cached.matches(&srcpath, fp));
            if unchanged {
                if records.iter().any(|record| record.srcpath == srcpath) {
                    let legacy = self.config.legacy_support;
                    let legacy_out = targetdir.join(&legacy_name);
                    handles.push(tokio::spawn(async move {
                        copy_file(&cached_primary, &outfile).await?;
                        if legacy && tokio::fs::try_exists(&cached_legacy).await? {
                            copy_file(&cached_legacy, &legacy_out).await?;
                        }
                        Ok::<_, PipelineError>(None)
                    }));
                    continue;
                }
                self.log.warn(format!(
                    "unchanged file {} has no cached record, reprocessing",
                    srcpath
                ));
            }

            let job = FileJob {
                infile,
                srcpath,
                name,
                primary_output: cached_primary,
                legacy_output: cached_legacy,
                loadpath: join_load_path(&project.base, &relative, &primary_name),
                base: project.base.clone(),
                group: group_name.to_string(),
                language: language.to_string(),
                channels: group.channels,
                bitrate: group.bitrate,
                legacy_support: self.config.legacy_support,
                verbose: self.flags.verbose,
            };
            let encoder = Arc::clone(&self.encoder);
            let governor = self.governor.clone();
            let log = self.log.clone();
            handles.push(tokio::spawn(async move {
                process_file(encoder, governor, log, job).await.map(Some)
            }));
        }

        // every job of this directory completes before the driver moves on
        for joined in futures::future::join_all(handles).await {
            if let Some(record) = joined?? {
                upsert_record(records, record);
            }
        }
        Ok(())
    }
}

async fn group_languages(
    project: &ProjectConfig,
    group_name: &str,
    group: &MediaGroup,
) -> Result<Vec<String>, PipelineError> {
    // the group root is always scanned, as the unnamed language
    let mut languages = vec![String::new()];
    if group.localization.first().map(String::as_str) == Some(LOCALIZATION_WILDCARD) {
        languages.extend(list_subdirectories(&project.rootdir.join(group_name)).await?);
    } else {
        languages.extend(group.localization.iter().cloned());
    }
    Ok(languages)
}

struct FileJob {
    infile: PathBuf,
    srcpath: String,
    name: String,
    primary_output: PathBuf,
    legacy_output: PathBuf,
    loadpath: String,
    base: String,
    group: String,
    language: String,
    channels: u16,
    bitrate: u32,
    legacy_support: bool,
    verbose: bool,
}

async fn process_file<E: EncoderPort>(
    encoder: Arc<E>,
    governor: Governor,
    log: RunLog,
    job: FileJob,
) -> Result<MediaRecord, PipelineError> {
    let _permit = governor.acquire().await;
    log.debug(format!("processing {}", job.srcpath));

    let bytes = tokio::fs::read(&job.infile).await?;
    let wave = parse_wave(&bytes).map_err(|source| PipelineError::Wave {
        path: job.infile.clone(),
        source,
    })?;

    let gain_db = if wave.num_channels == job.channels {
        0
    } else {
        CHANNEL_MISMATCH_GAIN_DB
    };

    let record = MediaRecord {
        name: job.name.clone(),
        id: 0,
        hash: hash_bytes(&bytes),
        duration: wave.duration,
        channels: job.channels,
        num_samples: wave.num_samples,
        sample_rate: TARGET_SAMPLE_RATE,
        bitrate: job.bitrate,
        base: job.base.clone(),
        loadpath: job.loadpath.clone(),
        srcpath: job.srcpath.clone(),
        group: job.group.clone(),
        language: job.language.clone(),
    };

    let primary = EncodeJob {
        input: job.infile.clone(),
        output: job.primary_output.clone(),
        codec: AudioCodec::Opus,
        bitrate: job.bitrate,
        channels: job.channels,
        sample_rate: TARGET_SAMPLE_RATE,
        gain_db,
        verbose: job.verbose,
    };
    run_encoder(encoder.as_ref(), &log, &primary).await;

    if job.legacy_support {
        let legacy = EncodeJob {
            output: job.legacy_output.clone(),
            codec: AudioCodec::Aac,
            ..primary
        };
        run_encoder(encoder.as_ref(), &log, &legacy).await;
    }

    Ok(record)
    // the permit drops here, after both invocations
}

async fn run_encoder<E: EncoderPort + ?Sized>(encoder: &E, log: &RunLog, job: &EncodeJob) {
    match encoder.encode(job).await {
        Ok(output) => {
            if !output.status.success() {
                log.error(format!(
                    "encoder exited with {} for {}: {}",
                    output.status,
                    job.output.display(),
                    String::from_utf8_lossy(&output.stderr).trim_end(),
                ));
                return;
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                log.encoder(&job.output, &stderr);
            }
            match tokio::fs::metadata(&job.output).await {
                Ok(meta) if meta.len() > 0 => {}
                _ => log.warn(format!(
                    "encoder reported success but produced no output at {}",
                    job.output.display()
                )),
            }
        }
        Err(e) => {
            log.error(format!(
                "failed to launch encoder for {}: {}",
                job.output.display(),
                e
            ));
        }
    }
}

fn join_load_path(base: &str, relative: &str, file_name: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), relative, file_name)
}

async fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

async fn write_json_compact<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string(value)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}
