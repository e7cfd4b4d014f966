//! Persisted cache state: the fingerprint index of the previous run and
//! the assembled record lists, laid out under the cache directory.

use crate::domain::bank::MediaRecord;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// On-disk layout of the build cache.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hashes_file(&self) -> PathBuf {
        self.root.join("hashes.json")
    }

    pub fn banks_dir(&self) -> PathBuf {
        self.root.join("banks")
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.banks_dir().join(project)
    }

    pub fn media_file(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("media.json")
    }

    pub fn bank_file(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("bank.json")
    }

    pub fn bank_min_file(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("bank.min.json")
    }

    pub fn summary_file(&self) -> PathBuf {
        self.banks_dir().join("project.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join(".logs.log")
    }
}

/// The previous run's fingerprint index. A missing or corrupt index file
/// loads as empty, which forces a full rebuild.
#[derive(Debug, Default)]
pub struct CacheIndex {
    entries: BTreeMap<String, String>,
}

impl CacheIndex {
    pub async fn load(path: &Path) -> Self {
        let entries = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => BTreeMap::new(),
        };
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// True when the cached fingerprint for `key` equals `fresh`.
    pub fn matches(&self, key: &str, fresh: &str) -> bool {
        self.get(key) == Some(fresh)
    }

    /// Persist a fresh index, superseding this one wholesale. Written only
    /// at the very end of a successful run.
    pub async fn persist(path: &Path, entries: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(path, content).await
    }
}

/// Record list of a previous run; missing or corrupt lists load as empty.
pub async fn load_cached_records(path: &Path) -> Vec<MediaRecord> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// Record list of an extended base project; here a missing list is a
/// structural problem, not a cold cache.
pub async fn load_base_records(path: &Path) -> io::Result<Vec<MediaRecord>> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content).map_err(io::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_paths() {
        let layout = CacheLayout::new(".cache");
        assert_eq!(layout.hashes_file(), PathBuf::from(".cache/hashes.json"));
        assert_eq!(
            layout.media_file("game"),
            PathBuf::from(".cache/banks/game/media.json")
        );
        assert_eq!(
            layout.bank_min_file("game"),
            PathBuf::from(".cache/banks/game/bank.min.json")
        );
        assert_eq!(layout.summary_file(), PathBuf::from(".cache/banks/project.json"));
        assert_eq!(layout.log_file(), PathBuf::from(".cache/.logs.log"));
    }

    #[tokio::test]
    async fn missing_index_loads_empty() {
        let dir = tempdir().unwrap();
        let index = CacheIndex::load(&dir.path().join("hashes.json")).await;
        assert_eq!(index.get("anything"), None);
    }

    #[tokio::test]
    async fn corrupt_index_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashes.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let index = CacheIndex::load(&path).await;
        assert_eq!(index.get("anything"), None);
    }

    #[tokio::test]
    async fn persisted_index_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/hashes.json");
        let entries = BTreeMap::from([
            ("sounds".to_string(), "abc".to_string()),
            ("sounds/game".to_string(), "def".to_string()),
        ]);

        CacheIndex::persist(&path, &entries).await.unwrap();
        let index = CacheIndex::load(&path).await;

        assert!(index.matches("sounds", "abc"));
        assert!(index.matches("sounds/game", "def"));
        assert!(!index.matches("sounds", "zzz"));
    }

    #[tokio::test]
    async fn missing_records_load_empty_but_base_records_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("media.json");

        assert!(load_cached_records(&path).await.is_empty());
        assert!(load_base_records(&path).await.is_err());
    }
}
