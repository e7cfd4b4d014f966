//! Change-detection fingerprints for the source tree.
//!
//! Fingerprints are seeded from paths and modification times, never file
//! contents: cheap enough to compute on every run, strong enough to answer
//! "did anything under here change". Content hashes for identity decisions
//! live with the records, not here.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::UNIX_EPOCH;

/// Extension of recognized source audio files.
pub const AUDIO_EXTENSION: &str = "wav";

/// Fingerprints of one crawl: the root directory's fingerprint plus an
/// entry for every visited directory and source audio file.
#[derive(Debug, Clone, Default)]
pub struct TreeFingerprint {
    pub root: String,
    pub entries: BTreeMap<String, String>,
}

impl TreeFingerprint {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// Map key for a path; fingerprints and cached indexes share this form.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == AUDIO_EXTENSION)
}

/// Crawl a directory tree once, up-front. Entries are visited in sorted
/// order so a fixed tree state always produces the same fingerprints.
pub async fn crawl(root: &Path) -> io::Result<TreeFingerprint> {
    let mut entries = BTreeMap::new();
    let root_fingerprint = crawl_dir(root.to_path_buf(), &mut entries).await?;
    Ok(TreeFingerprint {
        root: root_fingerprint,
        entries,
    })
}

fn crawl_dir<'a>(
    dir: PathBuf,
    entries: &'a mut BTreeMap<String, String>,
) -> Pin<Box<dyn Future<Output = io::Result<String>> + Send + 'a>> {
    Box::pin(async move {
        let mut children = Vec::new();
        let mut listing = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = listing.next_entry().await? {
            children.push(entry.path());
        }
        children.sort();

        let mut hasher = Sha256::new();
        for child in children {
            let metadata = tokio::fs::metadata(&child).await?;
            let seed = entry_seed(&child, &metadata)?;
            hasher.update(seed.as_bytes());

            if metadata.is_dir() {
                // recurse first so the subtree's fingerprint can fold into
                // this directory's running hash
                let sub = crawl_dir(child, entries).await?;
                hasher.update(sub.as_bytes());
            } else if is_audio_file(&child) {
                let mut file_hasher = Sha256::new();
                file_hasher.update(seed.as_bytes());
                entries.insert(path_key(&child), format!("{:x}", file_hasher.finalize()));
            }
        }

        let fingerprint = format!("{:x}", hasher.finalize());
        entries.insert(path_key(&dir), fingerprint.clone());
        Ok(fingerprint)
    })
}

fn entry_seed(path: &Path, metadata: &Metadata) -> io::Result<String> {
    let modified = metadata.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .as_millis();
    Ok(format!("{}{}", path.display(), millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn write_with_mtime(path: &Path, contents: &[u8], epoch_secs: u64) {
        std::fs::write(path, contents).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(epoch_secs))
            .unwrap();
    }

    fn build_tree(root: &Path, epoch_secs: u64) {
        std::fs::create_dir_all(root.join("voice/en")).unwrap();
        write_with_mtime(&root.join("click.wav"), b"click", epoch_secs);
        write_with_mtime(&root.join("voice/en/hello.wav"), b"hello", epoch_secs);
    }

    #[tokio::test]
    async fn stable_for_a_fixed_tree() {
        let dir = tempdir().unwrap();
        build_tree(dir.path(), 1_700_000_000);

        let first = crawl(dir.path()).await.unwrap();
        let second = crawl(dir.path()).await.unwrap();

        assert_eq!(first.root, second.root);
        assert_eq!(first.entries, second.entries);
    }

    #[tokio::test]
    async fn mtime_change_alters_fingerprints() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        // same names and contents in both trees, later mtimes in the second
        build_tree(a.path(), 1_700_000_000);
        build_tree(b.path(), 1_700_000_500);

        let fp_a = crawl(a.path()).await.unwrap();
        let fp_b = crawl(b.path()).await.unwrap();

        assert_ne!(fp_a.root, fp_b.root);
    }

    #[tokio::test]
    async fn nested_change_bubbles_to_every_ancestor() {
        let dir = tempdir().unwrap();
        build_tree(dir.path(), 1_700_000_000);
        let before = crawl(dir.path()).await.unwrap();

        let nested = dir.path().join("voice/en/hello.wav");
        let file = File::options().write(true).open(&nested).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(1_700_009_999))
            .unwrap();

        let after = crawl(dir.path()).await.unwrap();
        assert_ne!(before.root, after.root);
        assert_ne!(
            before.get(&path_key(&dir.path().join("voice"))),
            after.get(&path_key(&dir.path().join("voice")))
        );
        assert_ne!(before.get(&path_key(&nested)), after.get(&path_key(&nested)));
    }

    #[tokio::test]
    async fn unrelated_siblings_keep_their_fingerprints() {
        let dir = tempdir().unwrap();
        build_tree(dir.path(), 1_700_000_000);
        let before = crawl(dir.path()).await.unwrap();

        let file = File::options()
            .write(true)
            .open(dir.path().join("click.wav"))
            .unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_010_000))
            .unwrap();

        let after = crawl(dir.path()).await.unwrap();
        let voice_key = path_key(&dir.path().join("voice"));
        assert_eq!(before.get(&voice_key), after.get(&voice_key));
        assert_ne!(before.root, after.root);
    }

    #[tokio::test]
    async fn only_audio_files_get_their_own_entry() {
        let dir = tempdir().unwrap();
        build_tree(dir.path(), 1_700_000_000);
        write_with_mtime(&dir.path().join("notes.txt"), b"ignore me", 1_700_000_000);

        let fp = crawl(dir.path()).await.unwrap();
        assert!(fp.get(&path_key(&dir.path().join("click.wav"))).is_some());
        assert!(fp.get(&path_key(&dir.path().join("notes.txt"))).is_none());
    }
}
