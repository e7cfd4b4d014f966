//! Bank records: the per-file metadata the runtime loader consumes and the
//! assembly logic turning a project's record list into a bank descriptor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Metadata of one encoded asset.
///
/// Identity is two-fold: `srcpath` keys records within a project (no two
/// records of one project may share it), while `(name, language)` keys the
/// inheritance override between a project and its base. `hash` is a digest
/// of the raw source bytes and survives moves/renames; it is independent of
/// the mtime fingerprints used for change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub name: String,
    #[serde(default)]
    pub id: u32,
    pub hash: String,
    pub duration: f64,
    pub channels: u16,
    pub num_samples: u64,
    pub sample_rate: u32,
    pub bitrate: u32,
    pub base: String,
    pub loadpath: String,
    pub srcpath: String,
    pub group: String,
    pub language: String,
}

/// Assembled bank descriptor, one per project per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankRecord {
    pub name: String,
    pub base: String,
    pub srcdir: String,
    pub groups: Vec<String>,
    pub languages: Vec<String>,
    pub hash: String,
    pub media: Vec<MediaRecord>,
}

/// Everything the aggregate hash covers: the bank minus the hash itself.
#[derive(Serialize)]
struct BankSeed<'a> {
    name: &'a str,
    base: &'a str,
    srcdir: &'a str,
    groups: &'a [String],
    languages: &'a [String],
    media: &'a [MediaRecord],
}

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Insert a record, replacing any existing record for the same source path.
pub fn upsert_record(records: &mut Vec<MediaRecord>, record: MediaRecord) {
    match records.iter_mut().find(|r| r.srcpath == record.srcpath) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Fold a base project's records into an extending project's list. A base
/// record is added only when the extender has no record with the same
/// `(name, language)` pair, so the extender always wins.
pub fn merge_extends(records: &mut Vec<MediaRecord>, base_records: Vec<MediaRecord>) {
    for base in base_records {
        let overridden = records
            .iter()
            .any(|r| r.name == base.name && r.language == base.language);
        if !overridden {
            records.push(base);
        }
    }
}

/// Build the bank descriptor: assign each record its numeric id (its index
/// in the assembled list) and compute the aggregate hash over the pre-hash
/// structure. Deterministic for identical inputs.
pub fn assemble_bank(
    name: &str,
    base: &str,
    srcdir: &str,
    groups: Vec<String>,
    languages: Vec<String>,
    mut media: Vec<MediaRecord>,
) -> Result<BankRecord, serde_json::Error> {
    for (index, record) in media.iter_mut().enumerate() {
        record.id = index as u32;
    }

    let seed = BankSeed {
        name,
        base,
        srcdir,
        groups: &groups,
        languages: &languages,
        media: &media,
    };
    let hash = hash_bytes(&serde_json::to_vec(&seed)?);

    Ok(BankRecord {
        name: name.to_string(),
        base: base.to_string(),
        srcdir: srcdir.to_string(),
        groups,
        languages,
        hash,
        media,
    })
}
