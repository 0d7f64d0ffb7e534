//! Storage helpers shared by every artifact store
//!
//! Artifacts are written into a staging directory next to their final
//! location and renamed into place only once complete. A crashed or
//! aborted stage leaves at most a `.staging-*` directory behind, never a
//! half-written artifact under its real id.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::constants::ID_HEX_LEN;
use crate::logic::error::{PipelineError, PipelineResult};

const STAGING_PREFIX: &str = ".staging-";

// ============================================================================
// HASHING
// ============================================================================

/// Full lowercase sha256 hex digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Short content-derived identifier, e.g. `ds-0123456789abcdef`
pub fn content_id(prefix: &str, bytes: &[u8]) -> String {
    let digest = sha256_hex(bytes);
    format!("{}-{}", prefix, &digest[..ID_HEX_LEN])
}

/// `{prefix}-{16 lowercase hex}`, the only shape `content_id` produces
pub fn is_artifact_id(prefix: &str, id: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|hex| {
            hex.len() == ID_HEX_LEN && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

/// Location of artifact `id` under `root`. Ids that `content_id` could not
/// have produced name nothing, so they never reach the filesystem.
pub fn artifact_path(
    root: &Path,
    prefix: &str,
    kind: &'static str,
    id: &str,
) -> PipelineResult<PathBuf> {
    if !is_artifact_id(prefix, id) {
        log::warn!("Rejected malformed {} id {:?}", kind, id);
        return Err(PipelineError::not_found(kind, id));
    }
    Ok(root.join(id))
}

/// Checksum of a stored file
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let data = fs::read(path)?;
    Ok(sha256_hex(&data))
}

// ============================================================================
// JSON
// ============================================================================

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json)
}

/// Read errors surface as `Io`, undecodable content as `Serialization`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> PipelineResult<T> {
    let data = fs::read(path)?;
    let value = serde_json::from_slice(&data)?;
    Ok(value)
}

/// Write one JSON document per line
pub fn write_jsonl<'a, T, I>(path: &Path, items: I) -> io::Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

// ============================================================================
// STAGED WRITES
// ============================================================================

/// Directory that becomes an artifact only when `commit` succeeds
pub struct StagedDir {
    path: PathBuf,
    committed: bool,
}

impl StagedDir {
    pub fn new(parent: &Path) -> io::Result<Self> {
        fs::create_dir_all(parent)?;
        let path = parent.join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()));
        fs::create_dir(&path)?;
        Ok(Self {
            path,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Move the staged directory to `target`. Fails with `AlreadyExists` if
    /// `target` exists, including when another process won the race.
    pub fn commit(mut self, target: &Path) -> io::Result<()> {
        let taken = || {
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            )
        };
        if target.exists() {
            return Err(taken());
        }
        // a committed artifact is never empty, so rename cannot replace it
        if let Err(e) = fs::rename(&self.path, target) {
            return Err(if target.exists() { taken() } else { e });
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                log::warn!("Failed to clean staging dir {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Publish a single file complete or not at all, never replacing an
/// existing one. The temp file is hard-linked into place, which fails with
/// `AlreadyExists` if `path` is taken.
pub fn write_file_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = parent.join(format!("{}{}.tmp", STAGING_PREFIX, uuid::Uuid::new_v4()));
    fs::write(&tmp, bytes)?;
    let linked = fs::hard_link(&tmp, path);
    if let Err(e) = fs::remove_file(&tmp) {
        log::warn!("Failed to remove temp file {}: {}", tmp.display(), e);
    }
    linked
}

/// List artifact ids (sub-directory or `.json` file stems) under `dir`
pub fn list_ids(dir: &Path) -> io::Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = fs::read_dir(dir)?
        .filter_map(|r| r.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with(STAGING_PREFIX) {
                return None;
            }
            match name.strip_suffix(".json") {
                Some(stem) => Some(stem.to_string()),
                None if e.path().is_dir() => Some(name),
                None => None,
            }
        })
        .collect();

    ids.sort();
    Ok(ids)
}
