//! Layout cache files
//!
//! A layout cache persists the positional arrangement of one observer's
//! result set: the section keys with their row ids, the fingerprint of
//! the fetch spec that produced them, and the store version they were
//! valid for. Replaying a matching cache skips the global sort at
//! observer creation. Caches are strictly an optimization: unreadable
//! or mismatched files are discarded with a warning and rebuilt from a
//! fresh fetch, never surfaced as errors.
//!
//! On disk a cache is the bincode payload followed by a CRC32 trailer,
//! written to `<cache dir>/<name>.cache` through a temp-and-rename.

use folio_core::{FolioError, FolioResult, InstanceId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persisted arrangement of one result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CachedLayout {
    /// Fingerprint of the producing spec's entity, predicate, sort, group
    pub fingerprint: u64,
    /// Store version the layout was built against
    pub store_version: u64,
    /// Section keys with row ids, in path order
    pub sections: Vec<(Option<String>, Vec<InstanceId>)>,
}

pub(crate) fn cache_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.cache", name))
}

/// Read and verify a cache file.
///
/// `None` when the file is missing; `None` with a warning when it is
/// unreadable or fails its checksum, in which case the file is removed.
pub(crate) fn load(dir: &Path, name: &str) -> Option<CachedLayout> {
    let path = cache_path(dir, name);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(
                target: "folio::view",
                path = ?path,
                error = %e,
                "Failed to read layout cache; rebuilding"
            );
            return None;
        }
    };
    match decode(&data) {
        Ok(layout) => Some(layout),
        Err(e) => {
            warn!(
                target: "folio::view",
                path = ?path,
                error = %e,
                "Discarding unreadable layout cache"
            );
            let _ = fs::remove_file(&path);
            None
        }
    }
}

/// Write a cache file through a temp-and-rename.
pub(crate) fn store(dir: &Path, name: &str, layout: &CachedLayout) -> FolioResult<()> {
    fs::create_dir_all(dir)?;
    let path = cache_path(dir, name);
    let temp = path.with_extension("cache.tmp");
    fs::write(&temp, encode(layout)?)?;
    if let Err(e) = fs::rename(&temp, &path) {
        let _ = fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

/// Remove one cache file by name; a missing file is fine.
pub(crate) fn delete(dir: &Path, name: &str) -> FolioResult<()> {
    match fs::remove_file(cache_path(dir, name)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn encode(layout: &CachedLayout) -> FolioResult<Vec<u8>> {
    let mut data = bincode::serialize(layout)?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data);
    data.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(data)
}

fn decode(data: &[u8]) -> FolioResult<CachedLayout> {
    if data.len() < 4 {
        return Err(FolioError::Corruption(
            "cache file shorter than its checksum".to_string(),
        ));
    }
    let (payload, trailer) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(FolioError::Corruption(format!(
            "cache checksum mismatch: stored {:08x}, computed {:08x}",
            stored, computed
        )));
    }
    Ok(bincode::deserialize(payload)?)
}
