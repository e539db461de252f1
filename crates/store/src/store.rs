//! Attribute store: the in-memory record image and its file format
//!
//! The whole store is one file (`folio.db`):
//!
//! ```text
//! [magic "FOLIO"] [format version u8] [bincode payload] [CRC32 u32 LE]
//! ```
//!
//! The payload is the store version plus every record, grouped by entity
//! kind. The CRC32 covers everything before it. Writes go through a temp
//! file and an atomic rename so a crash never leaves a half-written store.
//!
//! ## Design Notes
//!
//! - The store is a plain value. Locking and validation live in the
//!   coordinator.
//! - A missing file loads as an empty store at version 0. Anything else
//!   that fails to decode is reported as corruption, never silently
//!   reset.

use crate::record::StoredRecord;
use folio_core::{EntityInstance, FolioError, FolioResult, InstanceId, RecordDeltas};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Magic bytes at the start of a store file.
const FILE_MAGIC: &[u8; 5] = b"FOLIO";

/// Store file format version.
const FORMAT_VERSION: u8 = 1;

/// Records grouped by entity kind, then by instance id.
type KindMap = BTreeMap<String, BTreeMap<InstanceId, StoredRecord>>;

/// Serialized payload of a store file.
#[derive(Serialize, Deserialize)]
struct StoreImage {
    version: u64,
    records: KindMap,
}

/// The full record image of one store.
///
/// Cheap to clone relative to a save: the coordinator stages every save on
/// a clone and swaps it in only after the file write succeeds.
#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    records: KindMap,
    version: u64,
}

impl AttributeStore {
    /// Create an empty store at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store version: the number of saves committed so far.
    pub fn current_version(&self) -> u64 {
        self.version
    }

    /// Total number of records across all kinds.
    pub fn record_count(&self) -> usize {
        self.records.values().map(|m| m.len()).sum()
    }

    /// Whether a record with this kind and id exists.
    pub fn contains(&self, kind: &str, id: InstanceId) -> bool {
        self.records
            .get(kind)
            .map(|m| m.contains_key(&id))
            .unwrap_or(false)
    }

    /// Fetch a single record as an instance, if present.
    pub fn get(&self, kind: &str, id: InstanceId) -> Option<EntityInstance> {
        self.records
            .get(kind)
            .and_then(|m| m.get(&id))
            .map(|r| r.to_instance(kind, id))
    }

    /// Store version at which a record was last written, if present.
    pub fn record_version(&self, kind: &str, id: InstanceId) -> Option<u64> {
        self.records.get(kind).and_then(|m| m.get(&id)).map(|r| r.version)
    }

    /// Fetch every record of one kind, in id order.
    pub fn fetch_kind(&self, kind: &str) -> Vec<EntityInstance> {
        self.records
            .get(kind)
            .map(|m| m.iter().map(|(id, r)| r.to_instance(kind, *id)).collect())
            .unwrap_or_default()
    }

    /// Apply record deltas in place and bump the store version once.
    ///
    /// Deletes are applied first, then inserts, then updates. Deleting an
    /// absent record is a no-op. Inserting an existing id or updating an
    /// absent one is an invalid operation; the store is left partially
    /// mutated, so callers must apply to a staged clone.
    ///
    /// Returns the new store version.
    pub fn apply_deltas(&mut self, deltas: &RecordDeltas) -> FolioResult<u64> {
        let next = self.version + 1;

        for deletion in &deltas.deleted {
            if let Some(map) = self.records.get_mut(&deletion.kind) {
                map.remove(&deletion.id);
                if map.is_empty() {
                    self.records.remove(&deletion.kind);
                }
            }
        }

        for instance in &deltas.inserted {
            let map = self.records.entry(instance.kind.clone()).or_default();
            if map.contains_key(&instance.id) {
                return Err(FolioError::InvalidOperation(format!(
                    "insert of already stored record {}",
                    instance
                )));
            }
            map.insert(instance.id, StoredRecord::new(instance.attrs.clone(), next));
        }

        for update in &deltas.updated {
            let instance = &update.instance;
            let record = self
                .records
                .get_mut(&instance.kind)
                .and_then(|m| m.get_mut(&instance.id))
                .ok_or_else(|| {
                    FolioError::InvalidOperation(format!(
                        "update of unknown record {}",
                        instance
                    ))
                })?;
            record.attrs = instance.attrs.clone();
            record.version = next;
        }

        self.version = next;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // File format
    // ------------------------------------------------------------------

    /// Encode the store into its file representation, checksum included.
    pub fn encode(&self) -> FolioResult<Vec<u8>> {
        let image = StoreImage {
            version: self.version,
            records: self.records.clone(),
        };
        let payload = bincode::serialize(&image)?;

        let mut buf = Vec::with_capacity(FILE_MAGIC.len() + 1 + payload.len() + 4);
        buf.extend_from_slice(FILE_MAGIC);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&payload);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        let checksum = hasher.finalize();
        buf.extend_from_slice(&checksum.to_le_bytes());

        Ok(buf)
    }

    /// Decode a store from its file representation, verifying the
    /// checksum and magic.
    pub fn decode(data: &[u8]) -> FolioResult<Self> {
        if data.len() < FILE_MAGIC.len() + 1 + 4 {
            return Err(FolioError::Corruption(format!(
                "store file too short: {} bytes",
                data.len()
            )));
        }

        let (content, checksum_bytes) = data.split_at(data.len() - 4);
        let mut expected = [0u8; 4];
        expected.copy_from_slice(checksum_bytes);
        let expected = u32::from_le_bytes(expected);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(content);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(FolioError::Corruption(format!(
                "store checksum mismatch: expected {:08x}, computed {:08x}",
                expected, actual
            )));
        }

        if &content[..FILE_MAGIC.len()] != FILE_MAGIC {
            return Err(FolioError::Corruption(
                "store file has wrong magic bytes".to_string(),
            ));
        }
        let format = content[FILE_MAGIC.len()];
        if format != FORMAT_VERSION {
            return Err(FolioError::Corruption(format!(
                "unsupported store format version {}",
                format
            )));
        }

        let image: StoreImage = bincode::deserialize(&content[FILE_MAGIC.len() + 1..])?;
        Ok(Self {
            records: image.records,
            version: image.version,
        })
    }

    /// Load a store from a file. A missing file is an empty store.
    pub fn load_file(path: &Path) -> FolioResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read(path)?;
        Self::decode(&data)
    }

    /// Write the store to a file atomically: temp file, then rename.
    ///
    /// With `sync` set the temp file is fsynced before the rename, so the
    /// committed save survives an OS crash.
    pub fn write_file(&self, path: &Path, sync: bool) -> FolioResult<()> {
        let temp_path = path.with_extension("db.tmp");

        // Clean up a stale temp file from an interrupted earlier write
        if temp_path.exists() {
            warn!(
                target: "folio::store",
                "removing stale temp file: {}",
                temp_path.display()
            );
            std::fs::remove_file(&temp_path)?;
        }

        let data = self.encode()?;
        std::fs::write(&temp_path, &data)?;
        if sync {
            let file = std::fs::File::open(&temp_path)?;
            file.sync_all()?;
        }

        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}
