//! Store coordinator: the single gate between contexts and the store file
//!
//! One coordinator owns one store directory. It holds an exclusive
//! filesystem lock for the life of the process, validates every save
//! batch against the model, and commits batches through a staged clone
//! so a failed write never corrupts the in-memory image:
//!
//! 1. Validate the batch against the entity descriptors.
//! 2. Apply the deltas to a clone of the current image.
//! 3. Write the clone to `folio.db` atomically.
//! 4. Swap the clone in as the current image.
//!
//! If any step fails, the committed image and the file are untouched.

use crate::config::{DurabilityMode, StoreConfig, CONFIG_FILE_NAME};
use crate::store::AttributeStore;
use folio_core::{
    EntityInstance, FolioError, FolioResult, InstanceId, Model, RecordDeltas, SaveBatch,
};
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Store file name placed in the store directory.
pub const STORE_FILE_NAME: &str = "folio.db";

/// Lock file name placed in the store directory.
const LOCK_FILE_NAME: &str = ".lock";

/// Owns a store directory: the record image, its file, and the model it
/// was opened with.
pub struct StoreCoordinator {
    model: Arc<Model>,
    store: Mutex<AttributeStore>,
    dir: PathBuf,
    file_path: PathBuf,
    cache_dir: PathBuf,
    sync_on_save: bool,
    saves_applied: AtomicU64,
    // Held for the life of the coordinator; released on drop
    _lock_file: File,
}

impl StoreCoordinator {
    /// Open a store directory, creating it and a default `folio.toml` if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::Locked`] if another process holds the store,
    /// [`FolioError::Corruption`] if `folio.db` fails its checksum, and
    /// [`FolioError::Config`] for an unreadable or invalid `folio.toml`.
    pub fn open<P: AsRef<Path>>(dir: P, model: Arc<Model>) -> FolioResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        // Canonicalize so lock and registry keys agree across spellings
        let canonical = dir.canonicalize()?;

        let lock_path = canonical.join(LOCK_FILE_NAME);
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        fs2::FileExt::try_lock_exclusive(&lock_file)
            .map_err(|_| FolioError::Locked(canonical.clone()))?;

        let config_path = canonical.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let config = StoreConfig::from_file(&config_path)?;
        let sync_on_save = config.durability_mode()? == DurabilityMode::Always;
        let cache_dir = canonical.join(&config.cache_dir);

        let file_path = canonical.join(STORE_FILE_NAME);
        let store = AttributeStore::load_file(&file_path)?;

        info!(
            target: "folio::store",
            path = ?canonical,
            version = store.current_version(),
            records = store.record_count(),
            "Opened store"
        );

        Ok(Self {
            model,
            store: Mutex::new(store),
            dir: canonical,
            file_path,
            cache_dir,
            sync_on_save,
            saves_applied: AtomicU64::new(0),
            _lock_file: lock_file,
        })
    }

    /// The model this store was opened with.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Canonical store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding layout cache files, from `folio.toml`.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Store version of the committed image.
    pub fn current_version(&self) -> u64 {
        self.store.lock().current_version()
    }

    /// Number of saves committed by this coordinator since open.
    pub fn saves_applied(&self) -> u64 {
        self.saves_applied.load(Ordering::Relaxed)
    }

    /// Commit one save batch: validate, stage, persist, swap.
    ///
    /// Returns the new store version and the deltas as committed.
    pub fn apply(&self, batch: SaveBatch) -> FolioResult<(u64, RecordDeltas)> {
        let mut store = self.store.lock();

        self.validate(&batch.deltas)?;

        let mut staged = store.clone();
        let version = staged.apply_deltas(&batch.deltas)?;
        staged.write_file(&self.file_path, self.sync_on_save)?;
        *store = staged;

        self.saves_applied.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "folio::store",
            version,
            inserted = batch.deltas.inserted.len(),
            updated = batch.deltas.updated.len(),
            deleted = batch.deltas.deleted.len(),
            "Committed save"
        );

        Ok((version, batch.deltas))
    }

    /// Fetch every committed record of one kind, in id order.
    pub fn fetch(&self, kind: &str) -> Vec<EntityInstance> {
        let store = self.store.lock();
        let instances = store.fetch_kind(kind);
        debug!(
            target: "folio::store",
            kind,
            count = instances.len(),
            "Fetched records"
        );
        instances
    }

    /// Fetch one committed record, if present.
    pub fn get(&self, kind: &str, id: InstanceId) -> Option<EntityInstance> {
        self.store.lock().get(kind, id)
    }

    /// Whether a committed record with this kind and id exists.
    pub fn contains(&self, kind: &str, id: InstanceId) -> bool {
        self.store.lock().contains(kind, id)
    }

    /// Total number of committed records.
    pub fn record_count(&self) -> usize {
        self.store.lock().record_count()
    }

    fn validate(&self, deltas: &RecordDeltas) -> FolioResult<()> {
        let report = self.model.check_deltas(deltas);
        if report.is_empty() {
            Ok(())
        } else {
            Err(FolioError::Validation(report))
        }
    }
}

impl std::fmt::Debug for StoreCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCoordinator")
            .field("dir", &self.dir)
            .field("version", &self.current_version())
            .field("sync_on_save", &self.sync_on_save)
            .finish()
    }
}
