//! Live result observers
//!
//! A [`ResultObserver`] binds one fetch spec to one context and keeps a
//! sectioned [`ResultSet`] current across that context's saves. It
//! subscribes itself to the context at creation; every commit is folded
//! into the snapshot through the diff engine and the resulting batch is
//! forwarded to the registered [`BatchHandler`], all synchronously on
//! the saving thread. The spec is fixed for the observer's lifetime; a
//! different query means a different observer.

use crate::cache::{self, CachedLayout};
use crate::diff;
use crate::event::{BatchHandler, ChangeBatch};
use crate::result_set::{ResultSet, Section};
use folio_core::{ContextId, EntityInstance, FetchSpec, FolioResult, InstanceId, SaveCommit};
use folio_object::{ContextManager, SaveObserver};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

struct ObserverCore {
    spec: FetchSpec,
    result_set: ResultSet,
    store_version: u64,
}

/// Keeps one spec's result set synchronized with a context
pub struct ResultObserver {
    core: Mutex<ObserverCore>,
    handler: Mutex<Option<Arc<dyn BatchHandler>>>,
    cache_dir: PathBuf,
    context: ContextId,
}

impl ResultObserver {
    /// Bind a spec to a context and build the initial result set.
    ///
    /// When the spec names a layout cache and a cache file matches both
    /// the spec fingerprint and the current store version, the stored
    /// arrangement is replayed instead of sorting from scratch; anything
    /// else falls back to a fresh build with a warning. The cache holds
    /// committed store state only, so pending changes anywhere on the
    /// context's ancestor chain force the fresh build and leave the
    /// file untouched. The observer subscribes itself to the context's
    /// saves; keep the returned `Arc` alive for as long as updates
    /// matter.
    pub fn new(
        manager: &mut ContextManager,
        context: ContextId,
        spec: FetchSpec,
    ) -> FolioResult<Arc<Self>> {
        let cache_dir = manager.cache_dir().to_path_buf();
        let store_version = manager.store_version();
        // Rows overlaid by pending changes anywhere on the ancestor
        // chain diverge from what the store committed; the cache can
        // neither be trusted nor rewritten from them
        let committed = !manager.chain_has_pending_changes(context);

        let mut replayed = None;
        if let Some(name) = spec.cache_name() {
            if let Some(layout) = cache::load(&cache_dir, name) {
                if !committed {
                    warn!(
                        target: "folio::view",
                        cache = name,
                        "Pending changes shadow the layout cache; rebuilding"
                    );
                } else if layout.fingerprint == spec.fingerprint()
                    && layout.store_version == store_version
                {
                    replayed = Self::replay(manager, context, &spec, &layout)?;
                } else {
                    warn!(
                        target: "folio::view",
                        cache = name,
                        "Layout cache is stale; rebuilding"
                    );
                }
            }
        }

        let result_set = match replayed {
            Some(set) => set,
            None => ResultSet::build(manager.fetch(context, &spec)?, &spec),
        };
        debug!(
            target: "folio::view",
            context = %context,
            entity = spec.entity(),
            sections = result_set.section_count(),
            rows = result_set.len(),
            "Observer bound"
        );

        let observer = Arc::new(Self {
            core: Mutex::new(ObserverCore {
                spec,
                result_set,
                store_version,
            }),
            handler: Mutex::new(None),
            cache_dir,
            context,
        });
        if committed {
            observer.write_cache();
        }
        manager.subscribe(context, Arc::downgrade(&observer) as Weak<dyn SaveObserver>);
        Ok(observer)
    }

    /// Rebuild the set from a cached arrangement.
    ///
    /// `Ok(None)` when the cached ids no longer line up with the rows
    /// the context yields, in which case the caller sorts from scratch.
    fn replay(
        manager: &mut ContextManager,
        context: ContextId,
        spec: &FetchSpec,
        layout: &CachedLayout,
    ) -> FolioResult<Option<ResultSet>> {
        let rows = manager.fetch_unordered(context, spec)?;
        let cached: usize = layout.sections.iter().map(|(_, ids)| ids.len()).sum();
        if rows.len() != cached {
            warn!(
                target: "folio::view",
                "Layout cache no longer covers the fetched rows; rebuilding"
            );
            return Ok(None);
        }

        let mut by_id: HashMap<InstanceId, EntityInstance> =
            rows.into_iter().map(|row| (row.id, row)).collect();
        let mut sections = Vec::with_capacity(layout.sections.len());
        for (key, ids) in &layout.sections {
            let mut section_rows = Vec::with_capacity(ids.len());
            for id in ids {
                match by_id.remove(id) {
                    Some(row) => section_rows.push(row),
                    None => {
                        warn!(
                            target: "folio::view",
                            "Layout cache no longer covers the fetched rows; rebuilding"
                        );
                        return Ok(None);
                    }
                }
            }
            sections.push(Section {
                key: key.clone(),
                rows: section_rows,
            });
        }
        debug!(
            target: "folio::view",
            sections = sections.len(),
            "Replayed layout cache"
        );
        Ok(Some(ResultSet::from_layout(sections)))
    }

    /// Fold one commit into the result set.
    ///
    /// Returns the batch describing the transition, or `None` when the
    /// commit does not touch this observer's rows. A root commit also
    /// refreshes the layout cache; a child commit carries state the
    /// store has not seen, so the cache stays at the last committed
    /// arrangement. Saves made through the manager reach a subscribed
    /// observer automatically; call this directly only when driving
    /// dispatch by hand.
    pub fn process_commit(&self, commit: &SaveCommit) -> Option<ChangeBatch> {
        let mut core = self.core.lock();
        let (next, batch) = diff::compute(&core.result_set, &commit.deltas, &core.spec);
        core.result_set = next;

        if let Some(version) = commit.version {
            let dirty = batch.is_some() || core.store_version != version;
            core.store_version = version;
            if dirty {
                self.write_cache_locked(&core);
            }
        }
        batch
    }

    /// Register the handler batches are forwarded to.
    ///
    /// Replaces any previous handler. Handlers run synchronously inside
    /// the save call, after the observer's snapshot has been updated.
    pub fn set_handler(&self, handler: Arc<dyn BatchHandler>) {
        *self.handler.lock() = Some(handler);
    }

    /// Context this observer is bound to
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Owned snapshot of the current result set
    pub fn snapshot(&self) -> ResultSet {
        self.core.lock().result_set.clone()
    }

    /// Number of sections in the current set
    pub fn section_count(&self) -> usize {
        self.core.lock().result_set.section_count()
    }

    /// Number of rows in one section of the current set
    ///
    /// # Panics
    /// Panics if `section` is out of range.
    pub fn row_count(&self, section: usize) -> usize {
        self.core.lock().result_set.row_count(section)
    }

    /// Total rows in the current set
    pub fn len(&self) -> usize {
        self.core.lock().result_set.len()
    }

    /// Whether the current set has no rows
    pub fn is_empty(&self) -> bool {
        self.core.lock().result_set.is_empty()
    }

    /// Remove a named layout cache from a cache directory.
    ///
    /// `dir` is the stack's cache directory, as reported by
    /// [`ContextManager::cache_dir`]. A missing cache is not an error.
    pub fn delete_cache(dir: &Path, name: &str) -> FolioResult<()> {
        cache::delete(dir, name)
    }

    fn write_cache(&self) {
        let core = self.core.lock();
        self.write_cache_locked(&core);
    }

    fn write_cache_locked(&self, core: &ObserverCore) {
        let name = match core.spec.cache_name() {
            Some(name) => name,
            None => return,
        };
        let layout = CachedLayout {
            fingerprint: core.spec.fingerprint(),
            store_version: core.store_version,
            sections: core
                .result_set
                .sections()
                .iter()
                .map(|s| (s.key.clone(), s.rows.iter().map(|row| row.id).collect()))
                .collect(),
        };
        if let Err(e) = cache::store(&self.cache_dir, name, &layout) {
            warn!(
                target: "folio::view",
                cache = name,
                error = %e,
                "Failed to write layout cache"
            );
        }
    }
}

impl SaveObserver for ResultObserver {
    fn context_did_save(&self, commit: &SaveCommit) {
        if let Some(batch) = self.process_commit(commit) {
            let handler = self.handler.lock().clone();
            if let Some(handler) = handler {
                handler.handle(&batch);
            }
        }
    }
}
