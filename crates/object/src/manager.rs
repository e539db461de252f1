//! Context manager: the owner of the persistence stack
//!
//! One `ContextManager` owns the model, the store coordinator, and a tree
//! of contexts rooted at [`root_context`](ContextManager::root_context).
//! Contexts are addressed by [`ContextId`]; all mutation flows through
//! `&mut self`, which statically enforces one writer per stack. Sharing a
//! stack across threads means wrapping it in the `Arc<Mutex<_>>` that
//! [`shared`](ContextManager::shared) hands out; saves serialize on that
//! mutex.
//!
//! Save propagation follows the context tree: saving a child publishes
//! its pending changes into its parent's pending set, and only a root
//! save reaches the store file. Each successful save is dispatched
//! synchronously to the saving context's subscribers on the calling
//! thread, so observers may not call back into the stack.

use crate::context::{InstanceState, PersistenceContext};
use folio_core::{
    AttrValue, ContextId, EntityDescriptor, EntityInstance, FetchSpec, FolioError, FolioResult,
    InstanceId, Model, SaveCommit,
};
use folio_store::StoreCoordinator;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Receives commit notifications from a context it subscribed to.
///
/// Called synchronously on the saving thread. Implementations must not
/// call back into the owning [`ContextManager`]; with a shared stack that
/// would deadlock on its mutex.
pub trait SaveObserver: Send + Sync {
    /// One context finished a save with pending changes.
    fn context_did_save(&self, commit: &SaveCommit);
}

// Process-wide registry of open stacks, keyed by canonical store
// directory. Entries are weak so a dropped stack can be reopened.
static OPEN_STACKS: Lazy<Mutex<HashMap<PathBuf, Weak<Mutex<ContextManager>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Owns the model, the store coordinator, and the context tree.
#[derive(Debug)]
pub struct ContextManager {
    model: Arc<Model>,
    coordinator: Arc<StoreCoordinator>,
    contexts: BTreeMap<ContextId, PersistenceContext>,
    root: ContextId,
    next_context: u64,
    observers: BTreeMap<ContextId, Vec<Weak<dyn SaveObserver>>>,
}

impl ContextManager {
    /// Open the stack over a store directory and build the root context.
    ///
    /// Errors here (config, lock, corruption) are startup errors; there
    /// is nothing to retry, the caller aborts.
    pub fn bootstrap<P: AsRef<Path>>(dir: P, model: Model) -> FolioResult<Self> {
        let model = Arc::new(model);
        let coordinator = Arc::new(StoreCoordinator::open(dir, model.clone())?);

        let root = ContextId::from_raw(1);
        let mut contexts = BTreeMap::new();
        contexts.insert(root, PersistenceContext::new(root, None, model.clone()));
        debug!(target: "folio::ctx", context = %root, "Created root context");

        Ok(Self {
            model,
            coordinator,
            contexts,
            root,
            next_context: 2,
            observers: BTreeMap::new(),
        })
    }

    /// Open the shared stack for a store directory.
    ///
    /// Returns the existing instance when the same canonical path is
    /// already open in this process; otherwise bootstraps a new one and
    /// registers it. `model` is only used when a new stack is built.
    pub fn shared<P: AsRef<Path>>(dir: P, model: Model) -> FolioResult<Arc<Mutex<Self>>> {
        std::fs::create_dir_all(dir.as_ref())?;
        let canonical = dir.as_ref().canonicalize()?;

        // Hold the registry lock across the check and the bootstrap so
        // two threads cannot race to open the same directory
        let mut registry = OPEN_STACKS.lock();
        if let Some(weak) = registry.get(&canonical) {
            if let Some(existing) = weak.upgrade() {
                debug!(target: "folio::ctx", path = ?canonical, "Returning existing shared stack");
                return Ok(existing);
            }
        }

        let manager = Arc::new(Mutex::new(Self::bootstrap(&canonical, model)?));
        registry.insert(canonical, Arc::downgrade(&manager));
        Ok(manager)
    }

    /// The root context id.
    pub fn root_context(&self) -> ContextId {
        self.root
    }

    /// The model the stack was opened with.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Store version of the last committed root save.
    pub fn store_version(&self) -> u64 {
        self.coordinator.current_version()
    }

    /// Directory holding layout cache files.
    pub fn cache_dir(&self) -> &Path {
        self.coordinator.cache_dir()
    }

    fn context(&self, id: ContextId) -> &PersistenceContext {
        self.contexts
            .get(&id)
            .unwrap_or_else(|| panic!("unknown context {}", id))
    }

    fn context_mut(&mut self, id: ContextId) -> &mut PersistenceContext {
        self.contexts
            .get_mut(&id)
            .unwrap_or_else(|| panic!("unknown context {}", id))
    }

    // ------------------------------------------------------------------
    // Context tree
    // ------------------------------------------------------------------

    /// Create a child context under `parent`.
    ///
    /// # Panics
    /// Panics if `parent` is unknown or discarded.
    pub fn new_child_context(&mut self, parent: ContextId) -> ContextId {
        self.context(parent);
        let id = ContextId::from_raw(self.next_context);
        self.next_context += 1;
        self.contexts
            .insert(id, PersistenceContext::new(id, Some(parent), self.model.clone()));
        debug!(target: "folio::ctx", context = %id, parent = %parent, "Created child context");
        id
    }

    /// Discard a context and all of its descendants, dropping their
    /// pending changes. The ids become invalid; later use panics.
    ///
    /// # Panics
    /// Panics if `id` is the root or unknown.
    pub fn discard_context(&mut self, id: ContextId) {
        assert!(id != self.root, "the root context cannot be discarded");
        self.context(id);

        let mut doomed = BTreeSet::new();
        doomed.insert(id);
        loop {
            let additions: Vec<ContextId> = self
                .contexts
                .iter()
                .filter(|(cid, ctx)| {
                    !doomed.contains(*cid)
                        && ctx.parent().map(|p| doomed.contains(&p)).unwrap_or(false)
                })
                .map(|(cid, _)| *cid)
                .collect();
            if additions.is_empty() {
                break;
            }
            doomed.extend(additions);
        }

        for cid in &doomed {
            self.contexts.remove(cid);
            self.observers.remove(cid);
        }
        debug!(target: "folio::ctx", context = %id, removed = doomed.len(), "Discarded context");
    }

    // ------------------------------------------------------------------
    // Instance operations
    // ------------------------------------------------------------------

    /// Create a Transient instance in a context. See
    /// [`PersistenceContext::create`].
    pub fn create(&mut self, ctx: ContextId, kind: &str) -> FolioResult<InstanceId> {
        self.context_mut(ctx).create(kind)
    }

    /// Write one attribute. See [`PersistenceContext::set_attr`].
    pub fn set_attr(
        &mut self,
        ctx: ContextId,
        id: InstanceId,
        name: &str,
        value: impl Into<AttrValue>,
    ) {
        self.context_mut(ctx).set_attr(id, name, value);
    }

    /// Read one attribute. See [`PersistenceContext::attr`].
    pub fn attr(&self, ctx: ContextId, id: InstanceId, name: &str) -> &AttrValue {
        self.context(ctx).attr(id, name)
    }

    /// Owned snapshot of one instance. See [`PersistenceContext::instance`].
    pub fn instance(&self, ctx: ContextId, id: InstanceId) -> EntityInstance {
        self.context(ctx).instance(id)
    }

    /// Mark an instance for deletion. See
    /// [`PersistenceContext::mark_deleted`].
    pub fn delete(&mut self, ctx: ContextId, id: InstanceId) {
        self.context_mut(ctx).mark_deleted(id);
    }

    /// Lifecycle state of an instance within a context, if registered.
    pub fn instance_state(&self, ctx: ContextId, id: InstanceId) -> Option<InstanceState> {
        self.context(ctx).state(id)
    }

    /// Whether a context has anything a save would write.
    pub fn has_pending_changes(&self, ctx: ContextId) -> bool {
        self.context(ctx).has_pending_changes()
    }

    /// Whether a context or any of its ancestors has pending changes.
    ///
    /// A fetch overlays the whole ancestor chain, so this is the test
    /// for whether fetched rows reflect committed store state alone.
    pub fn chain_has_pending_changes(&self, ctx: ContextId) -> bool {
        let mut cursor = Some(ctx);
        while let Some(id) = cursor {
            let context = self.context(id);
            if context.has_pending_changes() {
                return true;
            }
            cursor = context.parent();
        }
        false
    }

    /// Descriptor for an entity kind, through the context's cache.
    pub fn descriptor(&mut self, ctx: ContextId, kind: &str) -> FolioResult<Arc<EntityDescriptor>> {
        self.context_mut(ctx).descriptor(kind)
    }

    // ------------------------------------------------------------------
    // Fetch
    // ------------------------------------------------------------------

    /// Snapshot fetch against a context.
    ///
    /// Committed rows are overlaid with every ancestor's registered
    /// copies from the root down, then the context's own, so a child
    /// sees its parent's pending edits but never a sibling's or a
    /// child's. Matching rows are registered into the context as Clean
    /// working copies; copies already registered win. The result is
    /// filtered by the spec's predicate and sorted by its terms.
    pub fn fetch(&mut self, ctx: ContextId, spec: &FetchSpec) -> FolioResult<Vec<EntityInstance>> {
        let mut rows = self.collect_matching(ctx, spec)?;
        rows.sort_by(|a, b| spec.compare(a, b));
        debug!(
            target: "folio::ctx",
            context = %ctx,
            entity = spec.entity(),
            rows = rows.len(),
            "Fetched"
        );
        Ok(rows)
    }

    /// [`fetch`](Self::fetch) without the final sort; row order is
    /// unspecified. Used when the caller imposes its own order, such as
    /// replaying a persisted result-set layout.
    pub fn fetch_unordered(
        &mut self,
        ctx: ContextId,
        spec: &FetchSpec,
    ) -> FolioResult<Vec<EntityInstance>> {
        let rows = self.collect_matching(ctx, spec)?;
        debug!(
            target: "folio::ctx",
            context = %ctx,
            entity = spec.entity(),
            rows = rows.len(),
            "Fetched unordered"
        );
        Ok(rows)
    }

    fn collect_matching(
        &mut self,
        ctx: ContextId,
        spec: &FetchSpec,
    ) -> FolioResult<Vec<EntityInstance>> {
        self.context(ctx);
        if !self.model.contains(spec.entity()) {
            return Err(FolioError::UnknownEntity(spec.entity().to_string()));
        }

        let mut acc: BTreeMap<InstanceId, EntityInstance> = self
            .coordinator
            .fetch(spec.entity())
            .into_iter()
            .map(|instance| (instance.id, instance))
            .collect();

        let mut chain = Vec::new();
        let mut cursor = Some(ctx);
        while let Some(id) = cursor {
            let context = self.context(id);
            chain.push(id);
            cursor = context.parent();
        }
        chain.reverse();
        for id in chain {
            self.context(id).overlay_kind(spec.entity(), &mut acc);
        }

        let rows: Vec<EntityInstance> =
            acc.into_values().filter(|row| spec.matches(row)).collect();

        let target = self.context_mut(ctx);
        for row in &rows {
            target.register_clean(row.clone());
        }
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Save / rollback
    // ------------------------------------------------------------------

    /// Save a context.
    ///
    /// With no pending changes this is a no-op: `Ok(None)`, nothing
    /// published. A root save commits to the store and carries the new
    /// store version; a child save publishes into its parent's pending
    /// set and carries no version. Cascading further up is the caller's
    /// move. On error the context's pending changes are intact and no
    /// notification goes out.
    pub fn save(&mut self, ctx: ContextId) -> FolioResult<Option<SaveCommit>> {
        let (parent, batch) = {
            let context = self.context(ctx);
            (context.parent(), context.build_batch())
        };
        if batch.is_empty() {
            debug!(target: "folio::ctx", context = %ctx, "Save with no pending changes");
            return Ok(None);
        }

        let commit = match parent {
            None => {
                let (version, deltas) = self.coordinator.apply(batch)?;
                self.context_mut(ctx).clear_pending_after_save();
                SaveCommit::new(ctx, Some(version), deltas)
            }
            Some(parent_id) => {
                let report = self.model.check_deltas(&batch.deltas);
                if !report.is_empty() {
                    return Err(FolioError::Validation(report));
                }
                let deltas = batch.deltas;
                self.context_mut(parent_id).absorb(&deltas);
                self.context_mut(ctx).clear_pending_after_save();
                info!(
                    target: "folio::ctx",
                    context = %ctx,
                    parent = %parent_id,
                    ops = deltas.op_count(),
                    "Saved into parent"
                );
                SaveCommit::new(ctx, None, deltas)
            }
        };

        self.dispatch(&commit);
        Ok(Some(commit))
    }

    /// Discard a context's pending mutations. See
    /// [`PersistenceContext::rollback_pending`].
    pub fn rollback(&mut self, ctx: ContextId) {
        self.context_mut(ctx).rollback_pending();
        debug!(target: "folio::ctx", context = %ctx, "Rolled back");
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Subscribe an observer to one context's saves.
    ///
    /// The reference is weak; drop the observer to unsubscribe. Dead
    /// entries are pruned at dispatch.
    pub fn subscribe(&mut self, ctx: ContextId, observer: Weak<dyn SaveObserver>) {
        self.context(ctx);
        self.observers.entry(ctx).or_default().push(observer);
    }

    fn dispatch(&mut self, commit: &SaveCommit) {
        let live: Vec<Arc<dyn SaveObserver>> = match self.observers.get_mut(&commit.context) {
            Some(list) => {
                list.retain(|weak| weak.upgrade().is_some());
                list.iter().filter_map(|weak| weak.upgrade()).collect()
            }
            None => Vec::new(),
        };
        for observer in live {
            observer.context_did_save(commit);
        }
    }

    // ------------------------------------------------------------------
    // Undo scopes
    // ------------------------------------------------------------------

    /// Start an undo scope on a context. See
    /// [`PersistenceContext::begin_scope`].
    pub fn begin_scope(&mut self, ctx: ContextId) {
        self.context_mut(ctx).begin_scope();
    }

    /// Close a scope, reverting its recording. See
    /// [`PersistenceContext::discard_scope`].
    pub fn discard_scope(&mut self, ctx: ContextId) {
        self.context_mut(ctx).discard_scope();
    }

    /// Close a scope, keeping its mutations. See
    /// [`PersistenceContext::end_scope`].
    pub fn end_scope(&mut self, ctx: ContextId) {
        self.context_mut(ctx).end_scope();
    }

    /// Whether a context has an active scope.
    pub fn has_scope(&self, ctx: ContextId) -> bool {
        self.context(ctx).has_scope()
    }
}

impl Drop for ContextManager {
    fn drop(&mut self) {
        let mut registry = OPEN_STACKS.lock();
        registry.remove(self.coordinator.dir());
    }
}
