//! Persistence contexts: working sets of pending mutations
//!
//! A context owns working copies of entity instances and tracks what a
//! save would have to write. Instances move through four states:
//!
//! ```text
//! create ─────▶ Transient ──save──▶ Clean
//! fetch ──────▶ Clean ──set_attr──▶ Modified ──save──▶ Clean
//! mark_deleted: Transient ⇒ removed outright, else ⇒ Deleted (purged on save)
//! ```
//!
//! Contexts form a strict tree. The tree itself (ids, parents, save
//! propagation) is managed by [`ContextManager`](crate::manager::ContextManager);
//! this module only knows a context's own working set and its optional
//! undo scope.
//!
//! ## Design Notes
//!
//! - Operating on an id that is not registered here, or was deleted, is
//!   a usage error and panics. Recoverable conditions (validation, IO)
//!   are reported as errors at save time instead.
//! - Setting an attribute to its current value is a no-op: the instance
//!   does not become dirty and nothing is recorded into an active scope.

use crate::scope::ScopeRecording;
use folio_core::{
    AttrValue, ContextId, DeletedRecord, EntityDescriptor, EntityInstance, FolioError,
    FolioResult, InstanceId, Model, RecordDeltas, SaveBatch, UpdatedRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle state of a managed instance within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Created here, never saved; a save inserts it
    Transient,
    /// Matches what this context last saw committed; a save ignores it
    Clean,
    /// Edited since registration; a save updates it
    Modified,
    /// Marked for deletion; a save deletes it, then purges the mark
    Deleted,
}

/// One working copy plus its bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct ManagedInstance {
    pub(crate) kind: String,
    pub(crate) attrs: BTreeMap<String, AttrValue>,
    /// Attribute snapshot to restore on rollback; `None` for Transient
    /// instances and absorbed records, which rollback removes instead
    pub(crate) pristine: Option<BTreeMap<String, AttrValue>>,
    pub(crate) state: InstanceState,
    /// Attribute names changed since registration
    pub(crate) changed: BTreeSet<String>,
}

impl ManagedInstance {
    fn snapshot(&self, id: InstanceId) -> EntityInstance {
        EntityInstance::new(id, &self.kind, self.attrs.clone())
    }
}

/// A mutable working-set handle over the store.
///
/// All mutation goes through the owning [`ContextManager`](crate::manager::ContextManager),
/// which addresses contexts by [`ContextId`].
#[derive(Debug)]
pub struct PersistenceContext {
    id: ContextId,
    parent: Option<ContextId>,
    model: Arc<Model>,
    instances: BTreeMap<InstanceId, ManagedInstance>,
    // Descriptors are context-scoped in the underlying model; cache them
    // here so repeated repository lookups stay O(1)
    descriptors: BTreeMap<String, Arc<EntityDescriptor>>,
    scope: Option<ScopeRecording>,
}

impl PersistenceContext {
    pub(crate) fn new(id: ContextId, parent: Option<ContextId>, model: Arc<Model>) -> Self {
        Self {
            id,
            parent,
            model,
            instances: BTreeMap::new(),
            descriptors: BTreeMap::new(),
            scope: None,
        }
    }

    /// This context's id.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Parent context id; `None` for the root.
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    /// Number of instances registered here, pending deletes included.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Descriptor for an entity kind, resolved through this context's
    /// cache.
    pub fn descriptor(&mut self, kind: &str) -> FolioResult<Arc<EntityDescriptor>> {
        if let Some(descriptor) = self.descriptors.get(kind) {
            return Ok(descriptor.clone());
        }
        let descriptor = self
            .model
            .descriptor(kind)
            .ok_or_else(|| FolioError::UnknownEntity(kind.to_string()))?;
        self.descriptors.insert(kind.to_string(), descriptor.clone());
        Ok(descriptor)
    }

    /// Create a Transient instance of the given kind, initialized from
    /// the descriptor's defaults.
    pub fn create(&mut self, kind: &str) -> FolioResult<InstanceId> {
        let descriptor = self.descriptor(kind)?;
        let id = InstanceId::new();
        self.instances.insert(
            id,
            ManagedInstance {
                kind: kind.to_string(),
                attrs: descriptor.initial_attrs(),
                pristine: None,
                state: InstanceState::Transient,
                changed: BTreeSet::new(),
            },
        );
        if let Some(scope) = &mut self.scope {
            scope.record_created(id);
        }
        debug!(target: "folio::ctx", context = %self.id, instance = %id, kind, "Created instance");
        Ok(id)
    }

    /// State of a registered instance, or `None` if the id is unknown
    /// here.
    pub fn state(&self, id: InstanceId) -> Option<InstanceState> {
        self.instances.get(&id).map(|m| m.state)
    }

    /// Whether the instance is registered here and not marked deleted.
    pub fn contains(&self, id: InstanceId) -> bool {
        matches!(self.state(id), Some(state) if state != InstanceState::Deleted)
    }

    fn live(&self, id: InstanceId) -> &ManagedInstance {
        let managed = match self.instances.get(&id) {
            Some(managed) => managed,
            None => panic!("instance {} is not registered in context {}", id, self.id),
        };
        assert!(
            managed.state != InstanceState::Deleted,
            "instance {} was deleted in context {}",
            id,
            self.id
        );
        managed
    }

    /// Read one attribute. Missing names read as `Null`.
    ///
    /// # Panics
    /// Panics if the id is not registered here or was deleted.
    pub fn attr(&self, id: InstanceId, name: &str) -> &AttrValue {
        self.live(id).attrs.get(name).unwrap_or(&AttrValue::Null)
    }

    /// Owned snapshot of one instance's current values.
    ///
    /// # Panics
    /// Panics if the id is not registered here or was deleted.
    pub fn instance(&self, id: InstanceId) -> EntityInstance {
        self.live(id).snapshot(id)
    }

    /// Write one attribute. A Clean instance becomes Modified; the prior
    /// value is recorded into the active scope, if any. Writing the
    /// current value back is a no-op.
    ///
    /// # Panics
    /// Panics if the id is not registered here, was deleted, or the
    /// attribute is not declared for the entity kind. Type and
    /// optionality violations are deferred to save-time validation.
    pub fn set_attr(&mut self, id: InstanceId, name: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        let context = self.id;
        let managed = match self.instances.get_mut(&id) {
            Some(managed) => managed,
            None => panic!("instance {} is not registered in context {}", id, context),
        };
        assert!(
            managed.state != InstanceState::Deleted,
            "instance {} was deleted in context {}",
            id,
            context
        );
        let declared = self
            .model
            .descriptor(&managed.kind)
            .map(|d| d.has_attribute(name))
            .unwrap_or(false);
        assert!(
            declared,
            "unknown attribute '{}' on entity '{}'",
            name, managed.kind
        );

        let prior = managed.attrs.get(name).cloned().unwrap_or(AttrValue::Null);
        if prior == value {
            return;
        }

        if let Some(scope) = &mut self.scope {
            if !scope.was_created(id) {
                scope.record_prior(id, managed.state, &managed.changed, name, prior);
            }
        }

        if managed.state == InstanceState::Clean {
            managed.pristine = Some(managed.attrs.clone());
            managed.state = InstanceState::Modified;
        }
        if managed.state != InstanceState::Transient {
            managed.changed.insert(name.to_string());
        }
        managed.attrs.insert(name.to_string(), value);
    }

    /// Mark an instance for deletion.
    ///
    /// A Transient instance is removed outright, so create-then-delete
    /// nets to nothing. Anything else becomes Deleted and is purged by
    /// the next save.
    ///
    /// # Panics
    /// Panics if the id is not registered here or was already deleted.
    pub fn mark_deleted(&mut self, id: InstanceId) {
        let state = match self.instances.get(&id) {
            Some(managed) => managed.state,
            None => panic!("instance {} is not registered in context {}", id, self.id),
        };
        assert!(
            state != InstanceState::Deleted,
            "instance {} was already deleted in context {}",
            id,
            self.id
        );

        if state == InstanceState::Transient {
            self.instances.remove(&id);
            if let Some(scope) = &mut self.scope {
                scope.forget(id);
            }
        } else {
            if let Some(managed) = self.instances.get_mut(&id) {
                if managed.pristine.is_none() {
                    managed.pristine = Some(managed.attrs.clone());
                }
                managed.state = InstanceState::Deleted;
            }
            if let Some(scope) = &mut self.scope {
                scope.record_deleted(id, state);
            }
        }
        debug!(target: "folio::ctx", context = %self.id, instance = %id, "Marked deleted");
    }

    /// Whether a save would write anything.
    pub fn has_pending_changes(&self) -> bool {
        self.instances
            .values()
            .any(|m| m.state != InstanceState::Clean)
    }

    /// Register a committed row as a Clean working copy.
    ///
    /// A copy that is already registered wins, whatever its state; the
    /// incoming row is dropped.
    pub(crate) fn register_clean(&mut self, instance: EntityInstance) {
        if self.instances.contains_key(&instance.id) {
            return;
        }
        self.instances.insert(
            instance.id,
            ManagedInstance {
                kind: instance.kind,
                attrs: instance.attrs,
                pristine: None,
                state: InstanceState::Clean,
                changed: BTreeSet::new(),
            },
        );
    }

    /// Project this context's view of one kind onto an accumulator of
    /// committed rows: registered copies replace rows, delete marks
    /// remove them.
    pub(crate) fn overlay_kind(&self, kind: &str, acc: &mut BTreeMap<InstanceId, EntityInstance>) {
        for (id, managed) in &self.instances {
            if managed.kind != kind {
                continue;
            }
            if managed.state == InstanceState::Deleted {
                acc.remove(id);
            } else {
                acc.insert(*id, managed.snapshot(*id));
            }
        }
    }

    /// Collect pending changes as a save batch. The context itself is
    /// untouched.
    pub(crate) fn build_batch(&self) -> SaveBatch {
        let mut deltas = RecordDeltas::new();
        for (id, managed) in &self.instances {
            match managed.state {
                InstanceState::Clean => {}
                InstanceState::Transient => deltas.inserted.push(managed.snapshot(*id)),
                InstanceState::Modified => deltas
                    .updated
                    .push(UpdatedRecord::new(managed.snapshot(*id), managed.changed.clone())),
                InstanceState::Deleted => {
                    deltas.deleted.push(DeletedRecord::new(&managed.kind, *id))
                }
            }
        }
        SaveBatch::new(deltas)
    }

    /// Settle state after the batch from [`build_batch`](Self::build_batch)
    /// was applied downstream: Deleted instances are purged, everything
    /// else becomes Clean. Saving also closes any active scope; the
    /// editing session is committed.
    pub(crate) fn clear_pending_after_save(&mut self) {
        self.instances
            .retain(|_, m| m.state != InstanceState::Deleted);
        for managed in self.instances.values_mut() {
            managed.state = InstanceState::Clean;
            managed.pristine = None;
            managed.changed.clear();
        }
        self.scope = None;
    }

    /// Discard pending mutations: Transients and absorbed records are
    /// removed, Modified and Deleted instances restore their pristine
    /// snapshot. Any active scope dies with the pending state.
    pub(crate) fn rollback_pending(&mut self) {
        self.instances.retain(|_, m| match m.state {
            InstanceState::Transient => false,
            InstanceState::Modified | InstanceState::Deleted => m.pristine.is_some(),
            InstanceState::Clean => true,
        });
        for managed in self.instances.values_mut() {
            if managed.state != InstanceState::Clean {
                if let Some(pristine) = managed.pristine.take() {
                    managed.attrs = pristine;
                }
                managed.state = InstanceState::Clean;
                managed.changed.clear();
            }
        }
        self.scope = None;
    }

    /// Take a child's committed deltas over as this context's own
    /// pending changes.
    pub(crate) fn absorb(&mut self, deltas: &RecordDeltas) {
        for instance in &deltas.inserted {
            self.instances.insert(
                instance.id,
                ManagedInstance {
                    kind: instance.kind.clone(),
                    attrs: instance.attrs.clone(),
                    pristine: None,
                    state: InstanceState::Transient,
                    changed: BTreeSet::new(),
                },
            );
        }

        for update in &deltas.updated {
            let incoming = &update.instance;
            match self.instances.get_mut(&incoming.id) {
                Some(managed) => {
                    match managed.state {
                        // Still unsaved here, so the whole record remains
                        // an insert; just take the newer values
                        InstanceState::Transient => {
                            managed.attrs = incoming.attrs.clone();
                        }
                        InstanceState::Clean => {
                            managed.pristine = Some(managed.attrs.clone());
                            managed.attrs = incoming.attrs.clone();
                            managed.state = InstanceState::Modified;
                            managed.changed.extend(update.changed.iter().cloned());
                        }
                        InstanceState::Modified => {
                            managed.attrs = incoming.attrs.clone();
                            managed.changed.extend(update.changed.iter().cloned());
                        }
                        // The child edited a record this context had
                        // marked deleted; the child's save wins
                        InstanceState::Deleted => {
                            managed.attrs = incoming.attrs.clone();
                            managed.state = InstanceState::Modified;
                            managed.changed.extend(update.changed.iter().cloned());
                        }
                    }
                }
                None => {
                    self.instances.insert(
                        incoming.id,
                        ManagedInstance {
                            kind: incoming.kind.clone(),
                            attrs: incoming.attrs.clone(),
                            pristine: None,
                            state: InstanceState::Modified,
                            changed: update.changed.clone(),
                        },
                    );
                }
            }
        }

        for deletion in &deltas.deleted {
            match self.instances.get(&deletion.id).map(|m| m.state) {
                Some(InstanceState::Transient) => {
                    self.instances.remove(&deletion.id);
                }
                Some(InstanceState::Deleted) => {}
                Some(_) => {
                    if let Some(managed) = self.instances.get_mut(&deletion.id) {
                        if managed.pristine.is_none() {
                            managed.pristine = Some(managed.attrs.clone());
                        }
                        managed.state = InstanceState::Deleted;
                    }
                }
                None => {
                    self.instances.insert(
                        deletion.id,
                        ManagedInstance {
                            kind: deletion.kind.clone(),
                            attrs: BTreeMap::new(),
                            pristine: None,
                            state: InstanceState::Deleted,
                            changed: BTreeSet::new(),
                        },
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Undo scopes
    // ------------------------------------------------------------------

    /// Start recording mutations. A second `begin` while a scope is
    /// active replaces the active recording; the earlier session's
    /// changes are kept as if it had ended.
    pub fn begin_scope(&mut self) {
        if self.scope.is_some() {
            debug!(target: "folio::ctx", context = %self.id, "Replacing active undo scope");
        }
        self.scope = Some(ScopeRecording::default());
    }

    /// Whether a scope is currently recording.
    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }

    /// Close the scope, keeping its mutations. A later save persists
    /// them normally.
    ///
    /// # Panics
    /// Panics if no scope is active.
    pub fn end_scope(&mut self) {
        assert!(
            self.scope.take().is_some(),
            "end_scope without an active scope on context {}",
            self.id
        );
    }

    /// Close the scope and revert everything it recorded: prior values
    /// and states restored, in-scope delete marks cleared, in-scope
    /// creations removed entirely.
    ///
    /// # Panics
    /// Panics if no scope is active.
    pub fn discard_scope(&mut self) {
        let recording = match self.scope.take() {
            Some(recording) => recording,
            None => panic!("discard_scope without an active scope on context {}", self.id),
        };
        let (touched, created, deleted) = recording.into_parts();

        // Clear delete marks first so touched instances are writable again
        for (id, before) in deleted {
            if let Some(managed) = self.instances.get_mut(&id) {
                if managed.state == InstanceState::Deleted {
                    managed.state = before;
                    if before == InstanceState::Clean {
                        managed.pristine = None;
                    }
                }
            }
        }

        for (id, prior) in touched {
            if created.contains(&id) {
                continue;
            }
            if let Some(managed) = self.instances.get_mut(&id) {
                for (name, value) in prior.values {
                    managed.attrs.insert(name, value);
                }
                managed.changed = prior.changed;
                managed.state = prior.state;
                if prior.state == InstanceState::Clean {
                    managed.pristine = None;
                }
            }
        }

        for id in created {
            self.instances.remove(&id);
        }
        debug!(target: "folio::ctx", context = %self.id, "Discarded undo scope");
    }
}
