//! Entity-agnostic CRUD through a typed capability
//!
//! Every entity kind implements [`EntityKind`] once: a name and a
//! descriptor. [`Repository`] is a zero-sized handle parameterized over
//! that capability, funneling create/delete/find-all for the kind
//! through whatever context the caller supplies. No per-kind persistence
//! code, no extension of a shared base type.

use crate::manager::ContextManager;
use folio_core::{
    AttrValue, ContextId, EntityDescriptor, EntityInstance, FetchSpec, FolioResult, InstanceId,
};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Capability an entity kind implements to get repository access.
pub trait EntityKind {
    /// Entity kind name as registered in the model.
    const NAME: &'static str;

    /// Build the descriptor this kind is registered with.
    fn descriptor() -> EntityDescriptor;

    /// Attribute map a fresh instance starts with.
    fn defaults() -> BTreeMap<String, AttrValue> {
        Self::descriptor().initial_attrs()
    }
}

/// Zero-sized CRUD handle for one entity kind.
pub struct Repository<K: EntityKind> {
    _kind: PhantomData<K>,
}

impl<K: EntityKind> Repository<K> {
    /// Handle for the kind.
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }

    /// Create a Transient instance of this kind in a context.
    ///
    /// The instance is invisible to sibling or parent fetches until the
    /// chain of saves reaches them.
    pub fn create(&self, manager: &mut ContextManager, ctx: ContextId) -> FolioResult<InstanceId> {
        manager.create(ctx, K::NAME)
    }

    /// Mark an instance of this kind for deletion.
    pub fn delete(&self, manager: &mut ContextManager, ctx: ContextId, id: InstanceId) {
        manager.delete(ctx, id);
    }

    /// Snapshot fetch of every instance of this kind visible to the
    /// context.
    pub fn find_all(
        &self,
        manager: &mut ContextManager,
        ctx: ContextId,
    ) -> FolioResult<Vec<EntityInstance>> {
        manager.fetch(ctx, &FetchSpec::new(K::NAME))
    }

    /// Snapshot fetch with a full fetch spec.
    ///
    /// # Panics
    /// Panics if the spec targets a different entity kind.
    pub fn find_all_with(
        &self,
        manager: &mut ContextManager,
        ctx: ContextId,
        spec: &FetchSpec,
    ) -> FolioResult<Vec<EntityInstance>> {
        assert_eq!(
            spec.entity(),
            K::NAME,
            "fetch spec targets entity '{}', this repository handles '{}'",
            spec.entity(),
            K::NAME
        );
        manager.fetch(ctx, spec)
    }

    /// Descriptor for this kind, resolved through the context's cache.
    pub fn descriptor(
        &self,
        manager: &mut ContextManager,
        ctx: ContextId,
    ) -> FolioResult<Arc<EntityDescriptor>> {
        manager.descriptor(ctx, K::NAME)
    }
}

impl<K: EntityKind> Default for Repository<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityKind> Clone for Repository<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: EntityKind> Copy for Repository<K> {}

impl<K: EntityKind> fmt::Debug for Repository<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Repository<{}>", K::NAME)
    }
}
