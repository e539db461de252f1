//! Save batches and commit notifications
//!
//! A context submits a [`SaveBatch`] when it saves; the store (or the parent
//! context) applies it atomically and the manager publishes the result as a
//! [`SaveCommit`]. Both carry the same [`RecordDeltas`] payload: full
//! post-save snapshots plus the names of the attributes that changed, so a
//! result observer can re-derive its rows without fetching anything.

use crate::instance::EntityInstance;
use crate::types::{ContextId, InstanceId};
use std::collections::BTreeSet;

/// One updated record: the post-save snapshot and what changed
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedRecord {
    /// Snapshot after the save
    pub instance: EntityInstance,
    /// Names of the attributes this save changed
    pub changed: BTreeSet<String>,
}

impl UpdatedRecord {
    /// Build from a snapshot and changed-attribute names
    pub fn new(instance: EntityInstance, changed: BTreeSet<String>) -> Self {
        Self { instance, changed }
    }
}

/// One deleted record, identified by kind and id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    /// Entity kind name
    pub kind: String,
    /// Identity of the removed record
    pub id: InstanceId,
}

impl DeletedRecord {
    /// Build from kind and id
    pub fn new(kind: &str, id: InstanceId) -> Self {
        Self {
            kind: kind.to_string(),
            id,
        }
    }
}

/// The three delta classes one save produces
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordDeltas {
    /// Records this save created
    pub inserted: Vec<EntityInstance>,
    /// Records this save modified
    pub updated: Vec<UpdatedRecord>,
    /// Records this save removed
    pub deleted: Vec<DeletedRecord>,
}

impl RecordDeltas {
    /// Deltas with nothing in them
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the save changed anything
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of record operations
    pub fn op_count(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    /// Whether any delta touches the given entity kind
    pub fn touches_kind(&self, kind: &str) -> bool {
        self.inserted.iter().any(|i| i.kind == kind)
            || self.updated.iter().any(|u| u.instance.kind == kind)
            || self.deleted.iter().any(|d| d.kind == kind)
    }
}

/// What a context submits when it saves
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SaveBatch {
    /// The pending changes, as deltas
    pub deltas: RecordDeltas,
}

impl SaveBatch {
    /// Wrap deltas for submission to the store
    pub fn new(deltas: RecordDeltas) -> Self {
        Self { deltas }
    }

    /// Whether the batch carries no operations
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Published after a successful save with pending changes
///
/// `version` is the store commit version for root-context saves and `None`
/// when a child saved into its parent. A save with no pending changes
/// publishes nothing at all.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveCommit {
    /// Context that saved
    pub context: ContextId,
    /// Store commit version; `None` for child-to-parent saves
    pub version: Option<u64>,
    /// What the save changed
    pub deltas: RecordDeltas,
}

impl SaveCommit {
    /// Build a commit notification from an applied batch
    pub fn new(context: ContextId, version: Option<u64>, deltas: RecordDeltas) -> Self {
        Self {
            context,
            version,
            deltas,
        }
    }
}
