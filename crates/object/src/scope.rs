//! Undo scope recording
//!
//! A scope is a recording window over one context, backing the
//! "create-then-either-commit-or-discard" editing workflow. While a scope
//! is active the context records, first-write-wins:
//!
//! - the prior value of every attribute written, with the instance's
//!   state and changed-set as of its first in-scope touch
//! - ids created in-scope
//! - delete marks applied in-scope, with the pre-delete state
//!
//! Discarding the scope replays this data backwards: delete marks are
//! cleared, prior values and states restored, in-scope creations removed
//! entirely. Ending it just throws the recording away.

use crate::context::InstanceState;
use folio_core::{AttrValue, InstanceId};
use std::collections::{BTreeMap, BTreeSet};

/// What one instance looked like when the scope first touched it.
#[derive(Debug, Clone)]
pub(crate) struct PriorInstance {
    /// State at first in-scope write
    pub(crate) state: InstanceState,
    /// Changed-set at first in-scope write
    pub(crate) changed: BTreeSet<String>,
    /// First prior value per attribute written in-scope
    pub(crate) values: BTreeMap<String, AttrValue>,
}

/// The mutation record of one active scope.
#[derive(Debug, Default)]
pub(crate) struct ScopeRecording {
    touched: BTreeMap<InstanceId, PriorInstance>,
    created: BTreeSet<InstanceId>,
    deleted: BTreeMap<InstanceId, InstanceState>,
}

impl ScopeRecording {
    /// Record the prior value of one attribute write.
    ///
    /// `state` and `changed` describe the instance before the write; they
    /// are kept only for the first in-scope touch of the instance, and
    /// `prior` only for the first in-scope write of the attribute.
    pub(crate) fn record_prior(
        &mut self,
        id: InstanceId,
        state: InstanceState,
        changed: &BTreeSet<String>,
        attr: &str,
        prior: AttrValue,
    ) {
        let entry = self.touched.entry(id).or_insert_with(|| PriorInstance {
            state,
            changed: changed.clone(),
            values: BTreeMap::new(),
        });
        entry.values.entry(attr.to_string()).or_insert(prior);
    }

    /// Record an instance created in-scope.
    pub(crate) fn record_created(&mut self, id: InstanceId) {
        self.created.insert(id);
    }

    /// Record a delete mark applied in-scope, with the pre-delete state.
    pub(crate) fn record_deleted(&mut self, id: InstanceId, before: InstanceState) {
        self.deleted.entry(id).or_insert(before);
    }

    /// Whether the instance was created within this scope.
    pub(crate) fn was_created(&self, id: InstanceId) -> bool {
        self.created.contains(&id)
    }

    /// Drop all record of an instance.
    ///
    /// Used when an in-scope creation is deleted again: the instance is
    /// gone from the context, so there is nothing left to revert.
    pub(crate) fn forget(&mut self, id: InstanceId) {
        self.touched.remove(&id);
        self.created.remove(&id);
        self.deleted.remove(&id);
    }

    /// Consume the recording for replay at discard time.
    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<InstanceId, PriorInstance>,
        BTreeSet<InstanceId>,
        BTreeMap<InstanceId, InstanceState>,
    ) {
        (self.touched, self.created, self.deleted)
    }
}
