//! Change events and batches
//!
//! A [`ChangeBatch`] describes one save's effect on a sectioned result
//! set as an ordered list of positional events bracketed by `Begin` and
//! `End`. Inside the brackets the canonical order is: object deletes in
//! descending pre-change path order, section deletes descending, section
//! inserts ascending, object inserts in ascending post-change path
//! order, moves ascending by destination, updates ascending by current
//! path. Deletes precede inserts so a consumer applying events against
//! stale indices never collides with a freshly inserted row.

use folio_core::{EntityInstance, InstanceId, RowPath};

/// One positional change inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Opens a batch; always the first event
    Begin,
    /// A row joined the set, in post-change coordinates
    ObjectInserted {
        /// Snapshot of the new row
        instance: EntityInstance,
        /// Where it landed
        at: RowPath,
    },
    /// A row left the set, in pre-change coordinates
    ObjectDeleted {
        /// Identity of the removed row
        id: InstanceId,
        /// Where it was
        from: RowPath,
    },
    /// A row changed in place, in current coordinates
    ObjectUpdated {
        /// Post-save snapshot of the row
        instance: EntityInstance,
        /// Its current path
        at: RowPath,
    },
    /// A row changed position because an order-relevant attribute changed
    ObjectMoved {
        /// Post-save snapshot of the row
        instance: EntityInstance,
        /// Pre-change coordinates
        from: RowPath,
        /// Post-change coordinates
        to: RowPath,
    },
    /// A section appeared, at its post-change index
    SectionInserted {
        /// Group key of the new section
        key: Option<String>,
        /// Post-change section index
        at: usize,
    },
    /// A section vanished, at its pre-change index
    SectionDeleted {
        /// Group key of the removed section
        key: Option<String>,
        /// Pre-change section index
        from: usize,
    },
    /// Closes a batch; always the last event
    End,
}

impl ChangeEvent {
    /// Whether this event is one of the `Begin`/`End` brackets
    pub fn is_bracket(&self) -> bool {
        matches!(self, ChangeEvent::Begin | ChangeEvent::End)
    }
}

/// An ordered, bracketed list of events describing one save
///
/// Produced whole by the diff engine; consumers apply it atomically.
/// A batch always starts with `Begin` and ends with `End`, and one save
/// produces at most one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub(crate) fn new(events: Vec<ChangeEvent>) -> Self {
        Self { events }
    }

    /// Events in emission order, brackets included
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    /// Number of change events, brackets excluded
    pub fn change_count(&self) -> usize {
        self.events.iter().filter(|e| !e.is_bracket()).count()
    }
}

/// Consumes the batches a result observer emits
///
/// Called synchronously on the saving thread, after the observer's own
/// snapshot has been updated.
pub trait BatchHandler: Send + Sync {
    /// Apply one atomic batch, `Begin` through `End`
    fn handle(&self, batch: &ChangeBatch);
}
