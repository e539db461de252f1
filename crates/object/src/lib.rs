//! # Folio Object Layer
//!
//! Managed working copies over the attribute store:
//!
//! - [`ContextManager`] owns the stack: model, store coordinator, and a
//!   tree of contexts. Saving a child context publishes into its parent;
//!   only a root save commits to the store file.
//! - [`PersistenceContext`] tracks one working set: Transient, Clean,
//!   Modified and Deleted instances, pending until a save.
//! - [`Repository`] gives typed, entity-agnostic CRUD over any
//!   [`EntityKind`].
//! - Undo scopes wrap short editing sessions so a cancelled creation or
//!   edit rolls back cleanly.
//!
//! Successful saves notify [`SaveObserver`] subscribers synchronously;
//! the view layer builds its live result sets on top of that.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod manager;
pub mod repository;
mod scope;

pub use context::{InstanceState, PersistenceContext};
pub use manager::{ContextManager, SaveObserver};
pub use repository::{EntityKind, Repository};
