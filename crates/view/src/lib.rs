//! # Folio View Layer
//!
//! Live, sectioned views over the object layer. A [`ResultObserver`]
//! binds one [`FetchSpec`](folio_core::FetchSpec) to a context and
//! keeps a [`ResultSet`] current across saves; each save yields at most
//! one [`ChangeBatch`] of positional events, computed by the pure
//! [`diff`] engine and applied atomically by consumers such as the
//! [`ViewSynchronizer`]. Observers can persist their arrangement in a
//! layout cache to skip the initial sort on the next launch.
//!
//! Event batches follow a fixed discipline: deletes are emitted before
//! inserts, deletes in descending and inserts in ascending path order,
//! so a consumer working through the batch never sees an index
//! invalidated by an earlier event.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cache;
pub mod diff;
pub mod event;
pub mod observer;
pub mod result_set;
pub mod sync;

pub use event::{BatchHandler, ChangeBatch, ChangeEvent};
pub use observer::ResultObserver;
pub use result_set::{ResultSet, Section};
pub use sync::ViewSynchronizer;
