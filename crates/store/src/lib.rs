//! # Folio Store
//!
//! Durable attribute storage for Folio.
//!
//! One store is one directory:
//!
//! - `folio.db` is the whole record image, checksummed and rewritten
//!   atomically on every save
//! - `folio.toml` configures durability and the layout cache location
//! - `.lock` guards the directory against concurrent processes
//!
//! The [`StoreCoordinator`] is the only entry point contexts use. It
//! validates save batches against the [`Model`](folio_core::Model),
//! commits them through a staged clone, and serves committed snapshots
//! to fetches.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod record;
pub mod store;

pub use config::{DurabilityMode, StoreConfig, CONFIG_FILE_NAME};
pub use coordinator::{StoreCoordinator, STORE_FILE_NAME};
pub use record::StoredRecord;
pub use store::AttributeStore;
