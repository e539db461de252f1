//! Core types for the folio persistence layer
//!
//! This crate defines the foundational types used throughout the system:
//! - InstanceId / ContextId / RowPath: identity and position types
//! - AttrValue: unified attribute value enum with a canonical total order
//! - EntityDescriptor / Model: schema metadata and save-time validation
//! - EntityInstance: owned record snapshots
//! - FetchSpec: predicate, sort terms, group key
//! - SaveBatch / SaveCommit: what a save submits and what it publishes
//! - FolioError: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit;
pub mod error;
pub mod fetch;
pub mod instance;
pub mod schema;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use commit::{DeletedRecord, RecordDeltas, SaveBatch, SaveCommit, UpdatedRecord};
pub use error::{FolioError, FolioResult};
pub use fetch::{CompareOp, FetchSpec, GroupBy, GroupKey, Predicate, SortTerm};
pub use instance::EntityInstance;
pub use schema::{
    AttributeDescriptor, AttributeType, EntityDescriptor, Model, ModelBuilder, ValidationReport,
    Violation,
};
pub use types::{ContextId, InstanceId, RowPath};
pub use value::AttrValue;
