//! FolioDB - Embedded object persistence with live sectioned views
//!
//! FolioDB keeps a graph of schema-validated entity instances in a
//! single store file and layers three things on top: a tree of
//! persistence contexts whose saves propagate child to parent, snapshot
//! fetches described by composable fetch specs, and live result
//! observers that translate each save into an atomic batch of
//! positional change events for a sectioned view.
//!
//! # Quick Start
//!
//! ```ignore
//! use foliodb::{
//!     AttributeDescriptor, AttributeType, ContextManager, EntityDescriptor, FetchSpec,
//!     Model, SortTerm,
//! };
//!
//! let model = Model::builder()
//!     .entity(
//!         EntityDescriptor::new("Book")
//!             .attribute(AttributeDescriptor::required("title", AttributeType::String))
//!             .attribute(AttributeDescriptor::optional("author", AttributeType::String)),
//!     )
//!     .finish();
//!
//! let mut manager = ContextManager::bootstrap("./library", model)?;
//! let root = manager.root_context();
//!
//! let id = manager.create(root, "Book")?;
//! manager.set_attr(root, id, "title", "Middlemarch");
//! manager.save(root)?;
//!
//! let spec = FetchSpec::new("Book").sort_by(SortTerm::ascending("title"));
//! let books = manager.fetch(root, &spec)?;
//! ```
//!
//! # Architecture
//!
//! - [`folio_core`]: the model vocabulary — attribute values, entity
//!   descriptors, fetch specs, save deltas, errors.
//! - [`folio_store`]: the durable layer — one checksummed store file,
//!   a TOML config, an exclusive directory lock.
//! - [`folio_object`]: the working layer — contexts, the manager, save
//!   propagation, undo scopes, typed repositories.
//! - [`folio_view`]: the presentation layer — sectioned result sets,
//!   the diff engine, layout caches, view synchronizers.
//!
//! This facade re-exports each layer's public surface.

pub use folio_core::{
    AttrValue, AttributeDescriptor, AttributeType, CompareOp, ContextId, DeletedRecord,
    EntityDescriptor, EntityInstance, FetchSpec, FolioError, FolioResult, GroupBy, GroupKey,
    InstanceId, Model, ModelBuilder, Predicate, RecordDeltas, RowPath, SaveBatch, SaveCommit,
    SortTerm, UpdatedRecord, ValidationReport, Violation,
};
pub use folio_object::{
    ContextManager, EntityKind, InstanceState, PersistenceContext, Repository, SaveObserver,
};
pub use folio_store::{
    AttributeStore, DurabilityMode, StoreConfig, StoreCoordinator, StoredRecord, CONFIG_FILE_NAME,
    STORE_FILE_NAME,
};
pub use folio_view::{
    diff, BatchHandler, ChangeBatch, ChangeEvent, ResultObserver, ResultSet, Section,
    ViewSynchronizer,
};
