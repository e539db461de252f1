//! On-disk record representation

use folio_core::{AttrValue, EntityInstance, InstanceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persisted record: attribute values plus the store version that last
/// wrote it.
///
/// The instance id and entity kind are not stored here; they are the keys
/// of the maps that hold the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Attribute values keyed by attribute name.
    pub attrs: BTreeMap<String, AttrValue>,
    /// Store version at which this record was last written.
    pub version: u64,
}

impl StoredRecord {
    /// Create a record from attribute values at a given store version.
    pub fn new(attrs: BTreeMap<String, AttrValue>, version: u64) -> Self {
        Self { attrs, version }
    }

    /// Materialize this record as an `EntityInstance` of the given kind.
    pub fn to_instance(&self, kind: &str, id: InstanceId) -> EntityInstance {
        EntityInstance {
            id,
            kind: kind.to_string(),
            attrs: self.attrs.clone(),
        }
    }
}
