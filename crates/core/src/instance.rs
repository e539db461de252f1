//! Entity instance snapshots
//!
//! An [`EntityInstance`] is an owned snapshot of one managed record: identity,
//! entity kind, and the full attribute map. Snapshots flow out of fetches,
//! through commit notifications, and into result sets; mutating a snapshot
//! never touches the context it came from.

use crate::types::InstanceId;
use crate::value::AttrValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Owned snapshot of one managed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInstance {
    /// Stable identity
    pub id: InstanceId,
    /// Entity kind name
    pub kind: String,
    /// Full attribute map; absent optional attributes appear as `Null`
    pub attrs: BTreeMap<String, AttrValue>,
}

impl EntityInstance {
    /// Build a snapshot from parts
    pub fn new(id: InstanceId, kind: &str, attrs: BTreeMap<String, AttrValue>) -> Self {
        Self {
            id,
            kind: kind.to_string(),
            attrs,
        }
    }

    /// Attribute value by name; missing names read as `Null`
    pub fn attr(&self, name: &str) -> &AttrValue {
        self.attrs.get(name).unwrap_or(&AttrValue::Null)
    }

    /// String attribute accessor
    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).as_str()
    }

    /// Integer attribute accessor
    pub fn int_attr(&self, name: &str) -> Option<i64> {
        self.attr(name).as_int()
    }

    /// Float attribute accessor
    pub fn float_attr(&self, name: &str) -> Option<f64> {
        self.attr(name).as_float()
    }

    /// Boolean attribute accessor
    pub fn bool_attr(&self, name: &str) -> Option<bool> {
        self.attr(name).as_bool()
    }

    /// Date attribute accessor
    pub fn date_attr(&self, name: &str) -> Option<DateTime<Utc>> {
        self.attr(name).as_date()
    }
}

impl fmt::Display for EntityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}
