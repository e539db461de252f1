//! Core types for the folio persistence layer
//!
//! This module defines the foundational identity types:
//! - InstanceId: Stable identity of a managed instance
//! - ContextId: Handle to a persistence context in the manager's arena
//! - RowPath: Positional (section, row) coordinate in a sectioned result set

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a managed entity instance
///
/// An InstanceId is a wrapper around a UUID v4, assigned at creation time and
/// carried unchanged through saves, context propagation, and the store file.
/// Identity is distinct from every attribute value: two instances with equal
/// attributes are still different instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Create a new random InstanceId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an InstanceId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse an InstanceId from a string representation
    ///
    /// Accepts standard UUID format (with or without hyphens).
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this InstanceId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a persistence context
///
/// Allocated sequentially by the context manager; the handle stays unique for
/// the lifetime of the manager even after the context is discarded, so a stale
/// handle can never alias a newer context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Build a handle from its raw value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value of this handle
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Positional coordinate of a row in a sectioned result set
///
/// Ordering is section-major: all paths in section 0 sort before any path in
/// section 1. Change batches rely on this ordering when emitting deletes in
/// descending and inserts in ascending path order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowPath {
    /// Section index
    pub section: usize,
    /// Row index within the section
    pub row: usize,
}

impl RowPath {
    /// Create a path from section and row indices
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

impl fmt::Display for RowPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.section, self.row)
    }
}
