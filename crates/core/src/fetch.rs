//! Fetch specifications
//!
//! A [`FetchSpec`] describes what a fetch (or a live result set) selects:
//! the entity kind, a predicate over attribute values, sort terms, and an
//! optional group key that splits sorted rows into sections.
//!
//! Specs are immutable once bound to an observer, so every field is private
//! and set through builder-style constructors. The fingerprint over
//! (entity, predicate, sort, group) gates layout-cache reuse: a cache
//! written under one spec is never replayed under another.
//!
//! ## Design Notes
//!
//! - Predicate comparison uses the canonical total order of `AttrValue`
//!   (missing attributes read as `Null`, which sorts before everything).
//! - Sort ties are broken by `InstanceId` so row order is deterministic even
//!   when every sort attribute compares equal.

use crate::instance::EntityInstance;
use crate::types::InstanceId;
use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use xxhash_rust::xxh3::xxh3_64;

/// Comparison operator for attribute predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

/// Predicate over one instance's attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every instance
    All,
    /// Compare one attribute against a constant
    Compare {
        /// Attribute name
        attr: String,
        /// Comparison operator
        op: CompareOp,
        /// Constant to compare against
        value: AttrValue,
    },
    /// String attribute contains a substring
    Contains {
        /// Attribute name
        attr: String,
        /// Substring to look for
        needle: String,
    },
    /// String attribute starts with a prefix
    BeginsWith {
        /// Attribute name
        attr: String,
        /// Prefix to look for
        prefix: String,
    },
    /// Every sub-predicate matches
    And(Vec<Predicate>),
    /// At least one sub-predicate matches
    Or(Vec<Predicate>),
    /// Sub-predicate does not match
    Not(Box<Predicate>),
}

impl Predicate {
    /// Compare an attribute for equality
    pub fn eq(attr: &str, value: impl Into<AttrValue>) -> Self {
        Self::compare(attr, CompareOp::Eq, value)
    }

    /// Compare an attribute for inequality
    pub fn ne(attr: &str, value: impl Into<AttrValue>) -> Self {
        Self::compare(attr, CompareOp::Ne, value)
    }

    /// Attribute strictly less than a constant
    pub fn lt(attr: &str, value: impl Into<AttrValue>) -> Self {
        Self::compare(attr, CompareOp::Lt, value)
    }

    /// Attribute less than or equal to a constant
    pub fn le(attr: &str, value: impl Into<AttrValue>) -> Self {
        Self::compare(attr, CompareOp::Le, value)
    }

    /// Attribute strictly greater than a constant
    pub fn gt(attr: &str, value: impl Into<AttrValue>) -> Self {
        Self::compare(attr, CompareOp::Gt, value)
    }

    /// Attribute greater than or equal to a constant
    pub fn ge(attr: &str, value: impl Into<AttrValue>) -> Self {
        Self::compare(attr, CompareOp::Ge, value)
    }

    /// Build a comparison predicate
    pub fn compare(attr: &str, op: CompareOp, value: impl Into<AttrValue>) -> Self {
        Predicate::Compare {
            attr: attr.to_string(),
            op,
            value: value.into(),
        }
    }

    /// String attribute contains a substring
    pub fn contains(attr: &str, needle: &str) -> Self {
        Predicate::Contains {
            attr: attr.to_string(),
            needle: needle.to_string(),
        }
    }

    /// String attribute starts with a prefix
    pub fn begins_with(attr: &str, prefix: &str) -> Self {
        Predicate::BeginsWith {
            attr: attr.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Conjunction of predicates
    pub fn and(preds: Vec<Predicate>) -> Self {
        Predicate::And(preds)
    }

    /// Disjunction of predicates
    pub fn or(preds: Vec<Predicate>) -> Self {
        Predicate::Or(preds)
    }

    /// Negation
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Whether this instance satisfies the predicate
    pub fn matches(&self, instance: &EntityInstance) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Compare { attr, op, value } => {
                let actual = instance.attr(attr);
                match op {
                    CompareOp::Eq => actual == value,
                    CompareOp::Ne => actual != value,
                    CompareOp::Lt => actual < value,
                    CompareOp::Le => actual <= value,
                    CompareOp::Gt => actual > value,
                    CompareOp::Ge => actual >= value,
                }
            }
            Predicate::Contains { attr, needle } => instance
                .str_attr(attr)
                .map(|s| s.contains(needle.as_str()))
                .unwrap_or(false),
            Predicate::BeginsWith { attr, prefix } => instance
                .str_attr(attr)
                .map(|s| s.starts_with(prefix.as_str()))
                .unwrap_or(false),
            Predicate::And(preds) => preds.iter().all(|p| p.matches(instance)),
            Predicate::Or(preds) => preds.iter().any(|p| p.matches(instance)),
            Predicate::Not(pred) => !pred.matches(instance),
        }
    }
}

/// One sort term; terms apply in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortTerm {
    /// Attribute the term sorts by
    pub attr: String,
    /// Ascending or descending
    pub ascending: bool,
}

impl SortTerm {
    /// Ascending sort on an attribute
    pub fn ascending(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            ascending: true,
        }
    }

    /// Descending sort on an attribute
    pub fn descending(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            ascending: false,
        }
    }
}

/// How the group key is derived from the grouping attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBy {
    /// The attribute value itself
    Value,
    /// Uppercased first character of the string value ("#" when empty)
    FirstLetter,
}

/// Splits sorted rows into sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKey {
    /// Attribute the key derives from
    pub attr: String,
    /// Derivation rule
    pub by: GroupBy,
}

impl GroupKey {
    /// Group by the attribute value itself
    pub fn value(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            by: GroupBy::Value,
        }
    }

    /// Group by the uppercased first character of the string value
    pub fn first_letter(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            by: GroupBy::FirstLetter,
        }
    }

    /// Section key for one instance; `Null` attributes yield `None`
    pub fn key_for(&self, instance: &EntityInstance) -> Option<String> {
        let value = instance.attr(&self.attr);
        if value.is_null() {
            return None;
        }
        match self.by {
            GroupBy::Value => Some(match value {
                AttrValue::String(s) => s.clone(),
                other => other.to_string(),
            }),
            GroupBy::FirstLetter => {
                let text = match value {
                    AttrValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some(
                    text.chars()
                        .next()
                        .map(|c| c.to_uppercase().to_string())
                        .unwrap_or_else(|| "#".to_string()),
                )
            }
        }
    }
}

/// What a fetch selects: entity kind, predicate, sort terms, group key
///
/// Immutable once constructed; to change the query, build a new spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSpec {
    entity: String,
    predicate: Predicate,
    sort: Vec<SortTerm>,
    group: Option<GroupKey>,
    cache_name: Option<String>,
}

impl FetchSpec {
    /// Spec selecting every instance of one entity kind, unsorted
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            predicate: Predicate::All,
            sort: Vec::new(),
            group: None,
            cache_name: None,
        }
    }

    /// Restrict to instances matching a predicate
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Append a sort term
    pub fn sort_by(mut self, term: SortTerm) -> Self {
        self.sort.push(term);
        self
    }

    /// Split rows into sections by a group key
    ///
    /// Sections are runs of equal key in sorted row order, so the grouping
    /// attribute normally also leads the sort terms.
    pub fn group_by(mut self, key: GroupKey) -> Self {
        self.group = Some(key);
        self
    }

    /// Name the layout cache this spec may be persisted under
    pub fn with_cache(mut self, name: &str) -> Self {
        self.cache_name = Some(name.to_string());
        self
    }

    /// Entity kind this spec selects
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The predicate
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// The sort terms, in application order
    pub fn sort(&self) -> &[SortTerm] {
        &self.sort
    }

    /// The group key, if any
    pub fn group(&self) -> Option<&GroupKey> {
        self.group.as_ref()
    }

    /// The layout cache name, if any
    pub fn cache_name(&self) -> Option<&str> {
        self.cache_name.as_deref()
    }

    /// Whether an instance is selected (kind and predicate)
    pub fn matches(&self, instance: &EntityInstance) -> bool {
        instance.kind == self.entity && self.predicate.matches(instance)
    }

    /// Section key for an instance; `None` without a group key
    pub fn section_key(&self, instance: &EntityInstance) -> Option<String> {
        self.group.as_ref().and_then(|g| g.key_for(instance))
    }

    /// Attributes whose change can move a row: sort terms plus group key
    pub fn order_relevant_attrs(&self) -> BTreeSet<String> {
        let mut attrs: BTreeSet<String> =
            self.sort.iter().map(|term| term.attr.clone()).collect();
        if let Some(group) = &self.group {
            attrs.insert(group.attr.clone());
        }
        attrs
    }

    /// Row ordering: sort terms in order, ties broken by instance id
    pub fn compare(&self, a: &EntityInstance, b: &EntityInstance) -> Ordering {
        for term in &self.sort {
            let ord = a.attr(&term.attr).cmp(b.attr(&term.attr));
            let ord = if term.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    }

    /// Stable fingerprint over (entity, predicate, sort, group)
    ///
    /// The cache name is deliberately excluded: renaming a cache must not
    /// invalidate its contents, while changing what the spec selects must.
    pub fn fingerprint(&self) -> u64 {
        let key = (&self.entity, &self.predicate, &self.sort, &self.group);
        // Spec terms are plain data; encoding them cannot fail
        let bytes = bincode::serialize(&key).unwrap_or_default();
        xxh3_64(&bytes)
    }
}
