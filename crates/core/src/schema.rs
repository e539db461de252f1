//! Entity schema metadata
//!
//! This module defines the descriptor types that make uniform persistence
//! possible:
//! - AttributeType / AttributeDescriptor: one attribute of an entity kind
//! - EntityDescriptor: the full shape of one entity kind
//! - Model / ModelBuilder: the immutable set of descriptors a store is
//!   opened with
//! - ValidationReport / Violation: save-time schema check results
//!
//! Descriptors are assembled in code once at startup and never change for
//! the lifetime of the stack. Validation runs when a save batch reaches the
//! store, not on every attribute write, so a context can hold intermediate
//! states (a still-empty required attribute, say) without failing early.

use crate::commit::RecordDeltas;
use crate::types::InstanceId;
use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The declared type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Boolean attribute
    Bool,
    /// 64-bit integer attribute
    Int,
    /// 64-bit float attribute
    Float,
    /// UTF-8 string attribute
    String,
    /// UTC timestamp attribute
    Date,
}

impl AttributeType {
    /// Whether a non-null value matches this declared type
    ///
    /// `Null` is handled by the optionality check, not here.
    pub fn accepts(&self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (AttributeType::Bool, AttrValue::Bool(_))
                | (AttributeType::Int, AttrValue::Int(_))
                | (AttributeType::Float, AttrValue::Float(_))
                | (AttributeType::String, AttrValue::String(_))
                | (AttributeType::Date, AttrValue::Date(_))
        )
    }

    /// Type name used in violation messages
    pub fn name(&self) -> &'static str {
        match self {
            AttributeType::Bool => "Bool",
            AttributeType::Int => "Int",
            AttributeType::Float => "Float",
            AttributeType::String => "String",
            AttributeType::Date => "Date",
        }
    }
}

/// Describes one attribute of an entity kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute name, unique within its entity kind
    pub name: String,
    /// Declared type
    pub ty: AttributeType,
    /// Whether `Null` is a valid saved value
    pub optional: bool,
    /// Initial value for newly created instances; `None` means `Null`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<AttrValue>,
}

impl AttributeDescriptor {
    /// A required attribute (must be non-null at save time)
    pub fn required(name: &str, ty: AttributeType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            optional: false,
            default: None,
        }
    }

    /// An optional attribute (`Null` is a valid saved value)
    pub fn optional(name: &str, ty: AttributeType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            optional: true,
            default: None,
        }
    }

    /// Attach a default value used when instances are created
    pub fn with_default(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// The value a fresh instance starts with
    pub fn initial_value(&self) -> AttrValue {
        self.default.clone().unwrap_or(AttrValue::Null)
    }
}

/// The full shape of one entity kind
///
/// Attribute order is declaration order; names are unique within the kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity kind name, unique within the model
    pub name: String,
    /// Declared attributes
    pub attributes: Vec<AttributeDescriptor>,
}

impl EntityDescriptor {
    /// Start a descriptor with no attributes
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute (builder style)
    ///
    /// # Panics
    /// Panics if an attribute with the same name was already added; schemas
    /// are code-defined therefore a duplicate is a programming error.
    pub fn attribute(mut self, attr: AttributeDescriptor) -> Self {
        assert!(
            self.attribute_named(&attr.name).is_none(),
            "duplicate attribute '{}' on entity '{}'",
            attr.name,
            self.name
        );
        self.attributes.push(attr);
        self
    }

    /// Look up an attribute by name
    pub fn attribute_named(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Whether an attribute with this name is declared
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_named(name).is_some()
    }

    /// Attribute map a fresh instance starts with
    pub fn initial_attrs(&self) -> BTreeMap<String, AttrValue> {
        self.attributes
            .iter()
            .map(|a| (a.name.clone(), a.initial_value()))
            .collect()
    }

    /// Check one record against this descriptor
    ///
    /// Returns every violation found: unknown attribute names, required
    /// attributes left null, and type mismatches.
    pub fn check_record(
        &self,
        id: Option<InstanceId>,
        attrs: &BTreeMap<String, AttrValue>,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();

        for name in attrs.keys() {
            if !self.has_attribute(name) {
                violations.push(Violation {
                    entity: self.name.clone(),
                    instance: id,
                    reason: format!("unknown attribute '{}'", name),
                });
            }
        }

        for attr in &self.attributes {
            let value = attrs.get(&attr.name).unwrap_or(&AttrValue::Null);
            if value.is_null() {
                if !attr.optional {
                    violations.push(Violation {
                        entity: self.name.clone(),
                        instance: id,
                        reason: format!("required attribute '{}' is null", attr.name),
                    });
                }
            } else if !attr.ty.accepts(value) {
                violations.push(Violation {
                    entity: self.name.clone(),
                    instance: id,
                    reason: format!(
                        "attribute '{}' expects {}, got {}",
                        attr.name,
                        attr.ty.name(),
                        value.type_name()
                    ),
                });
            }
        }

        violations
    }
}

/// One schema violation found at save time
#[derive(Debug, Clone)]
pub struct Violation {
    /// Entity kind the record claims to be
    pub entity: String,
    /// Offending instance, when known
    pub instance: Option<InstanceId>,
    /// Human-readable reason
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance {
            Some(id) => write!(f, "{} {}: {}", self.entity, id, self.reason),
            None => write!(f, "{}: {}", self.entity, self.reason),
        }
    }
}

/// All violations collected from one save batch
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Violations in batch order
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Whether the batch passed validation
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of violations
    pub fn len(&self) -> usize {
        self.violations.len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for v in &self.violations {
            write!(f, "; {}", v)?;
        }
        Ok(())
    }
}

/// Immutable set of entity descriptors a store is opened with
///
/// Built once at startup; descriptors are shared as `Arc` so contexts can
/// cache them without copying.
#[derive(Debug, Clone)]
pub struct Model {
    entities: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl Model {
    /// Start building a model
    pub fn builder() -> ModelBuilder {
        ModelBuilder {
            entities: BTreeMap::new(),
        }
    }

    /// Look up a descriptor by entity kind name
    pub fn descriptor(&self, kind: &str) -> Option<Arc<EntityDescriptor>> {
        self.entities.get(kind).cloned()
    }

    /// Whether the model declares this entity kind
    pub fn contains(&self, kind: &str) -> bool {
        self.entities.contains_key(kind)
    }

    /// Declared entity kind names, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(|k| k.as_str())
    }

    /// Number of declared entity kinds
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the model declares no entity kinds
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check every record a save writes against its descriptor
    ///
    /// Inserted and updated records are checked in full. Deletions carry
    /// no attributes, so only their kind is checked. An empty report means
    /// the deltas are safe to commit.
    pub fn check_deltas(&self, deltas: &RecordDeltas) -> ValidationReport {
        let mut violations = Vec::new();

        let written = deltas
            .inserted
            .iter()
            .chain(deltas.updated.iter().map(|u| &u.instance));
        for instance in written {
            match self.descriptor(&instance.kind) {
                Some(descriptor) => {
                    violations.extend(descriptor.check_record(Some(instance.id), &instance.attrs));
                }
                None => violations.push(Violation {
                    entity: instance.kind.clone(),
                    instance: Some(instance.id),
                    reason: "entity kind not in model".to_string(),
                }),
            }
        }
        for deletion in &deltas.deleted {
            if !self.contains(&deletion.kind) {
                violations.push(Violation {
                    entity: deletion.kind.clone(),
                    instance: Some(deletion.id),
                    reason: "entity kind not in model".to_string(),
                });
            }
        }

        ValidationReport { violations }
    }
}

/// Builder for [`Model`]
#[derive(Debug)]
pub struct ModelBuilder {
    entities: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl ModelBuilder {
    /// Register an entity descriptor
    ///
    /// # Panics
    /// Panics if a descriptor with the same name was already registered.
    pub fn entity(mut self, descriptor: EntityDescriptor) -> Self {
        let name = descriptor.name.clone();
        let previous = self.entities.insert(name.clone(), Arc::new(descriptor));
        assert!(previous.is_none(), "duplicate entity kind '{}'", name);
        self
    }

    /// Finish building
    pub fn finish(self) -> Model {
        Model {
            entities: self.entities,
        }
    }
}
