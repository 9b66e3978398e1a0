//! Model elements and their identities.

use std::fmt;
use std::slice;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Unique identifier for a model element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(uuid::Uuid);

impl ElementId {
    /// Creates a new random element id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parses an element id from its string form.
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

/// The targets held by one reference property of an element.
///
/// The shape mirrors the property's declared cardinality: a to-one slot
/// holds at most one id, a to-many slot holds an ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum References {
    /// A to-one slot, empty or holding a single target.
    One(Option<ElementId>),
    /// A to-many slot holding targets in insertion order.
    Many(Vec<ElementId>),
}

impl References {
    /// Returns the targets currently held by this slot.
    #[must_use]
    pub fn targets(&self) -> &[ElementId] {
        match self {
            Self::One(Some(id)) => slice::from_ref(id),
            Self::One(None) => &[],
            Self::Many(ids) => ids,
        }
    }

    /// Returns whether the slot contains the given target.
    #[must_use]
    pub fn contains(&self, target: ElementId) -> bool {
        self.targets().contains(&target)
    }

    /// Returns the number of targets in the slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets().len()
    }

    /// Returns whether the slot holds no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets().is_empty()
    }
}

// To-many slots are compared as sets: membership is what the model
// guarantees, not the order in which links were re-established.
impl PartialEq for References {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::One(a), Self::One(b)) => a == b,
            (Self::Many(a), Self::Many(b)) => {
                let mut a = a.clone();
                let mut b = b.clone();
                a.sort_unstable();
                b.sort_unstable();
                a == b
            }
            _ => false,
        }
    }
}

impl Eq for References {}

/// A single element in the model.
///
/// Elements are plain records: every mutation goes through
/// [`ElementStore`](crate::store::ElementStore), which enforces the schema
/// and emits change events. The store hands out clones, so an `Element`
/// in user code is a snapshot, not a live view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub(crate) id: ElementId,
    pub(crate) kind: String,
    pub(crate) attributes: IndexMap<String, Value>,
    pub(crate) references: IndexMap<String, References>,
}

impl Element {
    /// Creates an element with empty slots shaped by the given property layout.
    pub(crate) fn new(
        id: ElementId,
        kind: String,
        attributes: IndexMap<String, Value>,
        references: IndexMap<String, References>,
    ) -> Self {
        Self {
            id,
            kind,
            attributes,
            references,
        }
    }

    /// Returns the element's id.
    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Returns the element's kind name.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the value of an attribute property, if set.
    #[must_use]
    pub fn attribute(&self, property: &str) -> Option<&Value> {
        self.attributes.get(property)
    }

    /// Returns the single target of a to-one reference property, if linked.
    ///
    /// Returns `None` both for an empty slot and for an unknown property;
    /// for a to-many property it returns the first target, if any.
    #[must_use]
    pub fn target(&self, property: &str) -> Option<ElementId> {
        self.references
            .get(property)
            .and_then(|refs| refs.targets().first().copied())
    }

    /// Returns all targets of a reference property.
    ///
    /// Unknown properties yield an empty slice.
    #[must_use]
    pub fn targets(&self, property: &str) -> &[ElementId] {
        self.references
            .get(property)
            .map(References::targets)
            .unwrap_or(&[])
    }

    /// Returns whether the given target is linked through the property.
    #[must_use]
    pub fn is_related(&self, property: &str, target: ElementId) -> bool {
        self.references
            .get(property)
            .is_some_and(|refs| refs.contains(target))
    }

    /// Iterates over the element's set attributes in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over the element's reference slots in declaration order.
    pub fn references(&self) -> impl Iterator<Item = (&str, &References)> {
        self.references.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Adds a target to a reference slot. No-op if already present.
    pub(crate) fn add_reference(&mut self, property: &str, target: ElementId) {
        match self.references.get_mut(property) {
            Some(References::One(slot)) => *slot = Some(target),
            Some(References::Many(ids)) => {
                if !ids.contains(&target) {
                    ids.push(target);
                }
            }
            None => {}
        }
    }

    /// Removes a target from a reference slot. No-op if absent.
    pub(crate) fn remove_reference(&mut self, property: &str, target: ElementId) {
        match self.references.get_mut(property) {
            Some(References::One(slot)) => {
                if *slot == Some(target) {
                    *slot = None;
                }
            }
            Some(References::Many(ids)) => {
                ids.retain(|id| *id != target);
            }
            None => {}
        }
    }
}
