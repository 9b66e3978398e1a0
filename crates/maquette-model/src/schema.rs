//! Schema registry describing element kinds and their properties.
//!
//! A [`Schema`] maps each kind name to an ordered list of property
//! definitions. Reference properties may declare an inverse property and
//! an owning flag; the store uses both to keep associations bidirectional
//! and to cascade deletion from owners to owned elements.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Kind name of the plain base element.
pub const KIND_ELEMENT: &str = "element";
/// Kind name of a diagram, the owning container for presentations.
pub const KIND_DIAGRAM: &str = "diagram";
/// Kind name of a shape placed on a diagram.
pub const KIND_SHAPE: &str = "shape";
/// Kind name of a connector joining two presentations.
pub const KIND_CONNECTOR: &str = "connector";

/// Attribute property holding a display name.
pub const PROP_NAME: &str = "name";
/// Reference from a presentation to the diagram it lives on.
pub const PROP_DIAGRAM: &str = "diagram";
/// Reference from a diagram to the presentations it owns.
pub const PROP_OWNED_PRESENTATION: &str = "owned_presentation";
/// Reference from a connector to the presentation at its head.
pub const PROP_HEAD: &str = "head";
/// Reference from a connector to the presentation at its tail.
pub const PROP_TAIL: &str = "tail";
/// Reverse of [`PROP_HEAD`]: connectors whose head is this presentation.
pub const PROP_HEAD_OF: &str = "head_of";
/// Reverse of [`PROP_TAIL`]: connectors whose tail is this presentation.
pub const PROP_TAIL_OF: &str = "tail_of";

/// How many targets a reference property may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// At most one target.
    One,
    /// Any number of targets, kept in insertion order.
    Many,
}

/// What a property stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// A value slot holding an optional [`Value`](crate::value::Value).
    Attribute,
    /// A link slot holding ids of other elements.
    Reference {
        /// Number of targets the slot may hold.
        cardinality: Cardinality,
        /// Property on the target that mirrors this link, if any.
        inverse: Option<String>,
        /// Whether targets are owned and deleted along with this element.
        owning: bool,
    },
}

/// A named property of a kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Property name, unique within its kind.
    pub name: String,
    /// Attribute or reference, with reference metadata.
    pub kind: PropertyKind,
}

impl PropertyDef {
    /// Returns whether this property is a reference.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, PropertyKind::Reference { .. })
    }

    /// Returns whether this property is an attribute.
    #[must_use]
    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, PropertyKind::Attribute)
    }
}

/// Definition of one element kind: its name and ordered properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindDef {
    name: String,
    properties: Vec<PropertyDef>,
}

impl KindDef {
    /// Starts a kind definition with no properties.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
        }
    }

    /// Adds an attribute property.
    #[must_use]
    pub fn attribute(mut self, name: &str) -> Self {
        self.properties.push(PropertyDef {
            name: name.to_string(),
            kind: PropertyKind::Attribute,
        });
        self
    }

    /// Adds a reference property.
    #[must_use]
    pub fn reference(
        mut self,
        name: &str,
        cardinality: Cardinality,
        inverse: Option<&str>,
        owning: bool,
    ) -> Self {
        self.properties.push(PropertyDef {
            name: name.to_string(),
            kind: PropertyKind::Reference {
                cardinality,
                inverse: inverse.map(str::to_string),
                owning,
            },
        });
        self
    }

    /// Returns the kind's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the kind's properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }
}

/// Registry of element kinds, looked up by the store on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    kinds: IndexMap<String, KindDef>,
}

impl Schema {
    /// Starts building a schema from scratch.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder { kinds: Vec::new() }
    }

    /// Returns the built-in modeling schema.
    ///
    /// It covers plain elements, diagrams that own their presentations,
    /// shapes placed on a diagram, and connectors joining presentations
    /// head-to-tail.
    #[must_use]
    pub fn modeling() -> Self {
        let mut kinds = IndexMap::new();
        for def in modeling_kinds() {
            kinds.insert(def.name.clone(), def);
        }
        Self { kinds }
    }

    /// Looks up a kind definition by name.
    #[must_use]
    pub fn kind(&self, name: &str) -> Option<&KindDef> {
        self.kinds.get(name)
    }

    /// Returns whether the schema defines the given kind.
    #[must_use]
    pub fn contains_kind(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Iterates over the defined kinds in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = &KindDef> {
        self.kinds.values()
    }
}

/// Builder validating kind and property declarations.
#[derive(Debug)]
pub struct SchemaBuilder {
    kinds: Vec<KindDef>,
}

impl SchemaBuilder {
    /// Adds a kind definition.
    #[must_use]
    pub fn kind(mut self, def: KindDef) -> Self {
        self.kinds.push(def);
        self
    }

    /// Validates the declarations and produces the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when a kind or property name is declared
    /// twice, or when a declared inverse has no reciprocal declaration
    /// pointing back at the property.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut kinds: IndexMap<String, KindDef> = IndexMap::new();
        for def in self.kinds {
            if kinds.contains_key(&def.name) {
                return Err(SchemaError::DuplicateKind(def.name));
            }
            for (i, property) in def.properties.iter().enumerate() {
                if def.properties[..i].iter().any(|p| p.name == property.name) {
                    return Err(SchemaError::DuplicateProperty {
                        kind: def.name.clone(),
                        property: property.name.clone(),
                    });
                }
            }
            kinds.insert(def.name.clone(), def);
        }

        // Every declared inverse must be declared back from the other side.
        for def in kinds.values() {
            for property in &def.properties {
                let PropertyKind::Reference {
                    inverse: Some(inverse),
                    ..
                } = &property.kind
                else {
                    continue;
                };
                let reciprocal = kinds.values().any(|other| {
                    other.property(inverse).is_some_and(|p| {
                        matches!(
                            &p.kind,
                            PropertyKind::Reference { inverse: Some(back), .. }
                                if back == &property.name
                        )
                    })
                });
                if !reciprocal {
                    return Err(SchemaError::InverseMismatch {
                        kind: def.name.clone(),
                        property: property.name.clone(),
                        inverse: inverse.clone(),
                    });
                }
            }
        }

        Ok(Schema { kinds })
    }
}

fn modeling_kinds() -> Vec<KindDef> {
    vec![
        KindDef::new(KIND_ELEMENT).attribute(PROP_NAME),
        KindDef::new(KIND_DIAGRAM).attribute(PROP_NAME).reference(
            PROP_OWNED_PRESENTATION,
            Cardinality::Many,
            Some(PROP_DIAGRAM),
            true,
        ),
        KindDef::new(KIND_SHAPE)
            .attribute(PROP_NAME)
            .reference(
                PROP_DIAGRAM,
                Cardinality::One,
                Some(PROP_OWNED_PRESENTATION),
                false,
            )
            .reference(PROP_HEAD_OF, Cardinality::Many, Some(PROP_HEAD), false)
            .reference(PROP_TAIL_OF, Cardinality::Many, Some(PROP_TAIL), false),
        KindDef::new(KIND_CONNECTOR)
            .attribute(PROP_NAME)
            .reference(
                PROP_DIAGRAM,
                Cardinality::One,
                Some(PROP_OWNED_PRESENTATION),
                false,
            )
            .reference(PROP_HEAD, Cardinality::One, Some(PROP_HEAD_OF), false)
            .reference(PROP_TAIL, Cardinality::One, Some(PROP_TAIL_OF), false)
            .reference(PROP_HEAD_OF, Cardinality::Many, Some(PROP_HEAD), false)
            .reference(PROP_TAIL_OF, Cardinality::Many, Some(PROP_TAIL), false),
    ]
}
