//! The element store: identity, associations, and cascading unlink.
//!
//! The store owns every live element and is the only place mutations
//! happen. Each mutation is validated against the schema, applied under
//! the registry lock, and then announced on the event bus. Locks are
//! never held while handlers run, so handlers may call back into the
//! store.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::bus::EventBus;
use crate::element::{Element, ElementId, References};
use crate::error::ModelError;
use crate::event::ModelEvent;
use crate::schema::{Cardinality, PropertyKind, Schema};
use crate::value::Value;

/// In-memory registry of model elements.
///
/// Elements are created, related, and unlinked through the store; every
/// structural change is observable only through the events emitted on
/// the bus passed at construction. Associations declared with an inverse
/// are kept consistent on both ends by every operation.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use maquette_model::schema::{KIND_DIAGRAM, KIND_SHAPE, PROP_DIAGRAM, PROP_OWNED_PRESENTATION};
/// use maquette_model::{ElementStore, EventBus, Schema, Value};
///
/// let store = ElementStore::new(Schema::modeling(), Arc::new(EventBus::new()));
/// let diagram = store.create(KIND_DIAGRAM)?;
/// let shape = store.create(KIND_SHAPE)?;
/// store.relate(shape, PROP_DIAGRAM, diagram)?;
///
/// let diagram = store.lookup(diagram).unwrap();
/// assert!(diagram.is_related(PROP_OWNED_PRESENTATION, shape));
/// # Ok::<(), maquette_model::ModelError>(())
/// ```
#[derive(Debug)]
pub struct ElementStore {
    schema: Schema,
    bus: Arc<EventBus>,
    registry: RwLock<IndexMap<ElementId, Element>>,
}

impl ElementStore {
    /// Creates an empty store emitting on the given bus.
    #[must_use]
    pub fn new(schema: Schema, bus: Arc<EventBus>) -> Self {
        Self {
            schema,
            bus,
            registry: RwLock::new(IndexMap::new()),
        }
    }

    /// Returns the schema the store validates against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Creates a new element of the given kind with no attributes set.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownKind`] if the schema does not define
    /// the kind, or a handler failure from the created event.
    pub fn create(&self, kind: &str) -> Result<ElementId, ModelError> {
        self.create_with(kind, IndexMap::new())
    }

    /// Creates a new element of the given kind with initial attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownKind`] for an undefined kind,
    /// [`ModelError::UnknownProperty`] or [`ModelError::PropertyMismatch`]
    /// when an initial attribute does not match the schema, or a handler
    /// failure from the created event.
    pub fn create_with(
        &self,
        kind: &str,
        attributes: IndexMap<String, Value>,
    ) -> Result<ElementId, ModelError> {
        let id = ElementId::new();
        self.register(id, kind, attributes)?;
        Ok(id)
    }

    /// Creates a new element and links it through a reference on an owner.
    ///
    /// Convenience for the common "create a presentation on a diagram"
    /// shape of call. The reference is validated before anything is
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownId`] for a dead owner, the usual
    /// schema errors for the property or kind, or a handler failure.
    pub fn create_owned(
        &self,
        owner: ElementId,
        property: &str,
        kind: &str,
    ) -> Result<ElementId, ModelError> {
        self.reference_def(owner, property)?;
        if !self.schema.contains_kind(kind) {
            return Err(ModelError::UnknownKind(kind.to_string()));
        }
        let id = self.create(kind)?;
        self.relate(owner, property, id)?;
        Ok(id)
    }

    /// Registers an element under a caller-supplied id.
    ///
    /// This is the replay path: undoing a deletion recreates the element
    /// with the id it had, so recorded association events stay valid.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::IdInUse`] if an element with this id is
    /// live, plus the same schema and handler errors as
    /// [`create_with`](Self::create_with).
    pub fn restore(
        &self,
        id: ElementId,
        kind: &str,
        attributes: IndexMap<String, Value>,
    ) -> Result<(), ModelError> {
        self.register(id, kind, attributes)
    }

    /// Retrieves a snapshot of a live element.
    ///
    /// Returns `None` for unknown or deleted ids; lookup never fails.
    #[must_use]
    pub fn lookup(&self, id: ElementId) -> Option<Element> {
        self.registry.read().get(&id).cloned()
    }

    /// Returns a lazy sequence of live elements matching the predicate.
    ///
    /// Iteration follows creation order. The id snapshot is taken here;
    /// elements deleted before being reached are skipped, elements
    /// created afterwards are not included. Call again for a fresh,
    /// restarted sequence.
    #[must_use]
    pub fn select<P>(&self, predicate: P) -> Select<'_, P>
    where
        P: Fn(&Element) -> bool,
    {
        let ids: Vec<ElementId> = self.registry.read().keys().copied().collect();
        Select {
            store: self,
            ids: ids.into_iter(),
            predicate,
        }
    }

    /// Returns the number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    /// Returns whether the store holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// Adds `target` to the named reference of `source`.
    ///
    /// The inverse end on the target is updated in the same step, and an
    /// association-added event is emitted per affected end, source side
    /// first. Linking an already-linked pair is a silent no-op. When a
    /// to-one end is occupied, the displaced association is removed
    /// first, with its own events.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownId`] for a dead source or target,
    /// schema errors for an unknown or non-reference property, or a
    /// handler failure from dispatch.
    pub fn relate(
        &self,
        source: ElementId,
        property: &str,
        target: ElementId,
    ) -> Result<(), ModelError> {
        let (cardinality, inverse, _) = self.reference_def(source, property)?;
        if !self.registry.read().contains_key(&target) {
            return Err(ModelError::UnknownId(target));
        }
        if self.related(source, property, target) {
            return Ok(());
        }

        // Occupied to-one ends lose their current association first.
        if cardinality == Cardinality::One {
            if let Some(displaced) = self.current_target(source, property) {
                self.unrelate(source, property, displaced)?;
            }
        }
        if let Some(inverse) = &inverse {
            let (inverse_cardinality, _, _) = self.reference_def(target, inverse)?;
            if inverse_cardinality == Cardinality::One {
                if let Some(displaced) = self.current_target(target, inverse) {
                    self.unrelate(target, inverse, displaced)?;
                }
            }
        }

        {
            let mut registry = self.registry.write();
            if let Some(element) = registry.get_mut(&source) {
                element.add_reference(property, target);
            }
            if let Some(inverse) = &inverse {
                if let Some(element) = registry.get_mut(&target) {
                    element.add_reference(inverse, source);
                }
            }
        }

        self.bus.emit(ModelEvent::AssociationAdded {
            element: source,
            property: property.to_string(),
            target,
        })?;
        if let Some(inverse) = inverse {
            self.bus.emit(ModelEvent::AssociationAdded {
                element: target,
                property: inverse,
                target: source,
            })?;
        }
        Ok(())
    }

    /// Removes `target` from the named reference of `source`.
    ///
    /// The inverse end is cleared in the same step; an
    /// association-deleted event is emitted per affected end, source
    /// side first. Removing an association that does not exist is a
    /// silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownId`] for a dead source, schema
    /// errors for the property, or a handler failure from dispatch.
    pub fn unrelate(
        &self,
        source: ElementId,
        property: &str,
        target: ElementId,
    ) -> Result<(), ModelError> {
        let (_, inverse, _) = self.reference_def(source, property)?;
        if !self.related(source, property, target) {
            return Ok(());
        }

        {
            let mut registry = self.registry.write();
            if let Some(element) = registry.get_mut(&source) {
                element.remove_reference(property, target);
            }
            if let Some(inverse) = &inverse {
                if let Some(element) = registry.get_mut(&target) {
                    element.remove_reference(inverse, source);
                }
            }
        }

        self.bus.emit(ModelEvent::AssociationDeleted {
            element: source,
            property: property.to_string(),
            target,
        })?;
        if let Some(inverse) = inverse {
            self.bus.emit(ModelEvent::AssociationDeleted {
                element: target,
                property: inverse,
                target: source,
            })?;
        }
        Ok(())
    }

    /// Sets, replaces, or clears (`None`) an attribute value.
    ///
    /// Emits an attribute-changed event carrying both the old and the
    /// new value. Writing the value already present is a silent no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownId`] for a dead element, schema
    /// errors for an unknown or non-attribute property, or a handler
    /// failure from dispatch.
    pub fn set_attribute(
        &self,
        id: ElementId,
        property: &str,
        value: Option<Value>,
    ) -> Result<(), ModelError> {
        let kind = self.kind_of(id)?;
        let kind_def = self
            .schema
            .kind(&kind)
            .ok_or_else(|| ModelError::UnknownKind(kind.clone()))?;
        let def = kind_def
            .property(property)
            .ok_or_else(|| ModelError::unknown_property(&kind, property))?;
        if !def.is_attribute() {
            return Err(ModelError::property_mismatch(
                &kind,
                property,
                "attribute",
                "reference",
            ));
        }

        let old = {
            let mut registry = self.registry.write();
            let Some(element) = registry.get_mut(&id) else {
                return Err(ModelError::UnknownId(id));
            };
            let old = element.attributes.get(property).cloned();
            if old == value {
                return Ok(());
            }
            match &value {
                Some(v) => {
                    element.attributes.insert(property.to_string(), v.clone());
                }
                None => {
                    element.attributes.shift_remove(property);
                }
            }
            old
        };

        self.bus.emit(ModelEvent::AttributeChanged {
            element: id,
            property: property.to_string(),
            old,
            new: value,
        })
    }

    /// Unlinks an element: cascading deletion with symmetric cleanup.
    ///
    /// In order: every association the element participates in is
    /// removed from both ends, then every element it exclusively owns is
    /// recursively unlinked (children's deleted events precede the
    /// parent's), and finally the element is deregistered and its
    /// deleted event emitted with the attribute values it held.
    ///
    /// Unlinking an id that is not live is a silent no-op, so a cascade
    /// reaching an element twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns a handler failure raised during any of the emitted
    /// events. The registry stays consistent up to the failing step;
    /// restoring the pre-transaction state is the transaction's job.
    pub fn unlink(&self, id: ElementId) -> Result<(), ModelError> {
        let Some(element) = self.lookup(id) else {
            return Ok(());
        };
        let Some(kind_def) = self.schema.kind(element.kind()) else {
            return Err(ModelError::UnknownKind(element.kind().to_string()));
        };

        // Owned children, captured before severing empties the slots.
        let mut owned: Vec<ElementId> = Vec::new();
        for property in kind_def.properties() {
            if let PropertyKind::Reference { owning: true, .. } = &property.kind {
                owned.extend_from_slice(element.targets(&property.name));
            }
        }

        // Sever every association, both ends. Targets are re-read per
        // property because each unrelate reshapes the registry.
        for property in kind_def.properties() {
            if !property.is_reference() {
                continue;
            }
            for target in self.targets_of(id, &property.name) {
                self.unrelate(id, &property.name, target)?;
            }
        }

        // Children before parent.
        for child in owned {
            self.unlink(child)?;
        }

        // A cascade below may already have deregistered this element.
        let removed = self.registry.write().shift_remove(&id);
        if let Some(element) = removed {
            debug!(element = %id, kind = %element.kind, "Element unlinked");
            self.bus.emit(ModelEvent::ElementDeleted {
                element: id,
                kind: element.kind,
                attributes: element.attributes,
            })?;
        }
        Ok(())
    }

    fn register(
        &self,
        id: ElementId,
        kind: &str,
        attributes: IndexMap<String, Value>,
    ) -> Result<(), ModelError> {
        let kind_def = self
            .schema
            .kind(kind)
            .ok_or_else(|| ModelError::UnknownKind(kind.to_string()))?;

        for name in attributes.keys() {
            let property = kind_def
                .property(name)
                .ok_or_else(|| ModelError::unknown_property(kind, name))?;
            if !property.is_attribute() {
                return Err(ModelError::property_mismatch(
                    kind,
                    name,
                    "attribute",
                    "reference",
                ));
            }
        }

        let mut references = IndexMap::new();
        for property in kind_def.properties() {
            if let PropertyKind::Reference { cardinality, .. } = &property.kind {
                let slot = match cardinality {
                    Cardinality::One => References::One(None),
                    Cardinality::Many => References::Many(Vec::new()),
                };
                references.insert(property.name.clone(), slot);
            }
        }

        {
            let mut registry = self.registry.write();
            if registry.contains_key(&id) {
                return Err(ModelError::IdInUse(id));
            }
            registry.insert(
                id,
                Element::new(id, kind.to_string(), attributes.clone(), references),
            );
        }

        debug!(element = %id, kind, "Element registered");
        self.bus.emit(ModelEvent::ElementCreated {
            element: id,
            kind: kind.to_string(),
            attributes,
        })
    }

    /// Resolves a reference property on a live element to
    /// (cardinality, inverse, owning).
    fn reference_def(
        &self,
        id: ElementId,
        property: &str,
    ) -> Result<(Cardinality, Option<String>, bool), ModelError> {
        let kind = self.kind_of(id)?;
        let kind_def = self
            .schema
            .kind(&kind)
            .ok_or_else(|| ModelError::UnknownKind(kind.clone()))?;
        let def = kind_def
            .property(property)
            .ok_or_else(|| ModelError::unknown_property(&kind, property))?;
        match &def.kind {
            PropertyKind::Reference {
                cardinality,
                inverse,
                owning,
            } => Ok((*cardinality, inverse.clone(), *owning)),
            PropertyKind::Attribute => Err(ModelError::property_mismatch(
                &kind,
                property,
                "reference",
                "attribute",
            )),
        }
    }

    fn kind_of(&self, id: ElementId) -> Result<String, ModelError> {
        self.registry
            .read()
            .get(&id)
            .map(|element| element.kind.clone())
            .ok_or(ModelError::UnknownId(id))
    }

    fn related(&self, source: ElementId, property: &str, target: ElementId) -> bool {
        self.registry
            .read()
            .get(&source)
            .is_some_and(|element| element.is_related(property, target))
    }

    fn current_target(&self, source: ElementId, property: &str) -> Option<ElementId> {
        self.registry
            .read()
            .get(&source)
            .and_then(|element| element.target(property))
    }

    fn targets_of(&self, id: ElementId, property: &str) -> Vec<ElementId> {
        self.registry
            .read()
            .get(&id)
            .map(|element| element.targets(property).to_vec())
            .unwrap_or_default()
    }
}

/// Lazy sequence of live elements produced by [`ElementStore::select`].
///
/// Each step resolves the next snapshotted id against the current
/// registry, so elements deleted mid-iteration are skipped rather than
/// yielded stale.
pub struct Select<'a, P> {
    store: &'a ElementStore,
    ids: std::vec::IntoIter<ElementId>,
    predicate: P,
}

impl<P> Iterator for Select<'_, P>
where
    P: Fn(&Element) -> bool,
{
    type Item = Element;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            if let Some(element) = self.store.lookup(id) {
                if (self.predicate)(&element) {
                    return Some(element);
                }
            }
        }
        None
    }
}
