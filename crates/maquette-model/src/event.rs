//! Change events emitted by the element store.
//!
//! Every mutation produces exactly the events needed to replay or revert
//! it. Mutation events carry enough payload to be inverted without
//! consulting the store, which is what the undo machinery relies on.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::value::Value;

/// Discriminant of a [`ModelEvent`], used for subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An element was created and registered.
    ElementCreated,
    /// An element was unlinked and deregistered.
    ElementDeleted,
    /// One end of an association gained a target.
    AssociationAdded,
    /// One end of an association lost a target.
    AssociationDeleted,
    /// An attribute value changed.
    AttributeChanged,
    /// An outermost transaction opened.
    TransactionBegin,
    /// An outermost transaction committed.
    TransactionCommit,
    /// An outermost transaction rolled back.
    TransactionRollback,
}

/// A change notification dispatched through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelEvent {
    /// An element was created and registered.
    ElementCreated {
        /// Id of the new element.
        element: ElementId,
        /// Kind the element was created as.
        kind: String,
        /// Attribute values set at creation time.
        attributes: IndexMap<String, Value>,
    },
    /// An element was unlinked and deregistered.
    ElementDeleted {
        /// Id of the removed element.
        element: ElementId,
        /// Kind the element had.
        kind: String,
        /// Attribute values at the moment of removal.
        attributes: IndexMap<String, Value>,
    },
    /// One end of an association gained a target.
    AssociationAdded {
        /// Element whose slot changed.
        element: ElementId,
        /// Reference property that changed.
        property: String,
        /// Target that was added.
        target: ElementId,
    },
    /// One end of an association lost a target.
    AssociationDeleted {
        /// Element whose slot changed.
        element: ElementId,
        /// Reference property that changed.
        property: String,
        /// Target that was removed.
        target: ElementId,
    },
    /// An attribute value changed.
    AttributeChanged {
        /// Element whose attribute changed.
        element: ElementId,
        /// Attribute property that changed.
        property: String,
        /// Value before the change.
        old: Option<Value>,
        /// Value after the change.
        new: Option<Value>,
    },
    /// An outermost transaction opened.
    TransactionBegin,
    /// An outermost transaction committed, carrying the mutation events
    /// emitted inside it in emission order.
    TransactionCommit {
        /// Mutation events accumulated during the transaction.
        events: Vec<ModelEvent>,
    },
    /// An outermost transaction rolled back, carrying the mutation events
    /// emitted inside it in emission order.
    TransactionRollback {
        /// Mutation events accumulated during the transaction.
        events: Vec<ModelEvent>,
    },
}

impl ModelEvent {
    /// Returns the event's discriminant.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ElementCreated { .. } => EventKind::ElementCreated,
            Self::ElementDeleted { .. } => EventKind::ElementDeleted,
            Self::AssociationAdded { .. } => EventKind::AssociationAdded,
            Self::AssociationDeleted { .. } => EventKind::AssociationDeleted,
            Self::AttributeChanged { .. } => EventKind::AttributeChanged,
            Self::TransactionBegin => EventKind::TransactionBegin,
            Self::TransactionCommit { .. } => EventKind::TransactionCommit,
            Self::TransactionRollback { .. } => EventKind::TransactionRollback,
        }
    }

    /// Returns whether this event describes a store mutation.
    ///
    /// Transaction delimiters are not mutations; they mark scope
    /// boundaries and are never journaled or inverted.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::TransactionBegin
                | Self::TransactionCommit { .. }
                | Self::TransactionRollback { .. }
        )
    }

    /// Returns the event that reverts this one, or `None` for
    /// transaction delimiters.
    ///
    /// Applying an event's inverse to a store in the post-event state
    /// brings it back to the pre-event state. The mapping is an
    /// involution: `e.inverse().inverse() == e` for mutation events.
    #[must_use]
    pub fn inverse(&self) -> Option<ModelEvent> {
        match self {
            Self::ElementCreated {
                element,
                kind,
                attributes,
            } => Some(Self::ElementDeleted {
                element: *element,
                kind: kind.clone(),
                attributes: attributes.clone(),
            }),
            Self::ElementDeleted {
                element,
                kind,
                attributes,
            } => Some(Self::ElementCreated {
                element: *element,
                kind: kind.clone(),
                attributes: attributes.clone(),
            }),
            Self::AssociationAdded {
                element,
                property,
                target,
            } => Some(Self::AssociationDeleted {
                element: *element,
                property: property.clone(),
                target: *target,
            }),
            Self::AssociationDeleted {
                element,
                property,
                target,
            } => Some(Self::AssociationAdded {
                element: *element,
                property: property.clone(),
                target: *target,
            }),
            Self::AttributeChanged {
                element,
                property,
                old,
                new,
            } => Some(Self::AttributeChanged {
                element: *element,
                property: property.clone(),
                old: new.clone(),
                new: old.clone(),
            }),
            Self::TransactionBegin
            | Self::TransactionCommit { .. }
            | Self::TransactionRollback { .. } => None,
        }
    }

    /// Returns the id of the element the event is about, if any.
    #[must_use]
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::ElementCreated { element, .. }
            | Self::ElementDeleted { element, .. }
            | Self::AssociationAdded { element, .. }
            | Self::AssociationDeleted { element, .. }
            | Self::AttributeChanged { element, .. } => Some(*element),
            Self::TransactionBegin
            | Self::TransactionCommit { .. }
            | Self::TransactionRollback { .. } => None,
        }
    }
}
