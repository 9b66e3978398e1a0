#![warn(missing_docs)]

//! Transactional, event-sourced element store for maquette
//!
//! Holds an in-memory graph of model elements whose every mutation is
//! validated against a schema, applied atomically to both association
//! ends, and announced synchronously on an event bus. Transaction scopes
//! batch mutations into one journaled unit, which is what the undo
//! machinery layers on top of.

pub mod bus;
pub mod element;
pub mod error;
pub mod event;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod value;

// Re-export public API
pub use bus::{EventBus, EventFilter, Handler, SubscriptionId};
pub use element::{Element, ElementId, References};
pub use error::{HandlerError, ModelError, SchemaError};
pub use event::{EventKind, ModelEvent};
pub use schema::{Cardinality, KindDef, PropertyDef, PropertyKind, Schema, SchemaBuilder};
pub use store::{ElementStore, Select};
pub use transaction::{transact, Transaction};
pub use value::Value;
