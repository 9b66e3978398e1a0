#![warn(missing_docs)]

//! Ready-wired modeling sessions for maquette.
//!
//! A [`Session`] bundles an event bus, an element store, and an undo
//! manager into one value with the wiring an application would
//! otherwise have to repeat: the undo manager listens on the bus from
//! the moment the session exists, so every committed transaction is
//! undoable and every failed one is rolled back.
//!
//! # Example
//!
//! ```
//! use maquette_model::schema::{KIND_DIAGRAM, KIND_SHAPE, PROP_OWNED_PRESENTATION};
//! use maquette_session::Session;
//!
//! let session = Session::new();
//! let store = session.store();
//!
//! let diagram = session.transact(|| {
//!     let diagram = store.create(KIND_DIAGRAM)?;
//!     store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
//!     Ok(diagram)
//! })?;
//!
//! session.undo_manager().undo_transaction().unwrap();
//! assert!(store.lookup(diagram).is_none());
//! # Ok::<(), maquette_model::ModelError>(())
//! ```

pub mod session;

// Re-export public API
pub use session::{Session, SessionId};
