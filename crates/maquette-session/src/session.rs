//! Modeling session wiring
//!
//! A [`Session`] assembles the pieces a modeling application needs: an
//! event bus, an element store bound to a schema, and an undo manager
//! listening on that bus.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use maquette_model::{ElementStore, EventBus, ModelError, Schema};
use maquette_undo_redo::{HistoryConfig, UndoManager};

/// Unique identifier for a modeling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A ready-wired modeling session.
///
/// Owns the event bus, the element store, and the undo manager, wired
/// in that order. The undo manager subscribes before any caller can,
/// so its recorder observes every mutation ahead of later subscribers
/// and can reverse a transaction that a later subscriber rejects.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    bus: Arc<EventBus>,
    store: Arc<ElementStore>,
    undo: UndoManager,
}

impl Session {
    /// Creates a session over the built-in modeling schema with the
    /// default history depth.
    #[must_use]
    pub fn new() -> Self {
        Self::with_schema(Schema::modeling())
    }

    /// Creates a session over a custom schema.
    #[must_use]
    pub fn with_schema(schema: Schema) -> Self {
        Self::with_history(schema, HistoryConfig::default())
    }

    /// Creates a session over a custom schema with explicit history
    /// limits.
    #[must_use]
    pub fn with_history(schema: Schema, config: HistoryConfig) -> Self {
        let id = SessionId::new();
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(ElementStore::new(schema, Arc::clone(&bus)));
        let undo = UndoManager::with_config(Arc::clone(&store), Arc::clone(&bus), config);
        info!(session = %id, "Session created");
        Self {
            id,
            bus,
            store,
            undo,
        }
    }

    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The element store holding the session's model.
    #[must_use]
    pub fn store(&self) -> &Arc<ElementStore> {
        &self.store
    }

    /// The event bus every mutation is published on.
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The undo manager recording this session's transactions.
    #[must_use]
    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    /// Runs `f` inside a transaction on the session's bus.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`
    /// and hands the failure back.
    pub fn transact<T, F>(&self, f: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Result<T, ModelError>,
    {
        maquette_model::transact(&self.bus, f)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
