//! Undo manager: records inverse operations and replays them.
//!
//! The manager subscribes to the event bus and follows the transaction
//! delimiters. While a transaction is open it appends the inverse of
//! every observed mutation to an open unit; commit files the unit,
//! rollback replays it immediately to restore the pre-transaction
//! state. Re-entrant emissions during undo, redo, or rollback replay
//! are observed in a non-recording mode so they never become units of
//! their own.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use maquette_model::{
    transact, ElementStore, EventBus, EventFilter, ModelError, ModelEvent, SubscriptionId,
};

use crate::error::UndoRedoError;
use crate::history::{History, HistoryConfig, UndoUnit};

/// What the recorder is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// No transaction open, nothing being replayed.
    Idle,
    /// A transaction is open; inverses are being collected.
    Recording,
    /// Replaying an undo unit.
    Undoing,
    /// Replaying a redo unit.
    Redoing,
    /// Reversing a failed transaction's partial mutations.
    RollingBack,
}

#[derive(Debug)]
struct Recorder {
    mode: Mode,
    open_unit: Vec<ModelEvent>,
    history: History,
}

/// Records undoable units from bus events and replays them on demand.
///
/// Create the manager before registering other subscribers: rollback
/// reversal runs from its bus handler, and subscribing it first means
/// the store is already restored by the time later subscribers observe
/// the rollback event.
///
/// Dropping the manager unsubscribes it; mutations after that are no
/// longer undoable.
pub struct UndoManager {
    store: Arc<ElementStore>,
    bus: Arc<EventBus>,
    recorder: Arc<Mutex<Recorder>>,
    subscription: SubscriptionId,
}

impl UndoManager {
    /// Creates a manager with the default history depth.
    #[must_use]
    pub fn new(store: Arc<ElementStore>, bus: Arc<EventBus>) -> Self {
        Self::with_config(store, bus, HistoryConfig::default())
    }

    /// Creates a manager with explicit stack limits.
    #[must_use]
    pub fn with_config(
        store: Arc<ElementStore>,
        bus: Arc<EventBus>,
        config: HistoryConfig,
    ) -> Self {
        let recorder = Arc::new(Mutex::new(Recorder {
            mode: Mode::Idle,
            open_unit: Vec::new(),
            history: History::new(config),
        }));
        let subscription = {
            let recorder = Arc::clone(&recorder);
            let store = Arc::clone(&store);
            bus.subscribe(EventFilter::All, move |event| {
                observe(&recorder, &store, event);
                Ok(())
            })
        };
        Self {
            store,
            bus,
            recorder,
            subscription,
        }
    }

    /// Undoes the most recently committed transaction.
    ///
    /// The unit's inverse operations are applied in reverse order inside
    /// a transaction of their own, then the unit moves to the redo
    /// stack.
    ///
    /// # Errors
    ///
    /// [`UndoRedoError::TransactionInProgress`] while a transaction is
    /// open, [`UndoRedoError::NoMoreUndos`] on an empty stack, or
    /// [`UndoRedoError::Model`] when replay fails; a failed unit is
    /// dropped rather than re-stacked in a half-applied state.
    pub fn undo_transaction(&self) -> Result<(), UndoRedoError> {
        if self.bus.in_transaction() {
            return Err(UndoRedoError::TransactionInProgress);
        }
        let unit = {
            let mut recorder = self.recorder.lock();
            let unit = recorder
                .history
                .take_undo()
                .ok_or(UndoRedoError::NoMoreUndos)?;
            recorder.mode = Mode::Undoing;
            unit
        };

        let result = transact(&self.bus, || {
            for event in unit.events.iter().rev() {
                apply(&self.store, event)?;
            }
            Ok(())
        });

        let mut recorder = self.recorder.lock();
        recorder.mode = Mode::Idle;
        match result {
            Ok(()) => {
                debug!(events = unit.events.len(), "Transaction undone");
                recorder.history.undone(unit);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Undo replay failed, dropping the unit");
                Err(UndoRedoError::Model(err))
            }
        }
    }

    /// Redoes the most recently undone transaction.
    ///
    /// The unit's operations are re-applied in their original forward
    /// order, then the unit moves back to the undo stack; the rest of
    /// the redo stack is preserved.
    ///
    /// # Errors
    ///
    /// Mirrors [`undo_transaction`](Self::undo_transaction), with
    /// [`UndoRedoError::NoMoreRedos`] on an empty stack.
    pub fn redo_transaction(&self) -> Result<(), UndoRedoError> {
        if self.bus.in_transaction() {
            return Err(UndoRedoError::TransactionInProgress);
        }
        let unit = {
            let mut recorder = self.recorder.lock();
            let unit = recorder
                .history
                .take_redo()
                .ok_or(UndoRedoError::NoMoreRedos)?;
            recorder.mode = Mode::Redoing;
            unit
        };

        let result = transact(&self.bus, || {
            for event in &unit.events {
                // Recorded events are inverses; their inverse is the
                // original mutation.
                let Some(original) = event.inverse() else {
                    continue;
                };
                apply(&self.store, &original)?;
            }
            Ok(())
        });

        let mut recorder = self.recorder.lock();
        recorder.mode = Mode::Idle;
        match result {
            Ok(()) => {
                debug!(events = unit.events.len(), "Transaction redone");
                recorder.history.redone(unit);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Redo replay failed, dropping the unit");
                Err(UndoRedoError::Model(err))
            }
        }
    }

    /// Returns whether there is a transaction to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.recorder.lock().history.can_undo()
    }

    /// Returns whether there is an undone transaction to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.recorder.lock().history.can_redo()
    }

    /// Returns the number of undoable units.
    #[must_use]
    pub fn undoable_count(&self) -> usize {
        self.recorder.lock().history.undoable_count()
    }

    /// Returns the number of redoable units.
    #[must_use]
    pub fn redoable_count(&self) -> usize {
        self.recorder.lock().history.redoable_count()
    }

    /// Drops both stacks.
    pub fn clear_history(&self) {
        self.recorder.lock().history.clear();
    }
}

impl Drop for UndoManager {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
    }
}

impl fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recorder = self.recorder.lock();
        f.debug_struct("UndoManager")
            .field("mode", &recorder.mode)
            .field("undoable", &recorder.history.undoable_count())
            .field("redoable", &recorder.history.redoable_count())
            .finish()
    }
}

/// Bus handler body: tracks transaction delimiters and collects
/// inverses of mutations.
fn observe(recorder: &Mutex<Recorder>, store: &ElementStore, event: &ModelEvent) {
    match event {
        ModelEvent::TransactionBegin => {
            let mut recorder = recorder.lock();
            if recorder.mode == Mode::Idle {
                recorder.mode = Mode::Recording;
                recorder.open_unit.clear();
            }
        }
        ModelEvent::TransactionCommit { .. } => {
            let mut recorder = recorder.lock();
            if recorder.mode == Mode::Recording {
                recorder.mode = Mode::Idle;
                let events = std::mem::take(&mut recorder.open_unit);
                if events.is_empty() {
                    debug!("Empty transaction committed, nothing recorded");
                } else {
                    debug!(events = events.len(), "Undo unit recorded");
                    recorder.history.record(UndoUnit::new(events));
                }
            }
        }
        ModelEvent::TransactionRollback { .. } => {
            // Take the open unit and release the lock before touching
            // the store: the reversal emits events that re-enter this
            // handler.
            let inverses = {
                let mut recorder = recorder.lock();
                if recorder.mode != Mode::Recording {
                    return;
                }
                recorder.mode = Mode::RollingBack;
                std::mem::take(&mut recorder.open_unit)
            };
            for inverse in inverses.iter().rev() {
                if let Err(err) = apply(store, inverse) {
                    error!(error = %err, "Rollback step failed, store may be partially restored");
                }
            }
            recorder.lock().mode = Mode::Idle;
        }
        mutation => {
            let mut recorder = recorder.lock();
            match recorder.mode {
                Mode::Recording => {
                    if let Some(inverse) = mutation.inverse() {
                        recorder.open_unit.push(inverse);
                    }
                }
                Mode::Idle => {
                    warn!(
                        kind = ?mutation.kind(),
                        "Mutation observed outside a transaction, not undoable"
                    );
                }
                Mode::Undoing | Mode::Redoing | Mode::RollingBack => {}
            }
        }
    }
}

/// Applies one recorded event against the store as a forward operation.
fn apply(store: &ElementStore, event: &ModelEvent) -> Result<(), ModelError> {
    match event {
        ModelEvent::ElementCreated {
            element,
            kind,
            attributes,
        } => store.restore(*element, kind, attributes.clone()),
        ModelEvent::ElementDeleted { element, .. } => store.unlink(*element),
        ModelEvent::AssociationAdded {
            element,
            property,
            target,
        } => store.relate(*element, property, *target),
        ModelEvent::AssociationDeleted {
            element,
            property,
            target,
        } => store.unrelate(*element, property, *target),
        ModelEvent::AttributeChanged {
            element,
            property,
            new,
            ..
        } => store.set_attribute(*element, property, new.clone()),
        ModelEvent::TransactionBegin
        | ModelEvent::TransactionCommit { .. }
        | ModelEvent::TransactionRollback { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use maquette_model::schema::{
        KIND_DIAGRAM, KIND_SHAPE, PROP_DIAGRAM, PROP_NAME, PROP_OWNED_PRESENTATION,
    };
    use maquette_model::{EventKind, HandlerError, Schema, Value};

    use super::*;

    fn setup() -> (Arc<EventBus>, Arc<ElementStore>, UndoManager) {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(ElementStore::new(Schema::modeling(), Arc::clone(&bus)));
        let undo = UndoManager::new(Arc::clone(&store), Arc::clone(&bus));
        (bus, store, undo)
    }

    #[test]
    fn test_undo_restores_unlinked_graph_with_same_ids() {
        let (bus, store, undo) = setup();

        let (diagram, shape) = transact(&bus, || {
            let diagram = store.create(KIND_DIAGRAM)?;
            let shape = store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
            Ok((diagram, shape))
        })
        .unwrap();
        transact(&bus, || store.unlink(diagram)).unwrap();
        assert!(store.is_empty());

        undo.undo_transaction().unwrap();

        let diagram_element = store.lookup(diagram).expect("diagram is back");
        let shape_element = store.lookup(shape).expect("shape is back");
        assert!(diagram_element.is_related(PROP_OWNED_PRESENTATION, shape));
        assert_eq!(shape_element.target(PROP_DIAGRAM), Some(diagram));

        undo.redo_transaction().unwrap();
        assert!(store.lookup(diagram).is_none());
        assert!(store.lookup(shape).is_none());
    }

    #[test]
    fn test_undo_of_creation_removes_the_element() {
        let (bus, store, undo) = setup();
        let id = transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();

        undo.undo_transaction().unwrap();
        assert!(store.lookup(id).is_none());

        undo.redo_transaction().unwrap();
        assert!(store.lookup(id).is_some(), "redo recreates with the same id");
    }

    #[test]
    fn test_attribute_undo_redo_walks_values() {
        let (bus, store, undo) = setup();
        let shape = transact(&bus, || {
            let shape = store.create(KIND_SHAPE)?;
            store.set_attribute(shape, PROP_NAME, Some(Value::from("first")))?;
            Ok(shape)
        })
        .unwrap();
        transact(&bus, || {
            store.set_attribute(shape, PROP_NAME, Some(Value::from("second")))
        })
        .unwrap();

        undo.undo_transaction().unwrap();
        assert_eq!(
            store.lookup(shape).unwrap().attribute(PROP_NAME),
            Some(&Value::from("first"))
        );

        undo.redo_transaction().unwrap();
        assert_eq!(
            store.lookup(shape).unwrap().attribute(PROP_NAME),
            Some(&Value::from("second"))
        );
    }

    #[test]
    fn test_empty_stacks_and_open_transaction_are_refused() {
        let (bus, _store, undo) = setup();
        assert!(matches!(
            undo.undo_transaction(),
            Err(UndoRedoError::NoMoreUndos)
        ));
        assert!(matches!(
            undo.redo_transaction(),
            Err(UndoRedoError::NoMoreRedos)
        ));

        transact(&bus, || {
            assert!(matches!(
                undo.undo_transaction(),
                Err(UndoRedoError::TransactionInProgress)
            ));
            assert!(matches!(
                undo.redo_transaction(),
                Err(UndoRedoError::TransactionInProgress)
            ));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_new_transaction_clears_the_redo_stack() {
        let (bus, store, undo) = setup();
        transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
        transact(&bus, || store.create(KIND_SHAPE)).unwrap();

        undo.undo_transaction().unwrap();
        assert!(undo.can_redo());

        transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
        assert!(!undo.can_redo());
        assert!(matches!(
            undo.redo_transaction(),
            Err(UndoRedoError::NoMoreRedos)
        ));
    }

    #[test]
    fn test_replay_does_not_record_new_units() {
        let (bus, store, undo) = setup();
        transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
        assert_eq!(undo.undoable_count(), 1);

        undo.undo_transaction().unwrap();
        assert_eq!(undo.undoable_count(), 0);
        assert_eq!(undo.redoable_count(), 1);

        undo.redo_transaction().unwrap();
        assert_eq!(undo.undoable_count(), 1);
        assert_eq!(undo.redoable_count(), 0);
    }

    #[test]
    fn test_empty_transaction_records_nothing() {
        let (bus, _store, undo) = setup();
        transact(&bus, || Ok(())).unwrap();
        assert!(!undo.can_undo());
    }

    #[test]
    fn test_mutation_outside_transaction_is_not_undoable() {
        let (_bus, store, undo) = setup();
        store.create(KIND_DIAGRAM).unwrap();
        assert!(!undo.can_undo());
    }

    #[test]
    fn test_rollback_restores_pre_transaction_state() {
        let (bus, store, undo) = setup();
        let (diagram, shape) = transact(&bus, || {
            let diagram = store.create(KIND_DIAGRAM)?;
            let shape = store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
            Ok((diagram, shape))
        })
        .unwrap();

        // Fails when the diagram's ownership end is severed.
        bus.subscribe(
            EventFilter::Kind(EventKind::AssociationDeleted),
            move |event| match event {
                ModelEvent::AssociationDeleted { property, .. }
                    if property == PROP_OWNED_PRESENTATION =>
                {
                    Err(HandlerError::new("ownership is sacred"))
                }
                _ => Ok(()),
            },
        );

        let err = transact(&bus, || store.unlink(shape)).unwrap_err();
        assert!(matches!(err, ModelError::Handler(_)));

        // Both elements survive and the back-reference is intact.
        assert!(store.lookup(diagram).is_some());
        assert!(store.lookup(shape).is_some());
        assert_eq!(store.lookup(shape).unwrap().target(PROP_DIAGRAM), Some(diagram));
        assert!(store
            .lookup(diagram)
            .unwrap()
            .is_related(PROP_OWNED_PRESENTATION, shape));

        // The failed transaction left no unit behind.
        assert_eq!(undo.undoable_count(), 1);
    }

    #[test]
    fn test_history_depth_drops_oldest_unit() {
        let (bus, store, undo) = {
            let bus = Arc::new(EventBus::new());
            let store = Arc::new(ElementStore::new(Schema::modeling(), Arc::clone(&bus)));
            let undo = UndoManager::with_config(
                Arc::clone(&store),
                Arc::clone(&bus),
                HistoryConfig {
                    max_undo_depth: 2,
                    max_redo_depth: 2,
                },
            );
            (bus, store, undo)
        };

        for _ in 0..3 {
            transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
        }
        assert_eq!(undo.undoable_count(), 2);

        undo.undo_transaction().unwrap();
        undo.undo_transaction().unwrap();
        assert!(matches!(
            undo.undo_transaction(),
            Err(UndoRedoError::NoMoreUndos)
        ));
        // The first creation is beyond the horizon.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_history_forgets_everything() {
        let (bus, store, undo) = setup();
        transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
        undo.undo_transaction().unwrap();
        transact(&bus, || store.create(KIND_SHAPE)).unwrap();

        undo.clear_history();
        assert!(!undo.can_undo());
        assert!(!undo.can_redo());
    }

    #[test]
    fn test_dropped_manager_stops_recording() {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(ElementStore::new(Schema::modeling(), Arc::clone(&bus)));
        {
            let _undo = UndoManager::new(Arc::clone(&store), Arc::clone(&bus));
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
