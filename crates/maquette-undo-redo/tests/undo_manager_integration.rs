//! Integration tests for the undo manager against a live store
//!
//! These scenarios build small diagrams, destroy them, and walk the
//! history in both directions, checking that identities, associations,
//! and attributes come back exactly.

use std::sync::Arc;

use maquette_model::schema::{
    KIND_CONNECTOR, KIND_DIAGRAM, KIND_SHAPE, PROP_DIAGRAM, PROP_HEAD, PROP_HEAD_OF, PROP_NAME,
    PROP_OWNED_PRESENTATION, PROP_TAIL,
};
use maquette_model::{
    transact, ElementStore, EventBus, EventFilter, EventKind, HandlerError, ModelError,
    ModelEvent, Schema, Value,
};
use maquette_undo_redo::{UndoManager, UndoRedoError};

fn setup() -> (Arc<EventBus>, Arc<ElementStore>, UndoManager) {
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(ElementStore::new(Schema::modeling(), Arc::clone(&bus)));
    let undo = UndoManager::new(Arc::clone(&store), Arc::clone(&bus));
    (bus, store, undo)
}

#[test]
fn test_unlink_undo_restores_full_diagram_with_connections() {
    let (bus, store, undo) = setup();

    let (diagram, head, tail, line) = transact(&bus, || {
        let diagram = store.create(KIND_DIAGRAM)?;
        let head = store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
        let tail = store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
        let line = store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_CONNECTOR)?;
        store.relate(line, PROP_HEAD, head)?;
        store.relate(line, PROP_TAIL, tail)?;
        store.set_attribute(head, PROP_NAME, Some(Value::from("Order")))?;
        store.set_attribute(tail, PROP_NAME, Some(Value::from("Customer")))?;
        Ok((diagram, head, tail, line))
    })
    .unwrap();

    transact(&bus, || store.unlink(diagram)).unwrap();
    assert!(store.is_empty());

    undo.undo_transaction().unwrap();

    // Same ids, same ownership, same endpoints, same names.
    let diagram_element = store.lookup(diagram).expect("diagram restored");
    for id in [head, tail, line] {
        assert!(diagram_element.is_related(PROP_OWNED_PRESENTATION, id));
    }
    let line_element = store.lookup(line).expect("connector restored");
    assert_eq!(line_element.target(PROP_HEAD), Some(head));
    assert_eq!(line_element.target(PROP_TAIL), Some(tail));
    assert!(store.lookup(head).unwrap().is_related(PROP_HEAD_OF, line));
    assert_eq!(
        store.lookup(head).unwrap().attribute(PROP_NAME),
        Some(&Value::from("Order"))
    );
    assert_eq!(
        store.lookup(tail).unwrap().attribute(PROP_NAME),
        Some(&Value::from("Customer"))
    );

    undo.redo_transaction().unwrap();
    assert!(store.is_empty());
    assert!(undo.can_undo());
    assert!(!undo.can_redo());
}

#[test]
fn test_history_walk_through_multiple_transactions() {
    let (bus, store, undo) = setup();

    let diagram = transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
    let shape = transact(&bus, || {
        store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)
    })
    .unwrap();
    transact(&bus, || {
        store.set_attribute(shape, PROP_NAME, Some(Value::from("Box")))
    })
    .unwrap();

    undo.undo_transaction().unwrap();
    assert_eq!(store.lookup(shape).unwrap().attribute(PROP_NAME), None);

    undo.undo_transaction().unwrap();
    assert!(store.lookup(shape).is_none());
    assert!(store.lookup(diagram).is_some());

    undo.undo_transaction().unwrap();
    assert!(store.is_empty());
    assert!(matches!(
        undo.undo_transaction(),
        Err(UndoRedoError::NoMoreUndos)
    ));

    undo.redo_transaction().unwrap();
    undo.redo_transaction().unwrap();
    undo.redo_transaction().unwrap();
    assert!(matches!(
        undo.redo_transaction(),
        Err(UndoRedoError::NoMoreRedos)
    ));

    assert_eq!(
        store.lookup(shape).unwrap().attribute(PROP_NAME),
        Some(&Value::from("Box"))
    );
    assert_eq!(store.lookup(shape).unwrap().target(PROP_DIAGRAM), Some(diagram));
}

#[test]
fn test_redo_chain_survives_consecutive_undos() {
    let (bus, store, undo) = setup();
    for _ in 0..3 {
        transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
    }

    for _ in 0..3 {
        undo.undo_transaction().unwrap();
    }
    assert_eq!(undo.redoable_count(), 3);
    assert!(store.is_empty());

    undo.redo_transaction().unwrap();
    assert_eq!(undo.redoable_count(), 2);
    assert_eq!(undo.undoable_count(), 1);
    assert_eq!(store.len(), 1);

    undo.redo_transaction().unwrap();
    assert_eq!(undo.redoable_count(), 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_rollback_keeps_connection_endpoints_intact() {
    let (bus, store, undo) = setup();
    let (diagram, shape, line) = transact(&bus, || {
        let diagram = store.create(KIND_DIAGRAM)?;
        let shape = store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
        let line = store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_CONNECTOR)?;
        store.relate(line, PROP_HEAD, shape)?;
        Ok((diagram, shape, line))
    })
    .unwrap();

    // Vetoes severing a connector head, partway through the unlink.
    bus.subscribe(
        EventFilter::Kind(EventKind::AssociationDeleted),
        |event| match event {
            ModelEvent::AssociationDeleted { property, .. } if property == PROP_HEAD => {
                Err(HandlerError::new("still connected"))
            }
            _ => Ok(()),
        },
    );

    let err = transact(&bus, || store.unlink(shape)).unwrap_err();
    assert!(matches!(err, ModelError::Handler(_)));

    // The rollback reversed the already-severed diagram membership and
    // repaired the half-severed head end.
    let shape_element = store.lookup(shape).expect("shape survived");
    assert_eq!(shape_element.target(PROP_DIAGRAM), Some(diagram));
    assert!(shape_element.is_related(PROP_HEAD_OF, line));
    assert_eq!(store.lookup(line).unwrap().target(PROP_HEAD), Some(shape));
    assert_eq!(undo.undoable_count(), 1, "the failed transaction left no unit");
}

#[test]
fn test_failed_undo_drops_unit_but_keeps_older_history() {
    let (bus, store, undo) = setup();
    let first = transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
    let second = transact(&bus, || store.create(KIND_DIAGRAM)).unwrap();
    transact(&bus, || store.unlink(second)).unwrap();
    assert_eq!(undo.undoable_count(), 3);

    let token = bus.subscribe(EventFilter::Kind(EventKind::ElementCreated), |_event| {
        Err(HandlerError::new("no resurrections"))
    });

    // Undoing the deletion tries to recreate the element; the handler
    // rejects that and the unit is dropped.
    let err = undo.undo_transaction().unwrap_err();
    assert!(matches!(err, UndoRedoError::Model(ModelError::Handler(_))));
    assert_eq!(undo.undoable_count(), 2);
    assert_eq!(undo.redoable_count(), 0);

    // Older history is still walkable once the veto is gone.
    bus.unsubscribe(token);
    undo.undo_transaction().unwrap();
    assert!(store.lookup(second).is_none());
    assert!(store.lookup(first).is_some());
}

#[test]
fn test_select_after_undo_yields_restored_elements() {
    let (bus, store, undo) = setup();
    let diagram = transact(&bus, || {
        let diagram = store.create(KIND_DIAGRAM)?;
        store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
        store.create_owned(diagram, PROP_OWNED_PRESENTATION, KIND_SHAPE)?;
        Ok(diagram)
    })
    .unwrap();

    transact(&bus, || store.unlink(diagram)).unwrap();
    assert_eq!(store.select(|_| true).count(), 0);

    undo.undo_transaction().unwrap();
    assert_eq!(store.select(|_| true).count(), 3);
    assert_eq!(
        store.select(|e| e.kind() == KIND_SHAPE).count(),
        2,
        "both shapes are live again"
    );
}
