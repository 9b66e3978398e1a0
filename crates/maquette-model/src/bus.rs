//! Synchronous event bus connecting the store to its observers.
//!
//! Dispatch is deterministic: handlers run on the emitting thread in
//! subscription order, and the first handler error aborts dispatch of
//! that event. The bus also keeps the journal for the currently open
//! transaction scope, so commit and rollback events can carry every
//! mutation emitted inside the scope.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{HandlerError, ModelError};
use crate::event::{EventKind, ModelEvent};

/// Handler signature for bus subscribers.
pub type Handler = dyn Fn(&ModelEvent) -> Result<(), HandlerError> + Send + Sync;

/// Identifies a subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which events a subscription observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Observe every event.
    All,
    /// Observe only events of the given kind.
    Kind(EventKind),
}

impl EventFilter {
    /// Returns whether the filter selects the given event.
    #[must_use]
    pub fn matches(&self, event: &ModelEvent) -> bool {
        match self {
            Self::All => true,
            Self::Kind(kind) => event.kind() == *kind,
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Arc<Handler>,
}

#[derive(Default)]
struct TransactionCell {
    depth: usize,
    journal: Vec<ModelEvent>,
}

/// Synchronous publish/subscribe bus for model change events.
///
/// Handlers run on the emitting thread, in the order they subscribed.
/// When a handler returns an error, dispatch of that event stops: the
/// remaining subscribers are skipped and the error is surfaced to the
/// emitter as [`ModelError::Handler`].
///
/// # Example
///
/// ```
/// use maquette_model::{EventBus, EventFilter, ModelEvent};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let bus = EventBus::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// bus.subscribe(EventFilter::All, move |_event| {
///     counter.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// });
///
/// bus.emit(ModelEvent::TransactionBegin)?;
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// # Ok::<(), maquette_model::ModelError>(())
/// ```
///
/// # Thread Safety
///
/// The bus is `Send + Sync`. Subscribers are snapshotted before dispatch
/// and no internal lock is held while handlers run, so handlers may
/// subscribe, unsubscribe, or emit re-entrantly without deadlocking.
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    transaction: Mutex<TransactionCell>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            transaction: Mutex::new(TransactionCell::default()),
        }
    }

    /// Registers a handler for events selected by the filter.
    ///
    /// Returns the id to pass to [`unsubscribe`](Self::unsubscribe).
    /// Handlers registered earlier run earlier.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ModelEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.write().push(Subscriber {
            id,
            filter,
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns whether a transaction scope is currently open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction.lock().depth > 0
    }

    /// Dispatches an event to every matching subscriber in order.
    ///
    /// Inside an open transaction scope, mutation events are journaled
    /// before dispatch; the mutation has already been applied by the
    /// store, so it belongs in the commit or rollback payload even when
    /// a handler rejects the notification.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Handler`] with the first handler failure.
    /// Subscribers after the failing one do not observe the event.
    pub fn emit(&self, event: ModelEvent) -> Result<(), ModelError> {
        if event.is_mutation() {
            let mut cell = self.transaction.lock();
            if cell.depth > 0 {
                cell.journal.push(event.clone());
            }
        }

        let matching: Vec<(SubscriptionId, Arc<Handler>)> = {
            let subscribers = self.subscribers.read();
            subscribers
                .iter()
                .filter(|s| s.filter.matches(&event))
                .map(|s| (s.id, Arc::clone(&s.handler)))
                .collect()
        };

        for (id, handler) in matching {
            if let Err(err) = handler(&event) {
                debug!(
                    subscription = %id,
                    error = %err,
                    "Event handler failed, skipping remaining subscribers"
                );
                return Err(ModelError::Handler(err));
            }
        }
        Ok(())
    }

    /// Opens a transaction scope. Returns whether it is the outermost one.
    pub(crate) fn begin_scope(&self) -> bool {
        let mut cell = self.transaction.lock();
        cell.depth += 1;
        cell.depth == 1
    }

    /// Closes the innermost transaction scope.
    ///
    /// Returns the drained journal when the outermost scope closes,
    /// `None` for nested scopes.
    pub(crate) fn end_scope(&self) -> Option<Vec<ModelEvent>> {
        let mut cell = self.transaction.lock();
        debug_assert!(cell.depth > 0, "transaction scope underflow");
        cell.depth = cell.depth.saturating_sub(1);
        if cell.depth == 0 {
            Some(std::mem::take(&mut cell.journal))
        } else {
            None
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin() -> ModelEvent {
        ModelEvent::TransactionBegin
    }

    fn created(id: crate::element::ElementId) -> ModelEvent {
        ModelEvent::ElementCreated {
            element: id,
            kind: "element".to_string(),
            attributes: indexmap::IndexMap::new(),
        }
    }

    #[test]
    fn test_subscribers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe(EventFilter::All, move |_event| {
                log.lock().push(name);
                Ok(())
            });
        }

        bus.emit(begin()).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_handler_skips_remaining_subscribers() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let log = Arc::clone(&log);
            bus.subscribe(EventFilter::All, move |_event| {
                log.lock().push("ran");
                Ok(())
            });
        }
        bus.subscribe(EventFilter::All, |_event| Err(HandlerError::new("veto")));
        {
            let log = Arc::clone(&log);
            bus.subscribe(EventFilter::All, move |_event| {
                log.lock().push("skipped");
                Ok(())
            });
        }

        let err = bus.emit(begin()).unwrap_err();
        assert!(matches!(err, ModelError::Handler(e) if e.message() == "veto"));
        assert_eq!(*log.lock(), vec!["ran"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = {
            let log = Arc::clone(&log);
            bus.subscribe(EventFilter::All, move |_event| {
                log.lock().push("seen");
                Ok(())
            })
        };

        bus.emit(begin()).unwrap();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(begin()).unwrap();

        assert_eq!(*log.lock(), vec!["seen"]);
    }

    #[test]
    fn test_kind_filter_selects_matching_events() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let log = Arc::clone(&log);
            bus.subscribe(
                EventFilter::Kind(EventKind::ElementCreated),
                move |event| {
                    log.lock().push(event.kind());
                    Ok(())
                },
            );
        }

        bus.emit(begin()).unwrap();
        bus.emit(created(crate::element::ElementId::new())).unwrap();
        assert_eq!(*log.lock(), vec![EventKind::ElementCreated]);
    }

    #[test]
    fn test_scope_journals_mutations_only() {
        let bus = EventBus::new();
        assert!(bus.begin_scope());
        assert!(bus.in_transaction());

        bus.emit(created(crate::element::ElementId::new())).unwrap();
        bus.emit(begin()).unwrap();

        let journal = bus.end_scope().expect("outermost scope drains");
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].kind(), EventKind::ElementCreated);
        assert!(!bus.in_transaction());
    }

    #[test]
    fn test_nested_scopes_drain_once() {
        let bus = EventBus::new();
        assert!(bus.begin_scope());
        assert!(!bus.begin_scope());

        bus.emit(created(crate::element::ElementId::new())).unwrap();

        assert!(bus.end_scope().is_none());
        let journal = bus.end_scope().expect("outermost scope drains");
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_no_journal_outside_scope() {
        let bus = EventBus::new();
        bus.emit(created(crate::element::ElementId::new())).unwrap();

        bus.begin_scope();
        let journal = bus.end_scope().expect("outermost scope drains");
        assert!(journal.is_empty());
    }

    #[test]
    fn test_failed_dispatch_still_journals_mutation() {
        let bus = EventBus::new();
        bus.subscribe(EventFilter::All, |_event| Err(HandlerError::new("veto")));

        bus.begin_scope();
        assert!(bus.emit(created(crate::element::ElementId::new())).is_err());
        let journal = bus.end_scope().expect("outermost scope drains");
        assert_eq!(journal.len(), 1);
    }
}
