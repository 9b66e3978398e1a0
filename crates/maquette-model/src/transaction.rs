//! Transaction scopes batching store mutations into one atomic unit.
//!
//! A scope only brackets emission: the store applies mutations as they
//! happen, and on rollback the accumulated event list is handed to
//! rollback-handling subscribers (notably the undo recorder), which
//! reverse the partial mutations before the original failure is
//! returned to the caller.

use tracing::warn;

use crate::bus::EventBus;
use crate::error::ModelError;
use crate::event::ModelEvent;

/// A transaction scope on the event bus.
///
/// Nested scopes collapse into the outermost one: only the outermost
/// scope emits [`TransactionBegin`](ModelEvent::TransactionBegin) and,
/// on close, [`TransactionCommit`](ModelEvent::TransactionCommit) or
/// [`TransactionRollback`](ModelEvent::TransactionRollback) carrying
/// every mutation event emitted while the scope was open.
///
/// The outcome is an explicit result: finish with [`commit`](Self::commit)
/// or [`rollback`](Self::rollback). A scope that is dropped unfinished
/// rolls back.
///
/// # Example
///
/// ```
/// use maquette_model::{EventBus, Transaction};
///
/// let bus = EventBus::new();
/// let tx = Transaction::begin(&bus)?;
/// // ... mutate the store ...
/// tx.commit()?;
/// assert!(!bus.in_transaction());
/// # Ok::<(), maquette_model::ModelError>(())
/// ```
#[must_use = "a transaction scope rolls back unless committed"]
pub struct Transaction<'a> {
    bus: &'a EventBus,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// Opens a transaction scope, joining an already-open one if any.
    ///
    /// # Errors
    ///
    /// Returns the handler failure if a subscriber rejects the
    /// [`TransactionBegin`](ModelEvent::TransactionBegin) event; the
    /// scope is closed again before returning.
    pub fn begin(bus: &'a EventBus) -> Result<Self, ModelError> {
        let outermost = bus.begin_scope();
        if outermost {
            if let Err(err) = bus.emit(ModelEvent::TransactionBegin) {
                bus.end_scope();
                return Err(err);
            }
        }
        Ok(Self {
            bus,
            finished: false,
        })
    }

    /// Closes the scope successfully.
    ///
    /// The outermost scope emits the commit event with the accumulated
    /// mutation list; nested scopes close silently.
    ///
    /// # Errors
    ///
    /// Returns the handler failure if a subscriber rejects the commit
    /// event. The mutations themselves stand; they were applied as they
    /// were emitted.
    pub fn commit(mut self) -> Result<(), ModelError> {
        self.finished = true;
        if let Some(events) = self.bus.end_scope() {
            self.bus.emit(ModelEvent::TransactionCommit { events })?;
        }
        Ok(())
    }

    /// Closes the scope with a failure and returns the cause.
    ///
    /// The outermost scope emits the rollback event so subscribers can
    /// reverse the partial mutations. A secondary handler failure during
    /// that emission is logged and never masks the original cause, which
    /// is handed back for the caller to propagate.
    pub fn rollback(mut self, cause: ModelError) -> ModelError {
        self.finished = true;
        if let Some(events) = self.bus.end_scope() {
            if let Err(err) = self.bus.emit(ModelEvent::TransactionRollback { events }) {
                warn!(error = %err, "Rollback event handler failed");
            }
        }
        cause
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(events) = self.bus.end_scope() {
            warn!("Transaction scope dropped unfinished, rolling back");
            if let Err(err) = self.bus.emit(ModelEvent::TransactionRollback { events }) {
                warn!(error = %err, "Rollback event handler failed");
            }
        }
    }
}

/// Runs a closure inside a transaction scope.
///
/// Commits when the closure returns `Ok`, rolls back and returns the
/// closure's error otherwise. Nested calls collapse into the enclosing
/// scope.
///
/// # Example
///
/// ```
/// use maquette_model::{transact, EventBus};
///
/// let bus = EventBus::new();
/// let value = transact(&bus, || Ok(21 * 2))?;
/// assert_eq!(value, 42);
/// # Ok::<(), maquette_model::ModelError>(())
/// ```
///
/// # Errors
///
/// Returns the closure's error after rollback, or a handler failure
/// raised while emitting the transaction delimiters.
pub fn transact<T, F>(bus: &EventBus, f: F) -> Result<T, ModelError>
where
    F: FnOnce() -> Result<T, ModelError>,
{
    let tx = Transaction::begin(bus)?;
    match f() {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => Err(tx.rollback(err)),
    }
}
