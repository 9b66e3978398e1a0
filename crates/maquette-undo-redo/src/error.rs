//! Error types for the undo/redo system

use thiserror::Error;

use maquette_model::ModelError;

/// Errors that can occur in the undo/redo system
#[derive(Debug, Error)]
pub enum UndoRedoError {
    /// No more undos available
    #[error("No more undos available")]
    NoMoreUndos,

    /// No more redos available
    #[error("No more redos available")]
    NoMoreRedos,

    /// Undo or redo requested while a transaction is open
    #[error("A transaction is in progress")]
    TransactionInProgress,

    /// Replaying against the store failed
    #[error(transparent)]
    Model(#[from] ModelError),
}
