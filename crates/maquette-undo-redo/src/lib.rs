#![warn(missing_docs)]

//! Undo/Redo for the maquette element store
//!
//! Subscribes to the model's event bus, records the inverse of every
//! mutation observed inside a transaction, and replays those inverses
//! to roll back failed transactions and to undo or redo committed ones.

pub mod error;
pub mod history;
pub mod manager;

// Re-export public API
pub use error::UndoRedoError;
pub use history::{HistoryConfig, UndoUnit};
pub use manager::UndoManager;
