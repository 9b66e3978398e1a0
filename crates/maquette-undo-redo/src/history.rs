//! Undo and redo stacks holding recorded units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maquette_model::ModelEvent;

/// One committed transaction's recorded inverse operations.
///
/// The events are the inverses of the transaction's mutations, in the
/// order the mutations were observed. Undo applies them in reverse;
/// redo applies each event's own inverse in forward order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoUnit {
    /// Inverse operations in recording order.
    pub events: Vec<ModelEvent>,
    /// When the unit was committed.
    pub recorded_at: DateTime<Utc>,
}

impl UndoUnit {
    /// Creates a unit from recorded inverse events, stamped with now.
    #[must_use]
    pub fn new(events: Vec<ModelEvent>) -> Self {
        Self {
            events,
            recorded_at: Utc::now(),
        }
    }
}

/// Limits for the undo and redo stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of undoable units kept; oldest are dropped.
    pub max_undo_depth: usize,
    /// Maximum number of redoable units kept; oldest are dropped.
    pub max_redo_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: 100,
            max_redo_depth: 100,
        }
    }
}

/// The two stacks and the exclusivity rule between them.
#[derive(Debug)]
pub(crate) struct History {
    config: HistoryConfig,
    undo: Vec<UndoUnit>,
    redo: Vec<UndoUnit>,
}

impl History {
    pub(crate) fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    /// Records a freshly committed unit. Anything redoable is dropped:
    /// a new transaction forks history and the old future is gone.
    pub(crate) fn record(&mut self, unit: UndoUnit) {
        self.undo.push(unit);
        self.trim_undo();
        self.redo.clear();
    }

    pub(crate) fn take_undo(&mut self) -> Option<UndoUnit> {
        self.undo.pop()
    }

    pub(crate) fn take_redo(&mut self) -> Option<UndoUnit> {
        self.redo.pop()
    }

    /// Moves a unit that was just undone onto the redo stack.
    pub(crate) fn undone(&mut self, unit: UndoUnit) {
        self.redo.push(unit);
        self.trim_redo();
    }

    /// Moves a unit that was just redone back onto the undo stack,
    /// leaving the rest of the redo stack intact.
    pub(crate) fn redone(&mut self, unit: UndoUnit) {
        self.undo.push(unit);
        self.trim_undo();
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub(crate) fn undoable_count(&self) -> usize {
        self.undo.len()
    }

    pub(crate) fn redoable_count(&self) -> usize {
        self.redo.len()
    }

    pub(crate) fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    fn trim_undo(&mut self) {
        while self.undo.len() > self.config.max_undo_depth {
            self.undo.remove(0);
        }
    }

    fn trim_redo(&mut self) {
        while self.redo.len() > self.config.max_redo_depth {
            self.redo.remove(0);
        }
    }
}
