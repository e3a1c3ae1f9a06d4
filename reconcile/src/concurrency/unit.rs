use crate::store::{WriteBatch, WriteOperation};

/// Lifecycle of a [`BatchUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Open,
    Committing,
    Committed,
    Failed,
}

/// A bounded group of recorded operations committed atomically.
#[derive(Debug)]
pub struct BatchUnit {
    id: u64,
    batch: WriteBatch,
    operations: usize,
    filled_at: Option<u64>,
    state: UnitState,
}

impl BatchUnit {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            batch: WriteBatch::new(),
            operations: 0,
            filled_at: None,
            state: UnitState::Open,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of operations recorded, which may be lower than the number of mutations.
    pub fn operations(&self) -> usize {
        self.operations
    }

    pub fn batch(&self) -> &WriteBatch {
        &self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.operations == 0
    }

    pub fn is_full(&self, max_operations: usize) -> bool {
        self.operations >= max_operations
    }

    /// Sequence number assigned when the unit became full.
    pub fn filled_at(&self) -> Option<u64> {
        self.filled_at
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Records `operation` into this unit's batch.
    pub fn record(&mut self, operation: WriteOperation) {
        operation(&mut self.batch);
        self.operations += 1;
    }

    pub fn mark_filled(&mut self, sequence: u64) {
        self.filled_at = Some(sequence);
    }

    pub fn set_state(&mut self, state: UnitState) {
        self.state = state;
    }

    /// Puts a failed unit back in the open pool with its recorded operations.
    pub fn reopen(&mut self) {
        self.state = UnitState::Open;
    }
}
