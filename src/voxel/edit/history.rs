//! Bounded undo/redo over diff batches

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::delta::DiffBatch;
use crate::voxel::chunk::VoxelChunk;

/// Default undo log capacity
pub const MAX_HISTORY: usize = 5;

/// What happens to a batch after it is redone
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedoPolicy {
    /// Redone batch goes back onto the undo log, so undo/redo can alternate freely
    #[default]
    Restack,
    /// Redone batch is dropped; it cannot be undone again
    Consume,
}

/// Undo log (bounded FIFO) and redo log (stack)
#[derive(Debug)]
pub struct HistoryManager {
    undo_log: VecDeque<DiffBatch>,
    redo_log: Vec<DiffBatch>,
    capacity: usize,
    policy: RedoPolicy,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(MAX_HISTORY, RedoPolicy::default())
    }
}

impl HistoryManager {
    pub fn new(capacity: usize, policy: RedoPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            undo_log: VecDeque::with_capacity(capacity + 1),
            redo_log: Vec::new(),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> RedoPolicy {
        self.policy
    }

    /// Record a carve
    ///
    /// Empty batches are ignored and leave the redo log intact. Returns
    /// whether the batch was recorded.
    pub fn record(&mut self, batch: DiffBatch) -> bool {
        if batch.is_empty() {
            return false;
        }
        self.push_undo(batch);
        self.redo_log.clear();
        true
    }

    fn push_undo(&mut self, batch: DiffBatch) {
        self.undo_log.push_back(batch);
        while self.undo_log.len() > self.capacity {
            if let Some(evicted) = self.undo_log.pop_front() {
                log::trace!("History full, dropping oldest batch of {} cells", evicted.len());
            }
        }
    }

    /// Revert the most recent batch
    ///
    /// Returns the layers that changed, or `None` when there is nothing to undo.
    pub fn undo(&mut self, chunk: &mut VoxelChunk) -> Option<Vec<u32>> {
        let batch = self.undo_log.pop_back()?;
        batch.revert(chunk);
        let layers = batch.touched_layers();
        log::debug!("Undo: restored {} cells", batch.len());
        self.redo_log.push(batch);
        Some(layers)
    }

    /// Re-apply the most recently undone batch
    ///
    /// Returns the layers that changed, or `None` when there is nothing to redo.
    pub fn redo(&mut self, chunk: &mut VoxelChunk) -> Option<Vec<u32>> {
        let batch = self.redo_log.pop()?;
        batch.apply(chunk);
        let layers = batch.touched_layers();
        log::debug!("Redo: re-applied {} cells", batch.len());
        match self.policy {
            RedoPolicy::Restack => self.push_undo(batch),
            RedoPolicy::Consume => {}
        }
        Some(layers)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_log.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_log.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_log.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_log.len()
    }

    /// Drop both logs (New / Load)
    pub fn clear(&mut self) {
        self.undo_log.clear();
        self.redo_log.clear();
    }
}
