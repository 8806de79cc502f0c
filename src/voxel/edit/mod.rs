//! Carve diffs and bounded undo/redo history.
//!
//! Every carve yields a [`DiffBatch`] of exact before/after flag words, so
//! undo and redo restore cells bit for bit.

pub mod delta;
pub mod history;

pub use delta::{CellDiff, DiffBatch};
pub use history::{HistoryManager, RedoPolicy, MAX_HISTORY};
