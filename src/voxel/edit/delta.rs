//! Cell diffs produced by one carve

use std::collections::BTreeSet;

use crate::voxel::cell::CellFlags;
use crate::voxel::chunk::VoxelChunk;

/// One changed cell with its flag word before and after the edit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellDiff {
    pub index: u32,
    pub before: CellFlags,
    pub after: CellFlags,
}

/// Ordered changes from a single carve, plus the layers they touch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffBatch {
    diffs: Vec<CellDiff>,
    layers: BTreeSet<u32>,
}

impl DiffBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change to cell `index` on layer `y`
    pub fn push(&mut self, index: usize, y: u32, before: CellFlags, after: CellFlags) {
        self.diffs.push(CellDiff { index: index as u32, before, after });
        self.layers.insert(y);
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn diffs(&self) -> &[CellDiff] {
        &self.diffs
    }

    /// Layers (y) holding at least one changed cell, ascending
    pub fn layers(&self) -> impl Iterator<Item = u32> + '_ {
        self.layers.iter().copied()
    }

    pub fn touched_layers(&self) -> Vec<u32> {
        self.layers.iter().copied().collect()
    }

    /// Write every `after` word, in recorded order
    pub fn apply(&self, chunk: &mut VoxelChunk) {
        for diff in &self.diffs {
            chunk.set_cell(diff.index as usize, diff.after);
        }
    }

    /// Write every `before` word, newest first
    pub fn revert(&self, chunk: &mut VoxelChunk) {
        for diff in self.diffs.iter().rev() {
            chunk.set_cell(diff.index as usize, diff.before);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UVec3;

    #[test]
    fn test_push_tracks_layers() {
        let mut batch = DiffBatch::new();
        batch.push(40, 3, CellFlags::FILLED, CellFlags::EMPTY);
        batch.push(2, 0, CellFlags::FILLED, CellFlags::EMPTY);
        batch.push(41, 3, CellFlags::FILLED, CellFlags::EMPTY);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.touched_layers(), vec![0, 3]);
    }

    #[test]
    fn test_apply_and_revert() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(3)).unwrap();
        let original = chunk.clone();

        let mut batch = DiffBatch::new();
        for index in [0usize, 5, 26] {
            let y = chunk.position(index).y;
            batch.push(index, y, chunk.cell(index), CellFlags::EMPTY);
        }

        batch.apply(&mut chunk);
        assert_eq!(chunk.count(CellFlags::FILLED), 24);
        batch.revert(&mut chunk);
        assert_eq!(chunk, original);
    }

    #[test]
    fn test_revert_restores_extra_bits() {
        let mut chunk = VoxelChunk::new(UVec3::splat(2)).unwrap();
        chunk.set_cell(1, CellFlags::FILLED | CellFlags::SELECTED);
        let mut batch = DiffBatch::new();
        batch.push(1, 0, chunk.cell(1), CellFlags::SELECTED);
        batch.apply(&mut chunk);
        assert_eq!(chunk.cell(1), CellFlags::SELECTED);
        batch.revert(&mut chunk);
        assert_eq!(chunk.cell(1), CellFlags::FILLED | CellFlags::SELECTED);
    }
}
