//! Zero-copy windows onto one horizontal layer of a chunk
//!
//! A layer is the contiguous slice `[y * dim_x * dim_z, (y + 1) * dim_x * dim_z)`
//! of the parent buffer, addressed as a `dim_x x 1 x dim_z` grid. The borrow
//! ties the view to its parent, so it cannot outlive the chunk.

use crate::voxel::cell::CellFlags;

/// Read-only layer view
#[derive(Clone, Copy, Debug)]
pub struct LayerView<'a> {
    cells: &'a [CellFlags],
    dim_x: u32,
    dim_z: u32,
}

/// Mutable layer view; writes go straight into the parent chunk
#[derive(Debug)]
pub struct LayerViewMut<'a> {
    cells: &'a mut [CellFlags],
    dim_x: u32,
    dim_z: u32,
}

#[inline]
fn layer_index(dim_x: u32, dim_z: u32, x: u32, z: u32) -> usize {
    assert!(x < dim_x && z < dim_z, "cell ({x}, {z}) outside layer {dim_x}x{dim_z}");
    x as usize + z as usize * dim_x as usize
}

impl<'a> LayerView<'a> {
    pub(crate) fn new(cells: &'a [CellFlags], dim_x: u32, dim_z: u32) -> Self {
        debug_assert_eq!(cells.len(), dim_x as usize * dim_z as usize);
        Self { cells, dim_x, dim_z }
    }

    pub fn dim_x(&self) -> u32 {
        self.dim_x
    }

    pub fn dim_z(&self) -> u32 {
        self.dim_z
    }

    /// Index within the layer (`x + z * dim_x`)
    pub fn index(&self, x: u32, z: u32) -> usize {
        layer_index(self.dim_x, self.dim_z, x, z)
    }

    pub fn flags(&self, x: u32, z: u32) -> CellFlags {
        self.cells[self.index(x, z)]
    }

    pub fn has_flag(&self, x: u32, z: u32, flags: CellFlags) -> bool {
        self.flags(x, z).intersects(flags)
    }

    pub fn cells(&self) -> &'a [CellFlags] {
        self.cells
    }

    pub fn count(&self, flags: CellFlags) -> usize {
        self.cells.iter().filter(|c| c.intersects(flags)).count()
    }
}

impl<'a> LayerViewMut<'a> {
    pub(crate) fn new(cells: &'a mut [CellFlags], dim_x: u32, dim_z: u32) -> Self {
        debug_assert_eq!(cells.len(), dim_x as usize * dim_z as usize);
        Self { cells, dim_x, dim_z }
    }

    pub fn dim_x(&self) -> u32 {
        self.dim_x
    }

    pub fn dim_z(&self) -> u32 {
        self.dim_z
    }

    pub fn index(&self, x: u32, z: u32) -> usize {
        layer_index(self.dim_x, self.dim_z, x, z)
    }

    pub fn flags(&self, x: u32, z: u32) -> CellFlags {
        self.cells[self.index(x, z)]
    }

    pub fn has_flag(&self, x: u32, z: u32, flags: CellFlags) -> bool {
        self.flags(x, z).intersects(flags)
    }

    pub fn add_flag(&mut self, x: u32, z: u32, flags: CellFlags) {
        let i = self.index(x, z);
        self.cells[i].insert(flags);
    }

    pub fn remove_flag(&mut self, x: u32, z: u32, flags: CellFlags) {
        let i = self.index(x, z);
        self.cells[i].remove(flags);
    }

    pub fn set(&mut self, x: u32, z: u32, flags: CellFlags) {
        let i = self.index(x, z);
        self.cells[i] = flags;
    }

    /// Clear `flags` on every cell of the layer
    pub fn clear_flag_all(&mut self, flags: CellFlags) {
        for cell in self.cells.iter_mut() {
            cell.remove(flags);
        }
    }

    /// Reborrow as a read-only view
    pub fn as_view(&self) -> LayerView<'_> {
        LayerView::new(self.cells, self.dim_x, self.dim_z)
    }
}
