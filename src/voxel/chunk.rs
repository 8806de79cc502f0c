//! Dense occupancy store for one block of stone
//!
//! Cells are laid out Y-outermost so a horizontal layer is one contiguous
//! slice of the buffer:
//!
//! ```text
//! index(x, y, z) = x + z * dim_x + y * dim_x * dim_z
//! ```
//!
//! Cell `(x, y, z)` is the unit cube centered on the integer point
//! `(x, y, z)` in chunk-local space.

use rayon::prelude::*;

use crate::core::error::Error;
use crate::core::types::{Result, UVec3, Vec3};
use crate::math::Aabb;
use crate::voxel::cell::CellFlags;
use crate::voxel::layer_view::{LayerView, LayerViewMut};

/// Flat 3-D grid of cell flags
#[derive(Clone, PartialEq, Eq)]
pub struct VoxelChunk {
    dims: UVec3,
    cells: Vec<CellFlags>,
}

impl std::fmt::Debug for VoxelChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelChunk")
            .field("dims", &self.dims)
            .field("filled", &self.count(CellFlags::FILLED))
            .finish()
    }
}

impl VoxelChunk {
    /// Allocate a chunk with every flag clear
    pub fn new(dims: UVec3) -> Result<Self> {
        let len = Self::checked_len(dims)?;
        Ok(Self {
            dims,
            cells: vec![CellFlags::EMPTY; len],
        })
    }

    /// Allocate a chunk with every cell filled
    pub fn filled(dims: UVec3) -> Result<Self> {
        let mut chunk = Self::new(dims)?;
        chunk.fill_solid();
        Ok(chunk)
    }

    /// Adopt an existing cell buffer (length must match `dims`)
    pub fn from_cells(dims: UVec3, cells: Vec<CellFlags>) -> Result<Self> {
        let len = Self::checked_len(dims)?;
        if cells.len() != len {
            return Err(Error::InvalidDimensions { x: dims.x, y: dims.y, z: dims.z });
        }
        Ok(Self { dims, cells })
    }

    fn checked_len(dims: UVec3) -> Result<usize> {
        let invalid = || Error::InvalidDimensions { x: dims.x, y: dims.y, z: dims.z };
        if dims.x == 0 || dims.y == 0 || dims.z == 0 {
            return Err(invalid());
        }
        // Indices must stay addressable as u32 on the GPU side
        let len = (dims.x as u64) * (dims.y as u64) * (dims.z as u64);
        if len > u32::MAX as u64 {
            return Err(invalid());
        }
        Ok(len as usize)
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn dim_x(&self) -> u32 {
        self.dims.x
    }

    pub fn dim_y(&self) -> u32 {
        self.dims.y
    }

    pub fn dim_z(&self) -> u32 {
        self.dims.z
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells per horizontal layer
    pub fn layer_len(&self) -> usize {
        self.dims.x as usize * self.dims.z as usize
    }

    /// Chunk-local bounds of the cell cubes
    pub fn bounds(&self) -> Aabb {
        Aabb::new(Vec3::splat(-0.5), self.dims.as_vec3() - Vec3::splat(0.5))
    }

    pub fn in_bounds(&self, x: u32, y: u32, z: u32) -> bool {
        x < self.dims.x && y < self.dims.y && z < self.dims.z
    }

    /// Flat index of a cell
    ///
    /// # Panics
    /// If the coordinate lies outside the chunk.
    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        assert!(
            self.in_bounds(x, y, z),
            "cell ({x}, {y}, {z}) outside chunk {:?}",
            self.dims
        );
        x as usize
            + z as usize * self.dims.x as usize
            + y as usize * self.layer_len()
    }

    /// Coordinate of a flat index, inverse of [`VoxelChunk::index`]
    ///
    /// # Panics
    /// If the index is out of range.
    #[inline]
    pub fn position(&self, index: usize) -> UVec3 {
        assert!(index < self.cells.len(), "cell index {index} outside chunk of {}", self.cells.len());
        let layer = self.layer_len();
        let y = index / layer;
        let rem = index % layer;
        let z = rem / self.dims.x as usize;
        let x = rem % self.dims.x as usize;
        UVec3::new(x as u32, y as u32, z as u32)
    }

    /// Flags of the cell at a coordinate
    pub fn flags(&self, x: u32, y: u32, z: u32) -> CellFlags {
        self.cells[self.index(x, y, z)]
    }

    pub fn add_flag(&mut self, x: u32, y: u32, z: u32, flags: CellFlags) {
        let index = self.index(x, y, z);
        self.cells[index].insert(flags);
    }

    pub fn remove_flag(&mut self, x: u32, y: u32, z: u32, flags: CellFlags) {
        let index = self.index(x, y, z);
        self.cells[index].remove(flags);
    }

    /// True when any of `flags` is set on the cell
    pub fn has_flag(&self, x: u32, y: u32, z: u32, flags: CellFlags) -> bool {
        self.flags(x, y, z).intersects(flags)
    }

    pub fn add_flag_at(&mut self, index: usize, flags: CellFlags) {
        self.cells[index].insert(flags);
    }

    pub fn remove_flag_at(&mut self, index: usize, flags: CellFlags) {
        self.cells[index].remove(flags);
    }

    pub fn has_flag_at(&self, index: usize, flags: CellFlags) -> bool {
        self.cells[index].intersects(flags)
    }

    /// Raw flag word at an index
    #[inline]
    pub fn cell(&self, index: usize) -> CellFlags {
        self.cells[index]
    }

    /// Overwrite the whole flag word at an index
    #[inline]
    pub fn set_cell(&mut self, index: usize, flags: CellFlags) {
        self.cells[index] = flags;
    }

    pub fn cells(&self) -> &[CellFlags] {
        &self.cells
    }

    /// Cell buffer as plain words, ready for GPU upload or encoding
    pub fn as_words(&self) -> &[u32] {
        bytemuck::cast_slice(&self.cells)
    }

    /// Clear `flags` on every cell
    pub fn clear_flag_all(&mut self, flags: CellFlags) {
        for cell in &mut self.cells {
            cell.remove(flags);
        }
    }

    /// Number of cells with any of `flags` set
    pub fn count(&self, flags: CellFlags) -> usize {
        self.cells.iter().filter(|c| c.intersects(flags)).count()
    }

    /// Fill every cell, dropping any other flags
    pub fn fill_solid(&mut self) {
        self.cells.fill(CellFlags::FILLED);
    }

    /// Fill a hollow ellipsoid inscribed in the chunk
    ///
    /// A cell is filled when its center lies inside the outer ellipsoid
    /// (radii `dim / 2`) and outside the inner one (radii shrunk by
    /// `thickness`). If the shell is thicker than the chunk allows on any
    /// axis, the ellipsoid is filled solid.
    pub fn fill_ellipsoid_shell(&mut self, thickness: f32) {
        let center = (self.dims.as_vec3() - Vec3::ONE) * 0.5;
        let outer = self.dims.as_vec3() * 0.5;
        let inner = (outer - Vec3::splat(thickness)).max(Vec3::ZERO);
        let hollow = inner.cmpgt(Vec3::ZERO).all();

        let dims = self.dims;
        for (y, mut layer) in self.layers_mut().enumerate() {
            for z in 0..dims.z {
                for x in 0..dims.x {
                    let p = Vec3::new(x as f32, y as f32, z as f32) - center;
                    let outer_eq = (p / outer).length_squared();
                    let inside_inner = hollow && (p / inner).length_squared() <= 1.0;
                    let cell = if outer_eq <= 1.0 && !inside_inner {
                        CellFlags::FILLED
                    } else {
                        CellFlags::EMPTY
                    };
                    layer.set(x, z, cell);
                }
            }
        }
    }

    /// Read-only view of layer `y`
    ///
    /// # Panics
    /// If `y` is outside the chunk.
    pub fn layer(&self, y: u32) -> LayerView<'_> {
        assert!(y < self.dims.y, "layer {y} outside chunk height {}", self.dims.y);
        let len = self.layer_len();
        let start = y as usize * len;
        LayerView::new(&self.cells[start..start + len], self.dims.x, self.dims.z)
    }

    /// Mutable view of layer `y`; writes land in this chunk's buffer
    ///
    /// # Panics
    /// If `y` is outside the chunk.
    pub fn layer_mut(&mut self, y: u32) -> LayerViewMut<'_> {
        assert!(y < self.dims.y, "layer {y} outside chunk height {}", self.dims.y);
        let len = self.layer_len();
        let start = y as usize * len;
        let (dim_x, dim_z) = (self.dims.x, self.dims.z);
        LayerViewMut::new(&mut self.cells[start..start + len], dim_x, dim_z)
    }

    /// All layers bottom to top
    pub fn layers(&self) -> impl ExactSizeIterator<Item = LayerView<'_>> + '_ {
        let (dim_x, dim_z) = (self.dims.x, self.dims.z);
        self.cells
            .chunks_exact(self.layer_len())
            .map(move |slab| LayerView::new(slab, dim_x, dim_z))
    }

    /// All layers as disjoint mutable views, bottom to top
    pub fn layers_mut(&mut self) -> impl ExactSizeIterator<Item = LayerViewMut<'_>> + '_ {
        let (dim_x, dim_z) = (self.dims.x, self.dims.z);
        let len = self.layer_len();
        self.cells
            .chunks_exact_mut(len)
            .map(move |slab| LayerViewMut::new(slab, dim_x, dim_z))
    }

    /// Mutable layer slabs as an indexed parallel iterator
    pub(crate) fn par_layer_slices_mut(&mut self) -> rayon::slice::ChunksExactMut<'_, CellFlags> {
        let len = self.layer_len();
        self.cells.par_chunks_exact_mut(len)
    }

    /// Release the buffer
    ///
    /// Takes the chunk by value, so it cannot be used or disposed again.
    pub fn dispose(self) {
        log::debug!("Disposing chunk {:?} ({} cells)", self.dims, self.cells.len());
        drop(self);
    }
}
