//! Carving: tool shape + pose -> cleared cells + diff batch

use glam::{Affine3A, UVec3, Vec3};

use super::lod::MAX_STRIDE;
use super::primitive::ToolShape;
use crate::voxel::cell::CellFlags;
use crate::voxel::chunk::VoxelChunk;
use crate::voxel::edit::DiffBatch;

/// One carve: a tool shape posed in the chunk at a sampling stride
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarveRequest {
    pub shape: ToolShape,
    /// Tool-local -> chunk-local
    pub transform: Affine3A,
    /// Sampling step in cells (1 = every cell)
    pub stride: u32,
}

impl CarveRequest {
    /// Carve with the shape already expressed in chunk space
    pub fn new(shape: ToolShape) -> Self {
        Self {
            shape,
            transform: Affine3A::IDENTITY,
            stride: 1,
        }
    }

    pub fn with_transform(mut self, transform: Affine3A) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }
}

/// Result of a carve as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarveOutcome {
    pub cells_changed: usize,
}

impl CarveOutcome {
    pub fn changed(&self) -> bool {
        self.cells_changed > 0
    }
}

/// Running totals over the lifetime of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarveStats {
    pub carves: u64,
    pub samples_tested: u64,
    pub cells_cleared: u64,
}

/// Clears `Filled` on every cell the tool covers
#[derive(Debug, Default)]
pub struct CarvingEngine {
    stats: CarveStats,
}

impl CarvingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CarveStats {
        self.stats
    }

    /// Carve `request` out of `chunk`
    ///
    /// Only the clamped chunk-space bounds of the tool are visited, sampled
    /// every `stride` cells. A sample whose center lies in the tool clears
    /// the `stride`-sized block around it. Cells that were already empty are
    /// neither changed nor recorded.
    pub fn carve(&mut self, chunk: &mut VoxelChunk, request: &CarveRequest) -> DiffBatch {
        self.stats.carves += 1;
        let stride = request.stride.clamp(1, MAX_STRIDE);

        if request.transform.matrix3.determinant().abs() < f32::EPSILON {
            log::warn!("Ignoring carve with degenerate tool transform");
            return DiffBatch::new();
        }
        let to_tool = request.transform.inverse();

        let dims = chunk.dims();
        let Some(range) = request.shape.chunk_bounds(&request.transform).cell_range(dims) else {
            log::trace!("Carve missed the chunk");
            return DiffBatch::new();
        };

        let mut batch = DiffBatch::new();
        let half = stride / 2;
        let step = stride as usize;
        for sy in (range.min.y..=range.max.y).step_by(step) {
            for sz in (range.min.z..=range.max.z).step_by(step) {
                for sx in (range.min.x..=range.max.x).step_by(step) {
                    self.stats.samples_tested += 1;
                    let sample = Vec3::new(sx as f32, sy as f32, sz as f32);
                    if !request.shape.contains_point(to_tool.transform_point3(sample)) {
                        continue;
                    }
                    let lo = UVec3::new(sx, sy, sz).saturating_sub(UVec3::splat(half));
                    let hi = (UVec3::new(sx, sy, sz) + UVec3::splat(stride) - UVec3::splat(half + 1))
                        .min(dims - UVec3::ONE);
                    clear_block(chunk, lo, hi, &mut batch);
                }
            }
        }

        self.stats.cells_cleared += batch.len() as u64;
        log::debug!(
            "Carved {} cells (stride {}, range {:?}..={:?})",
            batch.len(),
            stride,
            range.min,
            range.max
        );
        batch
    }
}

fn clear_block(chunk: &mut VoxelChunk, lo: UVec3, hi: UVec3, batch: &mut DiffBatch) {
    for y in lo.y..=hi.y {
        for z in lo.z..=hi.z {
            for x in lo.x..=hi.x {
                let index = chunk.index(x, y, z);
                let before = chunk.cell(index);
                if !before.is_filled() {
                    continue;
                }
                let after = before.without(CellFlags::FILLED);
                chunk.set_cell(index, after);
                batch.push(index, y, before, after);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::edit::HistoryManager;
    use glam::{Mat3, Quat};

    fn carve(chunk: &mut VoxelChunk, request: CarveRequest) -> DiffBatch {
        CarvingEngine::new().carve(chunk, &request)
    }

    #[test]
    fn test_sphere_radius_two_clears_33_cells() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        let mut history = HistoryManager::default();

        let batch = carve(&mut chunk, CarveRequest::new(ToolShape::sphere(Vec3::splat(5.0), 2.0)));
        assert_eq!(batch.len(), 33);
        assert_eq!(chunk.count(CellFlags::FILLED), 1000 - 33);

        assert!(history.record(batch));
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_carve_containment() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(12)).unwrap();
        let shape = ToolShape::sphere(Vec3::new(4.0, 6.0, 7.0), 3.0);
        let batch = carve(&mut chunk, CarveRequest::new(shape));
        assert!(!batch.is_empty());
        for diff in batch.diffs() {
            let p = chunk.position(diff.index as usize).as_vec3();
            assert!(shape.contains_point(p));
            assert!(diff.before.is_filled());
            assert!(!diff.after.is_filled());
        }
    }

    /// Every cell is cleared exactly when its center lies in the posed tool
    fn assert_carve_matches_membership(dims: UVec3, request: CarveRequest) {
        let mut chunk = VoxelChunk::filled(dims).unwrap();
        let batch = carve(&mut chunk, request);
        let to_tool = request.transform.inverse();

        let mut inside = 0;
        for index in 0..chunk.len() {
            let p = chunk.position(index).as_vec3();
            let covered = request.shape.contains_point(to_tool.transform_point3(p));
            assert_eq!(chunk.cell(index).is_filled(), !covered, "cell {:?}", chunk.position(index));
            inside += covered as usize;
        }
        assert!(inside > 0);
        assert_eq!(batch.len(), inside);
    }

    #[test]
    fn test_carve_clears_exactly_the_sphere() {
        assert_carve_matches_membership(
            UVec3::splat(12),
            CarveRequest::new(ToolShape::sphere(Vec3::new(4.0, 6.0, 7.0), 3.0)),
        );
    }

    #[test]
    fn test_carve_clears_exactly_the_rotated_box() {
        let shape = ToolShape::OrientedBox {
            center: Vec3::new(0.5, 0.0, -0.25),
            half_extents: Vec3::new(4.0, 1.5, 2.5),
            basis: Mat3::from_rotation_y(0.6),
        };
        let transform = Affine3A::from_rotation_translation(
            Quat::from_rotation_z(0.4) * Quat::from_rotation_x(-0.3),
            Vec3::new(8.0, 7.5, 8.0),
        );
        assert_carve_matches_membership(UVec3::splat(16), CarveRequest::new(shape).with_transform(transform));
    }

    #[test]
    fn test_carve_clears_exactly_the_rotated_box_at_the_edge() {
        // Tool hangs off the corner so the clamped range matters
        let transform = Affine3A::from_rotation_translation(Quat::from_rotation_y(0.8), Vec3::new(1.0, 2.0, 13.5));
        let shape = ToolShape::cuboid(Vec3::ZERO, Vec3::new(3.0, 2.0, 1.0));
        assert_carve_matches_membership(UVec3::new(10, 6, 14), CarveRequest::new(shape).with_transform(transform));
    }

    #[test]
    fn test_only_filled_cells_recorded() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        chunk.remove_flag(5, 5, 5, CellFlags::FILLED);
        let batch = carve(&mut chunk, CarveRequest::new(ToolShape::sphere(Vec3::splat(5.0), 2.0)));
        assert_eq!(batch.len(), 32);
    }

    #[test]
    fn test_second_carve_is_empty() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        let request = CarveRequest::new(ToolShape::sphere(Vec3::splat(5.0), 2.0));
        let mut engine = CarvingEngine::new();
        assert_eq!(engine.carve(&mut chunk, &request).len(), 33);
        assert!(engine.carve(&mut chunk, &request).is_empty());
        assert_eq!(engine.stats().carves, 2);
        assert_eq!(engine.stats().cells_cleared, 33);
    }

    #[test]
    fn test_shape_outside_chunk_is_empty() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        let batch = carve(&mut chunk, CarveRequest::new(ToolShape::sphere(Vec3::splat(30.0), 2.0)));
        assert!(batch.is_empty());
        let batch = carve(&mut chunk, CarveRequest::new(ToolShape::sphere(Vec3::splat(-4.0), 2.0)));
        assert!(batch.is_empty());
        assert_eq!(chunk.count(CellFlags::FILLED), 1000);
    }

    #[test]
    fn test_touching_face_includes_boundary_cell() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        // Sphere centered outside the -x face reaching exactly x = 0
        let batch = carve(&mut chunk, CarveRequest::new(ToolShape::sphere(Vec3::new(-2.0, 5.0, 5.0), 2.0)));
        assert_eq!(batch.len(), 1);
        assert_eq!(chunk.position(batch.diffs()[0].index as usize), UVec3::new(0, 5, 5));
    }

    #[test]
    fn test_partially_outside_is_clamped() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(6)).unwrap();
        let batch = carve(&mut chunk, CarveRequest::new(ToolShape::cuboid(Vec3::ZERO, Vec3::splat(1.0))));
        // Only the 2x2x2 corner octant survives clamping
        assert_eq!(batch.len(), 8);
    }

    #[test]
    fn test_transform_moves_tool_into_chunk() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        let request = CarveRequest::new(ToolShape::sphere(Vec3::ZERO, 2.0))
            .with_transform(Affine3A::from_translation(Vec3::splat(5.0)));
        assert_eq!(carve(&mut chunk, request).len(), 33);
    }

    #[test]
    fn test_scaled_transform() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        // Unit sphere scaled by 2 in chunk space is the radius-2 sphere
        let request = CarveRequest::new(ToolShape::sphere(Vec3::ZERO, 1.0)).with_transform(
            Affine3A::from_scale_rotation_translation(Vec3::splat(2.0), glam::Quat::IDENTITY, Vec3::splat(5.0)),
        );
        assert_eq!(carve(&mut chunk, request).len(), 33);
    }

    #[test]
    fn test_degenerate_transform_is_ignored() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        let request = CarveRequest::new(ToolShape::sphere(Vec3::ZERO, 2.0))
            .with_transform(Affine3A::from_scale(Vec3::new(1.0, 0.0, 1.0)));
        assert!(carve(&mut chunk, request).is_empty());
    }

    #[test]
    fn test_stride_blocks_tile_without_overlap() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(12)).unwrap();
        let request = CarveRequest::new(ToolShape::cuboid(Vec3::splat(5.5), Vec3::splat(3.5)))
            .with_stride(2);
        let batch = carve(&mut chunk, request);
        let mut seen = std::collections::HashSet::new();
        for diff in batch.diffs() {
            assert!(seen.insert(diff.index), "cell {} recorded twice", diff.index);
        }
        // Samples at 2,4,6,8 per axis each clear [c-1, c]
        assert_eq!(batch.len(), 8 * 8 * 8);
        assert!(!chunk.has_flag(1, 1, 1, CellFlags::FILLED));
        assert!(!chunk.has_flag(8, 8, 8, CellFlags::FILLED));
        assert!(chunk.has_flag(9, 9, 9, CellFlags::FILLED));
    }

    #[test]
    fn test_stride_block_clamped_at_origin() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(8)).unwrap();
        let request = CarveRequest::new(ToolShape::point(Vec3::ZERO)).with_stride(3);
        let batch = carve(&mut chunk, request);
        for diff in batch.diffs() {
            let p = chunk.position(diff.index as usize);
            assert!(p.max_element() < 8);
        }
        assert!(!chunk.has_flag(0, 0, 0, CellFlags::FILLED));
    }

    #[test]
    fn test_touched_layers() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(10)).unwrap();
        let batch = carve(&mut chunk, CarveRequest::new(ToolShape::sphere(Vec3::splat(5.0), 2.0)));
        assert_eq!(batch.touched_layers(), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_flat_chisel_carves_slab() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(16)).unwrap();
        let request = CarveRequest::new(ToolShape::flat_chisel(Vec3::splat(8.0), Vec3::Y, 1.0));
        let batch = carve(&mut chunk, request);
        // 3 x 5 x 3 cells: +-1 across, +-2 along the normal
        assert_eq!(batch.len(), 45);
    }
}
