//! Greedy meshing: merge each layer's filled cells into rectangular boxes
//!
//! Per layer, cells are scanned row-major with x fastest. An unmeshed filled
//! cell starts a run that grows along +x, then along +z while the whole row
//! qualifies. Absorbed cells are tagged `MESH_GENERATED`, so runs partition
//! the layer's filled cells. Each run becomes one `len_x x 1 x len_z` box.
//! No merging happens across layers.

use glam::Vec3;
use rayon::prelude::*;

use super::buffers::MeshBuffers;
use super::template::CubeTemplate;
use crate::voxel::cell::CellFlags;
use crate::voxel::chunk::VoxelChunk;
use crate::voxel::layer_view::LayerViewMut;

/// One merged rectangle within a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GreedyRun {
    pub x: u32,
    pub z: u32,
    pub len_x: u32,
    pub len_z: u32,
}

impl GreedyRun {
    pub fn area(&self) -> u32 {
        self.len_x * self.len_z
    }
}

#[inline]
fn qualifies(cell: CellFlags) -> bool {
    cell.is_filled() && !cell.intersects(CellFlags::MESH_GENERATED)
}

/// Find the runs of one layer, tagging absorbed cells
///
/// Expects `MESH_GENERATED` to be clear on the layer; call
/// [`LayerViewMut::clear_flag_all`] first when re-meshing.
pub fn greedy_runs_into(layer: &mut LayerViewMut<'_>, runs: &mut Vec<GreedyRun>) {
    let (dim_x, dim_z) = (layer.dim_x(), layer.dim_z());
    for z in 0..dim_z {
        let mut x = 0;
        while x < dim_x {
            if !qualifies(layer.flags(x, z)) {
                x += 1;
                continue;
            }

            layer.add_flag(x, z, CellFlags::MESH_GENERATED);
            let mut len_x = 1;
            while x + len_x < dim_x && qualifies(layer.flags(x + len_x, z)) {
                layer.add_flag(x + len_x, z, CellFlags::MESH_GENERATED);
                len_x += 1;
            }

            let mut len_z = 1;
            while z + len_z < dim_z
                && (x..x + len_x).all(|xi| qualifies(layer.flags(xi, z + len_z)))
            {
                for xi in x..x + len_x {
                    layer.add_flag(xi, z + len_z, CellFlags::MESH_GENERATED);
                }
                len_z += 1;
            }

            runs.push(GreedyRun { x, z, len_x, len_z });
            x += len_x;
        }
    }
}

/// Per-layer meshes, so a carve only re-meshes the layers it touched
#[derive(Clone, Debug, Default)]
pub struct LayeredMesh {
    layers: Vec<MeshBuffers>,
}

impl LayeredMesh {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, y: u32) -> &MeshBuffers {
        &self.layers[y as usize]
    }

    pub fn layers(&self) -> &[MeshBuffers] {
        &self.layers
    }

    pub fn triangle_count(&self) -> usize {
        self.layers.iter().map(MeshBuffers::triangle_count).sum()
    }

    /// Concatenate every layer into one mesh
    pub fn merged(&self) -> MeshBuffers {
        let mut out = MeshBuffers::new();
        for layer in &self.layers {
            out.append(layer);
        }
        out
    }
}

/// Builds greedy box meshes from a chunk
#[derive(Clone, Debug)]
pub struct GreedyMeshBuilder {
    template: CubeTemplate,
    /// Uniform scale applied to emitted positions
    scale: f32,
}

impl Default for GreedyMeshBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GreedyMeshBuilder {
    pub fn new() -> Self {
        Self::with_scale(1.0)
    }

    pub fn with_scale(scale: f32) -> Self {
        Self { template: CubeTemplate::unit(), scale }
    }

    /// Re-mesh one layer into `out` (replacing its contents)
    pub fn build_layer(&self, mut layer: LayerViewMut<'_>, y: u32, out: &mut MeshBuffers) -> usize {
        out.clear();
        layer.clear_flag_all(CellFlags::MESH_GENERATED);
        let mut runs = Vec::new();
        greedy_runs_into(&mut layer, &mut runs);
        for run in &runs {
            // Cell (x, y, z) spans [x - 0.5, x + 0.5]
            let origin = Vec3::new(run.x as f32, y as f32, run.z as f32) - Vec3::splat(0.5);
            let size = Vec3::new(run.len_x as f32, 1.0, run.len_z as f32);
            self.template.emit(origin * self.scale, size * self.scale, out);
        }
        runs.len()
    }

    /// Mesh every layer, in parallel across layers
    pub fn rebuild(&self, chunk: &mut VoxelChunk) -> LayeredMesh {
        let (dim_x, dim_z) = (chunk.dim_x(), chunk.dim_z());
        let layers: Vec<MeshBuffers> = chunk
            .par_layer_slices_mut()
            .enumerate()
            .map(|(y, slab)| {
                let mut mesh = MeshBuffers::new();
                self.build_layer(LayerViewMut::new(slab, dim_x, dim_z), y as u32, &mut mesh);
                mesh
            })
            .collect();
        let mesh = LayeredMesh { layers };
        log::debug!("Greedy rebuild: {} layers, {} triangles", mesh.layer_count(), mesh.triangle_count());
        mesh
    }

    /// Re-mesh only the listed layers of an existing mesh
    pub fn rebuild_layers(&self, chunk: &mut VoxelChunk, mesh: &mut LayeredMesh, layers: &[u32]) {
        if mesh.layers.len() != chunk.dim_y() as usize {
            *mesh = self.rebuild(chunk);
            return;
        }
        for &y in layers {
            let layer = chunk.layer_mut(y);
            let runs = self.build_layer(layer, y, &mut mesh.layers[y as usize]);
            log::trace!("Re-meshed layer {y}: {runs} runs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UVec3;

    fn runs_for(chunk: &mut VoxelChunk, y: u32) -> Vec<GreedyRun> {
        let mut layer = chunk.layer_mut(y);
        layer.clear_flag_all(CellFlags::MESH_GENERATED);
        let mut runs = Vec::new();
        greedy_runs_into(&mut layer, &mut runs);
        runs
    }

    /// Every filled cell covered exactly once, nothing else covered
    fn assert_partition(chunk: &VoxelChunk, y: u32, runs: &[GreedyRun]) {
        let layer = chunk.layer(y);
        let mut covered = vec![0u32; layer.cells().len()];
        for run in runs {
            for z in run.z..run.z + run.len_z {
                for x in run.x..run.x + run.len_x {
                    covered[layer.index(x, z)] += 1;
                }
            }
        }
        for (i, cell) in layer.cells().iter().enumerate() {
            let expected = if cell.is_filled() { 1 } else { 0 };
            assert_eq!(covered[i], expected, "cell {i} covered {} times", covered[i]);
        }
    }

    #[test]
    fn test_full_layer_is_one_run() {
        let mut chunk = VoxelChunk::filled(UVec3::new(5, 2, 4)).unwrap();
        let runs = runs_for(&mut chunk, 0);
        assert_eq!(runs, vec![GreedyRun { x: 0, z: 0, len_x: 5, len_z: 4 }]);
        assert_eq!(chunk.layer(0).count(CellFlags::MESH_GENERATED), 20);
    }

    #[test]
    fn test_empty_layer_has_no_runs() {
        let mut chunk = VoxelChunk::new(UVec3::new(4, 1, 4)).unwrap();
        assert!(runs_for(&mut chunk, 0).is_empty());
    }

    #[test]
    fn test_hole_splits_runs() {
        let mut chunk = VoxelChunk::filled(UVec3::new(3, 1, 3)).unwrap();
        chunk.remove_flag(1, 0, 1, CellFlags::FILLED);
        let runs = runs_for(&mut chunk, 0);
        assert_eq!(runs[0], GreedyRun { x: 0, z: 0, len_x: 3, len_z: 1 });
        assert_partition(&chunk, 0, &runs);
        assert_eq!(runs.iter().map(GreedyRun::area).sum::<u32>(), 8);
    }

    #[test]
    fn test_partition_irregular_pattern() {
        let mut chunk = VoxelChunk::new(UVec3::new(9, 1, 7)).unwrap();
        for z in 0..7u32 {
            for x in 0..9u32 {
                if (x * 7 + z * 3) % 5 != 0 && !(x == 4 && z > 2) {
                    chunk.add_flag(x, 0, z, CellFlags::FILLED);
                }
            }
        }
        let runs = runs_for(&mut chunk, 0);
        assert_partition(&chunk, 0, &runs);
    }

    #[test]
    fn test_z_growth_stops_at_partial_row() {
        let mut chunk = VoxelChunk::new(UVec3::new(3, 1, 3)).unwrap();
        for x in 0..3 {
            chunk.add_flag(x, 0, 0, CellFlags::FILLED);
            chunk.add_flag(x, 0, 1, CellFlags::FILLED);
        }
        chunk.add_flag(0, 0, 2, CellFlags::FILLED);
        let runs = runs_for(&mut chunk, 0);
        assert_eq!(runs, vec![
            GreedyRun { x: 0, z: 0, len_x: 3, len_z: 2 },
            GreedyRun { x: 0, z: 2, len_x: 1, len_z: 1 },
        ]);
    }

    #[test]
    fn test_build_layer_geometry() {
        let mut chunk = VoxelChunk::new(UVec3::new(4, 3, 4)).unwrap();
        chunk.add_flag(1, 2, 1, CellFlags::FILLED);
        chunk.add_flag(2, 2, 1, CellFlags::FILLED);
        let builder = GreedyMeshBuilder::new();
        let mut mesh = MeshBuffers::new();
        let runs = builder.build_layer(chunk.layer_mut(2), 2, &mut mesh);
        assert_eq!(runs, 1);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.indices.len(), 36);
        let bounds = mesh.bounds.unwrap();
        assert_eq!(bounds.min, Vec3::new(0.5, 1.5, 0.5));
        assert_eq!(bounds.max, Vec3::new(2.5, 2.5, 1.5));
    }

    #[test]
    fn test_rebuild_clears_stale_tags() {
        let mut chunk = VoxelChunk::filled(UVec3::new(4, 3, 4)).unwrap();
        let builder = GreedyMeshBuilder::new();
        let first = builder.rebuild(&mut chunk);
        assert_eq!(first.triangle_count(), 3 * 12);
        // Second pass must not skip cells tagged by the first
        let second = builder.rebuild(&mut chunk);
        assert_eq!(second.triangle_count(), 3 * 12);
    }

    #[test]
    fn test_rebuild_layers_matches_full_rebuild() {
        let mut chunk = VoxelChunk::filled(UVec3::new(6, 4, 6)).unwrap();
        let builder = GreedyMeshBuilder::new();
        let mut mesh = builder.rebuild(&mut chunk);

        chunk.remove_flag(2, 1, 3, CellFlags::FILLED);
        chunk.remove_flag(0, 3, 0, CellFlags::FILLED);
        builder.rebuild_layers(&mut chunk, &mut mesh, &[1, 3]);

        let full = builder.rebuild(&mut chunk);
        for y in 0..4 {
            assert_eq!(mesh.layer(y), full.layer(y));
        }
        assert_eq!(mesh.merged().triangle_count(), full.triangle_count());
    }

    #[test]
    fn test_rebuild_layers_on_resized_chunk_falls_back_to_full() {
        let mut chunk = VoxelChunk::filled(UVec3::new(3, 3, 3)).unwrap();
        let builder = GreedyMeshBuilder::new();
        let mut mesh = LayeredMesh::default();
        builder.rebuild_layers(&mut chunk, &mut mesh, &[0]);
        assert_eq!(mesh.layer_count(), 3);
    }
}
