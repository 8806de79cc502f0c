//! Host marching-cubes kernel
//!
//! Same field, case tables, interpolation, normals and budget rules as the
//! WGSL kernel. Slabs of marching cells are polygonised in parallel and
//! concatenated in slab order, so the output is deterministic.

use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;

use super::tables::{CORNER_OFFSETS, EDGE_CORNERS, TRI_TABLE};
use super::{ExtractionReport, IsoMesh, IsoParams, IsoVertex, IsosurfaceKernel};
use crate::core::types::Result;
use crate::voxel::chunk::VoxelChunk;

/// Read-only density view of a chunk
struct Field<'a> {
    words: &'a [u32],
    dims: IVec3,
}

impl Field<'_> {
    #[inline]
    fn density(&self, p: IVec3) -> f32 {
        if p.cmplt(IVec3::ZERO).any() || p.cmpge(self.dims).any() {
            return 0.0;
        }
        let idx = p.x as usize
            + p.z as usize * self.dims.x as usize
            + p.y as usize * (self.dims.x * self.dims.z) as usize;
        if self.words[idx] & crate::voxel::cell::flags::FILLED != 0 { 1.0 } else { 0.0 }
    }

    fn gradient(&self, p: IVec3) -> Vec3 {
        0.5 * Vec3::new(
            self.density(p + IVec3::X) - self.density(p - IVec3::X),
            self.density(p + IVec3::Y) - self.density(p - IVec3::Y),
            self.density(p + IVec3::Z) - self.density(p - IVec3::Z),
        )
    }
}

/// Polygonise one marching cell whose lowest corner sits at `base`
fn polygonise(field: &Field<'_>, base: IVec3, isovalue: f32, scale: f32, out: &mut Vec<[IsoVertex; 3]>) {
    let corners = CORNER_OFFSETS.map(|o| base + UVec3::from_array(o).as_ivec3());
    let mut values = [0.0f32; 8];
    let mut case = 0usize;
    for (i, corner) in corners.iter().enumerate() {
        values[i] = field.density(*corner);
        if values[i] < isovalue {
            case |= 1 << i;
        }
    }
    if case == 0 || case == 255 {
        return;
    }

    for tri in TRI_TABLE[case].chunks_exact(3).take_while(|t| t[0] >= 0) {
        let mut pos = [Vec3::ZERO; 3];
        let mut nrm = [Vec3::ZERO; 3];
        for k in 0..3 {
            let [a, b] = EDGE_CORNERS[tri[k] as usize];
            let (va, vb) = (values[a], values[b]);
            let f = if (vb - va).abs() > 1e-6 {
                ((isovalue - va) / (vb - va)).clamp(0.0, 1.0)
            } else {
                0.5
            };
            pos[k] = corners[a].as_vec3().lerp(corners[b].as_vec3(), f);
            nrm[k] = -field.gradient(corners[a]).lerp(field.gradient(corners[b]), f);
        }

        let mut face = (pos[1] - pos[0]).cross(pos[2] - pos[0]);
        if face.dot(nrm[0] + nrm[1] + nrm[2]) < 0.0 {
            pos.swap(1, 2);
            nrm.swap(1, 2);
            face = -face;
        }
        let fallback = face.try_normalize().unwrap_or(Vec3::Y);

        out.push(std::array::from_fn(|k| IsoVertex {
            position: (pos[k] * scale).to_array(),
            normal: nrm[k].try_normalize().unwrap_or(fallback).to_array(),
        }));
    }
}

/// rayon-backed kernel with persistent output buffers
#[derive(Debug, Default)]
pub struct CpuIsosurfaceKernel {
    vertices: Vec<IsoVertex>,
    indices: Vec<u32>,
    pending: Option<ExtractionReport>,
    last: Option<(ExtractionReport, IsoParams)>,
}

impl CpuIsosurfaceKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole output buffers including the cleared tail
    pub fn buffers(&self) -> (&[IsoVertex], &[u32]) {
        (&self.vertices, &self.indices)
    }
}

impl IsosurfaceKernel for CpuIsosurfaceKernel {
    fn submit(&mut self, chunk: &VoxelChunk, params: &IsoParams) -> Result<()> {
        let field = Field { words: chunk.as_words(), dims: chunk.dims().as_ivec3() };
        let cells = params.cell_counts();

        let slabs: Vec<Vec<[IsoVertex; 3]>> = (0..cells.y)
            .into_par_iter()
            .map(|cy| {
                let mut tris = Vec::new();
                for cz in 0..cells.z {
                    for cx in 0..cells.x {
                        let base = UVec3::new(cx, cy, cz).as_ivec3() - IVec3::ONE;
                        polygonise(&field, base, params.isovalue, params.grid_scale, &mut tris);
                    }
                }
                tris
            })
            .collect();

        let requested: usize = slabs.iter().map(Vec::len).sum();
        let report = ExtractionReport::new(requested.min(u32::MAX as usize) as u32, params.max_triangles);
        let written = report.vertex_count();

        // Buffers keep their high-water size; grow if this pass needs more
        if self.vertices.len() < written {
            self.vertices.resize(written, IsoVertex::default());
            self.indices.resize(written, 0);
        }
        let mut slot = 0usize;
        'fill: for tri in slabs.iter().flatten() {
            for v in tri {
                if slot >= written {
                    break 'fill;
                }
                self.vertices[slot] = *v;
                self.indices[slot] = slot as u32;
                slot += 1;
            }
        }

        // Clear pass: nothing stale may survive past the produced count
        self.vertices[written..].fill(IsoVertex::default());
        self.indices[written..].fill(0);

        self.pending = Some(report);
        self.last = Some((report, *params));
        Ok(())
    }

    fn synchronize(&mut self) -> Result<ExtractionReport> {
        // Work completes inside submit; synchronize only publishes it
        Ok(self.pending.take().or(self.last.map(|(r, _)| r)).unwrap_or_default())
    }

    fn read_back(&mut self) -> Result<IsoMesh> {
        let Some((report, params)) = self.last else {
            return Ok(IsoMesh::default());
        };
        let n = report.vertex_count();
        Ok(IsoMesh {
            vertices: self.vertices[..n].to_vec(),
            indices: self.indices[..n].to_vec(),
            bounds: params.bounds(),
            report,
        })
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::isosurface::IsosurfaceConfig;
    use crate::voxel::cell::CellFlags;

    fn extract(chunk: &VoxelChunk, budget: u32) -> (CpuIsosurfaceKernel, ExtractionReport) {
        let config = IsosurfaceConfig { triangle_budget: budget, ..Default::default() };
        let mut kernel = CpuIsosurfaceKernel::new();
        kernel.submit(chunk, &IsoParams::new(chunk.dims(), &config)).unwrap();
        let report = kernel.synchronize().unwrap();
        (kernel, report)
    }

    #[test]
    fn test_empty_chunk_has_no_surface() {
        let chunk = VoxelChunk::new(UVec3::splat(5)).unwrap();
        let (mut kernel, report) = extract(&chunk, 1000);
        assert_eq!(report.triangles_requested, 0);
        assert!(kernel.read_back().unwrap().vertices.is_empty());
    }

    #[test]
    fn test_single_cell_surface() {
        let mut chunk = VoxelChunk::new(UVec3::splat(3)).unwrap();
        chunk.add_flag(1, 1, 1, CellFlags::FILLED);
        let (mut kernel, report) = extract(&chunk, 1000);
        assert!(report.triangles_written > 0);
        assert!(!report.is_truncated());

        let mesh = kernel.read_back().unwrap();
        let center = Vec3::ONE;
        for v in &mesh.vertices {
            let p = Vec3::from_array(v.position);
            // Iso 0.9 sits 0.1 cells from the filled sample
            assert!((p - center).abs().max_element() <= 0.1 + 1e-5);
            let n = Vec3::from_array(v.normal);
            assert!((n.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_normals_point_outward_and_winding_agrees() {
        let mut chunk = VoxelChunk::new(UVec3::splat(8)).unwrap();
        for y in 2..6 {
            for z in 2..6 {
                for x in 2..6 {
                    chunk.add_flag(x, y, z, CellFlags::FILLED);
                }
            }
        }
        let (mut kernel, _) = extract(&chunk, 100_000);
        let mesh = kernel.read_back().unwrap();
        let center = Vec3::splat(3.5);
        for tri in mesh.vertices.chunks_exact(3) {
            let p = [tri[0], tri[1], tri[2]].map(|v| Vec3::from_array(v.position));
            let face = (p[1] - p[0]).cross(p[2] - p[0]);
            let n = Vec3::from_array(tri[0].normal) + Vec3::from_array(tri[1].normal) + Vec3::from_array(tri[2].normal);
            assert!(face.dot(n) >= 0.0);
            let centroid = (p[0] + p[1] + p[2]) / 3.0;
            assert!(n.dot(centroid - center) > 0.0);
        }
    }

    #[test]
    fn test_non_indexed_output() {
        let chunk = VoxelChunk::filled(UVec3::splat(3)).unwrap();
        let (mut kernel, _) = extract(&chunk, 10_000);
        let mesh = kernel.read_back().unwrap();
        for (i, &index) in mesh.indices.iter().enumerate() {
            assert_eq!(index, i as u32);
        }
    }

    #[test]
    fn test_budget_truncation_never_overflows() {
        let chunk = VoxelChunk::filled(UVec3::splat(6)).unwrap();
        let (_, full) = extract(&chunk, 1_000_000);
        assert!(full.triangles_requested > 20);

        let (mut kernel, report) = extract(&chunk, 20);
        assert!(report.is_truncated());
        assert_eq!(report.triangles_requested, full.triangles_requested);
        assert_eq!(report.triangles_written, 20);
        let (vertices, indices) = kernel.buffers();
        assert_eq!(vertices.len(), 60);
        assert_eq!(indices.len(), 60);
        assert_eq!(kernel.read_back().unwrap().triangle_count(), 20);
    }

    #[test]
    fn test_tail_cleared_after_smaller_pass() {
        let big = VoxelChunk::filled(UVec3::splat(6)).unwrap();
        let mut small = VoxelChunk::new(UVec3::splat(6)).unwrap();
        small.add_flag(2, 2, 2, CellFlags::FILLED);

        let config = IsosurfaceConfig::default();
        let mut kernel = CpuIsosurfaceKernel::new();
        kernel.submit(&big, &IsoParams::new(big.dims(), &config)).unwrap();
        let first = kernel.synchronize().unwrap();
        kernel.submit(&small, &IsoParams::new(small.dims(), &config)).unwrap();
        let second = kernel.synchronize().unwrap();
        assert!(second.triangles_written < first.triangles_written);

        let (vertices, indices) = kernel.buffers();
        let n = second.vertex_count();
        assert!(vertices[n..].iter().all(|v| *v == IsoVertex::default()));
        assert!(indices[n..].iter().all(|&i| i == 0));
    }

    #[test]
    fn test_deterministic() {
        let mut chunk = VoxelChunk::filled(UVec3::splat(7)).unwrap();
        chunk.remove_flag(3, 3, 0, CellFlags::FILLED);
        chunk.remove_flag(6, 1, 2, CellFlags::FILLED);
        let (mut a, _) = extract(&chunk, 100_000);
        let (mut b, _) = extract(&chunk, 100_000);
        assert_eq!(a.read_back().unwrap(), b.read_back().unwrap());
    }

    #[test]
    fn test_scale_applies_to_positions() {
        let chunk = VoxelChunk::filled(UVec3::splat(2)).unwrap();
        let config = IsosurfaceConfig { grid_scale: 2.0, ..Default::default() };
        let params = IsoParams::new(chunk.dims(), &config);
        let mut kernel = CpuIsosurfaceKernel::new();
        kernel.submit(&chunk, &params).unwrap();
        kernel.synchronize().unwrap();
        let mesh = kernel.read_back().unwrap();
        for v in &mesh.vertices {
            assert!(mesh.bounds.contains_point(Vec3::from_array(v.position)));
        }
        let max = mesh.vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
        assert!((max - 2.2).abs() < 1e-4);
    }
}
