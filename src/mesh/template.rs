//! Reusable unit-cube template for greedy boxes

use glam::Vec3;

use super::buffers::{MeshBuffers, MeshVertex};
use crate::math::Aabb;

/// Per-face (outward normal, corners counter-clockwise seen from outside)
const FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
    ([1.0, 0.0, 0.0], [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]]),
    ([-1.0, 0.0, 0.0], [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]]),
    ([0.0, 1.0, 0.0], [[0.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0]]),
    ([0.0, -1.0, 0.0], [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]]),
    ([0.0, 0.0, 1.0], [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]]),
    ([0.0, 0.0, -1.0], [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
];

const FACE_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

/// Unit cube spanning `[0, 1]^3`: 24 vertices (4 per face, unshared normals), 36 indices
#[derive(Clone, Debug)]
pub struct CubeTemplate {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
}

impl Default for CubeTemplate {
    fn default() -> Self {
        Self::unit()
    }
}

impl CubeTemplate {
    pub fn unit() -> Self {
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, corners) in FACES {
            let base = vertices.len() as u32;
            for (corner, uv) in corners.iter().zip(FACE_UVS) {
                vertices.push(MeshVertex { position: *corner, normal, uv });
            }
            indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self { vertices, indices }
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Append the template scaled by `size` with its min corner at `origin`
    pub fn emit(&self, origin: Vec3, size: Vec3, out: &mut MeshBuffers) {
        let base = out.vertices.len() as u32;
        out.vertices.extend(self.vertices.iter().map(|v| MeshVertex {
            position: (origin + Vec3::from_array(v.position) * size).to_array(),
            ..*v
        }));
        out.indices.extend(self.indices.iter().map(|i| base + i));
        out.include_bounds(Aabb::new(origin, origin + size));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_counts() {
        let cube = CubeTemplate::unit();
        assert_eq!(cube.vertices().len(), 24);
        assert_eq!(cube.indices().len(), 36);
    }

    #[test]
    fn test_winding_matches_normals() {
        let cube = CubeTemplate::unit();
        for tri in cube.indices().chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from_array(cube.vertices()[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let n = Vec3::from_array(cube.vertices()[tri[0] as usize].normal);
            assert!(face_normal.dot(n) > 0.99);
        }
    }

    #[test]
    fn test_emit_scales_and_offsets() {
        let cube = CubeTemplate::unit();
        let mut out = MeshBuffers::new();
        cube.emit(Vec3::new(1.5, -0.5, 2.5), Vec3::new(3.0, 1.0, 2.0), &mut out);
        cube.emit(Vec3::ZERO, Vec3::ONE, &mut out);
        assert_eq!(out.vertex_count(), 48);
        assert_eq!(out.indices[36], 24);
        let bounds = out.bounds.unwrap();
        assert_eq!(bounds.min, Vec3::new(0.0, -0.5, 0.0));
        assert_eq!(bounds.max, Vec3::new(4.5, 1.0, 4.5));
    }
}
