//! CPU-side mesh buffers handed to the renderer

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::math::Aabb;

/// Vertex layout shared by every CPU mesher
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Indexed triangle list with its bounding box
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffers {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// `None` while empty
    pub bounds: Option<Aabb>,
}

impl MeshBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.bounds = None;
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Grow the bounds to cover `aabb`
    pub fn include_bounds(&mut self, aabb: Aabb) {
        self.bounds = Some(match self.bounds {
            Some(b) => b.merged(&aabb),
            None => aabb,
        });
    }

    /// Append another mesh, rebasing its indices
    pub fn append(&mut self, other: &MeshBuffers) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| base + i));
        if let Some(b) = other.bounds {
            self.include_bounds(b);
        }
    }

    /// Raw vertex bytes for a GPU upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn position(&self, vertex: u32) -> Vec3 {
        Vec3::from_array(self.vertices[vertex as usize].position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(offset: f32) -> MeshBuffers {
        let mut mesh = MeshBuffers::new();
        for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            mesh.vertices.push(MeshVertex {
                position: [p[0] + offset, p[1], p[2]],
                ..Default::default()
            });
        }
        mesh.indices.extend([0, 1, 2]);
        mesh.include_bounds(Aabb::new(Vec3::new(offset, 0.0, 0.0), Vec3::new(offset + 1.0, 1.0, 0.0)));
        mesh
    }

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 32);
    }

    #[test]
    fn test_append_rebases_indices() {
        let mut mesh = tri(0.0);
        mesh.append(&tri(5.0));
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.triangle_count(), 2);
        let bounds = mesh.bounds.unwrap();
        assert_eq!(bounds.max.x, 6.0);
        assert_eq!(mesh.position(3), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_clear() {
        let mut mesh = tri(0.0);
        mesh.clear();
        assert!(mesh.is_empty());
        assert!(mesh.bounds.is_none());
        assert_eq!(mesh.vertex_bytes().len(), 0);
    }
}
