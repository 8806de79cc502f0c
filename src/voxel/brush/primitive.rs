use glam::{Affine3A, Mat3, Vec3};

use crate::math::Aabb;

/// Radius of the pin tool, in cells
pub const POINT_RADIUS: f32 = 2.0;

/// Slack on membership tests so samples exactly on a boundary survive
/// transform round-off
pub const CONTAINMENT_EPSILON: f32 = 1e-4;

/// Tool shapes, expressed in tool-local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolShape {
    Sphere { center: Vec3, radius: f32 },
    /// Box with orthonormal `basis` columns as its local axes
    OrientedBox { center: Vec3, half_extents: Vec3, basis: Mat3 },
    /// Small fixed-radius sphere
    Point { center: Vec3 },
}

impl ToolShape {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        ToolShape::Sphere { center, radius }
    }

    pub fn point(center: Vec3) -> Self {
        ToolShape::Point { center }
    }

    /// Axis-aligned box
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        ToolShape::OrientedBox { center, half_extents, basis: Mat3::IDENTITY }
    }

    /// Flat chisel blade: a slab twice as deep along `normal` as it is wide
    ///
    /// `range` is the impact range; the box extends `2 * range` along the
    /// normal and `range` along the two tangents.
    pub fn flat_chisel(center: Vec3, normal: Vec3, range: f32) -> Self {
        let n = normal.try_normalize().unwrap_or(Vec3::Y);
        let (t0, t1) = n.any_orthonormal_pair();
        ToolShape::OrientedBox {
            center,
            half_extents: Vec3::new(range, range * 2.0, range),
            basis: Mat3::from_cols(t0, n, t1),
        }
    }

    /// Closed membership test in tool-local space
    pub fn contains_point(&self, local_point: Vec3) -> bool {
        match self {
            ToolShape::Sphere { center, radius } => {
                let r = radius + CONTAINMENT_EPSILON;
                (local_point - *center).length_squared() <= r * r
            }
            ToolShape::Point { center } => {
                let r = POINT_RADIUS + CONTAINMENT_EPSILON;
                (local_point - *center).length_squared() <= r * r
            }
            ToolShape::OrientedBox { center, half_extents, basis } => {
                let q = (basis.transpose() * (local_point - *center)).abs();
                q.cmple(*half_extents + Vec3::splat(CONTAINMENT_EPSILON)).all()
            }
        }
    }

    /// Tool-local AABB
    pub fn local_bounds(&self) -> Aabb {
        match self {
            ToolShape::Sphere { center, radius } => {
                Aabb::from_center_half_extent(*center, Vec3::splat(*radius))
            }
            ToolShape::Point { center } => {
                Aabb::from_center_half_extent(*center, Vec3::splat(POINT_RADIUS))
            }
            ToolShape::OrientedBox { center, half_extents, basis } => {
                let oriented = Affine3A::from_mat3_translation(*basis, *center);
                Aabb::from_center_half_extent(Vec3::ZERO, *half_extents).transformed(&oriented)
            }
        }
    }

    /// Chunk-space AABB given the tool-to-chunk transform
    /// Conservative for rotated shapes
    pub fn chunk_bounds(&self, tool_to_chunk: &Affine3A) -> Aabb {
        self.local_bounds().transformed(tool_to_chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_membership_is_closed() {
        let sphere = ToolShape::sphere(Vec3::splat(5.0), 2.0);
        assert!(sphere.contains_point(Vec3::new(7.0, 5.0, 5.0)));
        assert!(!sphere.contains_point(Vec3::new(7.01, 5.0, 5.0)));
    }

    #[test]
    fn test_point_radius() {
        let pin = ToolShape::point(Vec3::ZERO);
        assert!(pin.contains_point(Vec3::new(0.0, 2.0, 0.0)));
        assert!(!pin.contains_point(Vec3::new(0.0, 2.1, 0.0)));
        assert_eq!(pin.local_bounds().size(), Vec3::splat(4.0));
    }

    #[test]
    fn test_box_membership_is_closed() {
        let b = ToolShape::cuboid(Vec3::ZERO, Vec3::ONE);
        assert!(b.contains_point(Vec3::ZERO));
        assert!(!b.contains_point(Vec3::splat(2.0)));
        assert!(b.contains_point(Vec3::ONE));
    }

    #[test]
    fn test_rotated_box_membership() {
        let basis = Mat3::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let b = ToolShape::OrientedBox {
            center: Vec3::ZERO,
            half_extents: Vec3::new(2.0, 0.5, 0.5),
            basis,
        };
        // Long axis now runs along the (1, 1, 0) diagonal
        let along = Vec3::new(1.0, 1.0, 0.0).normalize() * 1.9;
        assert!(b.contains_point(along));
        assert!(!b.contains_point(Vec3::X * 1.9));
    }

    #[test]
    fn test_flat_chisel_extents() {
        let chisel = ToolShape::flat_chisel(Vec3::ZERO, Vec3::Z, 2.0);
        assert!(chisel.contains_point(Vec3::Z * 4.0));
        assert!(!chisel.contains_point(Vec3::Z * 4.5));
        assert!(chisel.contains_point(Vec3::X * 2.0));
        assert!(!chisel.contains_point(Vec3::X * 2.5));
        let bounds = chisel.local_bounds();
        assert!((bounds.max.z - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_chunk_bounds_translated() {
        let sphere = ToolShape::sphere(Vec3::ZERO, 2.0);
        let bounds = sphere.chunk_bounds(&Affine3A::from_translation(Vec3::splat(5.0)));
        assert_eq!(bounds.min, Vec3::splat(3.0));
        assert_eq!(bounds.max, Vec3::splat(7.0));
    }
}
