//! Axis-aligned bounding box and integer cell ranges

use crate::core::types::{Affine3A, UVec3, Vec3};

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get half-extents
    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Check if point is inside AABB (boundary inclusive)
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Expand AABB to include point
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The 8 corners, x varying fastest
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Bounds of this box after an affine transform
    /// Conservative for rotated boxes (encloses all 8 transformed corners)
    pub fn transformed(&self, transform: &Affine3A) -> Aabb {
        let corners = self.corners();
        let first = transform.transform_point3(corners[0]);
        let mut result = Aabb::new(first, first);
        for corner in &corners[1..] {
            result.expand(transform.transform_point3(*corner));
        }
        result
    }

    /// Integer cells whose centers this box can reach, clamped to a grid of `dims`
    ///
    /// Returns `None` when the box misses the grid entirely.
    pub fn cell_range(&self, dims: UVec3) -> Option<CellRange> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return None;
        }
        let upper = dims.as_vec3() - Vec3::ONE;
        let lo = self.min.floor();
        let hi = self.max.ceil();
        if hi.x < 0.0 || hi.y < 0.0 || hi.z < 0.0
            || lo.x > upper.x || lo.y > upper.y || lo.z > upper.z
        {
            return None;
        }
        Some(CellRange {
            min: lo.clamp(Vec3::ZERO, upper).as_uvec3(),
            max: hi.clamp(Vec3::ZERO, upper).as_uvec3(),
        })
    }
}

/// Inclusive integer box of cell coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRange {
    pub min: UVec3,
    pub max: UVec3,
}

impl CellRange {
    /// Number of cells per axis
    pub fn extent(&self) -> UVec3 {
        self.max - self.min + UVec3::ONE
    }

    /// Total number of cells covered
    pub fn volume(&self) -> usize {
        let e = self.extent();
        e.x as usize * e.y as usize * e.z as usize
    }

    pub fn contains(&self, p: UVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}
