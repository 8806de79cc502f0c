//! Bounding volumes and cell ranges

pub mod aabb;

pub use aabb::{Aabb, CellRange};
