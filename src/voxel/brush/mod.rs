//! Carving tools
//!
//! Tools are shapes in their own local space, posed into the chunk by an
//! affine transform and sampled at a stride chosen from the stone's scale.

pub mod primitive;
pub mod carve;
pub mod lod;

// Re-exports
pub use primitive::{ToolShape, POINT_RADIUS};
pub use carve::{CarveOutcome, CarveRequest, CarveStats, CarvingEngine};
pub use lod::{LodConfig, stride_for_scale};
