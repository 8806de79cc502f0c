//! Voxel occupancy storage, carving tools and edit history

pub mod cell;
pub mod chunk;
pub mod layer_view;
pub mod brush;
pub mod edit;

pub use cell::CellFlags;
pub use chunk::VoxelChunk;
pub use layer_view::{LayerView, LayerViewMut};
