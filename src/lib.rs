//! Chisel - voxel stone carving core
//!
//! A dense occupancy grid ([`voxel::VoxelChunk`]) is carved by posed tool
//! shapes, every carve is recorded for bounded undo/redo, and a surface is
//! rebuilt from what remains, either as per-layer greedy boxes or as a
//! marching-cubes isosurface on the GPU or CPU. [`session::SculptSession`]
//! ties these together behind a serialized command queue.

pub mod core;
pub mod math;
pub mod voxel;
pub mod mesh;
pub mod render;
pub mod streaming;
pub mod session;
