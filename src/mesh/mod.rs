//! Surface reconstruction from voxel occupancy

pub mod buffers;
pub mod template;
pub mod greedy;
pub mod isosurface;

pub use buffers::{MeshBuffers, MeshVertex};
pub use template::CubeTemplate;
pub use greedy::{GreedyMeshBuilder, GreedyRun, LayeredMesh};
pub use isosurface::{
    ExtractionReport, IsoMesh, IsoParams, IsoVertex, IsosurfaceBackend, IsosurfaceBuilder,
    IsosurfaceConfig, IsosurfaceKernel,
};
