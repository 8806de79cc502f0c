//! Marching-cubes surface extraction under a fixed triangle budget
//!
//! The occupancy grid is read as a scalar field (`FILLED` = 1.0, else 0.0,
//! outside the chunk = 0.0) and polygonised at `isovalue`. Extraction runs
//! through an [`IsosurfaceKernel`]: `submit` starts the work, `synchronize`
//! waits for it and reports how many triangles were produced, `read_back`
//! copies the result to the host.
//!
//! Output past the budget is dropped, never written. The report still
//! carries the full requested count, so truncation is observable.

pub mod tables;
pub mod cpu;
pub mod gpu;

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::types::Result;
use crate::math::Aabb;
use crate::voxel::chunk::VoxelChunk;

pub use cpu::CpuIsosurfaceKernel;
pub use gpu::GpuIsosurfaceKernel;

/// Default triangle budget
pub const DEFAULT_TRIANGLE_BUDGET: u32 = 65536 * 16;

/// Which kernel implementation extracts the surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsosurfaceBackend {
    /// rayon on the host
    Cpu,
    /// wgpu compute
    Gpu,
    /// GPU when an adapter is available, CPU otherwise
    #[default]
    Auto,
}

/// Extraction settings
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsosurfaceConfig {
    pub isovalue: f32,
    /// World size of one cell
    pub grid_scale: f32,
    pub triangle_budget: u32,
    pub backend: IsosurfaceBackend,
}

impl Default for IsosurfaceConfig {
    fn default() -> Self {
        Self {
            isovalue: 0.9,
            grid_scale: 1.0,
            triangle_budget: DEFAULT_TRIANGLE_BUDGET,
            backend: IsosurfaceBackend::default(),
        }
    }
}

/// Per-dispatch parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IsoParams {
    pub dims: UVec3,
    pub isovalue: f32,
    pub grid_scale: f32,
    pub max_triangles: u32,
}

impl IsoParams {
    pub fn new(dims: UVec3, config: &IsosurfaceConfig) -> Self {
        Self {
            dims,
            isovalue: config.isovalue,
            grid_scale: config.grid_scale,
            max_triangles: config.triangle_budget,
        }
    }

    /// Marching cells per axis (one beyond the grid on each side, sharing corners)
    pub fn cell_counts(&self) -> UVec3 {
        self.dims + UVec3::ONE
    }

    /// Bounds of the extracted mesh: the chunk, `dims * grid_scale` in size
    pub fn bounds(&self) -> Aabb {
        Aabb::new(
            Vec3::splat(-0.5) * self.grid_scale,
            (self.dims.as_vec3() - Vec3::splat(0.5)) * self.grid_scale,
        )
    }
}

/// One isosurface vertex - 6 floats
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct IsoVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Triangle counts from one extraction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Triangles actually stored
    pub triangles_written: u32,
    /// Triangles the surface needed
    pub triangles_requested: u32,
    pub budget: u32,
}

impl ExtractionReport {
    pub fn new(requested: u32, budget: u32) -> Self {
        Self {
            triangles_written: requested.min(budget),
            triangles_requested: requested,
            budget,
        }
    }

    /// Some triangles were dropped
    pub fn is_truncated(&self) -> bool {
        self.triangles_requested > self.budget
    }

    /// Requested / budget (above 1.0 when truncated)
    pub fn utilization(&self) -> f32 {
        if self.budget == 0 {
            return 0.0;
        }
        self.triangles_requested as f32 / self.budget as f32
    }

    pub fn vertex_count(&self) -> usize {
        self.triangles_written as usize * 3
    }
}

/// Host copy of an extracted surface (non-indexed, `indices[i] == i`)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IsoMesh {
    pub vertices: Vec<IsoVertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
    pub report: ExtractionReport,
}

impl IsoMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Submit/synchronize extraction backend
pub trait IsosurfaceKernel: Send {
    /// Start extraction; results are not valid until [`IsosurfaceKernel::synchronize`]
    fn submit(&mut self, chunk: &VoxelChunk, params: &IsoParams) -> Result<()>;

    /// Wait for the last submission and report its counts
    fn synchronize(&mut self) -> Result<ExtractionReport>;

    /// Copy the last synchronized result to the host
    fn read_back(&mut self) -> Result<IsoMesh>;

    fn name(&self) -> &'static str;
}

/// Owns a kernel and drives it once per rebuild
pub struct IsosurfaceBuilder {
    kernel: Box<dyn IsosurfaceKernel>,
    config: IsosurfaceConfig,
    last_report: Option<ExtractionReport>,
}

impl IsosurfaceBuilder {
    pub fn new(kernel: Box<dyn IsosurfaceKernel>, config: IsosurfaceConfig) -> Self {
        Self { kernel, config, last_report: None }
    }

    /// Pick a kernel for `config.backend`
    pub fn from_config(config: IsosurfaceConfig) -> Result<Self> {
        let kernel: Box<dyn IsosurfaceKernel> = match config.backend {
            IsosurfaceBackend::Cpu => Box::new(CpuIsosurfaceKernel::new()),
            IsosurfaceBackend::Gpu => Box::new(GpuIsosurfaceKernel::new_blocking()?),
            IsosurfaceBackend::Auto => match GpuIsosurfaceKernel::new_blocking() {
                Ok(kernel) => Box::new(kernel),
                Err(e) => {
                    log::warn!("GPU isosurface unavailable ({e}), using CPU kernel");
                    Box::new(CpuIsosurfaceKernel::new())
                }
            },
        };
        log::info!("Isosurface kernel: {}", kernel.name());
        Ok(Self::new(kernel, config))
    }

    pub fn config(&self) -> &IsosurfaceConfig {
        &self.config
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    pub fn last_report(&self) -> Option<ExtractionReport> {
        self.last_report
    }

    /// Submit and synchronize one extraction
    pub fn rebuild(&mut self, chunk: &VoxelChunk) -> Result<ExtractionReport> {
        let params = IsoParams::new(chunk.dims(), &self.config);
        self.kernel.submit(chunk, &params)?;
        let report = self.kernel.synchronize()?;
        if report.is_truncated() {
            log::warn!(
                "Isosurface truncated: {} of {} triangles kept",
                report.triangles_written,
                report.triangles_requested
            );
        } else {
            log::debug!(
                "Isosurface: {} triangles ({:.1}% of budget)",
                report.triangles_written,
                report.utilization() * 100.0
            );
        }
        self.last_report = Some(report);
        Ok(report)
    }

    /// Host copy of the last rebuild
    pub fn read_back(&mut self) -> Result<IsoMesh> {
        self.kernel.read_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_truncation() {
        let report = ExtractionReport::new(150, 100);
        assert!(report.is_truncated());
        assert_eq!(report.triangles_written, 100);
        assert_eq!(report.vertex_count(), 300);
        assert!((report.utilization() - 1.5).abs() < 1e-6);

        let fits = ExtractionReport::new(100, 100);
        assert!(!fits.is_truncated());
    }

    #[test]
    fn test_params_bounds() {
        let config = IsosurfaceConfig { grid_scale: 0.5, ..Default::default() };
        let params = IsoParams::new(UVec3::new(10, 4, 6), &config);
        let bounds = params.bounds();
        assert_eq!(bounds.size(), Vec3::new(5.0, 2.0, 3.0));
        assert_eq!(bounds.min, Vec3::splat(-0.25));
        assert_eq!(params.cell_counts(), UVec3::new(11, 5, 7));
    }

    #[test]
    fn test_vertex_is_six_floats() {
        assert_eq!(std::mem::size_of::<IsoVertex>(), 24);
    }

    #[test]
    fn test_builder_with_cpu_kernel() {
        let config = IsosurfaceConfig { backend: IsosurfaceBackend::Cpu, ..Default::default() };
        let mut builder = IsosurfaceBuilder::from_config(config).unwrap();
        assert_eq!(builder.kernel_name(), "cpu");
        let chunk = VoxelChunk::filled(UVec3::splat(4)).unwrap();
        let report = builder.rebuild(&chunk).unwrap();
        assert!(report.triangles_written > 0);
        assert_eq!(builder.last_report(), Some(report));
        let mesh = builder.read_back().unwrap();
        assert_eq!(mesh.triangle_count() as u32, report.triangles_written);
    }
}
