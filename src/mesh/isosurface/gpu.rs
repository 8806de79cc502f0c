//! wgpu compute kernel for isosurface extraction
//!
//! One invocation per marching cell appends triangles through an atomic
//! counter, then a second pass zeroes everything past the produced count.
//! The counter is copied to a staging buffer in the same submission so
//! `synchronize` only has to map four bytes.

use bytemuck::{Pod, Zeroable};

use super::tables;
use super::{ExtractionReport, IsoMesh, IsoParams, IsoVertex, IsosurfaceKernel};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::render::GpuContext;
use crate::voxel::chunk::VoxelChunk;

const SHADER_SOURCE: &str = include_str!("../../../shaders/isosurface.wgsl");

/// Matches `Params` in isosurface.wgsl
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuIsoParams {
    dims: [u32; 3],
    max_triangles: u32,
    scale: f32,
    isovalue: f32,
    _pad: [u32; 2],
}

const WORKGROUP_SIZE: u32 = 4;
const CLEAR_WORKGROUPS: u32 = 16;
const FLOATS_PER_VERTEX: u64 = 6;
const TRIANGLE_BYTES: u64 = 3 * FLOATS_PER_VERTEX * 4;
const INDEX_BYTES_PER_TRIANGLE: u64 = 3 * 4;

/// Storage buffers sized for a triangle capacity
struct OutputBuffers {
    capacity: u32,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

pub struct GpuIsosurfaceKernel {
    gpu: GpuContext,
    extract_pipeline: wgpu::ComputePipeline,
    clear_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    tri_table_buffer: wgpu::Buffer,
    counter_buffer: wgpu::Buffer,
    counter_staging: wgpu::Buffer,
    voxel_buffer: Option<wgpu::Buffer>,
    output: Option<OutputBuffers>,
    bind_group: Option<wgpu::BindGroup>,
    /// Submitted but not yet synchronized
    in_flight: Option<IsoParams>,
    last: Option<(ExtractionReport, IsoParams)>,
}

impl GpuIsosurfaceKernel {
    pub fn new(gpu: GpuContext) -> Self {
        let device = &gpu.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("isosurface_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("isosurface_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1, true),
                storage(2, true),
                storage(3, false),
                storage(4, false),
                storage(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("isosurface_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = |entry: &str, label: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let extract_pipeline = pipeline("extract", "isosurface_extract");
        let clear_pipeline = pipeline("clear_tail", "isosurface_clear_tail");

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isosurface_params"),
            size: std::mem::size_of::<GpuIsoParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let tri_words = tables::tri_table_words();
        let tri_table_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isosurface_tri_table"),
            size: (tri_words.len() * std::mem::size_of::<i32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        gpu.queue.write_buffer(&tri_table_buffer, 0, bytemuck::cast_slice(&tri_words));

        let counter_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isosurface_counter"),
            size: std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let counter_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isosurface_counter_staging"),
            size: std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            gpu,
            extract_pipeline,
            clear_pipeline,
            bind_group_layout,
            params_buffer,
            tri_table_buffer,
            counter_buffer,
            counter_staging,
            voxel_buffer: None,
            output: None,
            bind_group: None,
            in_flight: None,
            last: None,
        }
    }

    /// Create a context and kernel, failing if no adapter is available
    pub fn new_blocking() -> Result<Self> {
        Ok(Self::new(GpuContext::new_blocking()?))
    }

    pub fn context(&self) -> &GpuContext {
        &self.gpu
    }

    /// Largest budget the output buffers can hold on this device
    pub fn max_triangles(&self) -> u32 {
        (self.gpu.max_storage_binding() / TRIANGLE_BYTES).min(u32::MAX as u64) as u32
    }

    /// Grow the voxel and output buffers as needed; drops the bind group when any is replaced
    fn ensure_buffers(&mut self, voxel_bytes: u64, capacity: u32) {
        let device = &self.gpu.device;

        if self.voxel_buffer.as_ref().map_or(true, |b| b.size() != voxel_bytes) {
            self.voxel_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("isosurface_voxels"),
                size: voxel_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.bind_group = None;
        }

        // Output keeps its high-water size; clear_tail zeroes whatever is unused
        if self.output.as_ref().map_or(true, |o| o.capacity < capacity) {
            let capacity = capacity.max(1);
            log::debug!("Isosurface output buffers: {} triangles", capacity);
            self.output = Some(OutputBuffers {
                capacity,
                vertices: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("isosurface_vertices"),
                    size: capacity as u64 * TRIANGLE_BYTES,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
                indices: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("isosurface_indices"),
                    size: capacity as u64 * INDEX_BYTES_PER_TRIANGLE,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
            });
            self.bind_group = None;
        }
    }

    fn bind_group(&mut self) -> Result<&wgpu::BindGroup> {
        if self.bind_group.is_none() {
            let (Some(voxels), Some(output)) = (&self.voxel_buffer, &self.output) else {
                return Err(Error::Gpu("isosurface buffers not allocated".into()));
            };
            self.bind_group = Some(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("isosurface_bind_group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: self.params_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: voxels.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: self.tri_table_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: output.vertices.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: output.indices.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: self.counter_buffer.as_entire_binding() },
                ],
            }));
        }
        self.bind_group
            .as_ref()
            .ok_or_else(|| Error::Gpu("isosurface bind group missing".into()))
    }

    /// Map a staging buffer and copy `len` bytes out
    fn read_staging(&self, staging: &wgpu::Buffer, len: u64) -> Result<Vec<u8>> {
        let slice = staging.slice(..len);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.gpu.device.poll(wgpu::PollType::Wait { submission_index: None, timeout: None });

        rx.recv()
            .map_err(|e| Error::Gpu(format!("readback channel closed: {e}")))?
            .map_err(|e| Error::Gpu(format!("buffer map failed: {e:?}")))?;
        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }
}

impl IsosurfaceKernel for GpuIsosurfaceKernel {
    fn submit(&mut self, chunk: &VoxelChunk, params: &IsoParams) -> Result<()> {
        let limit = self.max_triangles();
        let mut params = *params;
        if params.max_triangles > limit {
            log::warn!(
                "Triangle budget {} exceeds device storage limit, clamping to {}",
                params.max_triangles,
                limit
            );
            params.max_triangles = limit;
        }

        let words = chunk.as_words();
        self.ensure_buffers(std::mem::size_of_val(words) as u64, params.max_triangles);

        let gpu_params = GpuIsoParams {
            dims: params.dims.to_array(),
            max_triangles: params.max_triangles,
            scale: params.grid_scale,
            isovalue: params.isovalue,
            _pad: [0; 2],
        };
        self.gpu.queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&gpu_params));
        if let Some(voxels) = &self.voxel_buffer {
            self.gpu.queue.write_buffer(voxels, 0, bytemuck::cast_slice(words));
        }

        let bind_group = self.bind_group()?.clone();
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("isosurface_encoder"),
        });
        encoder.clear_buffer(&self.counter_buffer, 0, None);

        let cells = params.cell_counts();
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("isosurface_extract"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.extract_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                cells.x.div_ceil(WORKGROUP_SIZE),
                cells.y.div_ceil(WORKGROUP_SIZE),
                cells.z.div_ceil(WORKGROUP_SIZE),
            );
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("isosurface_clear_tail"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.clear_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(CLEAR_WORKGROUPS, 1, 1);
        }

        encoder.copy_buffer_to_buffer(
            &self.counter_buffer,
            0,
            &self.counter_staging,
            0,
            std::mem::size_of::<u32>() as u64,
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.in_flight = Some(params);
        Ok(())
    }

    fn synchronize(&mut self) -> Result<ExtractionReport> {
        let Some(params) = self.in_flight.take() else {
            return Ok(self.last.map(|(report, _)| report).unwrap_or_default());
        };
        let data = self.read_staging(&self.counter_staging, std::mem::size_of::<u32>() as u64)?;
        let requested: u32 = bytemuck::pod_read_unaligned(&data[..4]);
        let report = ExtractionReport::new(requested, params.max_triangles);
        self.last = Some((report, params));
        Ok(report)
    }

    fn read_back(&mut self) -> Result<IsoMesh> {
        if self.in_flight.is_some() {
            self.synchronize()?;
        }
        let Some((report, params)) = self.last else {
            return Ok(IsoMesh::default());
        };
        let Some(output) = &self.output else {
            return Ok(IsoMesh::default());
        };
        let triangles = report.triangles_written as u64;
        if triangles == 0 {
            return Ok(IsoMesh { bounds: params.bounds(), report, ..Default::default() });
        }

        let vertex_bytes = triangles * TRIANGLE_BYTES;
        let index_bytes = triangles * INDEX_BYTES_PER_TRIANGLE;
        let device = &self.gpu.device;
        let vertex_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isosurface_vertex_staging"),
            size: vertex_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("isosurface_index_staging"),
            size: index_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("isosurface_readback"),
        });
        encoder.copy_buffer_to_buffer(&output.vertices, 0, &vertex_staging, 0, vertex_bytes);
        encoder.copy_buffer_to_buffer(&output.indices, 0, &index_staging, 0, index_bytes);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let vertex_data = self.read_staging(&vertex_staging, vertex_bytes)?;
        let index_data = self.read_staging(&index_staging, index_bytes)?;

        Ok(IsoMesh {
            vertices: bytemuck::pod_collect_to_vec::<u8, IsoVertex>(&vertex_data),
            indices: bytemuck::pod_collect_to_vec::<u8, u32>(&index_data),
            bounds: params.bounds(),
            report,
        })
    }

    fn name(&self) -> &'static str {
        "gpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::isosurface::{CpuIsosurfaceKernel, IsosurfaceConfig};
    use crate::voxel::cell::CellFlags;
    use glam::UVec3;

    #[test]
    fn test_shader_validates() {
        let module = naga::front::wgsl::parse_str(SHADER_SOURCE).expect("WGSL parse failed");
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .expect("WGSL validation failed");
        for entry in ["extract", "clear_tail"] {
            assert!(module.entry_points.iter().any(|e| e.name == entry), "missing entry point {entry}");
        }
    }

    #[test]
    fn test_params_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<GpuIsoParams>(), 32);
    }

    fn gpu_kernel() -> Option<GpuIsosurfaceKernel> {
        match GpuIsosurfaceKernel::new_blocking() {
            Ok(kernel) => Some(kernel),
            Err(e) => {
                eprintln!("Skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn test_gpu_matches_cpu_triangle_count() {
        let Some(mut gpu) = gpu_kernel() else { return };
        let mut chunk = VoxelChunk::filled(UVec3::new(6, 5, 7)).unwrap();
        chunk.remove_flag(2, 2, 2, CellFlags::FILLED);
        chunk.remove_flag(0, 4, 6, CellFlags::FILLED);
        let params = IsoParams::new(chunk.dims(), &IsosurfaceConfig::default());

        let mut cpu = CpuIsosurfaceKernel::new();
        cpu.submit(&chunk, &params).unwrap();
        let expected = cpu.synchronize().unwrap();

        gpu.submit(&chunk, &params).unwrap();
        let report = gpu.synchronize().unwrap();
        assert_eq!(report.triangles_requested, expected.triangles_requested);

        let mesh = gpu.read_back().unwrap();
        assert_eq!(mesh.vertices.len(), report.vertex_count());
        for v in &mesh.vertices {
            assert!(mesh.bounds.contains_point(glam::Vec3::from_array(v.position)));
        }
    }

    #[test]
    fn test_gpu_truncates_at_budget() {
        let Some(mut gpu) = gpu_kernel() else { return };
        let chunk = VoxelChunk::filled(UVec3::splat(6)).unwrap();
        let config = IsosurfaceConfig { triangle_budget: 16, ..Default::default() };
        gpu.submit(&chunk, &IsoParams::new(chunk.dims(), &config)).unwrap();
        let report = gpu.synchronize().unwrap();
        assert!(report.is_truncated());
        assert_eq!(report.triangles_written, 16);
        assert_eq!(gpu.read_back().unwrap().triangle_count(), 16);
    }
}
