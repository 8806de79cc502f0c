//! Headless GPU context for compute work

use crate::core::error::Error;

/// Device and queue without a surface
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a compute-only context
    pub async fn new() -> Result<Self, Error> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("chisel_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                    max_buffer_size: adapter_limits.max_buffer_size,
                    ..Default::default()
                },
                memory_hints: wgpu::MemoryHints::Performance,
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("GPU: {} ({:?})", info.name, info.backend);
        log::info!("GPU buffer limits: max_buffer_size={}MB, max_storage_binding={}MB",
            adapter_limits.max_buffer_size / 1024 / 1024,
            adapter_limits.max_storage_buffer_binding_size / 1024 / 1024);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Blocking variant of [`GpuContext::new`]
    pub fn new_blocking() -> Result<Self, Error> {
        pollster::block_on(Self::new())
    }

    /// Largest storage buffer binding the device accepts
    pub fn max_storage_binding(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }
}
