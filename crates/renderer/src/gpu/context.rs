use crate::surface::SurfaceError;
use crate::types::GpuPowerPreference;

/// Instance, adapter and device for offscreen rendering. No presentation
/// surface is created; every frame is read back to the CPU.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub max_texture_dimension: u32,
}

impl GpuContext {
    pub(crate) fn headless(gpu_power: GpuPowerPreference) -> Result<Self, SurfaceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match gpu_power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| SurfaceError::Device(format!("failed to find a GPU adapter: {err}")))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            max_texture_dimension = limits.max_texture_dimension_2d,
            max_uniform_buffer_binding_size = limits.max_uniform_buffer_binding_size,
            "selected GPU adapter"
        );
        if adapter_info.device_type == wgpu::DeviceType::Cpu {
            tracing::warn!(
                name = %adapter_info.name,
                "software rasterizer detected; large blur radii will be slow"
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("tileblur device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| SurfaceError::Device(format!("failed to create GPU device: {err}")))?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            max_texture_dimension: limits.max_texture_dimension_2d,
        })
    }

    pub(crate) fn check_dimensions(&self, width: u32, height: u32) -> Result<(), SurfaceError> {
        let limit = self.max_texture_dimension;
        if width == 0 || height == 0 || width > limit || height > limit {
            return Err(SurfaceError::TextureTooLarge {
                width,
                height,
                limit,
            });
        }
        Ok(())
    }
}
