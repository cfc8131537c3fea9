//! Shared GPU context for wgpu resources.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;
use winit::window::Window;

/// Optional device features the shader backend can make use of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    /// `ClampToBorder` addressing is available.
    pub clamp_to_border: bool,
    /// 32-bit float textures can be sampled with linear filtering.
    pub float32_filterable: bool,
}

impl DeviceCaps {
    fn from_features(features: wgpu::Features) -> Self {
        Self {
            clamp_to_border: features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER),
            float32_filterable: features.contains(wgpu::Features::FLOAT32_FILTERABLE),
        }
    }
}

/// Device and queue shared by the shader backend and the outputs.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub caps: DeviceCaps,
}

impl GpuContext {
    /// Initializes for offscreen rendering.
    pub fn headless() -> Result<Self> {
        let instance = Self::create_instance();
        Self::init(instance, None)
    }

    /// Initializes a context able to present to `window` and returns the
    /// window's surface along with it.
    pub fn with_window(window: &Arc<Window>) -> Result<(Self, wgpu::Surface<'static>)> {
        let instance = Self::create_instance();
        let surface = instance.create_surface(window.clone())?;
        let context = Self::init(instance, Some(&surface))?;
        Ok((context, surface))
    }

    fn create_instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    fn init(instance: wgpu::Instance, surface: Option<&wgpu::Surface<'static>>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .map_err(|_| anyhow!("Failed to obtain GPU adapter"))?;

        let wanted = wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER | wgpu::Features::FLOAT32_FILTERABLE;
        let features = adapter.features() & wanted;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Retroshade Device"),
            required_features: features,
            required_limits: if surface.is_some() {
                wgpu::Limits::default()
            } else {
                wgpu::Limits::downlevel_defaults()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))?;

        let caps = DeviceCaps::from_features(features);
        let adapter_info = adapter.get_info();
        info!(
            "GPU: {} ({:?}), clamp-to-border: {}, float32 filterable: {}",
            adapter_info.name, adapter_info.backend, caps.clamp_to_border, caps.float32_filterable
        );

        Ok(Self {
            device,
            queue,
            instance,
            adapter,
            caps,
        })
    }

    /// Graphics API in use, e.g. "Vulkan".
    pub fn api_name(&self) -> String {
        format!("{:?}", self.adapter.get_info().backend)
    }
}
