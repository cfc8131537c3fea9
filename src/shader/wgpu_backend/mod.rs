//! wgpu implementation of the shader backend.
//!
//! Pass sources are GLSL 450 and are translated to WGSL with naga. A pass
//! sees this binding layout in group 0:
//!
//! | binding | resource |
//! |---------|----------|
//! | 0 | `texture2D` input of the pass |
//! | 1 | `sampler` for the input |
//! | 2 | `Inputs` uniform block |
//! | 3 | `Parameters` uniform block, when the pass has parameters |
//! | 4.. | LUT textures, each named after its id, with its sampler at the next binding |

mod gpu_context;
mod lut;
mod shader;
mod texture;

pub use gpu_context::{DeviceCaps, GpuContext};
pub use lut::WgpuShaderLut;
pub use shader::WgpuShader;
pub use texture::WgpuShaderTexture;

use super::{
    FilterType, Float2, FramebufferFormat, Rect, ShaderBackend, ShaderDesc, ShaderError, ShaderLutDesc,
    WrapType,
};
use tracing::debug;

/// Shader backend rendering through a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: DeviceCaps,
    api_name: String,
    viewport: Rect,
    scissors: Rect,
    bound: Option<WgpuShaderTexture>,
}

impl WgpuBackend {
    pub fn new(context: &GpuContext, viewport: Rect) -> Self {
        Self {
            device: context.device.clone(),
            queue: context.queue.clone(),
            caps: context.caps,
            api_name: context.api_name(),
            viewport,
            scissors: viewport,
            bound: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    pub fn scissors(&self) -> Rect {
        self.scissors
    }

    /// Target bound with [`ShaderBackend::bind_render_target`], if any.
    pub fn bound_target(&self) -> Option<&WgpuShaderTexture> {
        self.bound.as_ref()
    }
}

impl ShaderBackend for WgpuBackend {
    type Texture = WgpuShaderTexture;
    type Lut = WgpuShaderLut;
    type Pass = WgpuShader;

    fn name(&self) -> &str {
        &self.api_name
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    fn set_scissors(&mut self, scissors: Rect) {
        self.scissors = scissors;
    }

    fn create_shader(&mut self, desc: ShaderDesc<'_, WgpuShaderLut>) -> Result<WgpuShader, ShaderError> {
        WgpuShader::new(self, desc)
    }

    fn create_lut(&mut self, lut: &ShaderLutDesc) -> Result<WgpuShaderLut, ShaderError> {
        WgpuShaderLut::load(&self.device, &self.queue, self.caps, lut)
    }

    fn create_render_target(&mut self, size: Float2, format: FramebufferFormat) -> Result<WgpuShaderTexture, ShaderError> {
        let width = size.x as u32;
        let height = size.y as u32;
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(ShaderError::TextureAllocation {
                width,
                height,
                message: format!("size must be between 1 and {}", max),
            });
        }

        let texture_format = target_format(format, self.caps);
        debug!("Allocating {}x{} {:?} render target", width, height, texture_format);
        Ok(WgpuShaderTexture::render_target(
            &self.device,
            "Shader Pass Target",
            width,
            height,
            texture_format,
        ))
    }

    fn bind_render_target(&mut self, texture: &WgpuShaderTexture) {
        self.bound = Some(texture.clone());
    }

    fn unbind_render_target(&mut self) {
        self.bound = None;
    }
}

/// Texture format backing a framebuffer format.
pub(crate) fn target_format(format: FramebufferFormat, caps: DeviceCaps) -> wgpu::TextureFormat {
    match format {
        FramebufferFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        FramebufferFormat::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        FramebufferFormat::Float if caps.float32_filterable => wgpu::TextureFormat::Rgba32Float,
        // Half floats are always filterable
        FramebufferFormat::Float => wgpu::TextureFormat::Rgba16Float,
    }
}

pub(crate) fn address_mode(wrap: WrapType, caps: DeviceCaps) -> wgpu::AddressMode {
    match wrap {
        WrapType::Border if caps.clamp_to_border => wgpu::AddressMode::ClampToBorder,
        WrapType::Border | WrapType::Edge => wgpu::AddressMode::ClampToEdge,
        WrapType::Repeat => wgpu::AddressMode::Repeat,
        WrapType::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

pub(crate) fn filter_mode(filter: FilterType) -> wgpu::FilterMode {
    if filter.is_linear() {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    }
}

pub(crate) fn create_sampler(device: &wgpu::Device, caps: DeviceCaps, filter: FilterType, wrap: WrapType) -> wgpu::Sampler {
    let mode = address_mode(wrap, caps);
    let filter = filter_mode(filter);
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Shader Sampler"),
        address_mode_u: mode,
        address_mode_v: mode,
        address_mode_w: mode,
        mag_filter: filter,
        min_filter: filter,
        border_color: (mode == wgpu::AddressMode::ClampToBorder).then_some(wgpu::SamplerBorderColor::TransparentBlack),
        ..Default::default()
    })
}
