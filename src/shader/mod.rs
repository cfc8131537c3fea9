//! Multi-pass video shader pipeline.
//!
//! [`ShaderPreset`] drives a chain of [`Shader`] passes created by a
//! [`ShaderBackend`]. The preset description comes from a
//! [`ShaderPresetFactory`], which dispatches on file extension to loaders
//! supplied by add-ons.

mod factory;
mod geometry;
mod preset;
mod types;
pub mod utils;
pub mod wgpu_backend;

#[cfg(test)]
pub(crate) mod mock;

pub use factory::{PresetError, PresetLoader, ShaderPresetFactory};
pub use geometry::{InputUniforms, PassGeometry, QUAD_INDICES};
pub use preset::{BuildError, PassOutput, PresetState, ShaderPreset};
pub use types::{
    DestQuad, FboScale, FboScaleAxis, FilterType, Float2, FramebufferFormat, Rect, ScaleType,
    ShaderLutDesc, ShaderParameter, ShaderParameterMap, ShaderPass, WrapType,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while creating or running shader passes.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("can't load a shader with an empty path")]
    EmptyPath,
    #[error("failed to compile shader {path:?}: {message}")]
    Compile { path: PathBuf, message: String },
    #[error("couldn't open LUT image {path:?}: {source}")]
    LutImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("couldn't create a {width}x{height} render target: {message}")]
    TextureAllocation { width: u32, height: u32, message: String },
    #[error("pass {0} has no render target")]
    MissingRenderTarget(usize),
    #[error("render failed: {0}")]
    Render(String),
}

/// A texture a pass can read from or render into.
pub trait ShaderTexture {
    /// Width in texels.
    fn width(&self) -> f32;

    /// Height in texels.
    fn height(&self) -> f32;

    fn size(&self) -> Float2 {
        Float2::new(self.width(), self.height())
    }
}

/// A loaded lookup texture.
pub trait ShaderLut {
    /// Name the shader samples the LUT by.
    fn id(&self) -> &str;

    fn path(&self) -> &Path;
}

/// Everything a backend needs to build one pass.
pub struct ShaderDesc<'a, L> {
    /// Combined vertex and fragment source.
    pub source: &'a str,
    pub path: &'a Path,
    /// Parameters declared by this pass only.
    pub parameters: ShaderParameterMap,
    /// Sampling policy applied when this pass reads its input.
    pub filter: FilterType,
    pub wrap: WrapType,
    pub mipmap_input: bool,
    /// LUTs that loaded successfully. May be fewer than declared.
    pub luts: Vec<L>,
    pub viewport_size: Float2,
    pub frame_count_mod: u32,
}

/// One compiled shader pass.
pub trait Shader<B: ShaderBackend + ?Sized> {
    /// Allocates the per-pass uniform storage.
    fn create_input_buffer(&mut self, backend: &mut B) -> Result<(), ShaderError>;

    /// Sets the size of the texture this pass reads and the size it renders.
    fn set_sizes(&mut self, prev_size: Float2, next_size: Float2);

    /// Lays out the quad and per-frame inputs.
    fn prepare_parameters(&mut self, dest: &DestQuad, is_last_pass: bool, frame_count: u64);

    /// Recomputes the projection matrix from the output size.
    fn update_mvp(&mut self);

    /// Draws `source` through this pass.
    ///
    /// Output goes to the render target bound on the backend, or to
    /// `target` when none is bound.
    fn render(&mut self, backend: &mut B, source: &B::Texture, target: &B::Texture) -> Result<(), ShaderError>;
}

/// Capability contract a graphics API implements to host the pipeline.
pub trait ShaderBackend {
    type Texture: ShaderTexture;
    type Lut: ShaderLut;
    type Pass: Shader<Self>;

    /// Short name for logs, e.g. "Vulkan".
    fn name(&self) -> &str;

    fn viewport(&self) -> Rect;

    fn set_viewport(&mut self, viewport: Rect);

    fn set_scissors(&mut self, scissors: Rect);

    fn create_shader(&mut self, desc: ShaderDesc<'_, Self::Lut>) -> Result<Self::Pass, ShaderError>;

    fn create_lut(&mut self, lut: &ShaderLutDesc) -> Result<Self::Lut, ShaderError>;

    /// Allocates an intermediate render target with nearest filtering and
    /// border clamping.
    fn create_render_target(&mut self, size: Float2, format: FramebufferFormat) -> Result<Self::Texture, ShaderError>;

    /// Redirects rendering into `texture` until [`unbind_render_target`](Self::unbind_render_target).
    fn bind_render_target(&mut self, texture: &Self::Texture);

    fn unbind_render_target(&mut self);
}
