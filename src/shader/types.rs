//! Data model shared by preset loaders, the orchestrator and the backends.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parameter values handed to a single shader, keyed by uniform name.
pub type ShaderParameterMap = BTreeMap<String, f32>;

/// Texture filtering requested by a pass or LUT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Not specified by the preset; backends treat it as nearest.
    #[default]
    None,
    Linear,
    Nearest,
}

impl FilterType {
    pub fn is_linear(self) -> bool {
        self == FilterType::Linear
    }
}

/// Texture addressing outside of `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapType {
    #[default]
    Border,
    Edge,
    Repeat,
    MirroredRepeat,
}

/// What a pass's output size is relative to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    /// Relative to the previous pass output (or the video for the first pass).
    #[default]
    Input,
    /// A fixed number of pixels.
    Absolute,
    /// Relative to the viewport.
    Viewport,
}

/// Scale policy for one axis of a pass framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FboScaleAxis {
    #[serde(rename = "type")]
    pub kind: ScaleType,
    /// Multiplier. `0.0` means the preset did not specify one.
    pub scale: f32,
    /// Pixel size used when `kind` is [`ScaleType::Absolute`].
    pub abs: u32,
}

impl Default for FboScaleAxis {
    fn default() -> Self {
        Self {
            kind: ScaleType::Input,
            scale: 1.0,
            abs: 1,
        }
    }
}

impl FboScaleAxis {
    /// An axis for which the preset gave no scale at all.
    pub fn unspecified() -> Self {
        Self {
            scale: 0.0,
            ..Self::default()
        }
    }
}

/// Framebuffer scale and format policy of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FboScale {
    pub srgb_framebuffer: bool,
    pub float_framebuffer: bool,
    pub scale_x: FboScaleAxis,
    pub scale_y: FboScaleAxis,
}

impl FboScale {
    /// Both axes left without a multiplier.
    pub fn is_unspecified(&self) -> bool {
        self.scale_x.scale == 0.0 && self.scale_y.scale == 0.0
    }

    /// Pixel format of the render target. Float takes priority over sRGB.
    pub fn format(&self) -> FramebufferFormat {
        if self.float_framebuffer {
            FramebufferFormat::Float
        } else if self.srgb_framebuffer {
            FramebufferFormat::Srgb
        } else {
            FramebufferFormat::Rgba8
        }
    }
}

/// Storage format of an intermediate render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferFormat {
    /// 8 bits per channel RGBA
    Rgba8,
    /// 8 bits per channel sRGB-encoded RGBA
    Srgb,
    /// 32-bit float RGBA
    Float,
}

/// A lookup texture declared by a preset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderLutDesc {
    pub id: String,
    pub path: PathBuf,
    pub filter: FilterType,
    pub wrap: WrapType,
    pub mipmap: bool,
}

/// A tunable declared with `#pragma parameter` in a shader source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderParameter {
    pub id: String,
    pub description: String,
    /// Effective value after preset overrides. This is what gets rendered.
    pub current: f32,
    pub minimum: f32,
    pub initial: f32,
    pub maximum: f32,
    pub step: f32,
}

/// One stage of a preset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderPass {
    pub source_path: PathBuf,
    /// Vertex and fragment stages share one text, separated by `VERTEX` /
    /// `FRAGMENT` preprocessor guards.
    pub source: String,
    pub filter: FilterType,
    pub wrap: WrapType,
    pub frame_count_mod: u32,
    pub fbo: FboScale,
    pub mipmap: bool,
    pub luts: Vec<ShaderLutDesc>,
    pub parameters: Vec<ShaderParameter>,
}

/// A 2D size or point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Float2 {
    pub x: f32,
    pub y: f32,
}

impl Float2 {
    pub const ZERO: Float2 = Float2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn max_component(&self) -> f32 {
        self.x.max(self.y)
    }

    pub fn min_component(&self) -> f32 {
        self.x.min(self.y)
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl From<(u32, u32)> for Float2 {
    fn from((x, y): (u32, u32)) -> Self {
        Self::new(x as f32, y as f32)
    }
}

/// Viewport or scissor rectangle in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// A rectangle anchored at the origin.
    pub fn from_size(size: Float2) -> Self {
        Self::new(0.0, 0.0, size.x, size.y)
    }

    pub fn size(&self) -> Float2 {
        Float2::new(self.width, self.height)
    }
}

/// Corners of the on-screen destination quad: top-left, top-right,
/// bottom-right, bottom-left.
pub type DestQuad = [Float2; 4];
