//! Native YAML presets.
//!
//! ```yaml
//! passes:
//!   - shader: shaders/crt.glsl
//!     filter: linear
//!     fbo:
//!       scale_x: { type: viewport, scale: 1.0 }
//!       scale_y: { type: viewport, scale: 1.0 }
//! luts:
//!   - id: mask
//!     path: mask.png
//!     wrap: repeat
//! parameters:
//!   SCANLINE: 0.8
//! ```

use super::{pass_parameters, read_shader_source, resolve_path};
use crate::shader::{
    FboScale, FboScaleAxis, FilterType, PresetError, PresetLoader, ShaderLutDesc, ShaderPass, WrapType,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct YamlPreset {
    passes: Vec<YamlPass>,
    #[serde(default)]
    luts: Vec<YamlLut>,
    #[serde(default)]
    parameters: HashMap<String, f32>,
}

#[derive(Debug, Deserialize)]
struct YamlPass {
    shader: PathBuf,
    #[serde(default)]
    filter: FilterType,
    #[serde(default)]
    wrap: WrapType,
    #[serde(default)]
    frame_count_mod: u32,
    #[serde(default)]
    mipmap_input: bool,
    #[serde(default)]
    fbo: YamlFbo,
}

/// Framebuffer policy of a pass. Without any axis the pass has no scale of
/// its own; an axis left out next to a given one scales by the input.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YamlFbo {
    srgb_framebuffer: bool,
    float_framebuffer: bool,
    scale_x: Option<FboScaleAxis>,
    scale_y: Option<FboScaleAxis>,
}

impl From<YamlFbo> for FboScale {
    fn from(fbo: YamlFbo) -> Self {
        let (scale_x, scale_y) = match (fbo.scale_x, fbo.scale_y) {
            (None, None) => (FboScaleAxis::unspecified(), FboScaleAxis::unspecified()),
            (x, y) => (x.unwrap_or_default(), y.unwrap_or_default()),
        };
        FboScale {
            srgb_framebuffer: fbo.srgb_framebuffer,
            float_framebuffer: fbo.float_framebuffer,
            scale_x,
            scale_y,
        }
    }
}

#[derive(Debug, Deserialize)]
struct YamlLut {
    id: String,
    path: PathBuf,
    #[serde(default)]
    filter: FilterType,
    #[serde(default)]
    wrap: WrapType,
    #[serde(default)]
    mipmap: bool,
}

/// Loads `.yaml` / `.yml` presets.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlPresetLoader;

impl PresetLoader for YamlPresetLoader {
    fn load_preset(&self, path: &Path) -> Result<Vec<ShaderPass>, PresetError> {
        let text = read_shader_source(path)?;
        let preset: YamlPreset = serde_yaml::from_str(&text).map_err(|source| PresetError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if preset.passes.is_empty() {
            return Err(PresetError::NoPasses(path.to_path_buf()));
        }

        let luts: Vec<ShaderLutDesc> = preset
            .luts
            .into_iter()
            .map(|lut| ShaderLutDesc {
                path: resolve_path(path, &lut.path),
                id: lut.id,
                filter: lut.filter,
                wrap: lut.wrap,
                mipmap: lut.mipmap,
            })
            .collect();

        let mut passes = Vec::with_capacity(preset.passes.len());
        for pass in preset.passes {
            let source_path = resolve_path(path, &pass.shader);
            let source = read_shader_source(&source_path)?;
            let parameters = pass_parameters(&source, &preset.parameters);
            debug!("Preset pass {:?} ({} parameter(s))", source_path, parameters.len());

            passes.push(ShaderPass {
                source_path,
                source,
                filter: pass.filter,
                wrap: pass.wrap,
                frame_count_mod: pass.frame_count_mod,
                fbo: pass.fbo.into(),
                mipmap: pass.mipmap_input,
                luts: luts.clone(),
                parameters,
            });
        }
        Ok(passes)
    }
}
