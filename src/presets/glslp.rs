//! libretro `.glslp` preset parsing.

use super::{pass_parameters, read_shader_source, resolve_path};
use crate::shader::{
    FboScale, FboScaleAxis, FilterType, PresetError, PresetLoader, ScaleType, ShaderLutDesc, ShaderPass,
    WrapType,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Loads libretro common-shader presets.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlslpLoader;

impl PresetLoader for GlslpLoader {
    fn load_preset(&self, path: &Path) -> Result<Vec<ShaderPass>, PresetError> {
        let text = read_shader_source(path)?;
        let preset = GlslpFile::parse(path, &text)?;
        preset.passes()
    }
}

/// `key = value` pairs of a preset file.
struct GlslpFile<'a> {
    path: &'a Path,
    values: HashMap<String, String>,
}

impl<'a> GlslpFile<'a> {
    fn parse(path: &'a Path, text: &str) -> Result<Self, PresetError> {
        let mut values = HashMap::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| PresetError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!("expected `key = value`, got {:?}", line),
            })?;
            let value = value.trim().trim_matches('"').to_string();
            values.insert(key.trim().to_string(), value);
        }
        Ok(Self { path, values })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, PresetError> {
        self.get(key).ok_or_else(|| PresetError::MissingKey {
            path: self.path.to_path_buf(),
            key: key.to_string(),
        })
    }

    fn invalid(&self, key: &str, value: &str) -> PresetError {
        PresetError::InvalidValue {
            path: self.path.to_path_buf(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, PresetError> {
        match self.get(key) {
            Some(value) => value.parse().map(Some).map_err(|_| self.invalid(key, value)),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str) -> Result<bool, PresetError> {
        match self.get(key) {
            None => Ok(false),
            Some("true") | Some("1") => Ok(true),
            Some("false") | Some("0") => Ok(false),
            Some(value) => Err(self.invalid(key, value)),
        }
    }

    fn wrap(&self, key: &str) -> Result<WrapType, PresetError> {
        match self.get(key) {
            None | Some("clamp_to_border") => Ok(WrapType::Border),
            Some("clamp_to_edge") => Ok(WrapType::Edge),
            Some("repeat") => Ok(WrapType::Repeat),
            Some("mirrored_repeat") => Ok(WrapType::MirroredRepeat),
            Some(value) => Err(self.invalid(key, value)),
        }
    }

    fn scale_type(&self, key: &str) -> Result<Option<ScaleType>, PresetError> {
        match self.get(key) {
            None => Ok(None),
            Some("source") => Ok(Some(ScaleType::Input)),
            Some("absolute") => Ok(Some(ScaleType::Absolute)),
            Some("viewport") => Ok(Some(ScaleType::Viewport)),
            Some(value) => Err(self.invalid(key, value)),
        }
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn passes(&self) -> Result<Vec<ShaderPass>, PresetError> {
        let count: usize = self
            .parsed("shaders")?
            .ok_or_else(|| PresetError::MissingKey {
                path: self.path.to_path_buf(),
                key: "shaders".to_string(),
            })?;
        if count == 0 {
            return Err(PresetError::NoPasses(self.path.to_path_buf()));
        }

        let luts = self.luts()?;
        let overrides = self.parameter_overrides()?;

        let mut passes = Vec::with_capacity(count);
        for i in 0..count {
            let source_path = resolve_path(self.path, Path::new(self.require(&format!("shader{}", i))?));
            let source = read_shader_source(&source_path)?;
            let parameters = pass_parameters(&source, &overrides);

            let filter = match self.parsed_flag_opt(&format!("filter_linear{}", i))? {
                Some(true) => FilterType::Linear,
                Some(false) => FilterType::Nearest,
                None => FilterType::None,
            };

            debug!("Preset pass {}: {:?} ({} parameter(s))", i, source_path, parameters.len());
            passes.push(ShaderPass {
                source_path,
                source,
                filter,
                wrap: self.wrap(&format!("wrap_mode{}", i))?,
                frame_count_mod: self.parsed(&format!("frame_count_mod{}", i))?.unwrap_or(0),
                fbo: self.fbo(i)?,
                mipmap: self.flag(&format!("mipmap_input{}", i))?,
                luts: luts.clone(),
                parameters,
            });
        }
        Ok(passes)
    }

    fn parsed_flag_opt(&self, key: &str) -> Result<Option<bool>, PresetError> {
        if self.get(key).is_none() {
            return Ok(None);
        }
        self.flag(key).map(Some)
    }

    fn fbo(&self, i: usize) -> Result<FboScale, PresetError> {
        let both = self.scale_type(&format!("scale_type{}", i))?;
        let kind_x = self.scale_type(&format!("scale_type_x{}", i))?.or(both);
        let kind_y = self.scale_type(&format!("scale_type_y{}", i))?.or(both);

        let mut fbo = FboScale {
            srgb_framebuffer: self.flag(&format!("srgb_framebuffer{}", i))?,
            float_framebuffer: self.flag(&format!("float_framebuffer{}", i))?,
            scale_x: FboScaleAxis::unspecified(),
            scale_y: FboScaleAxis::unspecified(),
        };

        if kind_x.is_none() && kind_y.is_none() {
            return Ok(fbo);
        }

        fbo.scale_x = self.axis(kind_x.unwrap_or_default(), &format!("scale_x{}", i), &format!("scale{}", i))?;
        fbo.scale_y = self.axis(kind_y.unwrap_or_default(), &format!("scale_y{}", i), &format!("scale{}", i))?;
        Ok(fbo)
    }

    fn axis(&self, kind: ScaleType, axis_key: &str, both_key: &str) -> Result<FboScaleAxis, PresetError> {
        let key = if self.get(axis_key).is_some() { axis_key } else { both_key };
        let mut axis = FboScaleAxis { kind, ..Default::default() };
        match kind {
            ScaleType::Absolute => {
                if let Some(abs) = self.parsed::<u32>(key)? {
                    axis.abs = abs;
                }
            }
            ScaleType::Input | ScaleType::Viewport => {
                if let Some(scale) = self.parsed::<f32>(key)? {
                    axis.scale = scale;
                }
            }
        }
        Ok(axis)
    }

    fn luts(&self) -> Result<Vec<ShaderLutDesc>, PresetError> {
        let mut luts = Vec::new();
        for id in self.list("textures") {
            let path = resolve_path(self.path, Path::new(self.require(&id)?));
            let filter = match self.parsed_flag_opt(&format!("{}_linear", id))? {
                Some(true) => FilterType::Linear,
                Some(false) => FilterType::Nearest,
                None => FilterType::None,
            };
            luts.push(ShaderLutDesc {
                wrap: self.wrap(&format!("{}_wrap_mode", id))?,
                mipmap: self.flag(&format!("{}_mipmap", id))?,
                filter,
                path,
                id,
            });
        }
        Ok(luts)
    }

    fn parameter_overrides(&self) -> Result<HashMap<String, f32>, PresetError> {
        let mut overrides = HashMap::new();
        for name in self.list("parameters") {
            if let Some(value) = self.parsed::<f32>(&name)? {
                overrides.insert(name, value);
            }
        }
        Ok(overrides)
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}
