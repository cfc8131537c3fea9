//! Preset loaders bundled with the crate.

mod glslp;
mod yaml;

pub use glslp::GlslpLoader;
pub use yaml::YamlPresetLoader;

use crate::shader::utils::parse_parameter_pragmas;
use crate::shader::{PresetError, ShaderParameter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolves `relative` against the directory holding the preset.
pub(crate) fn resolve_path(preset_path: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        return relative.to_path_buf();
    }
    preset_path
        .parent()
        .map(|dir| dir.join(relative))
        .unwrap_or_else(|| relative.to_path_buf())
}

pub(crate) fn read_shader_source(path: &Path) -> Result<String, PresetError> {
    std::fs::read_to_string(path).map_err(|source| PresetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parameters declared by `source`, with preset overrides applied.
pub(crate) fn pass_parameters(source: &str, overrides: &HashMap<String, f32>) -> Vec<ShaderParameter> {
    let mut parameters = parse_parameter_pragmas(source);
    for parameter in &mut parameters {
        if let Some(value) = overrides.get(&parameter.id) {
            parameter.current = *value;
        }
    }
    parameters
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{PresetLoader, WrapType};

    #[test]
    fn test_resolve_path_is_relative_to_preset() {
        let resolved = resolve_path(Path::new("/presets/crt/royale.glslp"), Path::new("shaders/pass0.glsl"));
        assert_eq!(resolved, PathBuf::from("/presets/crt/shaders/pass0.glsl"));

        let absolute = resolve_path(Path::new("/presets/a.glslp"), Path::new("/opt/b.glsl"));
        assert_eq!(absolute, PathBuf::from("/opt/b.glsl"));
    }

    #[test]
    fn test_overrides_replace_current() {
        let source = "#pragma parameter GAMMA \"Gamma\" 2.2 1.0 3.0 0.1\n";
        let mut overrides = HashMap::new();
        overrides.insert("GAMMA".to_string(), 2.6);
        let parameters = pass_parameters(source, &overrides);
        assert_eq!(parameters[0].current, 2.6);
        assert_eq!(parameters[0].initial, 2.2);
    }

    #[test]
    fn test_bundled_presets_describe_the_same_chain() {
        let presets = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/presets");
        let glslp = GlslpLoader.load_preset(&presets.join("crt-simple.glslp")).unwrap();
        let yaml = YamlPresetLoader.load_preset(&presets.join("crt-simple.yaml")).unwrap();
        assert_eq!(glslp.len(), 2);
        assert_eq!(yaml.len(), 2);

        for (a, b) in glslp.iter().zip(&yaml) {
            assert_eq!(a.source_path, b.source_path);
            assert_eq!(a.filter, b.filter);
            assert_eq!(a.fbo, b.fbo);
            assert_eq!(a.luts, b.luts);
            assert_eq!(a.parameters, b.parameters);
        }

        let scanlines = &glslp[1];
        assert_eq!(scanlines.wrap, WrapType::Edge);
        assert_eq!(scanlines.parameters.len(), 3);
        assert_eq!(scanlines.parameters[0].id, "SCANLINE_STRENGTH");
        assert_eq!(scanlines.parameters[0].current, 0.5);
        assert_eq!(scanlines.parameters[2].current, scanlines.parameters[2].initial);
        assert!(scanlines.luts[0].path.exists());
    }
}
