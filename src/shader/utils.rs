//! Backend independent helpers for texture sizing and shader sources.

use super::types::{Float2, ShaderParameter, ShaderParameterMap};
use super::ShaderError;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

const DEFINE_VERTEX: &str = "#define VERTEX\n";
const DEFINE_FRAGMENT: &str = "#define FRAGMENT\n";
const DEFINE_PARAMETER_UNIFORM: &str = "#define PARAMETER_UNIFORM\n";

/// Smallest power-of-two square that can contain a frame of `video_size`.
pub fn optimal_texture_size(video_size: Float2) -> Float2 {
    let size_max = video_size.max_component().max(1.0).ceil() as u32;
    let size = size_max.next_power_of_two() as f32;
    Float2::new(size, size)
}

fn pragma_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"#pragma parameter ([a-zA-Z_][a-zA-Z0-9_]*)").expect("valid pragma regex")
    })
}

fn pragma_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*#pragma[ \t]+parameter[ \t]+([a-zA-Z_][a-zA-Z0-9_]*)[ \t]+"([^"]*)"[ \t]+(\S+)[ \t]+(\S+)[ \t]+(\S+)(?:[ \t]+([^\s/]+))?"#,
        )
        .expect("valid pragma declaration regex")
    })
}

/// Keeps the preset parameters that are actually declared in `source`,
/// mapped to their `current` value.
pub fn shader_parameters(parameters: &[ShaderParameter], source: &str) -> ShaderParameterMap {
    let mut matched = ShaderParameterMap::new();
    for caps in pragma_name_regex().captures_iter(source) {
        let name = &caps[1];
        if let Some(parameter) = parameters.iter().find(|p| p.id == name) {
            // Loaders have already applied preset overrides to `current`.
            matched.insert(name.to_string(), parameter.current);
        }
    }
    matched
}

/// Parses every `#pragma parameter NAME "description" initial min max [step]`
/// line of a shader source. Malformed lines are skipped.
pub fn parse_parameter_pragmas(source: &str) -> Vec<ShaderParameter> {
    let mut parameters = Vec::new();
    for caps in pragma_decl_regex().captures_iter(source) {
        let id = caps[1].to_string();
        let numbers: Option<Vec<f32>> = [3, 4, 5]
            .iter()
            .map(|&i| caps[i].parse::<f32>().ok())
            .collect();
        let Some(numbers) = numbers else {
            warn!("Ignoring malformed parameter pragma for {}", id);
            continue;
        };
        let step = caps
            .get(6)
            .and_then(|m| m.as_str().parse::<f32>().ok())
            .unwrap_or(0.0);
        if parameters.iter().any(|p: &ShaderParameter| p.id == id) {
            continue;
        }
        parameters.push(ShaderParameter {
            id,
            description: caps[2].to_string(),
            current: numbers[0],
            initial: numbers[0],
            minimum: numbers[1],
            maximum: numbers[2],
            step,
        });
    }
    parameters
}

/// Blanks out `#pragma parameter` lines, keeping line numbers intact for
/// compiler diagnostics.
pub fn strip_parameter_pragmas(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("#pragma parameter") {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The two compilation variants of a combined shader source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSource {
    /// Builds the vertex and fragment variants of `source`.
    ///
    /// With parameters present, `PARAMETER_UNIFORM` is defined so the shader
    /// reads them from a uniform block instead of compile-time constants.
    /// A leading `#version` line is moved above the injected defines.
    pub fn new(source: &str, path: &Path, uses_parameters: bool) -> Result<Self, ShaderError> {
        if path.as_os_str().is_empty() {
            return Err(ShaderError::EmptyPath);
        }

        let mut define_vertex = DEFINE_VERTEX.to_string();
        let mut define_fragment = DEFINE_FRAGMENT.to_string();
        if uses_parameters {
            define_fragment.push_str(DEFINE_PARAMETER_UNIFORM);
        }

        let body = if source.starts_with("#version") {
            let (version, rest) = source.split_once('\n').unwrap_or((source, ""));
            let version = version.trim_end_matches('\r');
            define_vertex = format!("{}\n{}", version, define_vertex);
            define_fragment = format!("{}\n{}", version, define_fragment);
            rest
        } else {
            source
        };

        Ok(Self {
            vertex: define_vertex + body,
            fragment: define_fragment + body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_optimal_texture_size_examples() {
        assert_eq!(optimal_texture_size(Float2::new(160.0, 144.0)), Float2::new(256.0, 256.0));
        assert_eq!(optimal_texture_size(Float2::new(256.0, 240.0)), Float2::new(256.0, 256.0));
        assert_eq!(optimal_texture_size(Float2::new(1.0, 1.0)), Float2::new(1.0, 1.0));
        assert_eq!(optimal_texture_size(Float2::new(320.0, 224.0)), Float2::new(512.0, 512.0));
    }

    proptest! {
        #[test]
        fn optimal_texture_size_is_minimal_power_of_two(w in 1u32..8192, h in 1u32..8192) {
            let size = optimal_texture_size(Float2::new(w as f32, h as f32));
            let s = size.x as u32;
            let max = w.max(h);
            prop_assert_eq!(size.x, size.y);
            prop_assert!(s.is_power_of_two());
            prop_assert!(s >= max);
            prop_assert!(s / 2 < max);
        }
    }

    #[test]
    fn test_shader_parameters_filters_by_source() {
        let source = "#pragma parameter BRIGHTNESS \"Brightness\" 1.0 0.0 2.0 0.1\nvoid main() {}\n";
        let params = vec![
            ShaderParameter { id: "BRIGHTNESS".into(), current: 1.5, ..Default::default() },
            ShaderParameter { id: "CONTRAST".into(), current: 0.7, ..Default::default() },
        ];
        let map = shader_parameters(&params, source);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("BRIGHTNESS"), Some(&1.5));
    }

    #[test]
    fn test_parse_parameter_pragmas() {
        let source = concat!(
            "#version 450\n",
            "#pragma parameter SCANLINE \"Scanline strength\" 0.5 0.0 1.0 0.05\n",
            "  #pragma parameter GAMMA \"Gamma\" 2.2 1.0 3.0\n",
            "#pragma parameter BROKEN \"Broken\" x 0.0 1.0\n",
        );
        let params = parse_parameter_pragmas(source);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].id, "SCANLINE");
        assert_eq!(params[0].description, "Scanline strength");
        assert_eq!(params[0].current, 0.5);
        assert_eq!(params[0].maximum, 1.0);
        assert_eq!(params[0].step, 0.05);
        assert_eq!(params[1].id, "GAMMA");
        assert_eq!(params[1].step, 0.0);
    }

    #[test]
    fn test_strip_parameter_pragmas_keeps_lines() {
        let source = "a\n#pragma parameter X \"x\" 0 0 1\nb";
        assert_eq!(strip_parameter_pragmas(source), "a\n\nb");
    }

    #[test]
    fn test_program_source_rejects_empty_path() {
        let err = ProgramSource::new("void main() {}", Path::new(""), false).unwrap_err();
        assert!(matches!(err, ShaderError::EmptyPath));
    }

    #[test]
    fn test_program_source_hoists_version() {
        let source = "#version 450\nvoid main() {}\n";
        let program = ProgramSource::new(source, Path::new("a.glsl"), true).unwrap();
        assert_eq!(program.vertex, "#version 450\n#define VERTEX\nvoid main() {}\n");
        assert_eq!(
            program.fragment,
            "#version 450\n#define FRAGMENT\n#define PARAMETER_UNIFORM\nvoid main() {}\n"
        );
    }

    #[test]
    fn test_program_source_without_version() {
        let program = ProgramSource::new("void main() {}", Path::new("a.glsl"), false).unwrap();
        assert_eq!(program.vertex, "#define VERTEX\nvoid main() {}");
        assert_eq!(program.fragment, "#define FRAGMENT\nvoid main() {}");
    }
}
