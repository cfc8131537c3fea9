//! YAML run configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Where rendered frames go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Display in a window
    #[default]
    Window,
    /// Render offscreen and save an image
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Settings read from a config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shader preset to apply
    pub preset: Option<PathBuf>,
    /// Image used as the emulator frame
    pub input: Option<PathBuf>,
    /// Image written in file mode
    pub output: Option<PathBuf>,
    pub viewport: Option<Viewport>,
    /// Playback speed; shader time advances by this much per frame
    pub speed: Option<f64>,
    /// Frames to render in file mode
    pub frames: Option<u32>,
    pub mode: Option<Mode>,
    /// Reload the preset when it changes on disk
    pub watch: Option<bool>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))
    }

    /// Values from `overrides` win over the ones in `self`.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            preset: overrides.preset.or(self.preset),
            input: overrides.input.or(self.input),
            output: overrides.output.or(self.output),
            viewport: overrides.viewport.or(self.viewport),
            speed: overrides.speed.or(self.speed),
            frames: overrides.frames.or(self.frames),
            mode: overrides.mode.or(self.mode),
            watch: overrides.watch.or(self.watch),
        }
    }
}
