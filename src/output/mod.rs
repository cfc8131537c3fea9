//! Output backends for displaying shaded video.

pub mod image_output;
pub mod window_output;

pub use image_output::ImageOutput;
pub use window_output::{WindowConfig, WindowRenderer};

use crate::frame::VideoFrame;
use crate::shader::wgpu_backend::{WgpuBackend, WgpuShaderTexture};
use crate::shader::{Float2, Rect, ShaderBackend, ShaderPreset, ShaderTexture};
use crate::utils::{dest_quad, letterbox};
use anyhow::Result;
use tracing::debug;

/// Trait for video output backends.
pub trait OutputBackend {
    /// Write a frame to the output.
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;
}

/// Feeds video frames through a shader preset onto a target texture.
pub struct PresetRenderer {
    preset: ShaderPreset<WgpuBackend>,
    source: Option<WgpuShaderTexture>,
}

impl PresetRenderer {
    pub fn new(preset: ShaderPreset<WgpuBackend>) -> Self {
        Self { preset, source: None }
    }

    /// Uploads `frame` and runs the preset into `target`, letterboxed.
    ///
    /// Returns false when no chain is available; the frame is still
    /// uploaded and can be drawn with [`source`](Self::source).
    pub fn render(&mut self, frame: &VideoFrame, target: &WgpuShaderTexture) -> bool {
        let video_size = Float2::from((frame.width, frame.height));
        let source = self.upload(frame, video_size).clone();

        let full = Rect::from_size(target.size());
        let backend = self.preset.backend_mut();
        backend.set_viewport(full);
        backend.set_scissors(full);

        let dest = dest_quad(letterbox(video_size, target.size()));
        self.preset.render_update(&dest, &source, target)
    }

    fn upload(&mut self, frame: &VideoFrame, video_size: Float2) -> &WgpuShaderTexture {
        let source = match self.source.take() {
            Some(source) if source.size() == video_size => source,
            _ => {
                if self.preset.video_size() != video_size {
                    debug!("Video size is now {}x{}", frame.width, frame.height);
                    self.preset.set_video_size(frame.width, frame.height);
                    self.preset.request_rebuild();
                }
                WgpuShaderTexture::source(self.preset.backend().device(), frame.width, frame.height)
            }
        };
        source.write_frame(self.preset.backend().queue(), frame);
        self.source.insert(source)
    }

    /// Last uploaded frame.
    pub fn source(&self) -> Option<&WgpuShaderTexture> {
        self.source.as_ref()
    }

    pub fn preset(&self) -> &ShaderPreset<WgpuBackend> {
        &self.preset
    }

    pub fn preset_mut(&mut self) -> &mut ShaderPreset<WgpuBackend> {
        &mut self.preset
    }
}
