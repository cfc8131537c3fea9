//! Shader preset orchestration: chain building, invalidation and per-frame
//! rendering.

use super::factory::{PresetError, ShaderPresetFactory};
use super::types::{DestQuad, Float2, FramebufferFormat, Rect, ScaleType, ShaderPass};
use super::utils::{optimal_texture_size, shader_parameters};
use super::{Shader, ShaderBackend, ShaderDesc, ShaderError, ShaderTexture};
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Reasons a preset chain could not be built.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("couldn't load shader preset or the shaders it references: {0}")]
    Load(#[from] PresetError),
    #[error("failed to initialize shaders: {0}")]
    Shaders(#[source] ShaderError),
    #[error("failed to initialize buffers: {0}")]
    Buffers(#[source] ShaderError),
    #[error("a shader texture failed to init: {0}")]
    Textures(#[source] ShaderError),
}

/// Where the pipeline currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetState {
    /// No preset path set.
    Empty,
    /// The chain is stale and will be rebuilt on the next update.
    NeedsUpdate,
    /// The chain is built and consistent.
    Ready,
    /// The current path failed and is disabled for this session.
    Failed,
}

/// Output of one pass.
///
/// Every pass but the last renders into its own texture. The last pass
/// renders into the caller's target, so only its resolved size is kept.
#[derive(Debug)]
pub enum PassOutput<T> {
    Texture(T),
    Target { size: Float2, format: FramebufferFormat },
}

impl<T: ShaderTexture> PassOutput<T> {
    pub fn size(&self) -> Float2 {
        match self {
            PassOutput::Texture(texture) => texture.size(),
            PassOutput::Target { size, .. } => *size,
        }
    }

    pub fn texture(&self) -> Option<&T> {
        match self {
            PassOutput::Texture(texture) => Some(texture),
            PassOutput::Target { .. } => None,
        }
    }
}

/// Owns a preset's passes and the shaders and textures built from them.
pub struct ShaderPreset<B: ShaderBackend> {
    backend: B,
    factory: Rc<RefCell<ShaderPresetFactory>>,

    video_size: Float2,
    texture_size: Float2,
    // Viewport size the chain was resolved against
    output_size: Float2,

    dest: DestQuad,
    target_size: Float2,

    preset_path: PathBuf,
    needs_update: bool,
    failed_paths: HashSet<PathBuf>,

    passes: Vec<ShaderPass>,
    shaders: Vec<B::Pass>,
    shader_textures: Vec<PassOutput<B::Texture>>,

    frame_count: f64,
    speed: f64,
}

impl<B: ShaderBackend> ShaderPreset<B> {
    pub fn new(backend: B, factory: Rc<RefCell<ShaderPresetFactory>>, video_width: u32, video_height: u32) -> Self {
        let video_size = Float2::from((video_width, video_height));
        let output_size = backend.viewport().size();
        Self {
            backend,
            factory,
            video_size,
            texture_size: optimal_texture_size(video_size),
            output_size,
            dest: [Float2::ZERO; 4],
            target_size: Float2::ZERO,
            preset_path: PathBuf::new(),
            needs_update: true,
            failed_paths: HashSet::new(),
            passes: Vec::new(),
            shaders: Vec::new(),
            shader_textures: Vec::new(),
            frame_count: 0.0,
            speed: 1.0,
        }
    }

    /// Sets the preset to use and tries to build it right away.
    pub fn set_shader_preset(&mut self, path: impl AsRef<Path>) -> bool {
        self.needs_update = true;
        self.preset_path = path.as_ref().to_path_buf();
        self.update()
    }

    pub fn shader_preset(&self) -> &Path {
        &self.preset_path
    }

    pub fn set_video_size(&mut self, video_width: u32, video_height: u32) {
        self.video_size = Float2::from((video_width, video_height));
        self.texture_size = optimal_texture_size(self.video_size);
    }

    /// Playback rate. Shader time advances by this much per rendered frame.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    /// Marks the chain stale so the next update rebuilds it.
    pub fn request_rebuild(&mut self) {
        self.needs_update = true;
    }

    /// Forgets an earlier failure of the current path and rebuilds.
    pub fn reload(&mut self) -> bool {
        if self.failed_paths.remove(&self.preset_path) {
            info!("Retrying shader preset {:?}", self.preset_path);
        }
        self.needs_update = true;
        self.update()
    }

    pub fn has_path_failed(&self, path: &Path) -> bool {
        self.failed_paths.contains(path)
    }

    pub fn state(&self) -> PresetState {
        if self.preset_path.as_os_str().is_empty() {
            PresetState::Empty
        } else if self.has_path_failed(&self.preset_path) {
            PresetState::Failed
        } else if self.needs_update || self.shaders.is_empty() {
            PresetState::NeedsUpdate
        } else {
            PresetState::Ready
        }
    }

    /// Rebuilds the chain if it is stale. Returns true if a chain is ready.
    pub fn update(&mut self) -> bool {
        if self.needs_update && !self.has_path_failed(&self.preset_path) {
            self.dispose_shaders();

            if self.preset_path.as_os_str().is_empty() {
                return false;
            }

            if let Err(e) = self.build() {
                return self.update_failed(&e.to_string());
            }
        }

        if self.shaders.is_empty() {
            return false;
        }

        // Each pass must have its own texture and the opposite is also true
        if self.shaders.len() != self.shader_textures.len() {
            return self.update_failed("a shader or texture failed to init");
        }

        self.needs_update = false;
        true
    }

    /// Renders one frame of `source` through the chain into `target`.
    ///
    /// Returns false when no chain is available; the caller is expected to
    /// draw the frame without post-processing.
    pub fn render_update(&mut self, dest: &DestQuad, source: &B::Texture, target: &B::Texture) -> bool {
        let viewport = self.backend.viewport();

        // Handle resizing of the viewport (window)
        self.update_viewport(viewport);

        if !self.update() {
            return false;
        }

        self.prepare_parameters(target.size(), dest);
        if self.shaders.is_empty() {
            return false;
        }

        let result = self.render_passes(source, target);

        self.frame_count += self.speed;

        self.backend.set_viewport(viewport);

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Shader pass failed to render: {}", e);
                self.update_failed("a shader pass failed to render")
            }
        }
    }

    fn build(&mut self) -> Result<(), BuildError> {
        let passes = self.factory.borrow().load_preset(&self.preset_path)?;
        if passes.is_empty() {
            return Err(PresetError::NoPasses(self.preset_path.clone()).into());
        }
        self.passes = passes;

        self.create_shaders().map_err(BuildError::Shaders)?;
        self.create_buffers().map_err(BuildError::Buffers)?;
        self.create_shader_textures().map_err(BuildError::Textures)?;
        self.update_mvps();

        info!(
            "Loaded shader preset {:?}: {} pass(es) on {}",
            self.preset_path,
            self.passes.len(),
            self.backend.name()
        );
        Ok(())
    }

    fn update_failed(&mut self, message: &str) -> bool {
        self.failed_paths.insert(self.preset_path.clone());
        warn!("Shader preset {:?}: {}. Disabling video shaders.", self.preset_path, message);
        self.dispose_shaders();
        false
    }

    fn create_shaders(&mut self) -> Result<(), ShaderError> {
        self.texture_size = optimal_texture_size(self.video_size);

        for pass in &self.passes {
            let mut luts = Vec::with_capacity(pass.luts.len());
            for lut in &pass.luts {
                match self.backend.create_lut(lut) {
                    Ok(loaded) => luts.push(loaded),
                    Err(e) => warn!("Couldn't create a LUT texture for LUT {}: {}", lut.id, e),
                }
            }

            // Only the parameters belonging to this specific shader
            let parameters = shader_parameters(&pass.parameters, &pass.source);

            let shader = self.backend.create_shader(ShaderDesc {
                source: &pass.source,
                path: &pass.source_path,
                parameters,
                filter: pass.filter,
                wrap: pass.wrap,
                mipmap_input: pass.mipmap,
                luts,
                viewport_size: self.output_size,
                frame_count_mod: pass.frame_count_mod,
            })?;
            self.shaders.push(shader);
        }
        Ok(())
    }

    fn create_buffers(&mut self) -> Result<(), ShaderError> {
        for shader in &mut self.shaders {
            shader.create_input_buffer(&mut self.backend)?;
        }
        Ok(())
    }

    fn create_shader_textures(&mut self) -> Result<(), ShaderError> {
        self.shader_textures.clear();

        let mut prev_size = self.video_size;
        let num_passes = self.passes.len();

        for (idx, pass) in self.passes.iter().enumerate() {
            let is_last = idx + 1 == num_passes;
            let scaled_size = resolve_pass_size(pass, prev_size, self.output_size, is_last);
            let format = pass.fbo.format();

            let output = if is_last {
                PassOutput::Target { size: scaled_size, format }
            } else {
                match self.backend.create_render_target(scaled_size, format) {
                    Ok(texture) => PassOutput::Texture(texture),
                    Err(e) => {
                        error!("Couldn't create a texture for video shader {:?}", pass.source_path);
                        return Err(e);
                    }
                }
            };
            debug!(
                "Pass {} ({:?}): {}x{} -> {}x{} {:?}",
                idx, pass.source_path, prev_size.x, prev_size.y, scaled_size.x, scaled_size.y, format
            );

            self.shader_textures.push(output);
            self.shaders[idx].set_sizes(prev_size, scaled_size);

            prev_size = scaled_size;
        }
        Ok(())
    }

    fn update_viewport(&mut self, viewport: Rect) {
        let size = viewport.size();
        if size != self.output_size {
            debug!("Viewport resized to {}x{}", size.x, size.y);
            self.output_size = size;
            self.needs_update = true;
            self.update();
        }
    }

    fn update_mvps(&mut self) {
        for shader in &mut self.shaders {
            shader.update_mvp();
        }
    }

    fn dispose_shaders(&mut self) {
        self.shaders.clear();
        self.shader_textures.clear();
        self.passes.clear();
        self.needs_update = true;
    }

    fn prepare_parameters(&mut self, target_size: Float2, dest: &DestQuad) {
        if self.dest != *dest || self.target_size != target_size {
            self.dest = *dest;
            self.target_size = target_size;

            self.update_mvps();
            let viewport = self.backend.viewport();
            self.update_viewport(viewport);
        }

        let frame_count = self.frame_count as u64;
        let last = self.shaders.len().saturating_sub(1);
        for (idx, shader) in self.shaders.iter_mut().enumerate() {
            shader.prepare_parameters(&self.dest, idx == last, frame_count);
        }
    }

    fn render_passes(&mut self, source: &B::Texture, target: &B::Texture) -> Result<(), ShaderError> {
        let last = self.shaders.len() - 1;

        // Every pass but the last renders offscreen into its own texture
        for idx in 0..last {
            let texture = self.shader_textures[idx]
                .texture()
                .ok_or(ShaderError::MissingRenderTarget(idx))?;
            let input = if idx == 0 {
                source
            } else {
                self.shader_textures[idx - 1]
                    .texture()
                    .ok_or(ShaderError::MissingRenderTarget(idx - 1))?
            };

            self.backend.bind_render_target(texture);
            let result = render_shader(&mut self.backend, &mut self.shaders[idx], input, texture);
            self.backend.unbind_render_target();
            result?;
        }

        let input = if last == 0 {
            source
        } else {
            self.shader_textures[last - 1]
                .texture()
                .ok_or(ShaderError::MissingRenderTarget(last - 1))?
        };
        render_shader(&mut self.backend, &mut self.shaders[last], input, target)
    }

    pub fn passes(&self) -> &[ShaderPass] {
        &self.passes
    }

    pub fn shaders(&self) -> &[B::Pass] {
        &self.shaders
    }

    pub fn shader_textures(&self) -> &[PassOutput<B::Texture>] {
        &self.shader_textures
    }

    pub fn video_size(&self) -> Float2 {
        self.video_size
    }

    /// Power-of-two size able to hold a video frame.
    pub fn texture_size(&self) -> Float2 {
        self.texture_size
    }

    pub fn output_size(&self) -> Float2 {
        self.output_size
    }

    pub fn frame_count(&self) -> f64 {
        self.frame_count
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

fn render_shader<B: ShaderBackend>(
    backend: &mut B,
    shader: &mut B::Pass,
    source: &B::Texture,
    target: &B::Texture,
) -> Result<(), ShaderError> {
    let viewport = Rect::from_size(target.size());
    backend.set_viewport(viewport);
    backend.set_scissors(viewport);

    shader.render(backend, source, target)
}

/// Resolves the output size of a pass from its scale policy.
pub(crate) fn resolve_pass_size(pass: &ShaderPass, prev_size: Float2, viewport_size: Float2, is_last: bool) -> Float2 {
    let scale_x = &pass.fbo.scale_x;
    let scale_y = &pass.fbo.scale_y;

    let mut scaled = Float2::new(
        match scale_x.kind {
            ScaleType::Absolute => scale_x.abs as f32,
            ScaleType::Viewport => viewport_size.x,
            ScaleType::Input => prev_size.x,
        },
        match scale_y.kind {
            ScaleType::Absolute => scale_y.abs as f32,
            ScaleType::Viewport => viewport_size.y,
            ScaleType::Input => prev_size.y,
        },
    );

    if pass.fbo.is_unspecified() {
        // An unscaled last pass outputs at full viewport resolution
        if is_last {
            scaled = viewport_size;
        }
    } else {
        scaled.x *= scale_x.scale;
        scaled.y *= scale_y.scale;
    }

    scaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::mock::{preset_with, MockBackend, MockTexture, RecordingLoader};
    use crate::shader::types::{FboScale, FboScaleAxis, ShaderLutDesc, ShaderParameter};

    const VIEWPORT: Rect = Rect::new(0.0, 0.0, 1920.0, 1080.0);

    fn pass(name: &str, fbo: FboScale) -> ShaderPass {
        ShaderPass {
            source_path: PathBuf::from(name),
            source: format!("// {}\n", name),
            fbo,
            ..Default::default()
        }
    }

    fn unspecified() -> FboScale {
        FboScale {
            scale_x: FboScaleAxis::unspecified(),
            scale_y: FboScaleAxis::unspecified(),
            ..Default::default()
        }
    }

    fn scaled(kind: ScaleType, scale: f32) -> FboScale {
        let axis = FboScaleAxis { kind, scale, abs: 1 };
        FboScale { scale_x: axis, scale_y: axis, ..Default::default() }
    }

    fn dest_for(viewport: Rect) -> DestQuad {
        [
            Float2::new(0.0, 0.0),
            Float2::new(viewport.width, 0.0),
            Float2::new(viewport.width, viewport.height),
            Float2::new(0.0, viewport.height),
        ]
    }

    fn frame(
        preset: &mut ShaderPreset<MockBackend>,
        source: &MockTexture,
        target: &MockTexture,
    ) -> bool {
        let viewport = preset.backend().viewport();
        preset.render_update(&dest_for(viewport), source, target)
    }

    #[test]
    fn test_single_pass_renders_source_to_target() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        assert!(preset.set_shader_preset("single.test"));
        assert_eq!(preset.state(), PresetState::Ready);

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        preset.set_speed(1.0);
        assert!(frame(&mut preset, &source, &target));

        assert_eq!(preset.frame_count(), 1.0);
        assert!(preset.backend().allocations.is_empty());
        let renders = &preset.backend().renders;
        assert_eq!(renders.len(), 1);
        assert_eq!(renders[0].source, 100);
        assert_eq!(renders[0].target, 200);
        assert_eq!(renders[0].bound, None);
        assert_eq!(preset.shader_textures()[0].size(), VIEWPORT.size());
    }

    #[test]
    fn test_texture_count_matches_pass_count() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Input, 2.0)),
            pass("b.glsl", scaled(ScaleType::Input, 1.0)),
            pass("c.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        assert!(preset.set_shader_preset("three.test"));

        assert_eq!(preset.shaders().len(), preset.shader_textures().len());
        assert_eq!(preset.backend().allocations.len(), 2);
        assert_eq!(preset.shader_textures()[0].size(), Float2::new(320.0, 288.0));
        assert_eq!(preset.shader_textures()[1].size(), Float2::new(320.0, 288.0));
        assert_eq!(preset.shader_textures()[2].size(), VIEWPORT.size());
    }

    #[test]
    fn test_three_pass_chain_order() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Input, 2.0)),
            pass("b.glsl", scaled(ScaleType::Input, 1.0)),
            pass("c.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("three.test");

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        assert!(frame(&mut preset, &source, &target));

        let t0 = preset.shader_textures()[0].texture().unwrap().id;
        let t1 = preset.shader_textures()[1].texture().unwrap().id;
        let renders = &preset.backend().renders;
        assert_eq!(renders.len(), 3);

        assert_eq!((renders[0].source, renders[0].target, renders[0].bound), (100, t0, Some(t0)));
        assert_eq!((renders[1].source, renders[1].target, renders[1].bound), (t0, t1, Some(t1)));
        assert_eq!((renders[2].source, renders[2].target, renders[2].bound), (t1, 200, None));

        assert_eq!(renders[0].viewport, Rect::new(0.0, 0.0, 320.0, 288.0));
        assert_eq!(renders[2].viewport, VIEWPORT);
        assert_eq!(preset.backend().bound, None);
    }

    #[test]
    fn test_two_pass_chain() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Viewport, 0.5)),
            pass("b.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 256, 240);
        preset.set_shader_preset("two.test");

        let source = MockTexture::external(100, Float2::new(256.0, 240.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        assert!(frame(&mut preset, &source, &target));

        assert_eq!(preset.backend().allocations.len(), 1);
        assert_eq!(preset.shader_textures()[0].size(), Float2::new(960.0, 540.0));
        let t0 = preset.shader_textures()[0].texture().unwrap().id;
        let renders = &preset.backend().renders;
        assert_eq!((renders[0].source, renders[0].target), (100, t0));
        assert_eq!((renders[1].source, renders[1].target), (t0, 200));
    }

    #[test]
    fn test_last_pass_without_scale_fills_viewport() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Absolute, 1.0)),
            pass("b.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("abs.test");

        let shaders = preset.shaders();
        assert_eq!(shaders[1].geometry.input_size(), Float2::new(1.0, 1.0));
        assert_eq!(shaders[1].geometry.output_size(), VIEWPORT.size());
    }

    #[test]
    fn test_middle_pass_without_scale_keeps_input_size() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", unspecified()),
            pass("b.glsl", scaled(ScaleType::Input, 3.0)),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("mid.test");

        assert_eq!(preset.shader_textures()[0].size(), Float2::new(160.0, 144.0));
        assert_eq!(preset.shader_textures()[1].size(), Float2::new(480.0, 432.0));
    }

    #[test]
    fn test_absolute_and_viewport_axes_resolve_independently() {
        let fbo = FboScale {
            scale_x: FboScaleAxis { kind: ScaleType::Absolute, scale: 1.0, abs: 640 },
            scale_y: FboScaleAxis { kind: ScaleType::Viewport, scale: 0.5, abs: 1 },
            float_framebuffer: true,
            ..Default::default()
        };
        let size = resolve_pass_size(&pass("a", fbo), Float2::new(160.0, 144.0), VIEWPORT.size(), false);
        assert_eq!(size, Float2::new(640.0, 540.0));
    }

    #[test]
    fn test_framebuffer_formats_reach_backend() {
        let mut float_fbo = scaled(ScaleType::Input, 1.0);
        float_fbo.float_framebuffer = true;
        float_fbo.srgb_framebuffer = true;
        let mut srgb_fbo = scaled(ScaleType::Input, 1.0);
        srgb_fbo.srgb_framebuffer = true;

        let loader = RecordingLoader::new(vec![
            pass("a.glsl", float_fbo),
            pass("b.glsl", srgb_fbo),
            pass("c.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("formats.test");

        let formats: Vec<FramebufferFormat> = preset.backend().allocations.iter().map(|a| a.format).collect();
        assert_eq!(formats, vec![FramebufferFormat::Float, FramebufferFormat::Srgb]);
    }

    #[test]
    fn test_viewport_resize_rebuilds_chain() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Viewport, 1.0)),
            pass("b.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("resize.test");
        assert_eq!(loader.calls(), 1);

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        assert!(frame(&mut preset, &source, &target));
        assert_eq!(loader.calls(), 1);

        let resized = Rect::new(0.0, 0.0, 1280.0, 720.0);
        preset.backend_mut().viewport = resized;
        let target = MockTexture::external(201, resized.size());
        assert!(frame(&mut preset, &source, &target));

        assert_eq!(loader.calls(), 2);
        assert_eq!(preset.output_size(), resized.size());
        assert_eq!(preset.shader_textures()[0].size(), resized.size());
        assert_eq!(preset.shader_textures()[1].size(), resized.size());
    }

    #[test]
    fn test_stable_geometry_is_not_recomputed() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("stable.test");
        let after_build = preset.shaders()[0].mvp_updates;

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        frame(&mut preset, &source, &target);
        let after_first = preset.shaders()[0].mvp_updates;
        assert_eq!(after_first, after_build + 1);

        frame(&mut preset, &source, &target);
        frame(&mut preset, &source, &target);
        assert_eq!(preset.shaders()[0].mvp_updates, after_first);

        let mut dest = dest_for(VIEWPORT);
        dest[0].x = 10.0;
        preset.render_update(&dest, &source, &target);
        assert_eq!(preset.shaders()[0].mvp_updates, after_first + 1);
    }

    #[test]
    fn test_viewport_is_restored() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Input, 2.0)),
            pass("b.glsl", unspecified()),
        ]);
        let viewport = Rect::new(10.0, 20.0, 800.0, 600.0);
        let mut preset = preset_with(&loader, viewport, 160, 144);
        preset.set_shader_preset("restore.test");

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, viewport.size());
        assert!(frame(&mut preset, &source, &target));
        assert_eq!(preset.backend().viewport, viewport);
    }

    #[test]
    fn test_frame_count_follows_speed() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("speed.test");

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        preset.set_speed(0.5);
        for _ in 0..4 {
            frame(&mut preset, &source, &target);
        }
        assert_eq!(preset.frame_count(), 2.0);
        assert_eq!(preset.backend().renders.last().unwrap().frame_count, 1);
    }

    #[test]
    fn test_frame_count_mod_reaches_shader() {
        let mut modded = pass("a.glsl", unspecified());
        modded.frame_count_mod = 10;
        let loader = RecordingLoader::new(vec![modded]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("mod.test");

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        for _ in 0..24 {
            frame(&mut preset, &source, &target);
        }
        assert_eq!(preset.backend().renders.last().unwrap().frame_count, 3);
    }

    #[test]
    fn test_empty_path_is_not_a_failure() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        assert_eq!(preset.state(), PresetState::Empty);
        assert!(!preset.set_shader_preset(""));
        assert_eq!(preset.state(), PresetState::Empty);
        assert_eq!(loader.calls(), 0);
    }

    #[test]
    fn test_failed_path_is_not_retried() {
        let loader = RecordingLoader::failing();
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);

        assert!(!preset.set_shader_preset("broken.test"));
        assert_eq!(preset.state(), PresetState::Failed);
        assert!(!preset.set_shader_preset("broken.test"));
        assert_eq!(loader.calls(), 1);

        let source = MockTexture::external(100, Float2::new(160.0, 144.0));
        let target = MockTexture::external(200, VIEWPORT.size());
        assert!(!frame(&mut preset, &source, &target));
        assert!(preset.backend().renders.is_empty());
        assert_eq!(loader.calls(), 1);
    }

    #[test]
    fn test_unknown_extension_fails_path() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        assert!(!preset.set_shader_preset("crt.unknown"));
        assert_eq!(preset.state(), PresetState::Failed);
    }

    #[test]
    fn test_new_path_after_failure_is_attempted() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.backend_mut().fail_shader = Some(PathBuf::from("a.glsl"));
        assert!(!preset.set_shader_preset("first.test"));
        assert_eq!(preset.state(), PresetState::Failed);

        preset.backend_mut().fail_shader = None;
        assert!(preset.set_shader_preset("second.test"));
        assert_eq!(preset.state(), PresetState::Ready);
        assert!(preset.has_path_failed(Path::new("first.test")));
    }

    #[test]
    fn test_shader_failure_disposes_partial_chain() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Input, 1.0)),
            pass("b.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.backend_mut().fail_shader = Some(PathBuf::from("b.glsl"));

        assert!(!preset.set_shader_preset("partial.test"));
        assert!(preset.shaders().is_empty());
        assert!(preset.shader_textures().is_empty());
        assert!(preset.passes().is_empty());
    }

    #[test]
    fn test_texture_failure_fails_path() {
        let loader = RecordingLoader::new(vec![
            pass("a.glsl", scaled(ScaleType::Input, 1.0)),
            pass("b.glsl", unspecified()),
        ]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.backend_mut().fail_allocation = true;

        assert!(!preset.set_shader_preset("alloc.test"));
        assert_eq!(preset.state(), PresetState::Failed);
        assert!(preset.shaders().is_empty());
    }

    #[test]
    fn test_reload_clears_failure() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.backend_mut().fail_shader = Some(PathBuf::from("a.glsl"));
        assert!(!preset.set_shader_preset("reload.test"));

        preset.backend_mut().fail_shader = None;
        assert!(!preset.update());
        assert!(preset.reload());
        assert_eq!(preset.state(), PresetState::Ready);
        assert_eq!(loader.calls(), 2);
    }

    #[test]
    fn test_failed_lut_is_skipped() {
        let mut with_luts = pass("a.glsl", unspecified());
        with_luts.luts = vec![
            ShaderLutDesc { id: "good".into(), path: "good.png".into(), ..Default::default() },
            ShaderLutDesc { id: "missing".into(), path: "missing.png".into(), ..Default::default() },
        ];
        let loader = RecordingLoader::new(vec![with_luts]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.backend_mut().failing_luts.insert("missing".into());

        assert!(preset.set_shader_preset("luts.test"));
        let luts: Vec<&str> = preset.shaders()[0].luts.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(luts, vec!["good"]);
    }

    #[test]
    fn test_parameters_are_filtered_per_pass() {
        let mut first = pass("a.glsl", scaled(ScaleType::Input, 1.0));
        first.source = "#pragma parameter GAMMA \"Gamma\" 2.2 1.0 3.0 0.1\n".into();
        let mut second = pass("b.glsl", unspecified());
        second.source = "#pragma parameter SCANLINES \"Scanlines\" 0.5 0.0 1.0 0.1\n".into();
        let declared = vec![
            ShaderParameter { id: "GAMMA".into(), current: 2.4, ..Default::default() },
            ShaderParameter { id: "SCANLINES".into(), current: 0.8, ..Default::default() },
        ];
        first.parameters = declared.clone();
        second.parameters = declared;

        let loader = RecordingLoader::new(vec![first, second]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        assert!(preset.set_shader_preset("params.test"));

        let shaders = preset.shaders();
        assert_eq!(shaders[0].parameters.len(), 1);
        assert_eq!(shaders[0].parameters.get("GAMMA"), Some(&2.4));
        assert_eq!(shaders[1].parameters.get("SCANLINES"), Some(&0.8));
    }

    #[test]
    fn test_video_size_updates_texture_size() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        assert_eq!(preset.texture_size(), Float2::new(256.0, 256.0));
        preset.set_video_size(320, 240);
        assert_eq!(preset.texture_size(), Float2::new(512.0, 512.0));
        assert_eq!(preset.video_size(), Float2::new(320.0, 240.0));
    }

    #[test]
    fn test_request_rebuild_reloads_preset() {
        let loader = RecordingLoader::new(vec![pass("a.glsl", unspecified())]);
        let mut preset = preset_with(&loader, VIEWPORT, 160, 144);
        preset.set_shader_preset("rebuild.test");
        preset.request_rebuild();
        assert_eq!(preset.state(), PresetState::NeedsUpdate);
        assert!(preset.update());
        assert_eq!(loader.calls(), 2);
    }
}
