//! Recording backend for exercising the orchestrator without a GPU.

use super::factory::{PresetError, PresetLoader, ShaderPresetFactory};
use super::geometry::PassGeometry;
use super::preset::ShaderPreset;
use super::types::{DestQuad, Float2, FramebufferFormat, Rect, ShaderLutDesc, ShaderParameterMap, ShaderPass};
use super::{Shader, ShaderBackend, ShaderDesc, ShaderError, ShaderLut, ShaderTexture};
use crate::addons::{AddonError, AddonEvents, AddonInfo, ShaderAddonManager, ShaderPresetAddon};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct MockTexture {
    pub id: u64,
    pub size: Float2,
}

impl MockTexture {
    /// A texture owned by the caller, such as the video frame or the screen.
    pub fn external(id: u64, size: Float2) -> Self {
        Self { id, size }
    }
}

impl ShaderTexture for MockTexture {
    fn width(&self) -> f32 {
        self.size.x
    }

    fn height(&self) -> f32 {
        self.size.y
    }
}

#[derive(Debug, Clone)]
pub struct MockLut {
    pub id: String,
    pub path: PathBuf,
}

impl ShaderLut for MockLut {
    fn id(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub id: u64,
    pub size: Float2,
    pub format: FramebufferFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRecord {
    pub pass: PathBuf,
    pub source: u64,
    pub target: u64,
    pub bound: Option<u64>,
    pub viewport: Rect,
    pub frame_count: i32,
}

#[derive(Debug)]
pub struct MockShader {
    pub path: PathBuf,
    pub geometry: PassGeometry,
    pub parameters: ShaderParameterMap,
    pub luts: Vec<MockLut>,
    pub buffer_created: bool,
    pub mvp_updates: usize,
}

impl Shader<MockBackend> for MockShader {
    fn create_input_buffer(&mut self, _backend: &mut MockBackend) -> Result<(), ShaderError> {
        self.buffer_created = true;
        Ok(())
    }

    fn set_sizes(&mut self, prev_size: Float2, next_size: Float2) {
        self.geometry.set_sizes(prev_size, next_size);
    }

    fn prepare_parameters(&mut self, dest: &DestQuad, is_last_pass: bool, frame_count: u64) {
        self.geometry.prepare(dest, is_last_pass, frame_count);
    }

    fn update_mvp(&mut self) {
        self.mvp_updates += 1;
        self.geometry.update_mvp();
    }

    fn render(&mut self, backend: &mut MockBackend, source: &MockTexture, target: &MockTexture) -> Result<(), ShaderError> {
        if !self.buffer_created {
            return Err(ShaderError::Render("input buffer missing".into()));
        }
        backend.renders.push(RenderRecord {
            pass: self.path.clone(),
            source: source.id,
            target: target.id,
            bound: backend.bound,
            viewport: backend.viewport,
            frame_count: self.geometry.current_input_data().frame_count,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockBackend {
    pub viewport: Rect,
    pub scissors: Rect,
    pub bound: Option<u64>,
    pub allocations: Vec<Allocation>,
    pub renders: Vec<RenderRecord>,
    pub fail_shader: Option<PathBuf>,
    pub fail_allocation: bool,
    pub failing_luts: HashSet<String>,
    next_id: u64,
}

impl MockBackend {
    pub fn new(viewport: Rect) -> Self {
        Self {
            viewport,
            next_id: 1000,
            ..Default::default()
        }
    }
}

impl ShaderBackend for MockBackend {
    type Texture = MockTexture;
    type Lut = MockLut;
    type Pass = MockShader;

    fn name(&self) -> &str {
        "mock"
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

    fn create_shader(&mut self, desc: ShaderDesc<'_, MockLut>) -> Result<MockShader, ShaderError> {
        if self.fail_shader.as_deref() == Some(desc.path) {
            return Err(ShaderError::Compile {
                path: desc.path.to_path_buf(),
                message: "rejected by test".into(),
            });
        }
        Ok(MockShader {
            path: desc.path.to_path_buf(),
            geometry: PassGeometry::new(desc.viewport_size, desc.frame_count_mod),
            parameters: desc.parameters,
            luts: desc.luts,
            buffer_created: false,
            mvp_updates: 0,
        })
    }

    fn create_lut(&mut self, lut: &ShaderLutDesc) -> Result<MockLut, ShaderError> {
        if self.failing_luts.contains(&lut.id) {
            return Err(ShaderError::Render(format!("no image for {}", lut.id)));
        }
        Ok(MockLut { id: lut.id.clone(), path: lut.path.clone() })
    }

    fn create_render_target(&mut self, size: Float2, format: FramebufferFormat) -> Result<MockTexture, ShaderError> {
        if self.fail_allocation {
            return Err(ShaderError::TextureAllocation {
                width: size.x as u32,
                height: size.y as u32,
                message: "out of memory".into(),
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.allocations.push(Allocation { id, size, format });
        Ok(MockTexture { id, size })
    }

    fn bind_render_target(&mut self, texture: &MockTexture) {
        self.bound = Some(texture.id);
    }

    fn unbind_render_target(&mut self) {
        self.bound = None;
    }
}

/// Loader returning a fixed pass list and counting how often it ran.
pub struct RecordingLoader {
    passes: Vec<ShaderPass>,
    fail: bool,
    calls: Cell<usize>,
}

impl RecordingLoader {
    pub fn new(passes: Vec<ShaderPass>) -> Rc<Self> {
        Rc::new(Self { passes, fail: false, calls: Cell::new(0) })
    }

    pub fn failing() -> Rc<Self> {
        Rc::new(Self { passes: Vec::new(), fail: true, calls: Cell::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl PresetLoader for RecordingLoader {
    fn load_preset(&self, path: &Path) -> Result<Vec<ShaderPass>, PresetError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(PresetError::Parse {
                path: path.to_path_buf(),
                line: 1,
                message: "broken preset".into(),
            });
        }
        Ok(self.passes.clone())
    }
}

#[derive(Default)]
struct NoAddons {
    events: AddonEvents,
}

impl ShaderAddonManager for NoAddons {
    fn shader_addon_infos(&self) -> Vec<AddonInfo> {
        Vec::new()
    }

    fn create_addon(&self, info: &AddonInfo) -> Result<ShaderPresetAddon, AddonError> {
        Err(AddonError::Unknown(info.id.clone()))
    }

    fn events(&self) -> &AddonEvents {
        &self.events
    }
}

/// A preset over a [`MockBackend`] whose factory maps `.test` to `loader`.
pub fn preset_with(loader: &Rc<RecordingLoader>, viewport: Rect, video_width: u32, video_height: u32) -> ShaderPreset<MockBackend> {
    let mut factory = ShaderPresetFactory::new(Rc::new(NoAddons::default()));
    factory.register_loader(loader.clone(), ".test");
    ShaderPreset::new(
        MockBackend::new(viewport),
        Rc::new(RefCell::new(factory)),
        video_width,
        video_height,
    )
}
