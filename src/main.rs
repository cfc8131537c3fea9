//! Retroshade: applies RetroPlayer-style shader presets to emulator frames.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use retroshade::addons::BuiltinAddons;
use retroshade::config::{Config, Mode, Viewport};
use retroshade::frame::VideoFrame;
use retroshade::output::{ImageOutput, OutputBackend, PresetRenderer, WindowConfig, WindowRenderer};
use retroshade::shader::wgpu_backend::{GpuContext, WgpuBackend, WgpuShaderTexture};
use retroshade::shader::{Float2, Rect, ShaderPreset, ShaderPresetFactory};
use retroshade::utils::FpsCounter;
use retroshade::watcher::PresetWatcher;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

/// Size of the generated frame when no input image is given.
const PATTERN_SIZE: (u32, u32) = (256, 224);

/// Multi-pass video shader presets for emulator output.
#[derive(Parser, Debug)]
#[command(name = "retroshade")]
#[command(about = "Render emulator frames through .glslp / .yaml shader presets")]
struct Args {
    /// Shader preset (.glslp, .yaml)
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Image used as the emulator frame; a test pattern when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Image written in file mode
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Viewport width
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height
    #[arg(long)]
    height: Option<u32>,

    /// Playback speed
    #[arg(long)]
    speed: Option<f64>,

    /// Frames to render in file mode
    #[arg(long)]
    frames: Option<u32>,

    /// Output mode: window or file
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Reload the preset when files next to it change
    #[arg(long)]
    watch: bool,

    /// YAML config file; command line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Config {
        let default = Viewport::default();
        let viewport = match (self.width, self.height) {
            (None, None) => None,
            (width, height) => Some(Viewport {
                width: width.unwrap_or(default.width),
                height: height.unwrap_or(default.height),
            }),
        };
        Config {
            preset: self.preset,
            input: self.input,
            output: self.output,
            viewport,
            speed: self.speed,
            frames: self.frames,
            mode: self.mode,
            watch: self.watch.then_some(true),
        }
    }
}

/// Fully resolved run settings.
struct Settings {
    preset: Option<PathBuf>,
    input: Option<PathBuf>,
    output: PathBuf,
    viewport: Viewport,
    speed: f64,
    frames: u32,
    mode: Mode,
    watch: bool,
}

impl From<Config> for Settings {
    fn from(config: Config) -> Self {
        Self {
            preset: config.preset,
            input: config.input,
            output: config.output.unwrap_or_else(|| PathBuf::from("output.png")),
            viewport: config.viewport.unwrap_or_default(),
            speed: config.speed.unwrap_or(1.0),
            frames: config.frames.unwrap_or(1).max(1),
            mode: config.mode.unwrap_or_default(),
            watch: config.watch.unwrap_or(false),
        }
    }
}

fn load_input(settings: &Settings) -> Result<VideoFrame> {
    match &settings.input {
        Some(path) => {
            let frame = VideoFrame::load(path).with_context(|| format!("Failed to load input image {:?}", path))?;
            info!("Loaded {}x{} input frame from {:?}", frame.width, frame.height, path);
            Ok(frame)
        }
        None => {
            info!("No input image, using a test pattern");
            Ok(VideoFrame::test_pattern(PATTERN_SIZE.0, PATTERN_SIZE.1))
        }
    }
}

fn create_preset(
    context: &GpuContext,
    factory: &Rc<RefCell<ShaderPresetFactory>>,
    settings: &Settings,
    frame: &VideoFrame,
) -> ShaderPreset<WgpuBackend> {
    let viewport = Rect::from_size(Float2::from((settings.viewport.width, settings.viewport.height)));
    let backend = WgpuBackend::new(context, viewport);
    let mut preset = ShaderPreset::new(backend, factory.clone(), frame.width, frame.height);
    preset.set_speed(settings.speed);
    if let Some(path) = &settings.preset {
        if !preset.set_shader_preset(path) {
            warn!("Shader preset {:?} is not usable yet", path);
        }
    }
    preset
}

/// Application state for the event loop.
struct RetroshadeApp {
    settings: Settings,
    factory: Rc<RefCell<ShaderPresetFactory>>,
    frame: VideoFrame,
    window: Option<Arc<Window>>,
    renderer: Option<WindowRenderer>,
    watcher: Option<PresetWatcher>,
    fps: FpsCounter,
}

impl RetroshadeApp {
    fn new(settings: Settings, factory: Rc<RefCell<ShaderPresetFactory>>, frame: VideoFrame) -> Self {
        let watcher = match (&settings.preset, settings.watch) {
            (Some(path), true) => PresetWatcher::new(path),
            _ => None,
        };
        Self {
            settings,
            factory,
            frame,
            window: None,
            renderer: None,
            watcher,
            fps: FpsCounter::new(),
        }
    }

    fn initialize(&mut self, window: Arc<Window>) -> Result<()> {
        let (context, surface) = GpuContext::with_window(&window)?;
        info!("Using {} adapter", context.api_name());

        let preset = create_preset(&context, &self.factory, &self.settings, &self.frame);
        let mut renderer = WindowRenderer::new(window, &context, surface, PresetRenderer::new(preset))?;
        renderer.set_frame(self.frame.clone());
        self.renderer = Some(renderer);
        Ok(())
    }

    fn process_frame(&mut self) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };

        self.factory.borrow_mut().process_events();

        if self.watcher.as_mut().is_some_and(|w| w.check_for_changes()) {
            let preset = renderer.renderer_mut().preset_mut();
            if preset.reload() {
                info!("Reloaded shader preset {:?}", preset.shader_preset());
            }
        }

        if let Err(e) = renderer.render() {
            error!("Render error: {}", e);
        }

        if let Some(fps) = self.fps.update() {
            let size = renderer.window().inner_size();
            debug!("[Perf] Rendering at {:.2} FPS (Viewport: {}x{})", fps, size.width, size.height);
        }
    }
}

impl ApplicationHandler for RetroshadeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_config = WindowConfig {
            width: self.settings.viewport.width,
            height: self.settings.viewport.height,
            ..Default::default()
        };
        let window_attrs = WindowAttributes::default()
            .with_title(window_config.title)
            .with_inner_size(PhysicalSize::new(window_config.width, window_config.height));

        match event_loop.create_window(window_attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                match self.initialize(window) {
                    Ok(()) => info!("Window created successfully"),
                    Err(e) => {
                        error!("Failed to create renderer: {}", e);
                        event_loop.exit();
                    }
                }
            }
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size);
                }
            }
            WindowEvent::RedrawRequested => {
                self.process_frame();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let file_config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let settings = Settings::from(file_config.merge(args.into_config()));

    info!("Starting Retroshade...");

    let addons = Rc::new(BuiltinAddons::new());
    let factory = Rc::new(RefCell::new(ShaderPresetFactory::new(addons)));
    info!("Preset formats: {}", factory.borrow().extensions().join(", "));

    let frame = load_input(&settings)?;

    match settings.mode {
        Mode::Window => run_window_mode(settings, factory, frame),
        Mode::File => run_file_mode(settings, factory, frame),
    }
}

/// Run in window output mode (default).
fn run_window_mode(settings: Settings, factory: Rc<RefCell<ShaderPresetFactory>>, frame: VideoFrame) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = RetroshadeApp::new(settings, factory, frame);
    event_loop.run_app(&mut app)?;

    Ok(())
}

/// Render offscreen and save the last frame.
fn run_file_mode(settings: Settings, factory: Rc<RefCell<ShaderPresetFactory>>, frame: VideoFrame) -> Result<()> {
    let preset_path = settings
        .preset
        .clone()
        .ok_or_else(|| anyhow!("File mode needs a shader preset"))?;

    let context = GpuContext::headless()?;
    info!("Using {} adapter", context.api_name());

    let target = WgpuShaderTexture::render_target(
        &context.device,
        "Output Texture",
        settings.viewport.width,
        settings.viewport.height,
        wgpu::TextureFormat::Rgba8Unorm,
    );

    let preset = create_preset(&context, &factory, &settings, &frame);
    let mut renderer = PresetRenderer::new(preset);
    let mut output = ImageOutput::new(settings.output.clone());

    for index in 0..settings.frames {
        if !renderer.render(&frame, &target) {
            let state = renderer.preset().state();
            return Err(anyhow!("Shader preset {:?} is unavailable ({:?})", preset_path, state));
        }
        debug!("Rendered frame {}", index);
    }

    let shaded = target.read_back(&context.device, &context.queue)?;
    output.write_frame(&shaded)?;
    info!(
        "Rendered {} frame(s) of {:?} through {} pass(es)",
        settings.frames,
        preset_path,
        renderer.preset().passes().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_viewport_fills_missing_axis() {
        let args = Args::parse_from(["retroshade", "--width", "640", "--mode", "file"]);
        let config = args.into_config();
        assert_eq!(config.viewport, Some(Viewport { width: 640, height: 720 }));
        assert_eq!(config.mode, Some(Mode::File));
        assert_eq!(config.watch, None);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from(Config::default());
        assert_eq!(settings.output, PathBuf::from("output.png"));
        assert_eq!(settings.viewport, Viewport::default());
        assert_eq!(settings.speed, 1.0);
        assert_eq!(settings.frames, 1);
        assert_eq!(settings.mode, Mode::Window);
        assert!(!settings.watch);
    }
}
