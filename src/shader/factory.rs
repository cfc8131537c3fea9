//! Extension based registry of preset loaders.

use super::types::ShaderPass;
use crate::addons::{AddonEvent, ShaderAddonManager, ShaderPresetAddon, Subscription};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while reading a preset description.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("no preset loader registered for {0:?}")]
    UnsupportedExtension(PathBuf),
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?}:{line}: {message}")]
    Parse { path: PathBuf, line: usize, message: String },
    #[error("invalid YAML preset {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("preset {path:?} is missing key `{key}`")]
    MissingKey { path: PathBuf, key: String },
    #[error("preset {path:?} has invalid value {value:?} for `{key}`")]
    InvalidValue { path: PathBuf, key: String, value: String },
    #[error("preset {0:?} declares no shader passes")]
    NoPasses(PathBuf),
}

/// Parses one preset file format into shader passes.
pub trait PresetLoader {
    fn load_preset(&self, path: &Path) -> Result<Vec<ShaderPass>, PresetError>;
}

/// Maps preset file extensions to the loaders of enabled shader add-ons.
pub struct ShaderPresetFactory {
    addons: Rc<dyn ShaderAddonManager>,
    loaders: HashMap<String, Rc<dyn PresetLoader>>,
    shader_addons: Vec<ShaderPresetAddon>,
    failed_addons: Vec<String>,
    events: Receiver<AddonEvent>,
    _subscription: Subscription,
}

impl ShaderPresetFactory {
    /// Creates the factory, registers all shader add-ons and starts listening
    /// for add-on changes.
    pub fn new(addons: Rc<dyn ShaderAddonManager>) -> Self {
        let (subscription, events) = addons.events().subscribe();
        let mut factory = Self {
            addons,
            loaders: HashMap::new(),
            shader_addons: Vec::new(),
            failed_addons: Vec::new(),
            events,
            _subscription: subscription,
        };
        factory.update_addons();
        factory
    }

    /// Registers `loader` for `extension`. The leading dot is optional.
    pub fn register_loader(&mut self, loader: Rc<dyn PresetLoader>, extension: &str) {
        if extension.is_empty() {
            return;
        }
        self.loaders.insert(canonical_extension(extension), loader);
    }

    /// Removes every extension mapping that points at `loader`.
    pub fn unregister_loader(&mut self, loader: &Rc<dyn PresetLoader>) {
        self.loaders.retain(|_, registered| !same_loader(registered, loader));
    }

    pub fn load_preset(&self, preset_path: &Path) -> Result<Vec<ShaderPass>, PresetError> {
        let loader = self
            .loader_for(preset_path)
            .ok_or_else(|| PresetError::UnsupportedExtension(preset_path.to_path_buf()))?;
        loader.load_preset(preset_path)
    }

    pub fn can_load_preset(&self, preset_path: &Path) -> bool {
        self.loader_for(preset_path).is_some()
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }

    /// Drains pending add-on events. Returns true if the add-ons were rescanned.
    pub fn process_events(&mut self) -> bool {
        let mut rescan = false;
        while let Ok(event) = self.events.try_recv() {
            rescan |= Self::needs_rescan(&event);
        }
        if rescan {
            self.update_addons();
        }
        rescan
    }

    fn needs_rescan(event: &AddonEvent) -> bool {
        match event {
            AddonEvent::Enabled(id) | AddonEvent::Disabled(id) | AddonEvent::Uninstalled(id) => {
                debug!("Add-on {} changed, rescanning shader preset loaders", id);
                true
            }
            AddonEvent::Other(_) => false,
        }
    }

    fn loader_for(&self, preset_path: &Path) -> Option<&Rc<dyn PresetLoader>> {
        let extension = preset_path.extension()?.to_str()?;
        self.loaders.get(&canonical_extension(extension))
    }

    fn update_addons(&mut self) {
        let addon_infos = self.addons.shader_addon_infos();

        // Look for removed or disabled add-ons
        let old_addons = std::mem::take(&mut self.shader_addons);
        for addon in old_addons {
            if addon_infos.iter().any(|info| info.id == addon.id) {
                self.shader_addons.push(addon);
            } else {
                info!("Unregistering shader preset add-on {}", addon.id);
                self.unregister_loader(&addon.loader);
            }
        }

        // Look for new add-ons
        for info in &addon_infos {
            if self.shader_addons.iter().any(|addon| addon.id == info.id) {
                continue;
            }
            if self.failed_addons.contains(&info.id) {
                continue;
            }

            match self.addons.create_addon(info) {
                Ok(addon) => {
                    info!("Registering shader preset add-on {} ({})", addon.id, addon.extensions.join(", "));
                    for extension in &addon.extensions {
                        self.register_loader(addon.loader.clone(), extension);
                    }
                    self.shader_addons.push(addon);
                }
                Err(e) => {
                    warn!("Failed to create shader preset add-on {}: {}", info.id, e);
                    self.failed_addons.push(info.id.clone());
                }
            }
        }
    }
}

fn canonical_extension(extension: &str) -> String {
    let extension = extension.to_ascii_lowercase();
    if extension.starts_with('.') {
        extension
    } else {
        format!(".{}", extension)
    }
}

fn same_loader(a: &Rc<dyn PresetLoader>, b: &Rc<dyn PresetLoader>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}
