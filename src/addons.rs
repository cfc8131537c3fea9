//! Add-on manager boundary for shader preset loaders.
//!
//! Preset loaders are supplied by add-ons. The host owns an add-on manager
//! that lists enabled shader add-ons and publishes [`AddonEvent`]s; the
//! [`ShaderPresetFactory`](crate::shader::ShaderPresetFactory) subscribes
//! and rescans when add-ons come and go.

use crate::presets::{GlslpLoader, YamlPresetLoader};
use crate::shader::PresetLoader;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::mpsc::{channel, Receiver, Sender};
use thiserror::Error;
use tracing::debug;

/// Lifecycle notifications published by the add-on manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonEvent {
    Enabled(String),
    Disabled(String),
    Uninstalled(String),
    /// Anything else (metadata refresh, settings change, ...).
    Other(String),
}

#[derive(Debug, Error)]
pub enum AddonError {
    #[error("unknown add-on {0}")]
    Unknown(String),
    #[error("add-on {0} failed to initialize")]
    CreateFailed(String),
}

/// Identity of an installed add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonInfo {
    pub id: String,
    pub name: String,
}

/// An instantiated shader preset add-on and the extensions it handles.
pub struct ShaderPresetAddon {
    pub id: String,
    pub extensions: Vec<String>,
    pub loader: Rc<dyn PresetLoader>,
}

/// What the preset factory needs from the host's add-on manager.
pub trait ShaderAddonManager {
    /// Enabled add-ons of the shader preset type.
    fn shader_addon_infos(&self) -> Vec<AddonInfo>;

    fn create_addon(&self, info: &AddonInfo) -> Result<ShaderPresetAddon, AddonError>;

    fn events(&self) -> &AddonEvents;
}

type SubscriberList = RefCell<Vec<(u64, Sender<AddonEvent>)>>;

/// Publisher side of add-on events.
#[derive(Default)]
pub struct AddonEvents {
    subscribers: Rc<SubscriberList>,
    next_id: Cell<u64>,
}

impl AddonEvents {
    /// Registers a new subscriber. Events are delivered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self) -> (Subscription, Receiver<AddonEvent>) {
        let (tx, rx) = channel();
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push((id, tx));
        let subscription = Subscription {
            id,
            subscribers: Rc::downgrade(&self.subscribers),
        };
        (subscription, rx)
    }

    pub fn publish(&self, event: AddonEvent) {
        debug!("Add-on event: {:?}", event);
        self.subscribers
            .borrow_mut()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

/// Keeps a subscription alive; unsubscribes on drop.
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberList>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

pub const GLSLP_ADDON_ID: &str = "shader.presets.glslp";
pub const YAML_ADDON_ID: &str = "shader.presets.yaml";

struct BuiltinAddon {
    info: AddonInfo,
    extensions: &'static [&'static str],
    enabled: bool,
    installed: bool,
}

/// In-process add-on manager offering the bundled preset loaders.
pub struct BuiltinAddons {
    addons: RefCell<Vec<BuiltinAddon>>,
    events: AddonEvents,
}

impl BuiltinAddons {
    pub fn new() -> Self {
        let addons = vec![
            BuiltinAddon {
                info: AddonInfo {
                    id: GLSLP_ADDON_ID.to_string(),
                    name: "libretro GLSL presets".to_string(),
                },
                extensions: &[".glslp"],
                enabled: true,
                installed: true,
            },
            BuiltinAddon {
                info: AddonInfo {
                    id: YAML_ADDON_ID.to_string(),
                    name: "YAML presets".to_string(),
                },
                extensions: &[".yaml", ".yml"],
                enabled: true,
                installed: true,
            },
        ];
        Self {
            addons: RefCell::new(addons),
            events: AddonEvents::default(),
        }
    }

    /// Enables or disables an add-on and notifies subscribers.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), AddonError> {
        {
            let mut addons = self.addons.borrow_mut();
            let addon = addons
                .iter_mut()
                .find(|a| a.info.id == id && a.installed)
                .ok_or_else(|| AddonError::Unknown(id.to_string()))?;
            if addon.enabled == enabled {
                return Ok(());
            }
            addon.enabled = enabled;
        }
        let event = if enabled {
            AddonEvent::Enabled(id.to_string())
        } else {
            AddonEvent::Disabled(id.to_string())
        };
        self.events.publish(event);
        Ok(())
    }

    pub fn uninstall(&self, id: &str) -> Result<(), AddonError> {
        {
            let mut addons = self.addons.borrow_mut();
            let addon = addons
                .iter_mut()
                .find(|a| a.info.id == id && a.installed)
                .ok_or_else(|| AddonError::Unknown(id.to_string()))?;
            addon.installed = false;
            addon.enabled = false;
        }
        self.events.publish(AddonEvent::Uninstalled(id.to_string()));
        Ok(())
    }
}

impl Default for BuiltinAddons {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderAddonManager for BuiltinAddons {
    fn shader_addon_infos(&self) -> Vec<AddonInfo> {
        self.addons
            .borrow()
            .iter()
            .filter(|a| a.installed && a.enabled)
            .map(|a| a.info.clone())
            .collect()
    }

    fn create_addon(&self, info: &AddonInfo) -> Result<ShaderPresetAddon, AddonError> {
        let addons = self.addons.borrow();
        let addon = addons
            .iter()
            .find(|a| a.info.id == info.id && a.installed)
            .ok_or_else(|| AddonError::Unknown(info.id.clone()))?;

        let loader: Rc<dyn PresetLoader> = match addon.info.id.as_str() {
            GLSLP_ADDON_ID => Rc::new(GlslpLoader),
            YAML_ADDON_ID => Rc::new(YamlPresetLoader),
            other => return Err(AddonError::Unknown(other.to_string())),
        };

        Ok(ShaderPresetAddon {
            id: addon.info.id.clone(),
            extensions: addon.extensions.iter().map(|e| e.to_string()).collect(),
            loader,
        })
    }

    fn events(&self) -> &AddonEvents {
        &self.events
    }
}
