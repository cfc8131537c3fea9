use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use tracing::{info, warn};

/// Watches the directory of a preset so edits to the preset or its
/// shaders can trigger a reload.
pub struct PresetWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<Result<Event, notify::Error>>,
}

impl PresetWatcher {
    pub fn new(preset: &Path) -> Option<Self> {
        let dir = match preset.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let (tx, rx) = channel();

        match RecommendedWatcher::new(tx, notify::Config::default()) {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
                    warn!("Failed to watch preset directory {:?}: {}", dir, e);
                    return None;
                }
                info!("Watching {:?} for preset changes", dir);
                Some(Self {
                    dir,
                    _watcher: watcher,
                    rx,
                })
            }
            Err(e) => {
                warn!("Failed to create preset watcher: {}", e);
                None
            }
        }
    }

    /// Drains pending events. Returns true if anything was written.
    pub fn check_for_changes(&mut self) -> bool {
        let mut changed = false;
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) => changed |= is_reload_event(&event),
                Err(e) => warn!("Watch error in {:?}: {}", self.dir, e),
            }
        }
        if changed {
            info!("Preset files in {:?} changed", self.dir);
        }
        changed
    }
}

fn is_reload_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_writes_trigger_reload() {
        assert!(is_reload_event(&Event::new(EventKind::Modify(ModifyKind::Any))));
        assert!(is_reload_event(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(!is_reload_event(&Event::new(EventKind::Access(AccessKind::Any))));
    }
}
