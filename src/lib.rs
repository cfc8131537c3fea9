//! Retroshade: multi-pass video shader presets for emulator output
//!
//! Loads RetroPlayer-style shader presets through add-on supplied loaders,
//! builds the pass chain on the GPU and renders video frames through it.

pub mod addons;
pub mod config;
pub mod frame;
pub mod output;
pub mod presets;
pub mod shader;
pub mod utils;
pub mod watcher;
