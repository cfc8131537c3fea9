//! Image file output for headless rendering.

use super::OutputBackend;
use crate::frame::VideoFrame;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

/// Saves each written frame to an image file, replacing the previous one.
pub struct ImageOutput {
    path: PathBuf,
    frames_written: u64,
}

impl ImageOutput {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl OutputBackend for ImageOutput {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        frame
            .save(&self.path)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        self.frames_written += 1;
        info!("Wrote {}x{} frame to {:?}", frame.width, frame.height, self.path);
        Ok(())
    }
}
