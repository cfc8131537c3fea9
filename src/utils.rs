use crate::shader::{DestQuad, Float2, Rect};
use std::time::{Duration, Instant};

/// A utility for tracking frames per second.
pub struct FpsCounter {
    frame_count: u32,
    last_time: Instant,
    interval: Duration,
}

impl FpsCounter {
    /// Create a new FPS counter reporting once per second.
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            last_time: Instant::now(),
            interval: Duration::from_secs(1),
        }
    }

    /// Update the counter with a new frame.
    /// Returns Some(fps) if the reporting interval has passed, otherwise None.
    pub fn update(&mut self) -> Option<f32> {
        self.frame_count += 1;
        let elapsed = self.last_time.elapsed();

        if elapsed >= self.interval {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            self.frame_count = 0;
            self.last_time = Instant::now();
            Some(fps)
        } else {
            None
        }
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest rectangle with the aspect ratio of `video` that fits centered
/// in `target`.
pub fn letterbox(video: Float2, target: Float2) -> Rect {
    if video.x <= 0.0 || video.y <= 0.0 {
        return Rect::from_size(target);
    }
    let scale = (target.x / video.x).min(target.y / video.y);
    let width = (video.x * scale).round();
    let height = (video.y * scale).round();
    Rect::new(
        ((target.x - width) / 2.0).floor(),
        ((target.y - height) / 2.0).floor(),
        width,
        height,
    )
}

/// Corners of `rect`: top-left, top-right, bottom-right, bottom-left.
pub fn dest_quad(rect: Rect) -> DestQuad {
    [
        Float2::new(rect.x, rect.y),
        Float2::new(rect.x + rect.width, rect.y),
        Float2::new(rect.x + rect.width, rect.y + rect.height),
        Float2::new(rect.x, rect.y + rect.height),
    ]
}
