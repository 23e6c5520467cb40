//! Deterministic synthetic frames for `stub://` origins.

use crate::frame::Frame;

pub(crate) struct SyntheticScene {
    width: u32,
    height: u32,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticScene {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_count: 0,
            scene_state: 0,
        }
    }

    pub(crate) fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    /// Produce the next frame. The pattern shifts every frame and the scene
    /// changes every 50 frames.
    pub(crate) fn next_frame(&mut self) -> Frame {
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (self.width as usize) * (self.height as usize) * 3;
        let offset = self.frame_count + self.scene_state as u64;
        let pixels = (0..pixel_count)
            .map(|i| ((i as u64 + offset) % 256) as u8)
            .collect();
        let image = image::RgbImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height));
        Frame::new(self.frame_count, image)
    }
}
