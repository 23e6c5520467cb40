//! Frame containers.
//!
//! - `Frame`: one decoded RGB frame as produced by a `FrameSource`.
//! - `AnnotatedFrame`: the canonical-resolution frame after annotation, as
//!   handed to the display sink.
//!
//! Detection models only ever see frames at the canonical resolution, so that
//! bounding boxes are reproducible regardless of the source resolution.

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbImage;
use std::time::SystemTime;

use crate::ingest::SourceKind;

/// Canonical inference width in pixels.
pub const CANONICAL_WIDTH: u32 = 640;

/// Canonical inference height in pixels.
pub const CANONICAL_HEIGHT: u32 = 480;

/// A decoded RGB frame.
pub struct Frame {
    /// 1-based position of this frame in source order.
    pub index: u64,
    /// Wall-clock capture time.
    pub captured_at: SystemTime,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            captured_at: SystemTime::now(),
            image,
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let len = pixels.len();
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!(
                "RGB buffer of {} bytes does not match {}x{} frame",
                len,
                width,
                height
            )
        })?;
        Ok(Self::new(index, image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Resize to the canonical inference resolution. Frames already at the
    /// canonical size are passed through untouched.
    pub fn into_canonical(self) -> Frame {
        if self.image.width() == CANONICAL_WIDTH && self.image.height() == CANONICAL_HEIGHT {
            return self;
        }
        let image = image::imageops::resize(
            &self.image,
            CANONICAL_WIDTH,
            CANONICAL_HEIGHT,
            FilterType::Triangle,
        );
        Frame {
            index: self.index,
            captured_at: self.captured_at,
            image,
        }
    }

    pub(crate) fn into_image(self) -> RgbImage {
        self.image
    }
}

/// A canonical-resolution frame with annotations rendered onto it.
pub struct AnnotatedFrame {
    pub index: u64,
    pub captured_at: SystemTime,
    pub source: SourceKind,
    pub image: RgbImage,
    /// Label texts drawn on this frame, in draw order.
    pub labels: Vec<String>,
    /// True when inference failed and the frame is published unannotated.
    pub inference_skipped: bool,
}
