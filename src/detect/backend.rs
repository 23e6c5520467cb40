use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// Backends are opaque capabilities the pipeline calls synchronously, once per
/// frame. The frame is always at the canonical resolution
/// (`CANONICAL_WIDTH` x `CANONICAL_HEIGHT`) and returned boxes are expected in
/// that coordinate space.
///
/// Implementations:
/// - MUST treat the frame as read-only and must not retain it past the call
/// - MAY return detections in any order
/// - MAY return detections below the user-facing confidence threshold; the
///   pipeline applies a single gate after inference
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a canonical frame.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
