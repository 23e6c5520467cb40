//! Single still-image source.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceKind};
use crate::frame::Frame;

/// Yields the decoded image once, then end of stream.
pub struct ImageSource {
    path: PathBuf,
    pending: Option<Frame>,
    frames_captured: u64,
}

impl ImageSource {
    /// Decode the image eagerly so a missing or corrupt file fails at open.
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        let frame = Frame::new(1, decoded.to_rgb8());
        log::info!(
            "ImageSource: opened {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        Ok(Self {
            path: path.to_path_buf(),
            pending: Some(frame),
            frames_captured: 0,
        })
    }
}

impl FrameSource for ImageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Image
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.pending.take();
        if frame.is_some() {
            self.frames_captured += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.pending = None;
        log::debug!("ImageSource: closed {}", self.path.display());
    }

    fn frames_captured(&self) -> u64 {
        self.frames_captured
    }
}
