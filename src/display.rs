//! Annotated-frame output.
//!
//! The pipeline publishes every processed frame exactly once, in source
//! order, to a `FrameSink`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::frame::AnnotatedFrame;

pub trait FrameSink: Send {
    fn publish(&mut self, frame: &AnnotatedFrame) -> Result<()>;
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullSink {
    published: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl FrameSink for NullSink {
    fn publish(&mut self, _frame: &AnnotatedFrame) -> Result<()> {
        self.published += 1;
        Ok(())
    }
}

/// Writes each frame to `frame_{index:06}.jpg` under a directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.jpg"))
    }
}

impl FrameSink for DirectorySink {
    fn publish(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        let path = self.frame_path(frame.index);
        frame
            .image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Keeps only the most recent frame, overwriting one file. Writes go to a
/// sibling temp file first so readers never see a half-written image.
#[derive(Debug)]
pub struct LatestFrameSink {
    path: PathBuf,
    staging: PathBuf,
}

impl LatestFrameSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output dir {}", parent.display()))?;
        }
        let file_name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?
            .to_string_lossy()
            .into_owned();
        let staging = path.with_file_name(format!(".{file_name}.partial"));
        Ok(Self { path, staging })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for LatestFrameSink {
    fn publish(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        let format = image::ImageFormat::from_path(&self.path)
            .with_context(|| format!("unsupported output format {}", self.path.display()))?;
        frame
            .image
            .save_with_format(&self.staging, format)
            .with_context(|| format!("failed to write {}", self.staging.display()))?;
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }
}
