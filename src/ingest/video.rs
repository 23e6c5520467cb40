//! Recorded video source.
//!
//! `VideoSource` selects a backend from the origin string:
//! - `stub://N`: N synthetic 640x480 frames (`stub://name` yields
//!   `SYNTHETIC_CLIP_FRAMES`)
//! - a directory: every `.jpg`/`.jpeg`/`.png` inside, in lexicographic order
//! - any other path: decoded with FFmpeg (feature: video-ffmpeg)
//!
//! The source only reads local paths; URL schemes other than `stub://` are
//! rejected at open.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::synthetic::SyntheticScene;
#[cfg(feature = "video-ffmpeg")]
use super::video_ffmpeg::FfmpegVideoSource;
use super::{is_stub, FrameSource, SourceKind};
use crate::frame::Frame;

/// Length of a `stub://` clip whose name is not a frame count.
pub const SYNTHETIC_CLIP_FRAMES: u64 = 100;

const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct VideoSource {
    path: String,
    backend: Option<VideoBackend>,
}

enum VideoBackend {
    Synthetic(SyntheticClip),
    Directory(StillSequence),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegVideoSource),
}

impl VideoSource {
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_path(path) {
            return Err(anyhow!(
                "video ingestion only supports local paths (no URL schemes)"
            ));
        }
        let backend = if is_stub(path) {
            VideoBackend::Synthetic(SyntheticClip::new(path))
        } else if Path::new(path).is_dir() {
            VideoBackend::Directory(StillSequence::open(Path::new(path))?)
        } else {
            open_decoder(path)?
        };
        let source = Self {
            path: path.to_string(),
            backend: Some(backend),
        };
        log::info!("VideoSource: opened {} ({})", path, source.backend_name());
        Ok(source)
    }

    fn backend_name(&self) -> &'static str {
        match &self.backend {
            Some(VideoBackend::Synthetic(_)) => "synthetic",
            Some(VideoBackend::Directory(_)) => "directory",
            #[cfg(feature = "video-ffmpeg")]
            Some(VideoBackend::Ffmpeg(_)) => "ffmpeg",
            None => "closed",
        }
    }
}

#[cfg(feature = "video-ffmpeg")]
fn open_decoder(path: &str) -> Result<VideoBackend> {
    Ok(VideoBackend::Ffmpeg(FfmpegVideoSource::open(path)?))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_decoder(path: &str) -> Result<VideoBackend> {
    if !Path::new(path).exists() {
        return Err(anyhow!("video file {} does not exist", path));
    }
    Err(anyhow!(
        "decoding video files requires the video-ffmpeg feature"
    ))
}

impl FrameSource for VideoSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            Some(VideoBackend::Synthetic(source)) => Ok(source.next_frame()),
            Some(VideoBackend::Directory(source)) => source.next_frame(),
            #[cfg(feature = "video-ffmpeg")]
            Some(VideoBackend::Ffmpeg(source)) => source.next_frame(),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if self.backend.take().is_some() {
            log::info!("VideoSource: closed {}", self.path);
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            #[cfg(feature = "video-ffmpeg")]
            Some(VideoBackend::Ffmpeg(source)) => source.is_healthy(),
            Some(_) => true,
            None => false,
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            Some(VideoBackend::Synthetic(source)) => source.scene.frames_generated(),
            Some(VideoBackend::Directory(source)) => source.cursor as u64,
            #[cfg(feature = "video-ffmpeg")]
            Some(VideoBackend::Ffmpeg(source)) => source.frames_captured(),
            None => 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic clip (stub://)
// ----------------------------------------------------------------------------

struct SyntheticClip {
    scene: SyntheticScene,
    total: u64,
}

impl SyntheticClip {
    fn new(path: &str) -> Self {
        let total = path
            .trim_start_matches("stub://")
            .parse()
            .unwrap_or(SYNTHETIC_CLIP_FRAMES);
        Self {
            scene: SyntheticScene::new(640, 480),
            total,
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.scene.frames_generated() >= self.total {
            return None;
        }
        Some(self.scene.next_frame())
    }
}

// ----------------------------------------------------------------------------
// Directory of stills
// ----------------------------------------------------------------------------

struct StillSequence {
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl StillSequence {
    fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
        {
            let path = entry?.path();
            let is_still = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| STILL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_still && path.is_file() {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(anyhow!("{} contains no image frames", dir.display()));
        }
        paths.sort();
        Ok(Self { paths, cursor: 0 })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        Ok(Some(Frame::new(self.cursor as u64, decoded.to_rgb8())))
    }
}

fn is_local_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_stub(path) {
        return true;
    }
    !path.contains("://")
}
