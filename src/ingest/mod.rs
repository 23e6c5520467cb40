//! Frame acquisition.
//!
//! Three origins produce frames:
//! - a single still image (`ImageSource`), one frame then end of stream
//! - a recorded video (`VideoSource`): `stub://N` synthetic clips, a directory
//!   of still images, or an FFmpeg-decoded file (feature: video-ffmpeg)
//! - a live camera (`CameraSource`): `stub://` synthetic devices or V4L2
//!   devices (feature: camera-v4l2), unbounded until cancelled
//!
//! Every source follows the same lifecycle: `open_source` either returns a
//! ready source or fails with `PipelineError::SourceUnavailable`;
//! `next_frame` yields frames in order and `Ok(None)` at end of stream;
//! `close` releases the underlying handle. Sources never log pixel content.

pub mod camera;
pub mod still;
#[cfg(feature = "camera-v4l2")]
mod normalize;
mod synthetic;
pub mod video;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod video_ffmpeg;

pub use self::camera::{CameraConfig, CameraSource};
pub use self::still::ImageSource;
pub use self::video::VideoSource;

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::frame::Frame;

/// Which kind of origin a frame came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Image,
    Video,
    Camera,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Image => "image",
            SourceKind::Video => "video",
            SourceKind::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// Where a session reads its frames from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Image(PathBuf),
    /// File path, directory of stills, or `stub://N`.
    Video(String),
    Camera(CameraConfig),
}

impl Origin {
    pub fn kind(&self) -> SourceKind {
        match self {
            Origin::Image(_) => SourceKind::Image,
            Origin::Video(_) => SourceKind::Video,
            Origin::Camera(_) => SourceKind::Camera,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Image(path) => write!(f, "image {}", path.display()),
            Origin::Video(path) => write!(f, "video {}", path),
            Origin::Camera(config) => write!(f, "camera {}", config.device),
        }
    }
}

/// A pull-based stream of frames.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    /// Next frame in source order, or `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying file, decoder, or device handle.
    fn close(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Number of frames produced so far.
    fn frames_captured(&self) -> u64;
}

/// Open `origin`. Any failure is reported as `PipelineError::SourceUnavailable`.
pub fn open_source(origin: &Origin) -> Result<Box<dyn FrameSource>> {
    let opened: Result<Box<dyn FrameSource>> = match origin {
        Origin::Image(path) => ImageSource::open(path).map(|s| Box::new(s) as Box<dyn FrameSource>),
        Origin::Video(path) => VideoSource::open(path).map(|s| Box::new(s) as Box<dyn FrameSource>),
        Origin::Camera(config) => {
            CameraSource::open(config.clone()).map(|s| Box::new(s) as Box<dyn FrameSource>)
        }
    };
    opened.map_err(|err| {
        log::warn!("failed to open {}: {:#}", origin, err);
        anyhow::Error::new(PipelineError::source_unavailable(origin.to_string(), &err))
    })
}

fn is_stub(path: &str) -> bool {
    path.starts_with("stub://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_is_source_unavailable() {
        let err = match open_source(&Origin::Image(PathBuf::from("/nonexistent/cat.jpg"))) {
            Ok(_) => panic!("missing image must not open"),
            Err(err) => err,
        };
        let pipeline = err
            .downcast_ref::<PipelineError>()
            .expect("classified error");
        assert!(pipeline.is_source_unavailable());
    }

    #[test]
    fn stub_origins_open() -> Result<()> {
        let mut video = open_source(&Origin::Video("stub://3".into()))?;
        assert_eq!(video.kind(), SourceKind::Video);
        assert!(video.next_frame()?.is_some());
        video.close();

        let mut camera = open_source(&Origin::Camera(CameraConfig {
            device: "stub://cam".into(),
            ..CameraConfig::default()
        }))?;
        assert_eq!(camera.kind(), SourceKind::Camera);
        assert!(camera.next_frame()?.is_some());
        camera.close();
        Ok(())
    }
}
