//! Live camera source.
//!
//! Uses V4L2 for real devices (feature: camera-v4l2), with a synthetic
//! fallback for `stub://` device paths. A camera never reports end of stream
//! on its own; sessions end on cancellation or a read failure.

use anyhow::{anyhow, Result};

use super::synthetic::SyntheticScene;
use super::{is_stub, FrameSource, SourceKind};
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://name`.
    pub device: String,
    /// Requested frame rate. Devices may ignore it.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

pub struct CameraSource {
    device: String,
    backend: Option<CameraBackend>,
}

enum CameraBackend {
    Synthetic(SyntheticScene),
    #[cfg(feature = "camera-v4l2")]
    Device(v4l2::DeviceCamera),
}

impl CameraSource {
    pub fn open(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero (got {}x{})",
                config.width,
                config.height
            ));
        }
        let backend = if is_stub(&config.device) {
            log::info!("CameraSource: connected to {} (synthetic)", config.device);
            CameraBackend::Synthetic(SyntheticScene::new(config.width, config.height))
        } else {
            open_device(&config)?
        };
        Ok(Self {
            device: config.device,
            backend: Some(backend),
        })
    }
}

#[cfg(feature = "camera-v4l2")]
fn open_device(config: &CameraConfig) -> Result<CameraBackend> {
    Ok(CameraBackend::Device(v4l2::DeviceCamera::open(config)?))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device(config: &CameraConfig) -> Result<CameraBackend> {
    Err(anyhow!(
        "camera {} requires the camera-v4l2 feature",
        config.device
    ))
}

impl FrameSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            Some(CameraBackend::Synthetic(scene)) => Ok(Some(scene.next_frame())),
            #[cfg(feature = "camera-v4l2")]
            Some(CameraBackend::Device(device)) => device.next_frame().map(Some),
            None => Err(anyhow!("camera {} is closed", self.device)),
        }
    }

    fn close(&mut self) {
        if self.backend.take().is_some() {
            log::info!("CameraSource: released {}", self.device);
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            Some(CameraBackend::Synthetic(_)) => true,
            #[cfg(feature = "camera-v4l2")]
            Some(CameraBackend::Device(device)) => device.is_healthy(),
            None => false,
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            Some(CameraBackend::Synthetic(scene)) => scene.frames_generated(),
            #[cfg(feature = "camera-v4l2")]
            Some(CameraBackend::Device(device)) => device.frames_captured(),
            None => 0,
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 device capture
// ----------------------------------------------------------------------------

#[cfg(feature = "camera-v4l2")]
mod v4l2 {
    use anyhow::{Context, Result};
    use ouroboros::self_referencing;
    use std::time::{Duration, Instant};

    use super::CameraConfig;
    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};

    pub(super) struct DeviceCamera {
        config: CameraConfig,
        state: DeviceState,
        format: PixelFormat,
        width: u32,
        height: u32,
        frame_count: u64,
        last_frame_at: Option<Instant>,
        last_error: Option<String>,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceCamera {
        pub(super) fn open(config: &CameraConfig) -> Result<Self> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&config.device)
                .with_context(|| format!("open v4l2 device {}", config.device))?;
            let mut format = device.format().context("read v4l2 format")?;
            format.width = config.width;
            format.height = config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "CameraSource: failed to set format on {}: {}",
                        config.device,
                        err
                    );
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };
            let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr)
                .with_context(|| format!("unsupported v4l2 pixel format {}", format.fourcc))?;

            if config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "CameraSource: failed to set fps on {}: {}",
                        config.device,
                        err
                    );
                }
            }

            let state = DeviceStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()?;

            log::info!(
                "CameraSource: connected to {} ({}x{} {:?})",
                config.device,
                format.width,
                format.height,
                pixel_format
            );
            Ok(Self {
                config: config.clone(),
                state,
                format: pixel_format,
                width: format.width,
                height: format.height,
                frame_count: 0,
                last_frame_at: None,
                last_error: None,
            })
        }

        pub(super) fn next_frame(&mut self) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let (width, height, format) = (self.width, self.height, self.format);
            let pixels = self
                .state
                .with_mut(|fields| {
                    fields
                        .stream
                        .next()
                        .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
                        .and_then(|(buf, _meta)| normalize_to_rgb(buf, width, height, format))
                })
                .map_err(|err| {
                    self.last_error = Some(err.to_string());
                    err
                })?;

            self.frame_count += 1;
            self.last_frame_at = Some(Instant::now());
            Frame::from_rgb(self.frame_count, width, height, pixels)
        }

        pub(super) fn is_healthy(&self) -> bool {
            if self.last_error.is_some() {
                return false;
            }
            let Some(last_frame_at) = self.last_frame_at else {
                return true;
            };
            last_frame_at.elapsed() <= self.health_grace()
        }

        pub(super) fn frames_captured(&self) -> u64 {
            self.frame_count
        }

        fn health_grace(&self) -> Duration {
            let base_ms = if self.config.target_fps == 0 {
                2_000
            } else {
                (1000 / self.config.target_fps).saturating_mul(6)
            };
            Duration::from_millis(base_ms.max(2_000) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 10,
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn stub_camera_streams_at_configured_resolution() -> Result<()> {
        let mut source = CameraSource::open(stub_config())?;
        for expected in 1..=20 {
            let frame = source.next_frame()?.expect("camera never ends");
            assert_eq!(frame.index, expected);
            assert_eq!((frame.width(), frame.height()), (1280, 720));
        }
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn closed_camera_reports_read_errors() -> Result<()> {
        let mut source = CameraSource::open(stub_config())?;
        source.close();
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let config = CameraConfig {
            width: 0,
            ..stub_config()
        };
        assert!(CameraSource::open(config).is_err());
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn device_paths_need_v4l2_support() {
        assert!(CameraSource::open(CameraConfig::default()).is_err());
    }
}
