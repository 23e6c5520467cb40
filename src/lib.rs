//! Watchpost
//!
//! Frame-by-frame fire and animal detection with alerting.
//!
//! # Architecture
//!
//! A session pulls frames from one origin (still image, recorded video, or
//! live camera), runs them through an object detector, and for each frame:
//!
//! 1. **Gate**: detections below the confidence threshold are dropped.
//! 2. **Annotate**: surviving detections are drawn as a box plus a
//!    `"{label} {percent}%"` strip on the frame.
//! 3. **Alert**: a watched label appearing after an absence raises one
//!    alert, delivered to every configured sink (log, sound, email, MQTT).
//! 4. **Publish**: the annotated frame goes to the display sink.
//!
//! Detection sessions require a login against the local credential store.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (`ImageSource`, `VideoSource`, `CameraSource`)
//! - `detect`: detector backends (stub, scripted, ONNX via tract) and YOLO decoding
//! - `catalog`: class-label catalogs for the fire and animal profiles
//! - `annotate`: confidence gate and box/label rendering
//! - `alert`: edge-triggered alert policy
//! - `notify`: alert transports and the dispatcher
//! - `display`: annotated-frame sinks
//! - `pipeline`: `StreamSession`, `StreamController`, cancellation
//! - `auth`: user signup/login over a SQLite credential store
//! - `config`: file + environment configuration

pub mod alert;
pub mod annotate;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod pipeline;

pub use alert::{AlertEvent, AlertPolicy, AlertState};
pub use annotate::{ConfidenceGate, FrameAnnotator, LabeledDetection};
pub use auth::{Authenticator, CredentialError, CredentialStore, SqliteCredentialStore};
pub use catalog::{ClassCatalog, DetectionProfile};
pub use config::WatchpostConfig;
pub use detect::{build_backend, BackendKind, BoundingBox, Detection, DetectorBackend};
pub use display::{DirectorySink, FrameSink, LatestFrameSink, NullSink};
pub use error::PipelineError;
pub use frame::{AnnotatedFrame, Frame};
pub use ingest::{CameraConfig, FrameSource, Origin, SourceKind};
pub use notify::{AlertDispatcher, NotificationSink};
pub use pipeline::{
    stop_channel, SessionEnd, SessionReport, StopHandle, StopSignal, StreamController,
    StreamSession,
};
