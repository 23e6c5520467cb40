//! Pipeline failure taxonomy.
//!
//! Fallible functions return `anyhow::Result`. When a failure needs to be
//! classified (session start vs. mid-stream read vs. inference vs. alert
//! delivery) it is wrapped in a `PipelineError` so callers can `downcast_ref`.

use std::fmt;

use crate::ingest::SourceKind;

#[derive(Debug)]
pub enum PipelineError {
    /// The origin could not be opened. The session never starts.
    SourceUnavailable { origin: String, reason: String },
    /// A frame read failed after the source was opened.
    ReadFailure { source: SourceKind, reason: String },
    /// The detection model failed on a single frame.
    InferenceFailure { frame_index: u64, reason: String },
    /// A notification transport failed to deliver an alert.
    NotificationFailure { sink: &'static str, reason: String },
}

impl PipelineError {
    pub fn source_unavailable(origin: impl Into<String>, err: &anyhow::Error) -> Self {
        PipelineError::SourceUnavailable {
            origin: origin.into(),
            reason: format!("{err:#}"),
        }
    }

    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, PipelineError::SourceUnavailable { .. })
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SourceUnavailable { origin, reason } => {
                write!(f, "source unavailable ({origin}): {reason}")
            }
            PipelineError::ReadFailure { source, reason } => {
                write!(f, "{source} read failure: {reason}")
            }
            PipelineError::InferenceFailure {
                frame_index,
                reason,
            } => write!(f, "inference failed on frame {frame_index}: {reason}"),
            PipelineError::NotificationFailure { sink, reason } => {
                write!(f, "notification via {sink} failed: {reason}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}
