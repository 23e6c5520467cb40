//! Alert suppression.
//!
//! `AlertPolicy` is edge-triggered per label: a watched label raises one
//! `AlertEvent` when it appears in a frame after being absent from the
//! previous evaluated frame, and stays silent while it remains present. A
//! frame with no watched labels returns the policy to `Idle`, so the next
//! appearance alerts again.

use serde::Serialize;
use std::collections::BTreeSet;
use std::time::SystemTime;

use crate::annotate::{ceil_percent, LabeledDetection};
use crate::ingest::SourceKind;

/// A watched label newly present in a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertEvent {
    pub label: String,
    pub frame_timestamp: SystemTime,
    pub frame_index: u64,
    #[serde(serialize_with = "serialize_kind")]
    pub source: SourceKind,
    /// Highest confidence among this frame's detections of `label`.
    pub confidence: f32,
}

fn serialize_kind<S: serde::Serializer>(kind: &SourceKind, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(kind)
}

impl AlertEvent {
    /// Confidence as a whole percentage, rounded up like the frame label.
    pub fn percent(&self) -> u32 {
        ceil_percent(self.confidence)
    }
}

/// Frame metadata an alert is stamped with.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    pub index: u64,
    pub captured_at: SystemTime,
    pub source: SourceKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Alerting,
}

#[derive(Clone, Debug)]
pub struct AlertPolicy {
    state: AlertState,
    present: BTreeSet<String>,
    last_alert_label: Option<String>,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertPolicy {
    pub fn new() -> Self {
        Self {
            state: AlertState::Idle,
            present: BTreeSet::new(),
            last_alert_label: None,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Label of the most recent alert emitted in this session.
    pub fn last_alert_label(&self) -> Option<&str> {
        self.last_alert_label.as_deref()
    }

    /// Watched labels present in the last evaluated frame.
    pub fn present(&self) -> &BTreeSet<String> {
        &self.present
    }

    /// Evaluate one frame's gated detections. Returns the alerts to dispatch,
    /// ordered by label.
    pub fn evaluate(&mut self, detections: &[LabeledDetection], frame: FrameContext) -> Vec<AlertEvent> {
        let mut current: BTreeSet<String> = BTreeSet::new();
        for det in detections.iter().filter(|d| d.watched) {
            current.insert(det.label.clone());
        }

        let events: Vec<AlertEvent> = current
            .difference(&self.present)
            .map(|label| AlertEvent {
                label: label.clone(),
                frame_timestamp: frame.captured_at,
                frame_index: frame.index,
                source: frame.source,
                confidence: best_confidence(detections, label),
            })
            .collect();

        if let Some(last) = events.last() {
            self.last_alert_label = Some(last.label.clone());
        }
        self.state = if current.is_empty() {
            AlertState::Idle
        } else {
            AlertState::Alerting
        };
        self.present = current;
        events
    }
}

fn best_confidence(detections: &[LabeledDetection], label: &str) -> f32 {
    detections
        .iter()
        .filter(|d| d.label == label)
        .map(|d| d.confidence)
        .fold(0.0, f32::max)
}
