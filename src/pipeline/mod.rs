//! The frame loop.
//!
//! `StreamController::run` drives one `StreamSession` to completion:
//!
//! ```text
//! loop {
//!     stop requested?            -> end (Cancelled)
//!     next frame                 -> end of stream: end (Exhausted)
//!     resize to 640x480
//!     detect -> gate -> annotate -> alert policy -> dispatch -> publish
//! }
//! close source
//! ```
//!
//! The stop signal is checked once per iteration, before the next frame is
//! pulled; a frame in flight always completes. Failures inside the loop are
//! handled in place and never escape `run`:
//! - video/image read failure: treated as end of stream
//! - camera read failure: the session ends (`SessionEnd::ReadFailure`)
//! - inference failure: the frame is published unannotated and the alert
//!   policy is not evaluated for it
//! - notification failure: logged and counted, the loop continues

mod session;
mod stop;

pub use session::StreamSession;
pub use stop::{stop_channel, StopHandle, StopSignal};

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::FrameContext;
use crate::annotate::{ConfidenceGate, FrameAnnotator};
use crate::catalog::ClassCatalog;
use crate::config::WatchpostConfig;
use crate::detect::{build_backend, DetectorBackend};
use crate::display::{FrameSink, NullSink};
use crate::error::PipelineError;
use crate::frame::{AnnotatedFrame, Frame};
use crate::ingest::SourceKind;
use crate::notify::AlertDispatcher;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Why a session stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The source reported end of stream.
    Exhausted,
    /// A stop was requested, or the frame limit was reached.
    Cancelled,
    /// A camera read failed; the reason is the failure message.
    ReadFailure(String),
}

/// Counters for one finished session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    /// Frames pulled from the source and published.
    pub frames_processed: u64,
    /// Published frames whose inference failed.
    pub frames_skipped: u64,
    pub alerts_emitted: u64,
    pub notification_failures: u64,
    pub end: SessionEnd,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            frames_processed: 0,
            frames_skipped: 0,
            alerts_emitted: 0,
            notification_failures: 0,
            end: SessionEnd::Exhausted,
        }
    }
}

pub struct StreamController {
    model: Box<dyn DetectorBackend>,
    catalog: Arc<ClassCatalog>,
    gate: ConfidenceGate,
    annotator: FrameAnnotator,
    dispatcher: AlertDispatcher,
    display: Box<dyn FrameSink>,
    max_frames: Option<u64>,
}

impl StreamController {
    /// Controller with the default annotator, a log-only dispatcher, and a
    /// display sink that discards frames.
    pub fn new(model: Box<dyn DetectorBackend>, catalog: Arc<ClassCatalog>, gate: ConfidenceGate) -> Self {
        Self {
            model,
            catalog,
            gate,
            annotator: FrameAnnotator::default(),
            dispatcher: AlertDispatcher::logging(),
            display: Box::new(NullSink::new()),
            max_frames: None,
        }
    }

    /// Controller for a loaded configuration: the configured catalog, model
    /// backend, threshold, and alert transports. Frames go to a null sink until
    /// `with_display` is called.
    pub fn from_config(config: &WatchpostConfig) -> Result<Self> {
        let catalog = Arc::new(config.catalog()?);
        let model = build_backend(&config.model, config.profile, &catalog)?;
        let dispatcher = AlertDispatcher::from_settings(&config.notify)?;
        log::info!("alert sinks: {}", dispatcher.sink_names().join(", "));
        Ok(Self::new(model, catalog, config.gate()?).with_dispatcher(dispatcher))
    }

    pub fn with_annotator(mut self, annotator: FrameAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_display(mut self, display: Box<dyn FrameSink>) -> Self {
        self.display = display;
        self
    }

    /// Stop each session after `limit` frames, as if cancelled.
    pub fn with_max_frames(mut self, limit: Option<u64>) -> Self {
        self.max_frames = limit;
        self
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn gate(&self) -> ConfidenceGate {
        self.gate
    }

    /// Drive `session` until it is exhausted, cancelled, or its camera fails.
    /// The session's source is closed before this returns; its alert policy
    /// stays readable afterwards.
    pub fn run(&mut self, session: &mut StreamSession, stop: &mut StopSignal) -> SessionReport {
        let mut report = SessionReport::new();
        let kind = session.kind();
        let mut last_health_log = Instant::now();

        log::info!(
            "{} session running with '{}' detector, threshold {}%",
            kind,
            self.model.name(),
            (self.gate.threshold() * 100.0).round()
        );

        loop {
            if stop.is_stopped() {
                log::info!("{} session cancelled", kind);
                report.end = SessionEnd::Cancelled;
                break;
            }
            if self
                .max_frames
                .is_some_and(|limit| report.frames_processed >= limit)
            {
                log::info!("{} session reached frame limit", kind);
                report.end = SessionEnd::Cancelled;
                break;
            }

            let frame = match session.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    report.end = SessionEnd::Exhausted;
                    break;
                }
                Err(err) => {
                    let failure = PipelineError::ReadFailure {
                        source: kind,
                        reason: format!("{err:#}"),
                    };
                    log::warn!("{}", failure);
                    report.end = match kind {
                        SourceKind::Camera => SessionEnd::ReadFailure(failure.to_string()),
                        SourceKind::Image | SourceKind::Video => SessionEnd::Exhausted,
                    };
                    break;
                }
            };

            self.process_frame(session, frame, &mut report);

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "{} health={} frames={} skipped={} alerts={}",
                    kind,
                    session.is_healthy(),
                    session.frames_captured(),
                    report.frames_skipped,
                    report.alerts_emitted
                );
                last_health_log = Instant::now();
            }
        }

        session.end();
        log::info!(
            "{} session ended ({:?}): {} frames, {} skipped, {} alerts",
            kind,
            report.end,
            report.frames_processed,
            report.frames_skipped,
            report.alerts_emitted
        );
        report
    }

    fn process_frame(&mut self, session: &mut StreamSession, frame: Frame, report: &mut SessionReport) {
        let frame = frame.into_canonical();
        let context = FrameContext {
            index: frame.index,
            captured_at: frame.captured_at,
            source: session.kind(),
        };

        let annotated = match self.model.detect(frame.image()) {
            Ok(raw) => {
                let gated = self.gate.apply(&raw, &self.catalog);
                let mut image = frame.into_image();
                let annotations = self.annotator.annotate(&mut image, &gated);

                for event in session.policy.evaluate(&gated, context) {
                    report.alerts_emitted += 1;
                    let outcome = self.dispatcher.dispatch(&event);
                    report.notification_failures += outcome.failures.len() as u64;
                }

                AnnotatedFrame {
                    index: context.index,
                    captured_at: context.captured_at,
                    source: context.source,
                    image,
                    labels: annotations.into_iter().map(|a| a.text).collect(),
                    inference_skipped: false,
                }
            }
            Err(err) => {
                let failure = PipelineError::InferenceFailure {
                    frame_index: context.index,
                    reason: format!("{err:#}"),
                };
                log::warn!("{}; publishing frame unannotated", failure);
                report.frames_skipped += 1;
                AnnotatedFrame {
                    index: context.index,
                    captured_at: context.captured_at,
                    source: context.source,
                    image: frame.into_image(),
                    labels: Vec::new(),
                    inference_skipped: true,
                }
            }
        };

        report.frames_processed += 1;
        if let Err(err) = self.display.publish(&annotated) {
            log::warn!("failed to publish frame {}: {:#}", annotated.index, err);
        }
    }
}
