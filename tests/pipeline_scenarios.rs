use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use watchpost::detect::{ScriptedBackend, ScriptedFrame};
use watchpost::{
    stop_channel, AlertDispatcher, AlertEvent, AlertState, AnnotatedFrame, BoundingBox,
    CameraConfig, ClassCatalog, ConfidenceGate, Frame, FrameSink, FrameSource, NotificationSink,
    Origin, PipelineError, SessionEnd, SourceKind, StopHandle, StreamController, StreamSession,
};

#[derive(Clone, Debug)]
struct Published {
    index: u64,
    labels: Vec<String>,
    inference_skipped: bool,
}

#[derive(Clone, Default)]
struct RecordingDisplay {
    frames: Arc<Mutex<Vec<Published>>>,
    stop_after: Option<(u64, StopHandle)>,
}

impl RecordingDisplay {
    fn stopping_after(index: u64, handle: StopHandle) -> Self {
        Self {
            frames: Arc::default(),
            stop_after: Some((index, handle)),
        }
    }

    fn frames(&self) -> Vec<Published> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingDisplay {
    fn publish(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        self.frames.lock().unwrap().push(Published {
            index: frame.index,
            labels: frame.labels.clone(),
            inference_skipped: frame.inference_skipped,
        });
        if let Some((index, handle)) = &self.stop_after {
            if frame.index == *index {
                handle.stop();
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    alerts: Arc<Mutex<Vec<AlertEvent>>>,
}

impl RecordingSink {
    fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<()> {
        self.alerts.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FailingSink;

impl NotificationSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn notify(&mut self, _event: &AlertEvent) -> Result<()> {
        Err(anyhow!("relay refused connection"))
    }
}

/// In-memory source that counts `close` calls and can fail on a given read.
struct CountingSource {
    kind: SourceKind,
    remaining: Option<u64>,
    fail_on: Option<u64>,
    produced: u64,
    closes: Arc<AtomicUsize>,
}

impl CountingSource {
    fn new(kind: SourceKind, frames: Option<u64>) -> (Self, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Self {
                kind,
                remaining: frames,
                fail_on: None,
                produced: 0,
                closes: closes.clone(),
            },
            closes,
        )
    }

    fn failing_on(mut self, read: u64) -> Self {
        self.fail_on = Some(read);
        self
    }
}

impl FrameSource for CountingSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_on == Some(self.produced + 1) {
            return Err(anyhow!("device disconnected"));
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        self.produced += 1;
        Ok(Some(Frame::new(self.produced, RgbImage::new(320, 240))))
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn frames_captured(&self) -> u64 {
        self.produced
    }
}

fn controller(
    catalog: ClassCatalog,
    script: Vec<ScriptedFrame>,
    threshold_percent: u8,
) -> (StreamController, RecordingDisplay, RecordingSink) {
    let display = RecordingDisplay::default();
    let sink = RecordingSink::default();
    let controller = build(catalog, script, threshold_percent, display.clone(), sink.clone());
    (controller, display, sink)
}

fn build(
    catalog: ClassCatalog,
    script: Vec<ScriptedFrame>,
    threshold_percent: u8,
    display: RecordingDisplay,
    sink: RecordingSink,
) -> StreamController {
    StreamController::new(
        Box::new(ScriptedBackend::new(script)),
        Arc::new(catalog),
        ConfidenceGate::from_percent(threshold_percent).expect("threshold"),
    )
    .with_dispatcher(AlertDispatcher::new().with_sink(Box::new(sink)))
    .with_display(Box::new(display))
}

fn class_id(catalog: &ClassCatalog, label: &str) -> usize {
    catalog
        .labels()
        .iter()
        .position(|l| l == label)
        .expect("label in catalog")
}

fn fire(confidence: f32) -> ScriptedFrame {
    ScriptedFrame::single(0, confidence, BoundingBox::new(100.0, 120.0, 260.0, 300.0))
}

fn write_png(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    RgbImage::from_pixel(800, 600, Rgb([30, 90, 40]))
        .save(&path)
        .expect("write png");
    path
}

#[test]
fn image_with_dog_is_boxed_and_alerted_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_png(&dir, "yard.png");
    let catalog = ClassCatalog::animals();
    let dog = class_id(&catalog, "dog");
    let script = vec![ScriptedFrame::single(
        dog,
        0.92,
        BoundingBox::new(50.0, 60.0, 300.0, 400.0),
    )];
    let (mut controller, display, sink) = controller(catalog, script, 50);

    let mut session = StreamSession::start(&Origin::Image(path))?;
    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut session, &mut stop);

    assert_eq!(report.end, SessionEnd::Exhausted);
    assert_eq!(report.frames_processed, 1);
    let frames = display.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].labels, vec!["dog 92%".to_string()]);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].label, "dog");
    assert_eq!(alerts[0].percent(), 92);
    assert_eq!(alerts[0].source, SourceKind::Image);
    assert_eq!(report.alerts_emitted, 1);
    Ok(())
}

#[test]
fn video_fire_in_consecutive_frames_alerts_on_first() -> Result<()> {
    let script = vec![
        ScriptedFrame::empty(),
        fire(0.81),
        fire(0.77),
        ScriptedFrame::empty(),
        ScriptedFrame::empty(),
    ];
    let (mut controller, display, sink) = controller(ClassCatalog::fire(), script, 50);

    let mut session = StreamSession::start(&Origin::Video("stub://5".into()))?;
    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut session, &mut stop);

    assert_eq!(report.end, SessionEnd::Exhausted);
    assert_eq!(report.frames_processed, 5);
    let indices: Vec<u64> = display.frames().iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].label, "fire");
    assert_eq!(alerts[0].frame_index, 2);
    assert_eq!(alerts[0].source, SourceKind::Video);
    Ok(())
}

#[test]
fn camera_stops_after_cancellation() -> Result<()> {
    let (handle, mut stop) = stop_channel();
    let display = RecordingDisplay::stopping_after(10, handle);
    let sink = RecordingSink::default();
    let mut controller = build(
        ClassCatalog::fire(),
        Vec::new(),
        50,
        display.clone(),
        sink.clone(),
    );

    let origin = Origin::Camera(CameraConfig {
        device: "stub://porch".into(),
        ..CameraConfig::default()
    });
    let mut session = StreamSession::start(&origin)?;
    let report = controller.run(&mut session, &mut stop);

    assert_eq!(report.end, SessionEnd::Cancelled);
    assert!(report.frames_processed <= 11);
    assert_eq!(display.frames().last().map(|f| f.index), Some(report.frames_processed));
    assert!(sink.alerts().is_empty());
    Ok(())
}

#[test]
fn cancelled_camera_releases_device_once() {
    let (handle, mut stop) = stop_channel();
    let (source, closes) = CountingSource::new(SourceKind::Camera, None);
    let display = RecordingDisplay::stopping_after(10, handle);
    let mut controller = build(
        ClassCatalog::fire(),
        Vec::new(),
        50,
        display.clone(),
        RecordingSink::default(),
    );

    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.frames_processed, 10);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn just_below_threshold_is_ignored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_png(&dir, "field.png");
    let (mut controller, display, sink) = controller(ClassCatalog::fire(), vec![fire(0.49)], 50);

    let mut session = StreamSession::start(&Origin::Image(path))?;
    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut session, &mut stop);

    assert_eq!(report.frames_processed, 1);
    assert!(display.frames()[0].labels.is_empty());
    assert!(sink.alerts().is_empty());
    assert_eq!(report.alerts_emitted, 0);
    Ok(())
}

#[test]
fn confidence_equal_to_threshold_passes() {
    let (source, _closes) = CountingSource::new(SourceKind::Video, Some(1));
    let (mut controller, display, sink) = controller(ClassCatalog::fire(), vec![fire(0.5)], 50);

    let (_handle, mut stop) = stop_channel();
    controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(display.frames()[0].labels, vec!["fire 50%".to_string()]);
    assert_eq!(sink.alerts().len(), 1);
}

#[test]
fn reappearance_alerts_again() {
    let (source, _closes) = CountingSource::new(SourceKind::Video, Some(5));
    let script = vec![
        ScriptedFrame::empty(),
        fire(0.9),
        fire(0.9),
        ScriptedFrame::empty(),
        fire(0.9),
    ];
    let (mut controller, _display, sink) = controller(ClassCatalog::fire(), script, 50);

    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    let indices: Vec<u64> = sink.alerts().iter().map(|a| a.frame_index).collect();
    assert_eq!(indices, vec![2, 5]);
    assert_eq!(report.alerts_emitted, 2);
}

#[test]
fn unavailable_source_never_starts() {
    let err = match StreamSession::start(&Origin::Video("/nonexistent/clip.mp4".into())) {
        Ok(_) => panic!("missing video must not open"),
        Err(err) => err,
    };
    let classified = err
        .downcast_ref::<PipelineError>()
        .expect("pipeline error");
    assert!(classified.is_source_unavailable());
}

#[test]
fn inference_failure_publishes_frame_unannotated() {
    let (source, closes) = CountingSource::new(SourceKind::Video, Some(3));
    let script = vec![
        ScriptedFrame::Failure("tensor shape mismatch".into()),
        fire(0.9),
        fire(0.9),
    ];
    let (mut controller, display, sink) = controller(ClassCatalog::fire(), script, 50);

    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(report.end, SessionEnd::Exhausted);
    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.frames_skipped, 1);
    let frames = display.frames();
    assert!(frames[0].inference_skipped);
    assert!(frames[0].labels.is_empty());
    assert!(!frames[1].inference_skipped);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].frame_index, 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn camera_read_failure_ends_session() {
    let (source, closes) = CountingSource::new(SourceKind::Camera, None);
    let source = source.failing_on(3);
    let (mut controller, display, _sink) = controller(ClassCatalog::fire(), Vec::new(), 50);

    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    match &report.end {
        SessionEnd::ReadFailure(reason) => assert!(reason.contains("device disconnected")),
        other => panic!("unexpected end {:?}", other),
    }
    assert_eq!(report.frames_processed, 2);
    assert_eq!(display.frames().len(), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn video_read_failure_is_end_of_stream() {
    let (source, closes) = CountingSource::new(SourceKind::Video, Some(10));
    let source = source.failing_on(4);
    let (mut controller, _display, _sink) = controller(ClassCatalog::fire(), Vec::new(), 50);

    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(report.end, SessionEnd::Exhausted);
    assert_eq!(report.frames_processed, 3);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn frame_limit_cancels_session() {
    let (source, closes) = CountingSource::new(SourceKind::Camera, None);
    let (controller, display, _sink) = controller(ClassCatalog::fire(), Vec::new(), 50);
    let mut controller = controller.with_max_frames(Some(4));

    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(display.frames().len(), 4);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_before_first_frame_processes_nothing() {
    let (source, closes) = CountingSource::new(SourceKind::Camera, None);
    let (mut controller, display, _sink) = controller(ClassCatalog::fire(), Vec::new(), 50);

    let (handle, mut stop) = stop_channel();
    handle.stop();
    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(report.end, SessionEnd::Cancelled);
    assert_eq!(report.frames_processed, 0);
    assert!(display.frames().is_empty());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn session_closes_source_once_when_ended_or_dropped() {
    let (source, closes) = CountingSource::new(SourceKind::Video, Some(2));
    let mut session = StreamSession::from_source(Box::new(source));
    assert!(session.is_active());
    session.end();
    session.end();
    assert!(!session.is_active());
    drop(session);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let (source, closes) = CountingSource::new(SourceKind::Video, Some(2));
    drop(StreamSession::from_source(Box::new(source)));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_sink_does_not_stop_delivery_or_loop() {
    let (source, _closes) = CountingSource::new(SourceKind::Video, Some(3));
    let display = RecordingDisplay::default();
    let sink = RecordingSink::default();
    let mut controller = StreamController::new(
        Box::new(ScriptedBackend::new(vec![fire(0.9)])),
        Arc::new(ClassCatalog::fire()),
        ConfidenceGate::from_percent(50).expect("threshold"),
    )
    .with_dispatcher(
        AlertDispatcher::new()
            .with_sink(Box::new(FailingSink))
            .with_sink(Box::new(sink.clone())),
    )
    .with_display(Box::new(display.clone()));

    let (_handle, mut stop) = stop_channel();
    let report = controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.alerts_emitted, 1);
    assert_eq!(report.notification_failures, 1);
    assert_eq!(sink.alerts().len(), 1);
    assert_eq!(display.frames().len(), 3);
}

#[test]
fn unwatched_labels_are_drawn_but_never_alerted() -> Result<()> {
    let catalog = ClassCatalog::new(["deer", "car"], ["deer"])?;
    let (source, _closes) = CountingSource::new(SourceKind::Video, Some(1));
    let script = vec![ScriptedFrame::single(
        1,
        0.88,
        BoundingBox::new(10.0, 40.0, 200.0, 220.0),
    )];
    let (mut controller, display, sink) = controller(catalog, script, 50);

    let (_handle, mut stop) = stop_channel();
    controller.run(&mut StreamSession::from_source(Box::new(source)), &mut stop);

    assert_eq!(display.frames()[0].labels, vec!["car 88%".to_string()]);
    assert!(sink.alerts().is_empty());
    Ok(())
}

#[test]
fn sessions_do_not_share_alert_state() {
    let script = vec![fire(0.9), fire(0.9), fire(0.9), fire(0.9)];
    let (mut controller, _display, sink) = controller(ClassCatalog::fire(), script, 50);

    let (first, _) = CountingSource::new(SourceKind::Video, Some(2));
    let mut session_a = StreamSession::from_source(Box::new(first));
    let (_handle, mut stop) = stop_channel();
    controller.run(&mut session_a, &mut stop);
    assert_eq!(session_a.policy().state(), AlertState::Alerting);
    assert_eq!(session_a.last_alert_label(), Some("fire"));

    let (second, _) = CountingSource::new(SourceKind::Video, Some(2));
    let mut session_b = StreamSession::from_source(Box::new(second));
    assert_eq!(session_b.policy().state(), AlertState::Idle);
    let report = controller.run(&mut session_b, &mut stop);

    assert_eq!(report.alerts_emitted, 1);
    assert_eq!(session_b.policy().state(), AlertState::Alerting);
    assert_eq!(session_a.policy().state(), AlertState::Alerting);
    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].frame_index, 1);
    assert_eq!(alerts[1].frame_index, 1);
}
