//! YOLOv8 output decoding.
//!
//! The detection head emits a `[1, 4 + num_classes, num_anchors]` tensor laid
//! out channel-major: rows 0..4 are `cx, cy, w, h` in model-input pixels and
//! the remaining rows are per-class scores. Single-class heads may also be
//! exported as `[1, 5, num_anchors]`, which decodes the same way.

use crate::detect::result::{BoundingBox, Detection};

/// IoU above which a lower-scoring box of the same class is suppressed.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Decode a channel-major YOLOv8 head into detections.
///
/// `scale_x`/`scale_y` map model-input pixels back to frame pixels. Anchors
/// whose best class score is below `min_confidence` are dropped. The result
/// has per-class non-maximum suppression applied.
pub fn decode_yolov8(
    output: &[f32],
    channels: usize,
    anchors: usize,
    scale_x: f32,
    scale_y: f32,
    min_confidence: f32,
) -> Vec<Detection> {
    if channels < 5 || output.len() < channels * anchors {
        return Vec::new();
    }
    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];

    let mut detections = Vec::new();
    for i in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..channels - 4 {
            let score = at(4 + class, i);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !best_score.is_finite() || best_score < min_confidence {
            continue;
        }
        let bbox = BoundingBox::from_center(at(0, i), at(1, i), at(2, i), at(3, i))
            .scale(scale_x, scale_y);
        if !bbox.is_valid() {
            continue;
        }
        detections.push(Detection::new(best_class, best_score.min(1.0), bbox));
    }

    non_max_suppression(detections, NMS_IOU_THRESHOLD)
}

/// Greedy per-class non-maximum suppression.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) >= iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}
