use anyhow::{anyhow, Result};

use crate::catalog::ClassCatalog;
use crate::detect::{BoundingBox, Detection};
use crate::frame::{CANONICAL_HEIGHT, CANONICAL_WIDTH};

/// Default confidence threshold, in percent.
pub const DEFAULT_THRESHOLD_PERCENT: u8 = 50;

// Slack below an integer percent that f32 scaling may add (0.92 * 100).
const PERCENT_EPSILON: f32 = 1e-3;

/// Confidence as a whole percentage, rounded up: 0.501 reads as 51.
pub(crate) fn ceil_percent(confidence: f32) -> u32 {
    (confidence * 100.0 - PERCENT_EPSILON).ceil().max(0.0) as u32
}

/// A detection that cleared the confidence gate, paired with its label.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub watched: bool,
}

impl LabeledDetection {
    /// Confidence as a whole percentage, rounded up.
    pub fn percent(&self) -> u32 {
        ceil_percent(self.confidence)
    }
}

/// The single confidence filter shared by annotation and alerting.
///
/// A detection passes when `confidence >= threshold`. The gate also resolves
/// class labels and drops detections that cannot be drawn: class ids outside
/// the catalog, confidences outside 0..=1, and boxes that are malformed or
/// fall entirely outside the canonical frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl ConfidenceGate {
    /// Threshold as a fraction in 0..=1.
    pub fn new(threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within 0..=1 (got {})",
                threshold
            ));
        }
        Ok(Self { threshold })
    }

    /// Threshold in whole percent, 0..=100.
    pub fn from_percent(percent: u8) -> Result<Self> {
        if percent > 100 {
            return Err(anyhow!(
                "confidence threshold must be within 0..=100 percent (got {})",
                percent
            ));
        }
        Self::new(percent as f32 / 100.0)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn passes(&self, confidence: f32) -> bool {
        confidence >= self.threshold
    }

    /// Filter and label one frame's raw detections.
    ///
    /// Input order is preserved; the input slice and catalog are not modified.
    pub fn apply(&self, raw: &[Detection], catalog: &ClassCatalog) -> Vec<LabeledDetection> {
        raw.iter()
            .filter_map(|det| {
                if !(0.0..=1.0).contains(&det.confidence) {
                    log::debug!(
                        "dropping detection with out-of-range confidence {}",
                        det.confidence
                    );
                    return None;
                }
                if !self.passes(det.confidence) {
                    return None;
                }
                let Some(label) = catalog.label(det.class_id) else {
                    log::debug!("dropping detection with unknown class id {}", det.class_id);
                    return None;
                };
                if !det.bbox.is_valid() {
                    log::debug!("dropping detection with malformed box {:?}", det.bbox);
                    return None;
                }
                let bbox = det.bbox.clamp_to(CANONICAL_WIDTH, CANONICAL_HEIGHT);
                if !bbox.is_valid() {
                    log::debug!("dropping detection outside frame {:?}", det.bbox);
                    return None;
                }
                Some(LabeledDetection {
                    label: label.to_string(),
                    confidence: det.confidence,
                    bbox,
                    watched: catalog.is_watched(label),
                })
            })
            .collect()
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD_PERCENT as f32 / 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, confidence: f32) -> Detection {
        Detection::new(
            class_id,
            confidence,
            BoundingBox::new(10.0, 10.0, 50.0, 50.0),
        )
    }

    #[test]
    fn boundary_confidence_passes() {
        let gate = ConfidenceGate::default();
        assert!(gate.passes(0.5));
        assert!(!gate.passes(0.49));
        let catalog = ClassCatalog::fire();
        assert_eq!(gate.apply(&[det(0, 0.5)], &catalog).len(), 1);
        assert!(gate.apply(&[det(0, 0.49)], &catalog).is_empty());
    }

    #[test]
    fn percent_threshold_matches_fraction() {
        assert_eq!(ConfidenceGate::from_percent(70).unwrap().threshold(), 0.7);
        assert!(ConfidenceGate::from_percent(101).is_err());
        assert!(ConfidenceGate::new(-0.1).is_err());
        assert!(ConfidenceGate::new(f32::NAN).is_err());
    }

    #[test]
    fn unknown_class_and_bad_boxes_are_dropped() {
        let gate = ConfidenceGate::default();
        let catalog = ClassCatalog::fire();
        let inverted = Detection::new(0, 0.9, BoundingBox::new(50.0, 50.0, 10.0, 10.0));
        let offscreen = Detection::new(0, 0.9, BoundingBox::new(700.0, 10.0, 800.0, 50.0));
        let bad_conf = det(0, 1.5);
        let kept = gate.apply(&[det(3, 0.9), inverted, offscreen, bad_conf, det(0, 0.9)], &catalog);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].label, "fire");
        assert!(kept[0].watched);
    }

    #[test]
    fn boxes_are_clamped_to_canonical_frame() {
        let gate = ConfidenceGate::default();
        let catalog = ClassCatalog::fire();
        let wide = Detection::new(0, 0.9, BoundingBox::new(-10.0, 5.0, 900.0, 600.0));
        let kept = gate.apply(&[wide], &catalog);
        assert_eq!(kept[0].bbox, BoundingBox::new(0.0, 5.0, 639.0, 479.0));
    }

    #[test]
    fn percent_rounds_up() {
        let labeled = |confidence| LabeledDetection {
            label: "dog".into(),
            confidence,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            watched: true,
        };
        assert_eq!(labeled(0.92).percent(), 92);
        assert_eq!(labeled(0.501).percent(), 51);
        assert_eq!(labeled(0.5).percent(), 50);
        assert_eq!(labeled(0.499).percent(), 50);
        assert_eq!(labeled(0.9).percent(), 90);
        assert_eq!(labeled(1.0).percent(), 100);
        assert_eq!(labeled(0.0).percent(), 0);
    }
}
