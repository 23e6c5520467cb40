//! Frame annotation.
//!
//! `FrameAnnotator::annotations` turns gated detections into a list of
//! `Annotation`s (box + label text + label position). It is a pure function of
//! its input: the same detections always describe the same boxes and text.
//! `FrameAnnotator::render` rasterizes a list of annotations onto a frame.

mod gate;
mod raster;

pub(crate) use gate::ceil_percent;
pub use gate::{ConfidenceGate, LabeledDetection, DEFAULT_THRESHOLD_PERCENT};

use image::{Rgb, RgbImage};

/// Label offset from the box's top-left corner: right, then up.
pub const LABEL_OFFSET_X: i32 = 8;
pub const LABEL_OFFSET_Y: i32 = 20;

const LABEL_PADDING: i32 = 2;

/// One box and its label, in canonical-frame pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    /// `[x1, y1, x2, y2]`
    pub rect: [i32; 4],
    /// `"{label} {confidence%}"`
    pub text: String,
    /// Requested top-left of the label strip, before clamping into the frame.
    pub text_origin: (i32, i32),
}

#[derive(Clone, Debug)]
pub struct FrameAnnotator {
    pub box_color: Rgb<u8>,
    pub box_thickness: u32,
    pub text_color: Rgb<u8>,
    pub text_background: Rgb<u8>,
    pub text_scale: u32,
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self {
            box_color: Rgb([255, 0, 0]),
            box_thickness: 2,
            text_color: Rgb([255, 255, 255]),
            text_background: Rgb([255, 0, 255]),
            text_scale: 2,
        }
    }
}

impl FrameAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe the annotations for a frame's gated detections.
    pub fn annotations(&self, detections: &[LabeledDetection]) -> Vec<Annotation> {
        detections
            .iter()
            .map(|det| {
                let rect = det.bbox.to_pixels();
                Annotation {
                    rect,
                    text: format!("{} {}%", det.label, det.percent()),
                    text_origin: (rect[0] + LABEL_OFFSET_X, rect[1] - LABEL_OFFSET_Y),
                }
            })
            .collect()
    }

    /// Draw annotations onto `image` in order.
    pub fn render(&self, image: &mut RgbImage, annotations: &[Annotation]) {
        for annotation in annotations {
            raster::draw_rect(
                image,
                annotation.rect,
                self.box_color,
                self.box_thickness,
            );
            self.render_label(image, annotation);
        }
    }

    /// Describe and draw in one step. Returns the annotations drawn.
    pub fn annotate(&self, image: &mut RgbImage, detections: &[LabeledDetection]) -> Vec<Annotation> {
        let annotations = self.annotations(detections);
        self.render(image, &annotations);
        annotations
    }

    /// Where the label strip lands after clamping into the frame, as
    /// `[left, top, right, bottom]`.
    pub fn label_strip(&self, image_width: u32, image_height: u32, annotation: &Annotation) -> [i32; 4] {
        let width = raster::text_width(&annotation.text, self.text_scale) + 2 * LABEL_PADDING;
        let height = raster::text_height(self.text_scale) + 2 * LABEL_PADDING;
        let (mut left, mut top) = annotation.text_origin;
        left = left.min(image_width as i32 - width).max(0);
        top = top.min(image_height as i32 - height).max(0);
        [left, top, left + width - 1, top + height - 1]
    }

    fn render_label(&self, image: &mut RgbImage, annotation: &Annotation) {
        let strip = self.label_strip(image.width(), image.height(), annotation);
        raster::fill_rect(image, strip, self.text_background);
        raster::draw_text(
            image,
            strip[0] + LABEL_PADDING,
            strip[1] + LABEL_PADDING,
            &annotation.text,
            self.text_color,
            self.text_scale,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn dog(confidence: f32) -> LabeledDetection {
        LabeledDetection {
            label: "dog".into(),
            confidence,
            bbox: BoundingBox::new(100.0, 120.0, 300.0, 400.0),
            watched: true,
        }
    }

    #[test]
    fn label_percent_rounds_up() {
        let annotations = FrameAnnotator::new().annotations(&[dog(0.501), dog(0.5)]);
        assert_eq!(annotations[0].text, "dog 51%");
        assert_eq!(annotations[1].text, "dog 50%");
    }

    #[test]
    fn annotation_text_and_offset() {
        let annotator = FrameAnnotator::new();
        let annotations = annotator.annotations(&[dog(0.92)]);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].rect, [100, 120, 300, 400]);
        assert_eq!(annotations[0].text, "dog 92%");
        assert_eq!(annotations[0].text_origin, (108, 100));
    }

    #[test]
    fn annotations_are_a_pure_function_of_detections() {
        let annotator = FrameAnnotator::new();
        let dets = vec![dog(0.92), dog(0.61)];
        let first = annotator.annotations(&dets);
        let second = annotator.annotations(&dets);
        assert_eq!(first, second);
        assert_eq!(dets[0].confidence, 0.92);
    }

    #[test]
    fn render_draws_box_and_label() {
        let annotator = FrameAnnotator::new();
        let mut image = RgbImage::new(640, 480);
        annotator.annotate(&mut image, &[dog(0.92)]);
        assert_eq!(*image.get_pixel(100, 300), annotator.box_color);
        assert_eq!(*image.get_pixel(300, 300), annotator.box_color);
        assert_eq!(*image.get_pixel(200, 250), Rgb([0, 0, 0]));
        // Label strip background starts at the offset origin.
        assert_eq!(*image.get_pixel(108, 100), annotator.text_background);
    }

    #[test]
    fn label_strip_is_clamped_into_frame() {
        let annotator = FrameAnnotator::new();
        let top_left = LabeledDetection {
            bbox: BoundingBox::new(0.0, 0.0, 50.0, 50.0),
            ..dog(0.5)
        };
        let annotations = annotator.annotations(&[top_left]);
        assert_eq!(annotations[0].text_origin, (8, -20));
        let strip = annotator.label_strip(640, 480, &annotations[0]);
        assert_eq!(strip[0], 8);
        assert_eq!(strip[1], 0);

        let right_edge = LabeledDetection {
            bbox: BoundingBox::new(630.0, 100.0, 639.0, 200.0),
            ..dog(0.5)
        };
        let annotations = annotator.annotations(&[right_edge]);
        let strip = annotator.label_strip(640, 480, &annotations[0]);
        assert_eq!(strip[2], 639);
    }

    #[test]
    fn empty_detections_leave_frame_untouched() {
        let annotator = FrameAnnotator::new();
        let mut image = RgbImage::new(64, 48);
        let annotations = annotator.annotate(&mut image, &[]);
        assert!(annotations.is_empty());
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
