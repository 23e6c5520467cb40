#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::decode_yolov8;

/// Anchors below this score are discarded before NMS. Kept low so the
/// pipeline's confidence gate remains the only user-facing threshold.
const PRE_FILTER_CONFIDENCE: f32 = 0.05;

/// Tract-based backend for YOLOv8 ONNX models.
///
/// Loads a local model file once and runs it on every frame. No network I/O;
/// nothing is written to disk.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    num_classes: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// `input_width`/`input_height` are the model's fixed input size (640x640
    /// for stock YOLOv8 exports). `num_classes` must match the class catalog.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_width: u32,
        input_height: u32,
        num_classes: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{}, {} classes)",
            model_path.display(),
            input_width,
            input_height,
            num_classes
        );

        Ok(Self {
            model,
            input_width,
            input_height,
            num_classes,
        })
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let resized;
        let pixels = if frame.width() == self.input_width && frame.height() == self.input_height {
            frame
        } else {
            resized = image::imageops::resize(
                frame,
                self.input_width,
                self.input_height,
                FilterType::Triangle,
            );
            &resized
        };

        tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| pixels.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
        .into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let (channels, anchors) = (shape[1], shape[2]);
        if channels - 4 != self.num_classes {
            return Err(anyhow!(
                "model reports {} classes but catalog has {}",
                channels - 4,
                self.num_classes
            ));
        }
        let flat: Vec<f32> = view.iter().copied().collect();
        let scale_x = frame.width() as f32 / self.input_width as f32;
        let scale_y = frame.height() as f32 / self.input_height as f32;

        Ok(decode_yolov8(
            &flat,
            channels,
            anchors,
            scale_x,
            scale_y,
            PRE_FILTER_CONFIDENCE,
        ))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_width, self.input_height);
        self.detect(&blank).map(|_| ())
    }
}
