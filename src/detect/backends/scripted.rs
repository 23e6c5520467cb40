use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Deserialize;
use std::path::Path;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// What the scripted backend returns for one frame.
#[derive(Clone, Debug)]
pub enum ScriptedFrame {
    Detections(Vec<Detection>),
    Failure(String),
}

impl ScriptedFrame {
    pub fn empty() -> Self {
        ScriptedFrame::Detections(Vec::new())
    }

    pub fn single(class_id: usize, confidence: f32, bbox: BoundingBox) -> Self {
        ScriptedFrame::Detections(vec![Detection::new(class_id, confidence, bbox)])
    }
}

/// Backend that replays a fixed per-frame script.
///
/// Used for synthetic runs and tests. Frame N of the stream receives entry N
/// of the script. Past the end it returns nothing, or wraps around when
/// cycling is enabled.
pub struct ScriptedBackend {
    script: Vec<ScriptedFrame>,
    cursor: usize,
    cycle: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptedFrameFile {
    Detections(Vec<ScriptedDetectionFile>),
    Failure { error: String },
}

#[derive(Debug, Deserialize)]
struct ScriptedDetectionFile {
    class_id: usize,
    confidence: f32,
    bbox: [f32; 4],
}

impl ScriptedBackend {
    pub fn new(script: Vec<ScriptedFrame>) -> Self {
        Self {
            script,
            cursor: 0,
            cycle: false,
        }
    }

    /// Wrap around to the start of the script once it is exhausted.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Load a script from a JSON file.
    ///
    /// The file holds one entry per frame: either a list of
    /// `{"class_id", "confidence", "bbox": [x1, y1, x2, y2]}` objects or
    /// `{"error": "..."}` to simulate an inference failure.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid detection script {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<ScriptedFrameFile> =
            serde_json::from_str(raw).map_err(|e| anyhow!("{}", e))?;
        let script = entries
            .into_iter()
            .map(|entry| match entry {
                ScriptedFrameFile::Failure { error } => ScriptedFrame::Failure(error),
                ScriptedFrameFile::Detections(dets) => ScriptedFrame::Detections(
                    dets.into_iter()
                        .map(|d| {
                            let [x1, y1, x2, y2] = d.bbox;
                            Detection::new(
                                d.class_id,
                                d.confidence,
                                BoundingBox::new(x1, y1, x2, y2),
                            )
                        })
                        .collect(),
                ),
            })
            .collect();
        Ok(Self::new(script))
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        if self.cursor >= self.script.len() {
            if !self.cycle || self.script.is_empty() {
                return Ok(Vec::new());
            }
            self.cursor = 0;
        }
        let entry = &self.script[self.cursor];
        self.cursor += 1;
        match entry {
            ScriptedFrame::Detections(dets) => Ok(dets.clone()),
            ScriptedFrame::Failure(reason) => Err(anyhow!("{}", reason)),
        }
    }
}
