use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection};
use crate::landmarks::FaceLandmarks;

/// Detector pipeline: load image → detect faces → landmarks
pub struct Pipeline {
    pub detector: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Pipeline {
    pub fn new(model_path: &Path, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        Ok(Self {
            detector: crate::model::detector_session(model_path)?,
            score_threshold,
            nms_threshold,
        })
    }

    /// All faces in the image, best score first.
    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        face::detect_faces(
            &mut self.detector,
            img,
            self.score_threshold,
            self.nms_threshold,
        )
        .context("detecting faces")
    }

    /// Landmarks of every face found in the image file at `path`.
    pub fn landmarks_from_path(&mut self, path: &Path) -> Result<Vec<FaceLandmarks>> {
        let img = image::open(path).with_context(|| format!("opening {}", path.display()))?;
        let detections = self.detect(&img)?;
        Ok(detections.iter().map(FaceLandmarks::from).collect())
    }
}
