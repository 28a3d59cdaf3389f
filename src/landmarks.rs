use std::path::Path;
use std::sync::Arc;

use mugrs_vision::FaceLandmarks;

use crate::capability::FaceDetector;

/// Best-effort landmark lookup: detector failures become "no face".
pub struct LandmarkProvider {
    detector: Arc<dyn FaceDetector>,
}

impl LandmarkProvider {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    /// Landmarks of the first face in the image, or `None` when there is no
    /// face or the detector failed.
    pub fn detect(&self, image: &Path) -> Option<FaceLandmarks> {
        match self.detector.detect(image) {
            Ok(faces) => {
                let first = faces.into_iter().next();
                if first.is_none() {
                    log::debug!("no face in {}", image.display());
                }
                first
            }
            Err(e) => {
                log::warn!("face detection failed for {}: {e:#}", image.display());
                None
            }
        }
    }
}

/// The landmarks currently on screen and how current they are.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum LandmarkState {
    #[default]
    Absent,
    /// Detected on the latest sampling tick.
    Fresh(FaceLandmarks),
    /// Carried over from an earlier tick; the latest found nothing.
    Stale(FaceLandmarks),
}

impl LandmarkState {
    /// Fold one sampling tick into the state. A miss never clears landmarks.
    pub fn update(&mut self, tick: Option<FaceLandmarks>) {
        *self = match (tick, *self) {
            (Some(found), _) => LandmarkState::Fresh(found),
            (None, LandmarkState::Fresh(prev) | LandmarkState::Stale(prev)) => {
                LandmarkState::Stale(prev)
            }
            (None, LandmarkState::Absent) => LandmarkState::Absent,
        };
    }

    /// Landmarks to display, fresh or not.
    pub fn displayed(&self) -> Option<&FaceLandmarks> {
        match self {
            LandmarkState::Fresh(lm) | LandmarkState::Stale(lm) => Some(lm),
            LandmarkState::Absent => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, LandmarkState::Fresh(_))
    }
}
