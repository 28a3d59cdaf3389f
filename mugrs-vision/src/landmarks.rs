use serde::{Deserialize, Serialize};

use crate::face::Detection;

/// A 2D point in image-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The landmarks the overlay needs from one face. A `None` field was not
/// detected in this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: Option<Point>,
    pub right_eye: Option<Point>,
    pub nose_base: Option<Point>,
}

impl FaceLandmarks {
    pub fn new(left_eye: Point, right_eye: Point, nose_base: Point) -> Self {
        Self {
            left_eye: Some(left_eye),
            right_eye: Some(right_eye),
            nose_base: Some(nose_base),
        }
    }

    /// All three points, or `None` if any of them is missing.
    pub fn complete(&self) -> Option<(Point, Point, Point)> {
        Some((self.left_eye?, self.right_eye?, self.nose_base?))
    }

    pub fn is_complete(&self) -> bool {
        self.complete().is_some()
    }
}

/// YuNet emits five points in the subject's frame of reference:
/// right eye, left eye, nose tip, right mouth corner, left mouth corner.
impl From<&Detection> for FaceLandmarks {
    fn from(det: &Detection) -> Self {
        let point = |i: usize| Point::new(det.landmarks[i * 2], det.landmarks[i * 2 + 1]);
        Self {
            right_eye: Some(point(0)),
            left_eye: Some(point(1)),
            nose_base: Some(point(2)),
        }
    }
}
