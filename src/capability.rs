//! Narrow contracts for the platform services the pipeline drives.
//!
//! Everything the controller and recorder touch outside of their own state
//! goes through one of these traits, so a desktop build can plug in V4L2,
//! YuNet and ffmpeg while tests plug in in-memory doubles.

use std::path::{Path, PathBuf};

use anyhow::Result;
use mugrs_vision::FaceLandmarks;
use serde::{Deserialize, Serialize};

/// Platform permission prompts. Each call blocks until the user answers.
pub trait PermissionProvider: Send + Sync {
    fn request_camera(&self) -> bool;
    fn request_microphone(&self) -> bool;
    fn request_storage(&self) -> bool;
}

/// Still capture from the live camera.
pub trait PhotoCamera: Send + Sync {
    /// Capture one still and return where it was written.
    fn take_photo(&self) -> Result<PathBuf>;
}

/// Face detection over a still image on disk.
pub trait FaceDetector: Send + Sync {
    /// Every face found, most confident first.
    fn detect(&self, image: &Path) -> Result<Vec<FaceLandmarks>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Jpg,
    Png,
}

impl SnapshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Jpg => "jpg",
            SnapshotFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotOptions {
    pub format: SnapshotFormat,
    /// 0.0 to 1.0, only used by lossy formats.
    pub quality: f32,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            format: SnapshotFormat::Jpg,
            quality: 0.8,
        }
    }
}

impl SnapshotOptions {
    /// Encoder quality on the 1..=100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
    }
}

/// The composited view the recorder snapshots.
pub trait ViewSurface: Send + Sync {
    /// False once the view is gone; the capture loop ends when it is.
    fn is_renderable(&self) -> bool;

    /// Render the current view into `dest`.
    fn capture(&self, dest: &Path, options: &SnapshotOptions) -> Result<()>;
}

/// What the encoder reported after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub success: bool,
    pub log: String,
}

/// Turns a concat manifest into a single video file.
pub trait VideoAssembler: Send + Sync {
    fn concat(&self, manifest: &Path, output: &Path) -> Result<AssemblyReport>;
}

/// Blocking, user-visible notices.
pub trait AlertSink: Send + Sync {
    fn alert(&self, title: &str, message: &str);
}
