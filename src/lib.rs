pub mod capability;
pub mod config;
pub mod controller;
pub mod devices;
pub mod error;
pub mod ffmpeg;
pub mod landmarks;
pub mod overlay;
pub mod recorder;
mod sync;

// Re-export vision types for convenience
pub use mugrs_vision::{FaceLandmarks, Pipeline, Point};

pub use controller::{CaptureController, SessionPhase};
pub use error::{ControllerError, RecorderError};
pub use recorder::FrameRecorder;
