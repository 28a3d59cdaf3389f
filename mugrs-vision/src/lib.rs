pub mod face;
pub mod landmarks;
pub mod model;
pub mod pipeline;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use face::Detection;
pub use landmarks::{FaceLandmarks, Point};
pub use pipeline::Pipeline;
pub use video::Camera;
