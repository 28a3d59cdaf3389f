use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("video encoder could not run: {0:#}")]
    Encoder(anyhow::Error),

    #[error("video assembly of {} failed: {detail}", .output.display())]
    Assembly { output: PathBuf, detail: String },

    #[error("video assembly reported success but {} was not written", .0.display())]
    MissingOutput(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("camera and microphone permission required")]
    PermissionDenied,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}
