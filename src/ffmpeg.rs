//! Video assembly through the ffmpeg binary.
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::capability::{AssemblyReport, VideoAssembler};

pub struct FfmpegAssembler {
    binary: String,
}

impl FfmpegAssembler {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Arguments for joining a concat manifest into an H.264-friendly mp4.
///
/// `-y` overwrites an existing output without prompting.
pub fn concat_args(manifest: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-f", "concat", "-safe", "0", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(manifest.into());
    args.extend(
        ["-vsync", "vfr", "-pix_fmt", "yuv420p"]
            .into_iter()
            .map(OsString::from),
    );
    args.push(output.into());
    args
}

impl VideoAssembler for FfmpegAssembler {
    fn concat(&self, manifest: &Path, output: &Path) -> Result<AssemblyReport> {
        let args = concat_args(manifest, output);
        log::info!("running {} {:?}", self.binary, args);

        let out = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute {}", self.binary))?;

        let log = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            log::error!("ffmpeg exited with {}", out.status);
        }
        Ok(AssemblyReport {
            success: out.status.success(),
            log,
        })
    }
}
