use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::capability::SnapshotOptions;
use crate::overlay::AccessoryToggles;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("MUGRS_CONFIG_PATH").unwrap_or("/usr/local/etc/mugrs/config.toml"))
});

pub static SHARE_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("MUGRS_SHARE_PREFIX").unwrap_or("/usr/local/share/mugrs"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    pub microphone: String,
    pub model_path: PathBuf,
    pub assets_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub ffmpeg: String,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub sample_interval_ms: u64,
    pub capture_interval_ms: u64,
    pub frame_duration_ms: u64,
    pub record_duration_secs: u64,
    pub request_storage_permission: bool,
    pub snapshot: SnapshotOptions,
    pub toggles: AccessoryToggles,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            microphone: "/dev/snd".to_string(),
            model_path: SHARE_PREFIX.join(mugrs_vision::model::DETECTOR_MODEL_FILE),
            assets_dir: SHARE_PREFIX.join("assets"),
            cache_dir: None,
            ffmpeg: "ffmpeg".to_string(),
            score_threshold: 0.6,
            nms_threshold: 0.3,
            sample_interval_ms: 250,
            capture_interval_ms: 200,
            frame_duration_ms: 200,
            record_duration_secs: 12,
            request_storage_permission: cfg!(target_os = "android"),
            snapshot: SnapshotOptions::default(),
            toggles: AccessoryToggles::default(),
        }
    }
}

impl Config {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms)
    }

    pub fn record_duration(&self) -> Duration {
        Duration::from_secs(self.record_duration_secs)
    }

    /// Where stills, frames, manifests and the output video go.
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        ProjectDirs::from("", "", "mugrs")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("mugrs"))
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
