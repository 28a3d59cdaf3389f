use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use mugrs::capability::FaceDetector;
use mugrs::config::{self, Config};
use mugrs::controller::{Capabilities, CaptureController, ControllerSettings, LiveView};
use mugrs::devices::{
    CompositeSurface, ConsoleAlerts, DevicePermissions, V4lPhotoCamera, YunetDetector,
};
use mugrs::ffmpeg::FfmpegAssembler;
use mugrs::landmarks::LandmarkProvider;
use mugrs::overlay::{compose, AccessoryToggles, OverlayRenderer};
use mugrs::recorder::{FrameRecorder, RecorderSettings};
use mugrs::Pipeline;

#[derive(Parser)]
#[command(name = "mugrs")]
#[command(
    version,
    about = "Camera with face accessories - sunglasses, hat and mustache - and clip recording"
)]
struct Cli {
    /// Config file (defaults to the system config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct ToggleArgs {
    /// Leave the sunglasses off
    #[arg(long)]
    no_sunglasses: bool,
    /// Leave the hat off
    #[arg(long)]
    no_hat: bool,
    /// Leave the mustache off
    #[arg(long)]
    no_mustache: bool,
}

impl ToggleArgs {
    fn apply(self, defaults: AccessoryToggles) -> AccessoryToggles {
        AccessoryToggles {
            sunglasses: defaults.sunglasses && !self.no_sunglasses,
            hat: defaults.hat && !self.no_hat,
            mustache: defaults.mustache && !self.no_mustache,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record a clip of the camera with accessories
    Record {
        /// Clip length in seconds (defaults to the configured duration)
        #[arg(short, long)]
        seconds: Option<u64>,
        #[command(flatten)]
        toggles: ToggleArgs,
    },
    /// Detect face landmarks in an image and print accessory placements
    Detect {
        image: PathBuf,
        /// Print JSON instead of log lines
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        toggles: ToggleArgs,
    },
    /// Draw the accessories onto an image
    Composite {
        image: PathBuf,
        /// Where to write the result
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        toggles: ToggleArgs,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Record { seconds, toggles } => {
            if let Some(seconds) = seconds {
                cfg.record_duration_secs = seconds;
            }
            cfg.toggles = toggles.apply(cfg.toggles);
            record(&cfg)
        }
        Commands::Detect {
            image,
            json,
            toggles,
        } => detect(&cfg, &image, json, toggles.apply(cfg.toggles)),
        Commands::Composite {
            image,
            output,
            toggles,
        } => composite(&cfg, &image, &output, toggles.apply(cfg.toggles)),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn detector(cfg: &Config) -> Result<Arc<dyn FaceDetector>> {
    let pipeline = Pipeline::new(&cfg.model_path, cfg.score_threshold, cfg.nms_threshold)
        .context("Failed to initialize face detector")?;
    Ok(Arc::new(YunetDetector::new(pipeline)))
}

fn record(cfg: &Config) -> Result<()> {
    let cache = cfg.cache_dir();
    info!("Cache directory: {}", cache.display());

    let view = LiveView::shared(cfg.toggles);
    let renderer =
        OverlayRenderer::load(&cfg.assets_dir).context("Failed to load accessory assets")?;
    let recorder = Arc::new(FrameRecorder::new(
        RecorderSettings::from_config(cfg),
        Arc::new(CompositeSurface::new(&view, renderer)),
        Arc::new(FfmpegAssembler::new(&cfg.ffmpeg)),
    ));

    let caps = Capabilities {
        permissions: Arc::new(DevicePermissions {
            camera: PathBuf::from(&cfg.camera),
            microphone: PathBuf::from(&cfg.microphone),
            storage: cache.clone(),
        }),
        camera: Arc::new(V4lPhotoCamera::new(&cfg.camera, &cache.join("stills"))?),
        detector: detector(cfg)?,
        alerts: Arc::new(ConsoleAlerts),
    };
    let controller =
        CaptureController::new(ControllerSettings::from_config(cfg), view, caps, recorder);

    controller.mount();
    controller
        .handle_record()
        .context("Recording could not start")?;
    info!("Recording {}s...", cfg.record_duration_secs);

    let outcome = controller.wait_for_recording();
    controller.shutdown();

    match outcome {
        Some(Ok(Some(path))) => {
            info!("✓ Video saved");
            println!("{}", path.display());
            Ok(())
        }
        Some(Ok(None)) => {
            anyhow::bail!("No frames were captured. Is the camera delivering images?")
        }
        Some(Err(e)) => Err(e).context("Recording failed"),
        None => anyhow::bail!("Recording did not complete"),
    }
}

fn detect(cfg: &Config, input: &Path, json: bool, toggles: AccessoryToggles) -> Result<()> {
    let provider = LandmarkProvider::new(detector(cfg)?);
    let landmarks = provider.detect(input);
    let placements = landmarks
        .as_ref()
        .map(|lm| compose(lm, &toggles))
        .unwrap_or_default();

    if json {
        let out = serde_json::json!({
            "image": input,
            "landmarks": landmarks,
            "placements": placements,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match landmarks {
        Some(lm) => info!(
            "Landmarks: left eye {:?}, right eye {:?}, nose {:?}",
            lm.left_eye, lm.right_eye, lm.nose_base
        ),
        None => info!("No face detected in {}", input.display()),
    }
    for p in &placements {
        info!(
            "{:?}: left {:.1} top {:.1} width {:.1} height {:.1}",
            p.accessory, p.rect.left, p.rect.top, p.rect.width, p.rect.height
        );
    }
    Ok(())
}

fn composite(
    cfg: &Config,
    input: &Path,
    output: &Path,
    toggles: AccessoryToggles,
) -> Result<()> {
    let renderer =
        OverlayRenderer::load(&cfg.assets_dir).context("Failed to load accessory assets")?;
    let provider = LandmarkProvider::new(detector(cfg)?);

    let Some(landmarks) = provider.detect(input) else {
        anyhow::bail!(
            "Failed to detect a face. Please ensure the face is visible and well-lit."
        );
    };
    let placements = compose(&landmarks, &toggles);

    let frame = image::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .to_rgb8();
    renderer
        .render(&frame, &placements)
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("✓ {} accessories drawn to {}", placements.len(), output.display());
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(&Config::default(), Some(config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
