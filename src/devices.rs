//! Desktop implementations of the capability traits: V4L2 camera, YuNet
//! detector, image-based compositing and log-backed alerts.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use mugrs_vision::{Camera, FaceLandmarks, Pipeline};

use crate::capability::{
    AlertSink, FaceDetector, PermissionProvider, PhotoCamera, SnapshotFormat, SnapshotOptions,
    ViewSurface,
};
use crate::controller::{LiveView, SharedView};
use crate::overlay::OverlayRenderer;
use crate::sync::lock;

/// Permissions on a desktop are whether the device nodes are usable.
pub struct DevicePermissions {
    pub camera: PathBuf,
    pub microphone: PathBuf,
    pub storage: PathBuf,
}

impl PermissionProvider for DevicePermissions {
    fn request_camera(&self) -> bool {
        let ok = OpenOptions::new().read(true).open(&self.camera).is_ok();
        log::info!("camera {}: {}", self.camera.display(), granted(ok));
        ok
    }

    fn request_microphone(&self) -> bool {
        let ok = self.microphone.exists();
        log::info!("microphone {}: {}", self.microphone.display(), granted(ok));
        ok
    }

    fn request_storage(&self) -> bool {
        let ok = std::fs::create_dir_all(&self.storage).is_ok();
        log::info!("storage {}: {}", self.storage.display(), granted(ok));
        ok
    }
}

fn granted(ok: bool) -> &'static str {
    if ok {
        "granted"
    } else {
        "denied"
    }
}

/// Number of still files reused in rotation.
const STILL_SLOTS: usize = 4;

/// Stills from a V4L2 camera, written into a small rotating set of files.
///
/// The device is opened on the first photo so that a missing camera shows
/// up as a denied permission rather than a startup failure.
pub struct V4lPhotoCamera {
    device: String,
    camera: Mutex<Option<Camera>>,
    dir: PathBuf,
    taken: AtomicUsize,
}

impl V4lPhotoCamera {
    pub fn new(device: &str, dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating still directory {}", dir.display()))?;
        Ok(Self {
            device: device.to_string(),
            camera: Mutex::new(None),
            dir: dir.to_path_buf(),
            taken: AtomicUsize::new(0),
        })
    }
}

impl PhotoCamera for V4lPhotoCamera {
    fn take_photo(&self) -> Result<PathBuf> {
        let mut camera = lock(&self.camera);
        if camera.is_none() {
            *camera = Some(Camera::open(&self.device).context("Failed to open camera")?);
        }
        let frame = camera
            .as_mut()
            .context("camera not open")?
            .frame()?;
        drop(camera);

        let slot = self.taken.fetch_add(1, Ordering::Relaxed) % STILL_SLOTS;
        let path = self.dir.join(format!("still_{slot}.jpg"));
        frame
            .save(&path)
            .with_context(|| format!("writing still {}", path.display()))?;
        Ok(path)
    }
}

/// YuNet landmarks. The ONNX session needs exclusive access per run.
pub struct YunetDetector {
    pipeline: Mutex<Pipeline>,
}

impl YunetDetector {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Mutex::new(pipeline),
        }
    }
}

impl FaceDetector for YunetDetector {
    fn detect(&self, image: &Path) -> Result<Vec<FaceLandmarks>> {
        lock(&self.pipeline).landmarks_from_path(image)
    }
}

/// The live view as seen by the recorder: latest still plus accessories.
pub struct CompositeSurface {
    view: Weak<Mutex<LiveView>>,
    renderer: OverlayRenderer,
}

impl CompositeSurface {
    pub fn new(view: &SharedView, renderer: OverlayRenderer) -> Self {
        Self {
            view: Arc::downgrade(view),
            renderer,
        }
    }
}

impl ViewSurface for CompositeSurface {
    fn is_renderable(&self) -> bool {
        self.view.strong_count() > 0
    }

    fn capture(&self, dest: &Path, options: &SnapshotOptions) -> Result<()> {
        let view = self.view.upgrade().context("view is gone")?;
        let (still, placements) = {
            let v = lock(&view);
            (v.still.clone(), v.placements())
        };
        let still = still.context("no camera frame yet")?;

        let frame = image::open(&still)
            .with_context(|| format!("reading still {}", still.display()))?
            .to_rgb8();
        let composited = self.renderer.render(&frame, &placements);

        match options.format {
            SnapshotFormat::Jpg => {
                let file = File::create(dest)
                    .with_context(|| format!("creating {}", dest.display()))?;
                JpegEncoder::new_with_quality(BufWriter::new(file), options.jpeg_quality())
                    .encode_image(&composited)?;
            }
            SnapshotFormat::Png => composited.save_with_format(dest, ImageFormat::Png)?,
        }
        Ok(())
    }
}

/// Alerts for a terminal session: they go to the log.
pub struct ConsoleAlerts;

impl AlertSink for ConsoleAlerts {
    fn alert(&self, title: &str, message: &str) {
        log::warn!("{title}: {message}");
    }
}
