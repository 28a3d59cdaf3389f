//! In-process doubles for the capability traits.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use mugrs::capability::{
    AlertSink, AssemblyReport, FaceDetector, PermissionProvider, PhotoCamera, SnapshotOptions,
    VideoAssembler, ViewSurface,
};
use mugrs::{FaceLandmarks, Point};

pub fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mugrs-{tag}-{}", uuid::Uuid::new_v4()))
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub fn reference_face() -> FaceLandmarks {
    FaceLandmarks::new(
        Point::new(100.0, 200.0),
        Point::new(140.0, 200.0),
        Point::new(120.0, 230.0),
    )
}

#[derive(Default)]
pub struct FakeSurface {
    pub gone: AtomicBool,
    pub captures: AtomicUsize,
    /// Every n-th capture fails when set.
    pub fail_every: Option<usize>,
    /// How long each capture takes.
    pub delay: Duration,
}

impl FakeSurface {
    pub fn failing_every(n: usize) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

impl ViewSurface for FakeSurface {
    fn is_renderable(&self) -> bool {
        !self.gone.load(Ordering::SeqCst)
    }

    fn capture(&self, dest: &Path, _options: &SnapshotOptions) -> Result<()> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(every) = self.fail_every {
            if n % every == 0 {
                anyhow::bail!("snapshot {n} failed");
            }
        }
        std::fs::write(dest, b"frame")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerMode {
    WriteOutput,
    ExitFailure,
    NoOutput,
    CannotRun,
}

pub struct FakeAssembler {
    pub mode: AssemblerMode,
    pub calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeAssembler {
    pub fn new(mode: AssemblerMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl VideoAssembler for FakeAssembler {
    fn concat(&self, manifest: &Path, output: &Path) -> Result<AssemblyReport> {
        self.calls
            .lock()
            .unwrap()
            .push((manifest.to_path_buf(), output.to_path_buf()));
        match self.mode {
            AssemblerMode::WriteOutput => {
                std::fs::write(output, b"mp4")?;
                Ok(AssemblyReport {
                    success: true,
                    log: String::new(),
                })
            }
            AssemblerMode::ExitFailure => Ok(AssemblyReport {
                success: false,
                log: "frames.txt: Invalid data found when processing input".into(),
            }),
            AssemblerMode::NoOutput => Ok(AssemblyReport {
                success: true,
                log: String::new(),
            }),
            AssemblerMode::CannotRun => anyhow::bail!("ffmpeg: not found"),
        }
    }
}

pub struct FakePermissions {
    pub camera: bool,
    pub microphone: bool,
    pub storage: bool,
    pub storage_asked: AtomicBool,
}

impl FakePermissions {
    pub fn new(camera: bool, microphone: bool) -> Self {
        Self {
            camera,
            microphone,
            storage: true,
            storage_asked: AtomicBool::new(false),
        }
    }
}

impl PermissionProvider for FakePermissions {
    fn request_camera(&self) -> bool {
        self.camera
    }

    fn request_microphone(&self) -> bool {
        self.microphone
    }

    fn request_storage(&self) -> bool {
        self.storage_asked.store(true, Ordering::SeqCst);
        self.storage
    }
}

/// Writes a placeholder still per photo.
pub struct FakeCamera {
    pub dir: PathBuf,
    pub taken: AtomicUsize,
    pub broken: AtomicBool,
}

impl FakeCamera {
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).unwrap();
        Self {
            dir: dir.to_path_buf(),
            taken: AtomicUsize::new(0),
            broken: AtomicBool::new(false),
        }
    }
}

impl PhotoCamera for FakeCamera {
    fn take_photo(&self) -> Result<PathBuf> {
        if self.broken.load(Ordering::SeqCst) {
            anyhow::bail!("camera unplugged");
        }
        let n = self.taken.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("still_{n}.jpg"));
        std::fs::write(&path, b"still")?;
        Ok(path)
    }
}

/// Returns whatever face is currently set, or an error when `fail` is on.
#[derive(Default)]
pub struct FakeDetector {
    pub face: Mutex<Option<FaceLandmarks>>,
    pub fail: AtomicBool,
}

impl FakeDetector {
    pub fn with_face(face: FaceLandmarks) -> Self {
        Self {
            face: Mutex::new(Some(face)),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_face(&self, face: Option<FaceLandmarks>) {
        *self.face.lock().unwrap() = face;
    }
}

impl FaceDetector for FakeDetector {
    fn detect(&self, _image: &Path) -> Result<Vec<FaceLandmarks>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("detector backend crashed");
        }
        Ok(self.face.lock().unwrap().iter().copied().collect())
    }
}

#[derive(Default)]
pub struct RecordedAlerts {
    pub alerts: Mutex<Vec<(String, String)>>,
}

impl RecordedAlerts {
    pub fn all(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordedAlerts {
    fn alert(&self, title: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}
