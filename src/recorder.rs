//! Frame recorder
//!
//! Snapshots the composited view on a fixed cadence while a session is
//! active, then hands the ordered frames to the video assembler as an ffmpeg
//! concat manifest.
//!
//! Each session carries a generation number. The capture loop only appends a
//! frame while its own generation is the active one, so a loop that outlives
//! its session can never write into the next one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{SnapshotOptions, VideoAssembler, ViewSurface};
use crate::config::Config;
use crate::error::RecorderError;
use crate::sync::lock;

pub const MANIFEST_NAME: &str = "frames.txt";

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub capture_interval: Duration,
    pub frame_duration: Duration,
    pub snapshot: SnapshotOptions,
    pub cache_dir: PathBuf,
}

impl RecorderSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            capture_interval: cfg.capture_interval(),
            frame_duration: cfg.frame_duration(),
            snapshot: cfg.snapshot,
            cache_dir: cfg.cache_dir(),
        }
    }
}

/// One recording, from `start` to `stop`.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,
    pub generation: u64,
    pub dir: PathBuf,
    /// Capture order, which is also playback order.
    pub frames: Vec<PathBuf>,
}

struct Shared {
    active: AtomicBool,
    generation: AtomicU64,
    session: Mutex<Option<RecordingSession>>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.active.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Append a frame if `generation` still owns the session.
    fn push_frame(&self, generation: u64, frame: PathBuf) -> bool {
        match lock(&self.session).as_mut() {
            Some(session) if session.generation == generation => {
                session.frames.push(frame);
                true
            }
            _ => false,
        }
    }
}

struct Worker {
    wake: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct FrameRecorder {
    settings: RecorderSettings,
    surface: Arc<dyn ViewSurface>,
    assembler: Arc<dyn VideoAssembler>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl FrameRecorder {
    pub fn new(
        settings: RecorderSettings,
        surface: Arc<dyn ViewSurface>,
        assembler: Arc<dyn VideoAssembler>,
    ) -> Self {
        Self {
            settings,
            surface,
            assembler,
            shared: Arc::new(Shared {
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Frames captured so far in the current session.
    pub fn frame_count(&self) -> usize {
        lock(&self.shared.session)
            .as_ref()
            .map_or(0, |s| s.frames.len())
    }

    pub fn session_id(&self) -> Option<Uuid> {
        lock(&self.shared.session).as_ref().map(|s| s.id)
    }

    /// Open a session and start snapshotting. Returns `false` without
    /// touching the running session if one is already active.
    pub fn start(&self) -> Result<bool, RecorderError> {
        let mut worker = lock(&self.worker);
        if self.is_active() {
            debug!("start ignored: already capturing");
            return Ok(false);
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let id = Uuid::new_v4();
        let dir = self.settings.cache_dir.join(format!("session-{id}"));
        std::fs::create_dir_all(&dir)?;

        *lock(&self.shared.session) = Some(RecordingSession {
            id,
            generation,
            dir: dir.clone(),
            frames: Vec::new(),
        });
        self.shared.active.store(true, Ordering::SeqCst);

        let (wake, rx) = mpsc::channel();
        let ctx = CaptureLoop {
            shared: self.shared.clone(),
            surface: self.surface.clone(),
            generation,
            dir,
            interval: self.settings.capture_interval,
            options: self.settings.snapshot,
        };
        let handle = match thread::Builder::new()
            .name(format!("capture-{generation}"))
            .spawn(move || ctx.run(rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.active.store(false, Ordering::SeqCst);
                lock(&self.shared.session).take();
                return Err(e.into());
            }
        };
        *worker = Some(Worker { wake, handle });

        info!("recording session {id} started");
        Ok(true)
    }

    /// End the session and assemble its frames into a video.
    ///
    /// `Ok(None)` when nothing was recorded; the empty session directory is removed.
    pub fn stop(&self) -> Result<Option<PathBuf>, RecorderError> {
        let mut worker = lock(&self.worker);
        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(Worker { wake, handle }) = worker.take() {
            drop(wake);
            if handle.join().is_err() {
                warn!("capture loop panicked");
            }
        }

        let Some(session) = lock(&self.shared.session).take() else {
            debug!("stop ignored: no session");
            return Ok(None);
        };
        info!(
            "recording session {} stopped with {} frames",
            session.id,
            session.frames.len()
        );
        if session.frames.is_empty() {
            if let Err(e) = std::fs::remove_dir_all(&session.dir) {
                warn!("removing empty session {}: {e}", session.dir.display());
            }
            return Ok(None);
        }

        let manifest = session.dir.join(MANIFEST_NAME);
        std::fs::write(
            &manifest,
            build_manifest(&session.frames, self.settings.frame_duration),
        )?;

        let output = self
            .settings
            .cache_dir
            .join(format!("mugrs-{}.mp4", session.id));
        let report = self
            .assembler
            .concat(&manifest, &output)
            .map_err(RecorderError::Encoder)?;
        if !report.success {
            return Err(RecorderError::Assembly {
                output,
                detail: tail(&report.log, 5),
            });
        }
        if !output.exists() {
            return Err(RecorderError::MissingOutput(output));
        }

        info!("video saved to {}", output.display());
        Ok(Some(output))
    }
}

struct CaptureLoop {
    shared: Arc<Shared>,
    surface: Arc<dyn ViewSurface>,
    generation: u64,
    dir: PathBuf,
    interval: Duration,
    options: SnapshotOptions,
}

impl CaptureLoop {
    fn run(self, wake: Receiver<()>) {
        let ext = self.options.format.extension();
        let mut index = 0usize;
        let mut next = Instant::now();

        while self.shared.is_current(self.generation) {
            if !self.surface.is_renderable() {
                info!("view is gone, capture loop {} ends", self.generation);
                break;
            }

            let dest = self.dir.join(format!("frame_{index:05}.{ext}"));
            match self.surface.capture(&dest, &self.options) {
                Ok(()) => {
                    if !self.shared.push_frame(self.generation, dest) {
                        break;
                    }
                    index += 1;
                }
                Err(e) => warn!("snapshot failed: {e:#}"),
            }

            // Hold the schedule; after an overrun, go again right away.
            next += self.interval;
            let now = Instant::now();
            if next < now {
                next = now;
            }
            match wake.recv_timeout(next - now) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!("capture loop {} exits after {index} frames", self.generation);
    }
}

/// ffmpeg concat demuxer script: one `file` + `duration` pair per frame.
pub fn build_manifest(frames: &[PathBuf], frame_duration: Duration) -> String {
    let secs = frame_duration.as_secs_f64();
    frames
        .iter()
        .map(|p| format!("file '{}'\nduration {}", quote(p), secs))
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

fn tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
