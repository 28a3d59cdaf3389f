//! Capture session controller
//!
//! Owns permission state, the landmark sampling loop and the fixed-length
//! recording flow. Sampling keeps running while a recording is in progress.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use mugrs_vision::FaceLandmarks;

use crate::capability::{AlertSink, FaceDetector, PermissionProvider, PhotoCamera};
use crate::config::Config;
use crate::error::{ControllerError, RecorderError};
use crate::landmarks::{LandmarkProvider, LandmarkState};
use crate::overlay::{compose, Accessory, AccessoryToggles, Placement};
use crate::recorder::FrameRecorder;
use crate::sync::lock;

/// What is on screen: the latest still and the landmarks drawn over it.
#[derive(Debug, Default)]
pub struct LiveView {
    pub still: Option<PathBuf>,
    pub landmarks: LandmarkState,
    pub toggles: AccessoryToggles,
}

pub type SharedView = Arc<Mutex<LiveView>>;

impl LiveView {
    pub fn shared(toggles: AccessoryToggles) -> SharedView {
        Arc::new(Mutex::new(LiveView {
            toggles,
            ..LiveView::default()
        }))
    }

    pub fn placements(&self) -> Vec<Placement> {
        self.landmarks
            .displayed()
            .map(|lm| compose(lm, &self.toggles))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthorized,
    Authorizing,
    Ready,
    RecordingRequested,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionState {
    pub camera: bool,
    pub microphone: bool,
    /// `None` where the platform has no separate storage permission.
    pub storage: Option<bool>,
}

impl PermissionState {
    pub fn authorized(&self) -> bool {
        self.camera && self.microphone
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub sample_interval: Duration,
    pub record_duration: Duration,
    pub request_storage: bool,
}

impl ControllerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            sample_interval: cfg.sample_interval(),
            record_duration: cfg.record_duration(),
            request_storage: cfg.request_storage_permission,
        }
    }
}

pub struct Capabilities {
    pub permissions: Arc<dyn PermissionProvider>,
    pub camera: Arc<dyn PhotoCamera>,
    pub detector: Arc<dyn FaceDetector>,
    pub alerts: Arc<dyn AlertSink>,
}

/// Result of one fixed-length recording.
pub type RecordingOutcome = Result<Option<PathBuf>, RecorderError>;

struct Sampler {
    wake: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct CaptureController {
    settings: ControllerSettings,
    view: SharedView,
    prompts: Arc<dyn PermissionProvider>,
    camera: Arc<dyn PhotoCamera>,
    alerts: Arc<dyn AlertSink>,
    landmarks: Arc<LandmarkProvider>,
    recorder: Arc<FrameRecorder>,
    phase: Arc<Mutex<SessionPhase>>,
    granted: Mutex<Option<PermissionState>>,
    sampler: Mutex<Option<Sampler>>,
    pending: Mutex<Option<JoinHandle<RecordingOutcome>>>,
}

impl CaptureController {
    pub fn new(
        settings: ControllerSettings,
        view: SharedView,
        caps: Capabilities,
        recorder: Arc<FrameRecorder>,
    ) -> Self {
        Self {
            settings,
            view,
            prompts: caps.permissions,
            camera: caps.camera,
            alerts: caps.alerts,
            landmarks: Arc::new(LandmarkProvider::new(caps.detector)),
            recorder,
            phase: Arc::new(Mutex::new(SessionPhase::Unauthorized)),
            granted: Mutex::new(None),
            sampler: Mutex::new(None),
            pending: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *lock(&self.phase)
    }

    fn set_phase(&self, next: SessionPhase) {
        let mut phase = lock(&self.phase);
        debug!("phase {:?} -> {:?}", *phase, next);
        *phase = next;
    }

    pub fn permissions(&self) -> Option<PermissionState> {
        *lock(&self.granted)
    }

    pub fn recorder(&self) -> &Arc<FrameRecorder> {
        &self.recorder
    }

    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    /// Ask for permissions and, if camera and microphone are granted, start
    /// landmark sampling.
    pub fn mount(&self) -> PermissionState {
        self.set_phase(SessionPhase::Authorizing);

        let camera = self.prompts.request_camera();
        let microphone = self.prompts.request_microphone();
        let storage = self
            .settings
            .request_storage
            .then(|| self.prompts.request_storage());
        if storage == Some(false) {
            warn!("storage permission denied; saving may fail");
        }

        let state = PermissionState {
            camera,
            microphone,
            storage,
        };
        *lock(&self.granted) = Some(state);

        if state.authorized() {
            self.set_phase(SessionPhase::Ready);
            self.start_sampling();
        } else {
            warn!("camera={camera} microphone={microphone}: staying unauthorized");
            self.set_phase(SessionPhase::Unauthorized);
        }
        state
    }

    fn start_sampling(&self) {
        let mut sampler = lock(&self.sampler);
        if sampler.is_some() {
            return;
        }

        let (wake, rx) = mpsc::channel::<()>();
        let camera = self.camera.clone();
        let landmarks = self.landmarks.clone();
        let view = self.view.clone();
        let interval = self.settings.sample_interval;

        let spawned = thread::Builder::new()
            .name("landmark-sampler".into())
            .spawn(move || loop {
                let started = Instant::now();
                let tick = match camera.take_photo() {
                    Ok(still) => {
                        let found = landmarks.detect(&still);
                        let mut v = lock(&view);
                        v.still = Some(still);
                        v.landmarks.update(found);
                        v.landmarks.is_fresh()
                    }
                    Err(e) => {
                        debug!("photo failed: {e:#}");
                        lock(&view).landmarks.update(None);
                        false
                    }
                };
                debug!("sampling tick, fresh={tick}");

                match rx.recv_timeout(interval.saturating_sub(started.elapsed())) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => *sampler = Some(Sampler { wake, handle }),
            Err(e) => error!("failed to start landmark sampling: {e}"),
        }
    }

    /// Start a fixed-length recording.
    ///
    /// The recorder is stopped on a timer after the configured duration;
    /// the outcome is shown as an alert and can be collected with
    /// [`CaptureController::wait_for_recording`].
    pub fn handle_record(&self) -> Result<(), ControllerError> {
        let authorized = self.permissions().map_or(false, |p| p.authorized());
        if !authorized {
            self.alerts
                .alert("Permissions missing", "Camera and microphone required");
            return Err(ControllerError::PermissionDenied);
        }

        {
            let mut phase = lock(&self.phase);
            if matches!(
                *phase,
                SessionPhase::RecordingRequested | SessionPhase::Recording
            ) {
                debug!("record request rejected: {:?}", *phase);
                return Err(ControllerError::AlreadyRecording);
            }
            *phase = SessionPhase::RecordingRequested;
        }

        match self.recorder.start() {
            Ok(true) => {}
            Ok(false) => {
                warn!("recorder already has a session running; not taking it over");
                self.set_phase(SessionPhase::Ready);
                return Err(ControllerError::AlreadyRecording);
            }
            Err(e) => {
                self.set_phase(SessionPhase::Ready);
                self.alerts.alert("Error", &e.to_string());
                return Err(e.into());
            }
        }
        self.set_phase(SessionPhase::Recording);

        let recorder = self.recorder.clone();
        let phase = self.phase.clone();
        let alerts = self.alerts.clone();
        let duration = self.settings.record_duration;

        let spawned = thread::Builder::new()
            .name("record-timer".into())
            .spawn(move || {
                thread::sleep(duration);
                let outcome = recorder.stop();
                *lock(&phase) = SessionPhase::Ready;
                surface_outcome(alerts.as_ref(), &outcome);
                outcome
            });

        match spawned {
            Ok(handle) => {
                if let Some(previous) = lock(&self.pending).replace(handle) {
                    let _ = previous.join();
                }
                info!("recording for {duration:?}");
                Ok(())
            }
            Err(e) => {
                if let Err(stop_err) = self.recorder.stop() {
                    warn!("stopping recorder after failed timer spawn: {stop_err}");
                }
                self.set_phase(SessionPhase::Ready);
                let err = ControllerError::from(RecorderError::from(e));
                self.alerts.alert("Error", &err.to_string());
                Err(err)
            }
        }
    }

    /// Block until the pending recording finishes and return its outcome.
    /// `None` if no recording was started since the last call.
    pub fn wait_for_recording(&self) -> Option<RecordingOutcome> {
        let handle = lock(&self.pending).take()?;
        match handle.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                error!("recording timer panicked");
                None
            }
        }
    }

    pub fn landmarks(&self) -> LandmarkState {
        lock(&self.view).landmarks
    }

    /// Displayed landmarks, fresh or stale.
    pub fn displayed_landmarks(&self) -> Option<FaceLandmarks> {
        lock(&self.view).landmarks.displayed().copied()
    }

    pub fn placements(&self) -> Vec<Placement> {
        lock(&self.view).placements()
    }

    pub fn toggles(&self) -> AccessoryToggles {
        lock(&self.view).toggles
    }

    pub fn toggle(&self, accessory: Accessory) -> bool {
        lock(&self.view).toggles.toggle(accessory)
    }

    pub fn set_toggle(&self, accessory: Accessory, on: bool) {
        lock(&self.view).toggles.set(accessory, on);
    }

    /// Stop landmark sampling. A recording in flight still completes.
    pub fn shutdown(&self) {
        if let Some(Sampler { wake, handle }) = lock(&self.sampler).take() {
            drop(wake);
            if handle.join().is_err() {
                warn!("landmark sampler panicked");
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn surface_outcome(alerts: &dyn AlertSink, outcome: &RecordingOutcome) {
    match outcome {
        Ok(Some(path)) => alerts.alert("Video Saved", &path.display().to_string()),
        Ok(None) => info!("recording captured no frames"),
        Err(e) => {
            error!("recording failed: {e}");
            alerts.alert("Error", &e.to_string());
        }
    }
}
