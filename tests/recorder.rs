mod common;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{temp_dir, wait_until, AssemblerMode, FakeAssembler, FakeSurface};
use mugrs::capability::SnapshotOptions;
use mugrs::recorder::{FrameRecorder, RecorderSettings, MANIFEST_NAME};
use mugrs::RecorderError;

const WAIT: Duration = Duration::from_secs(5);

fn settings(cache_dir: PathBuf) -> RecorderSettings {
    RecorderSettings {
        capture_interval: Duration::from_millis(5),
        frame_duration: Duration::from_millis(200),
        snapshot: SnapshotOptions::default(),
        cache_dir,
    }
}

fn recorder(
    cache: &Path,
    surface: Arc<FakeSurface>,
    assembler: Arc<FakeAssembler>,
) -> FrameRecorder {
    FrameRecorder::new(settings(cache.to_path_buf()), surface, assembler)
}

#[test]
fn test_stop_without_start_writes_nothing() {
    let cache = temp_dir("rec-idle");
    let assembler = Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput));
    let rec = recorder(&cache, Arc::new(FakeSurface::default()), assembler.clone());

    assert!(rec.stop().unwrap().is_none());
    assert!(!cache.exists());
    assert_eq!(assembler.call_count(), 0);
}

#[test]
fn test_records_frames_and_assembles() {
    let cache = temp_dir("rec-ok");
    let surface = Arc::new(FakeSurface::default());
    let assembler = Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput));
    let rec = recorder(&cache, surface.clone(), assembler.clone());

    assert!(rec.start().unwrap());
    assert!(rec.is_active());
    let id = rec.session_id().unwrap();
    assert!(wait_until(WAIT, || rec.frame_count() >= 3));

    let output = rec.stop().unwrap().expect("a video");
    assert!(!rec.is_active());
    assert!(rec.session_id().is_none());
    assert_eq!(output, cache.join(format!("mugrs-{id}.mp4")));
    assert!(output.exists());

    let calls = assembler.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let (manifest, out) = &calls[0];
    assert_eq!(out, &output);
    assert_eq!(
        manifest,
        &cache.join(format!("session-{id}")).join(MANIFEST_NAME)
    );

    // Every line pair names the next frame, in capture order.
    let text = std::fs::read_to_string(manifest).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines.len() >= 6);
    assert_eq!(lines.len() % 2, 0);
    for (i, pair) in lines.chunks(2).enumerate() {
        assert!(pair[0].starts_with("file '"));
        assert!(pair[0].ends_with(&format!("frame_{i:05}.jpg'")));
        assert_eq!(pair[1], "duration 0.2");
    }

    std::fs::remove_dir_all(&cache).unwrap();
}

#[test]
fn test_start_while_active_keeps_session() {
    let cache = temp_dir("rec-twice");
    let rec = recorder(
        &cache,
        Arc::new(FakeSurface::default()),
        Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput)),
    );

    assert!(rec.start().unwrap());
    let id = rec.session_id();
    assert!(wait_until(WAIT, || rec.frame_count() >= 2));
    let before = rec.frame_count();

    assert!(!rec.start().unwrap());
    assert_eq!(rec.session_id(), id);
    assert!(rec.frame_count() >= before);

    assert!(rec.stop().unwrap().is_some());
    std::fs::remove_dir_all(&cache).unwrap();
}

#[test]
fn test_no_frames_skips_assembly() {
    let cache = temp_dir("rec-empty");
    let surface = Arc::new(FakeSurface::default());
    surface.gone.store(true, Ordering::SeqCst);
    let assembler = Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput));
    let rec = recorder(&cache, surface.clone(), assembler.clone());

    assert!(rec.start().unwrap());
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(rec.frame_count(), 0);

    assert!(rec.stop().unwrap().is_none());
    assert_eq!(assembler.call_count(), 0);
    assert_eq!(surface.captures.load(Ordering::SeqCst), 0);
    // The session directory does not outlive an empty session.
    assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);
    std::fs::remove_dir_all(&cache).unwrap();
}

/// Captures started within `window` by a recorder ticking every `interval`.
fn captures_in_window(tag: &str, interval: Duration, delay: Duration, window: Duration) -> usize {
    let cache = temp_dir(tag);
    let surface = Arc::new(FakeSurface::slow(delay));
    let rec = FrameRecorder::new(
        RecorderSettings {
            capture_interval: interval,
            ..settings(cache.clone())
        },
        surface.clone(),
        Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput)),
    );

    rec.start().unwrap();
    std::thread::sleep(window);
    let started = surface.captures.load(Ordering::SeqCst);
    rec.stop().unwrap();
    std::fs::remove_dir_all(&cache).unwrap();
    started
}

#[test]
fn test_cadence_ignores_snapshot_time() {
    // 40 ms schedule, 25 ms snapshots: 16 starts in 600 ms on schedule,
    // about 10 if each wait began after the snapshot finished.
    let n = captures_in_window(
        "rec-cadence",
        Duration::from_millis(40),
        Duration::from_millis(25),
        Duration::from_millis(600),
    );
    assert!(n >= 13, "only {n} captures");
    assert!(n <= 17, "{n} captures");
}

#[test]
fn test_overrun_captures_again_immediately() {
    // 40 ms snapshots on a 20 ms schedule run back to back: 16 starts in
    // 600 ms, about 11 if a full interval followed each overrun.
    let n = captures_in_window(
        "rec-overrun",
        Duration::from_millis(20),
        Duration::from_millis(40),
        Duration::from_millis(600),
    );
    assert!(n >= 13, "only {n} captures");
    assert!(n <= 17, "{n} captures");
}

#[test]
fn test_capture_ends_when_view_goes_away() {
    let cache = temp_dir("rec-gone");
    let surface = Arc::new(FakeSurface::default());
    let rec = recorder(
        &cache,
        surface.clone(),
        Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput)),
    );

    rec.start().unwrap();
    assert!(wait_until(WAIT, || rec.frame_count() >= 1));
    surface.gone.store(true, Ordering::SeqCst);

    // Give the loop time to notice, then check it stopped adding frames.
    std::thread::sleep(Duration::from_millis(30));
    let settled = rec.frame_count();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(rec.frame_count(), settled);

    // Frames taken before the view went away still make a video.
    assert!(rec.stop().unwrap().is_some());
    std::fs::remove_dir_all(&cache).unwrap();
}

#[test]
fn test_failed_snapshots_are_skipped() {
    let cache = temp_dir("rec-skip");
    let surface = Arc::new(FakeSurface::failing_every(2));
    let assembler = Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput));
    let rec = recorder(&cache, surface.clone(), assembler.clone());

    rec.start().unwrap();
    assert!(wait_until(WAIT, || rec.frame_count() >= 3));
    rec.stop().unwrap().unwrap();

    assert!(surface.captures.load(Ordering::SeqCst) > 3);
    let (manifest, _) = assembler.calls.lock().unwrap()[0].clone();
    let text = std::fs::read_to_string(manifest).unwrap();
    let files: Vec<&str> = text.lines().filter(|l| l.starts_with("file")).collect();
    for (i, line) in files.iter().enumerate() {
        assert!(line.ends_with(&format!("frame_{i:05}.jpg'")), "{line}");
    }
    std::fs::remove_dir_all(&cache).unwrap();
}

#[test]
fn test_restart_opens_fresh_session() {
    let cache = temp_dir("rec-restart");
    let rec = recorder(
        &cache,
        Arc::new(FakeSurface::default()),
        Arc::new(FakeAssembler::new(AssemblerMode::WriteOutput)),
    );

    rec.start().unwrap();
    let first_id = rec.session_id();
    assert!(wait_until(WAIT, || rec.frame_count() >= 2));
    let first = rec.stop().unwrap().unwrap();

    assert!(rec.start().unwrap());
    assert_ne!(rec.session_id(), first_id);
    assert!(wait_until(WAIT, || rec.frame_count() >= 1));
    let second = rec.stop().unwrap().unwrap();

    assert_ne!(first, second);
    assert!(first.exists() && second.exists());
    std::fs::remove_dir_all(&cache).unwrap();
}

#[test]
fn test_assembler_failure_is_reported() {
    let cache = temp_dir("rec-fail");
    let rec = recorder(
        &cache,
        Arc::new(FakeSurface::default()),
        Arc::new(FakeAssembler::new(AssemblerMode::ExitFailure)),
    );

    rec.start().unwrap();
    assert!(wait_until(WAIT, || rec.frame_count() >= 1));
    match rec.stop() {
        Err(RecorderError::Assembly { output, detail }) => {
            assert!(!output.exists());
            assert!(detail.contains("Invalid data"));
        }
        other => panic!("expected assembly error, got {other:?}"),
    }
    assert!(!rec.is_active());
    std::fs::remove_dir_all(&cache).unwrap();
}

#[test]
fn test_missing_output_is_an_error() {
    let cache = temp_dir("rec-missing");
    let rec = recorder(
        &cache,
        Arc::new(FakeSurface::default()),
        Arc::new(FakeAssembler::new(AssemblerMode::NoOutput)),
    );

    rec.start().unwrap();
    assert!(wait_until(WAIT, || rec.frame_count() >= 1));
    assert!(matches!(rec.stop(), Err(RecorderError::MissingOutput(_))));
    std::fs::remove_dir_all(&cache).unwrap();
}

#[test]
fn test_encoder_that_cannot_run() {
    let cache = temp_dir("rec-noenc");
    let rec = recorder(
        &cache,
        Arc::new(FakeSurface::default()),
        Arc::new(FakeAssembler::new(AssemblerMode::CannotRun)),
    );

    rec.start().unwrap();
    assert!(wait_until(WAIT, || rec.frame_count() >= 1));
    let err = rec.stop().unwrap_err();
    assert!(matches!(err, RecorderError::Encoder(_)));
    assert!(err.to_string().contains("not found"));
    std::fs::remove_dir_all(&cache).unwrap();
}
