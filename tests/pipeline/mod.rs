//! Whole-recorder tests on real threads
//!
//! The frame clock, capture worker and read-ahead worker all run for real;
//! only the camera and the storage card are replaced by in-memory fakes.
//!
//! Run with: cargo test --test pipeline

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crabdvr::avi::{inspect, ClipKind, ClipName, FrameSize};
use crabdvr::storage::Storage;
use crabdvr::testing::{CollectingNotifier, MemoryStorage, ScriptedSource};
use crabdvr::timing::MonotonicClock;
use crabdvr::{Collaborators, Dvr, DvrConfig, DvrError, RecordState};

struct Harness {
    dvr: Dvr,
    storage: Arc<MemoryStorage>,
    source: Arc<ScriptedSource>,
    notifier: Arc<CollectingNotifier>,
}

fn config() -> DvrConfig {
    let mut config = DvrConfig::default();
    config.camera.frame_size = FrameSize::Qvga;
    config.camera.fps = 20;
    config.camera.max_frame_bytes = 2_000;
    config.camera.live_streams = 1;
    config.recording.use_motion = false;
    config.recording.min_seconds = 1;
    config.recording.max_seconds = 2;
    config.recording.cooldown_secs = 1;
    config.storage.ram_size = 8 * 1024;
    config.storage.min_free_mb = 0;
    config.playback.stop_timeout_ms = 300;
    config.playback.fps_override = Some(200);
    config
}

fn start(config: DvrConfig) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let source = Arc::new(ScriptedSource::new(700));
    let notifier = Arc::new(CollectingNotifier::new());
    let collaborators = Collaborators::new(source.clone()).with_notifier(notifier.clone());
    let dvr = Dvr::start_with(
        config,
        collaborators,
        storage.clone(),
        Arc::new(MonotonicClock::new()),
    )
    .expect("recorder starts");
    Harness {
        dvr,
        storage,
        source,
        notifier,
    }
}

/// Poll `cond` every 20 ms until it holds or `timeout` passes
fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}

/// Force one clip through the duration cap and wait until capture is idle
fn record_one(h: &Harness) -> String {
    let before = h.notifier.saved().len();
    h.dvr.force_record(true);
    assert!(wait_for(Duration::from_secs(8), || h.notifier.saved().len() > before));
    assert!(wait_for(Duration::from_secs(3), || h.dvr.state() == RecordState::Idle));
    h.notifier.saved()[before].clone()
}

fn frames_in(storage: &MemoryStorage, path: &str) -> usize {
    let mut reader = storage.file(path).expect("clip stored").reader();
    inspect(&mut reader, path).expect("clip parses").video_frames()
}

#[test]
fn test_forced_clip_is_capped_saved_and_played() {
    let h = start(config());
    let path = record_one(&h);

    // the duration cap ended it and dropped the manual request
    assert!(!h.dvr.controls().force_record());
    let name = ClipName::parse(&path).unwrap();
    assert_eq!(name.frame_size, "QVGA");
    assert_eq!(name.duration, 2);
    assert_eq!(
        name.kind,
        ClipKind::Recording {
            audio: false,
            telemetry: false
        }
    );
    assert!(h.storage.clips().contains(&path));
    assert!(!h.storage.exists("/current.avi"));

    let frames = frames_in(&h.storage, &path);
    assert!((15..=45).contains(&frames), "{} frames", frames);

    let mut player = h.dvr.player();
    player.open(&path).unwrap();
    let mut played = 0;
    while let Some(frame) = player.next_frame() {
        assert_eq!(frame.len(), 700);
        assert_eq!(&frame[..2], &[0xFF, 0xD8]);
        played += 1;
    }
    assert_eq!(played, frames);
    assert!(player.last_stats().unwrap().completed);
    drop(player);

    let stats = h.dvr.shutdown().unwrap();
    assert_eq!(stats.clips_saved, 1);
    assert!(stats.frames as usize > frames);
}

#[test]
fn test_recording_stops_running_playback() {
    let h = start(config());
    let path = record_one(&h);

    thread::scope(|s| {
        let player = s.spawn(|| {
            let mut player = h.dvr.player();
            // two frames a second: the whole clip would take many seconds
            player.set_fps_override(Some(2));
            player.open(&path).unwrap();
            let started = Instant::now();
            while player.next_frame().is_some() {}
            (started.elapsed(), player.last_stats().unwrap().completed)
        });

        thread::sleep(Duration::from_millis(600));
        h.dvr.force_record(true);

        let (elapsed, completed) = player.join().unwrap();
        assert!(elapsed < Duration::from_secs(4), "playback ran {:?}", elapsed);
        assert!(!completed);
    });

    assert!(wait_for(Duration::from_secs(2), || h.dvr.state() == RecordState::Recording));
    let mut player = h.dvr.player();
    assert!(matches!(player.open(&path), Err(DvrError::PlaybackRefused(_))));
    drop(player);

    // the second clip runs into the duration cap as well
    assert!(wait_for(Duration::from_secs(8), || h.notifier.saved().len() == 2));
    let stats = h.dvr.shutdown().unwrap();
    assert_eq!(stats.clips_saved, 2);
}

#[test]
fn test_still_and_live_stream_get_frames() {
    let mut config = config();
    config.recording.enabled = false;
    let h = start(config);

    h.dvr.request_still();
    let mut still = None;
    assert!(wait_for(Duration::from_secs(2), || {
        still = h.dvr.take_still();
        still.is_some()
    }));
    let still = still.unwrap();
    assert_eq!(still.len(), 700);
    assert_eq!(&still[..2], &[0xFF, 0xD8]);

    let streams = h.dvr.live_streams();
    assert!(streams.open(0));
    let frame = streams.take(0, Duration::from_secs(2)).expect("stream frame");
    assert_eq!(frame.len(), 700);
    streams.close(0);
    assert!(!streams.open(5));
}

#[test]
fn test_shutdown_closes_open_clip() {
    let mut config = config();
    config.recording.max_seconds = 60;
    let h = start(config);

    h.dvr.force_record(true);
    assert!(wait_for(Duration::from_secs(2), || h.dvr.state() == RecordState::Recording));
    thread::sleep(Duration::from_millis(1500));

    let storage = h.storage.clone();
    let notifier = h.notifier.clone();
    let stats = h.dvr.shutdown().unwrap();
    assert_eq!(stats.clips_saved, 1);
    assert_eq!(storage.clips().len(), 1);
    assert_eq!(notifier.saved(), storage.clips());
    // every frame handed out came back
    assert_eq!(h.source.outstanding(), 0);
}

#[test]
fn test_disabled_recording_stays_idle() {
    let mut config = config();
    config.recording.enabled = false;
    let h = start(config);

    h.dvr.force_record(true);
    thread::sleep(Duration::from_millis(500));
    assert_eq!(h.dvr.state(), RecordState::Idle);
    assert!(h.storage.clips().is_empty());
    assert!(h.dvr.is_running());

    let stats = h.dvr.shutdown().unwrap();
    assert!(stats.frames > 0);
    assert_eq!(stats.clips_saved + stats.clips_discarded, 0);
}
