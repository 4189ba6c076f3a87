//! Configuration file tests
//!
//! Run with: cargo test --test config_test

use std::time::Duration;

use crabdvr::avi::FrameSize;
use crabdvr::DvrConfig;
use tempfile::tempdir;

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("crabdvr.toml");

    let mut config = DvrConfig::default();
    config.camera.frame_size = FrameSize::Hd;
    config.recording.min_seconds = 12;
    config.recording.use_motion = false;
    config.timelapse.enabled = true;
    config.storage.root = "/mnt/card".to_string();
    config.playback.fps_override = Some(25);

    config.save_to_file(&path).unwrap();
    assert!(path.exists());
    let loaded = DvrConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let loaded = DvrConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, DvrConfig::default());
}

#[test]
fn test_hand_written_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crabdvr.toml");
    std::fs::write(
        &path,
        r#"
[camera]
frame_size = "QVGA"
fps = 15

[recording]
min_seconds = 10
max_seconds = 60
cooldown_secs = 2

[storage]
ram_size = 32768
min_free_mb = 5

[playback]
stop_timeout_ms = 250
"#,
    )
    .unwrap();

    let config = DvrConfig::load_from_file(&path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.fps(), 15);
    assert_eq!(config.max_frame_bytes(), FrameSize::Qvga.max_jpeg_bytes());

    let limits = config.record_limits();
    assert_eq!(limits.min_ms, 10_000);
    assert_eq!(limits.max_ms, 60_000);
    assert_eq!(limits.cooldown_ms, 2_000);

    let scheduler = config.scheduler_settings();
    assert_eq!(scheduler.fps, 15);
    assert_eq!(scheduler.stop_playback_timeout, Duration::from_millis(250));
    assert_eq!(scheduler.limits, limits);

    let recorder = config.recorder_settings();
    assert_eq!(recorder.ram_size, 32768);
    assert_eq!(recorder.min_seconds, 10);
    assert_eq!(recorder.min_free_bytes, 5 * 1024 * 1024);
}

#[test]
fn test_validation_messages() {
    let mut config = DvrConfig::default();
    config.storage.ram_size = 100_000;
    assert!(config.validate().unwrap_err().contains("multiple of 512"));

    let mut config = DvrConfig::default();
    config.recording.max_in_flight = 0;
    assert!(config.validate().unwrap_err().contains("in flight"));

    let mut config = DvrConfig::default();
    config.timelapse.secs_between_frames = 0;
    assert!(config.validate().is_err());

    let mut config = DvrConfig::default();
    config.playback.fps_override = Some(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_start_rejects_invalid_config() {
    let mut config = DvrConfig::default();
    config.recording.max_seconds = 1;
    let source = std::sync::Arc::new(crabdvr::testing::ScriptedSource::new(100));
    let result = crabdvr::Dvr::start(config, crabdvr::Collaborators::new(source));
    match result {
        Err(e) => {
            assert!(matches!(e, crabdvr::DvrError::ConfigError(_)));
            assert!(e.is_fatal());
        }
        Ok(_) => panic!("invalid config must not start"),
    }
}
