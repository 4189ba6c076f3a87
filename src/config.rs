//! Configuration management for crabdvr
//!
//! Loads and saves the recorder configuration as TOML and turns it into the
//! settings each subsystem runs with.

use crate::avi::{FrameSize, AVI_HEADER_LEN};
use crate::capture::{RecordLimits, SchedulerSettings};
use crate::errors::DvrError;
use crate::recording::{RecorderSettings, TimeLapseSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DvrConfig {
    pub camera: CameraConfig,
    pub recording: RecordingConfig,
    pub timelapse: TimeLapseConfig,
    pub storage: StorageConfig,
    pub playback: PlaybackConfig,
}

/// Frame source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub frame_size: FrameSize,
    /// Capture rate, 0 for the frame size's default
    pub fps: u32,
    /// Largest frame accepted, 0 for width x height / 5
    pub max_frame_bytes: usize,
    /// Number of live-stream slots
    pub live_streams: usize,
}

/// Motion recording configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    /// Use the motion detector as a trigger
    pub use_motion: bool,
    /// Clips shorter than this are discarded
    pub min_seconds: u32,
    /// Hard cap on clip length
    pub max_seconds: u32,
    /// Hard cap on frames per clip
    pub max_frames: u32,
    pub cooldown_secs: u32,
    /// Seconds between motion checks while recording
    pub move_stop_secs: u32,
    /// Most frames processed per frame clock wake
    pub max_in_flight: u32,
}

/// Time-lapse configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeLapseConfig {
    pub enabled: bool,
    pub secs_between_frames: u32,
    pub duration_mins: u32,
    pub playback_fps: u32,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory clips are stored under
    pub root: String,
    /// Ring buffer flush block, also the playback read block
    pub ram_size: usize,
    /// Recording is switched off below this much free space
    pub min_free_mb: u64,
}

/// Playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Time playback gets to stop by itself before it is forced
    pub stop_timeout_ms: u64,
    /// Play every clip at this rate instead of its recorded one
    pub fps_override: Option<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_size: FrameSize::Svga,
            fps: 0,
            max_frame_bytes: 0,
            live_streams: 2,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_motion: true,
            min_seconds: 30,
            max_seconds: 300,
            max_frames: 20_000,
            cooldown_secs: 5,
            move_stop_secs: 5,
            max_in_flight: 4,
        }
    }
}

impl Default for TimeLapseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secs_between_frames: 10,
            duration_mins: 60,
            playback_fps: 1,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "./recordings".to_string(),
            ram_size: 128 * 1024,
            min_free_mb: 100,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 500,
            fps_override: None,
        }
    }
}

impl DvrConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DvrError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| DvrError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: DvrConfig = toml::from_str(&contents)
            .map_err(|e| DvrError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DvrError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DvrError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| DvrError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| DvrError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabdvr.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Capture rate after applying the frame size default
    pub fn fps(&self) -> u32 {
        if self.camera.fps == 0 {
            self.camera.frame_size.default_fps()
        } else {
            self.camera.fps
        }
    }

    /// Frame size limit after applying the frame size default
    pub fn max_frame_bytes(&self) -> usize {
        if self.camera.max_frame_bytes == 0 {
            self.camera.frame_size.max_jpeg_bytes()
        } else {
            self.camera.max_frame_bytes
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        let fps = self.fps();
        if fps == 0 || fps > 240 {
            return Err("Invalid FPS (must be 1-240)".to_string());
        }

        let ram = self.storage.ram_size;
        if ram % 512 != 0 || ram <= AVI_HEADER_LEN {
            return Err(format!(
                "RAM size {} must be a multiple of 512 larger than {}",
                ram, AVI_HEADER_LEN
            ));
        }
        if ram < self.max_frame_bytes() + 8 {
            return Err(format!(
                "RAM size {} cannot hold a {} byte frame",
                ram,
                self.max_frame_bytes()
            ));
        }

        if self.recording.max_seconds < self.recording.min_seconds {
            return Err("Maximum recording time is below the minimum".to_string());
        }
        if self.recording.max_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }

        if self.timelapse.secs_between_frames == 0 {
            return Err("Time lapse interval must be at least 1 second".to_string());
        }
        if self.timelapse.playback_fps == 0 {
            return Err("Time lapse playback FPS must be at least 1".to_string());
        }
        if self.playback.fps_override == Some(0) {
            return Err("Playback FPS override must be at least 1".to_string());
        }

        Ok(())
    }

    pub fn record_limits(&self) -> RecordLimits {
        RecordLimits {
            min_ms: self.recording.min_seconds as u64 * 1000,
            max_ms: self.recording.max_seconds as u64 * 1000,
            max_frames: self.recording.max_frames,
            cooldown_ms: self.recording.cooldown_secs as u64 * 1000,
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings::new(self.camera.frame_size, self.fps(), self.storage.ram_size)
            .with_min_seconds(self.recording.min_seconds)
            .with_min_free_bytes(self.storage.min_free_mb * 1024 * 1024)
    }

    pub fn timelapse_settings(&self) -> TimeLapseSettings {
        TimeLapseSettings {
            secs_between_frames: self.timelapse.secs_between_frames,
            duration_mins: self.timelapse.duration_mins,
            playback_fps: self.timelapse.playback_fps,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            fps: self.fps(),
            max_frame_bytes: self.max_frame_bytes(),
            max_in_flight: self.recording.max_in_flight,
            use_motion: self.recording.use_motion,
            move_stop_secs: self.recording.move_stop_secs,
            limits: self.record_limits(),
            stop_playback_timeout: Duration::from_millis(self.playback.stop_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DvrConfig::default();
        assert_eq!(config.camera.frame_size, FrameSize::Svga);
        assert_eq!(config.fps(), 10);
        assert_eq!(config.max_frame_bytes(), 96_000);
        assert!(config.recording.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad_ram = DvrConfig::default();
        bad_ram.storage.ram_size = 1000;
        assert!(bad_ram.validate().is_err());

        let mut small_ram = DvrConfig::default();
        small_ram.storage.ram_size = 64 * 1024;
        assert!(small_ram.validate().is_err());
        small_ram.camera.max_frame_bytes = 60_000;
        assert!(small_ram.validate().is_ok());

        let mut bad_caps = DvrConfig::default();
        bad_caps.recording.max_seconds = 10;
        assert!(bad_caps.validate().is_err());

        let mut bad_fps = DvrConfig::default();
        bad_fps.camera.fps = 500;
        assert!(bad_fps.validate().is_err());
    }

    #[test]
    fn test_config_toml_format() {
        let config = DvrConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[camera]"));
        assert!(toml_string.contains("[recording]"));
        assert!(toml_string.contains("[timelapse]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("[playback]"));
        assert!(toml_string.contains("frame_size = \"SVGA\""));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: DvrConfig = toml::from_str(
            "[recording]\nmin_seconds = 5\n\n[camera]\nframe_size = \"VGA\"\n",
        )
        .unwrap();
        assert_eq!(config.recording.min_seconds, 5);
        assert_eq!(config.recording.max_seconds, 300);
        assert_eq!(config.fps(), 20);
        assert_eq!(config.record_limits().min_ms, 5000);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = DvrConfig::load_from_file("nonexistent_file.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), DvrConfig::default());
    }
}
