//! Clip file naming.
//!
//! Saved clips live in a per-day folder and carry their metadata in the
//! name, e.g. `/20240315/20240315_142501_SVGA_10_35_S.avi`:
//! start time, frame-size tag, achieved fps, duration in seconds and
//! optional flags (`S` audio, `M` telemetry). Time-lapse files end in `_T`
//! and carry playback fps and planned minutes instead.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::format::FrameSize;
use crate::errors::DvrError;

/// Temporary name of the clip being recorded
pub const AVI_TEMP: &str = "/current.avi";
/// Temporary name of the time-lapse being built
pub const TIMELAPSE_TEMP: &str = "/current.tl";

pub const AVI_EXT: &str = "avi";
pub const SRT_EXT: &str = "srt";

/// `/YYYYMMDD`
pub fn date_folder(at: &NaiveDateTime) -> String {
    at.format("/%Y%m%d").to_string()
}

/// `/YYYYMMDD/YYYYMMDD_HHMMSS`
pub fn part_name(at: &NaiveDateTime) -> String {
    at.format("/%Y%m%d/%Y%m%d_%H%M%S").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipKind {
    Recording { audio: bool, telemetry: bool },
    TimeLapse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipName {
    pub started: NaiveDateTime,
    pub frame_size: String,
    /// Achieved fps for recordings, playback fps for time-lapses
    pub fps: u32,
    /// Seconds for recordings, planned minutes for time-lapses
    pub duration: u32,
    pub kind: ClipKind,
}

impl ClipName {
    pub fn recording(
        started: NaiveDateTime,
        frame_size: FrameSize,
        fps: u32,
        secs: u32,
        audio: bool,
        telemetry: bool,
    ) -> Self {
        Self {
            started,
            frame_size: frame_size.tag().to_string(),
            fps,
            duration: secs,
            kind: ClipKind::Recording { audio, telemetry },
        }
    }

    pub fn time_lapse(started: NaiveDateTime, frame_size: FrameSize, playback_fps: u32, mins: u32) -> Self {
        Self {
            started,
            frame_size: frame_size.tag().to_string(),
            fps: playback_fps,
            duration: mins,
            kind: ClipKind::TimeLapse,
        }
    }

    pub fn folder(&self) -> String {
        date_folder(&self.started)
    }

    /// Full storage path of the clip
    pub fn path(&self) -> String {
        let flags = match self.kind {
            ClipKind::Recording { audio, telemetry } => {
                let mut f = String::new();
                if audio {
                    f.push_str("_S");
                }
                if telemetry {
                    f.push_str("_M");
                }
                f
            }
            ClipKind::TimeLapse => "_T".to_string(),
        };
        format!(
            "{}_{}_{}_{}{}.{}",
            part_name(&self.started),
            self.frame_size,
            self.fps,
            self.duration,
            flags,
            AVI_EXT
        )
    }

    /// Path of the telemetry sidecar that accompanies the clip
    pub fn srt_path(&self) -> String {
        let path = self.path();
        format!("{}.{}", &path[..path.len() - AVI_EXT.len() - 1], SRT_EXT)
    }

    pub fn is_time_lapse(&self) -> bool {
        matches!(self.kind, ClipKind::TimeLapse)
    }

    /// Recover the metadata from a clip path or bare file name
    pub fn parse(path: &str) -> Result<Self, DvrError> {
        let invalid = || DvrError::InvalidFilename(path.to_string());

        let base = path.rsplit('/').next().unwrap_or(path);
        let stem = base
            .strip_suffix(".avi")
            .or_else(|| base.strip_suffix(".AVI"))
            .ok_or_else(invalid)?;

        let tokens: Vec<&str> = stem.split('_').collect();
        if tokens.len() < 5 {
            return Err(invalid());
        }

        let started = NaiveDateTime::parse_from_str(
            &format!("{}_{}", tokens[0], tokens[1]),
            "%Y%m%d_%H%M%S",
        )
        .map_err(|_| invalid())?;
        let fps: u32 = tokens[3].parse().map_err(|_| invalid())?;
        let duration: u32 = tokens[4].parse().map_err(|_| invalid())?;

        let flags = &tokens[5..];
        let kind = if flags.contains(&"T") {
            ClipKind::TimeLapse
        } else {
            ClipKind::Recording {
                audio: flags.contains(&"S"),
                telemetry: flags.contains(&"M"),
            }
        };

        Ok(Self {
            started,
            frame_size: tokens[2].to_string(),
            fps,
            duration,
            kind,
        })
    }
}
