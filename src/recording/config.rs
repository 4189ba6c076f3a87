//! Recording settings, statistics and close outcomes

use serde::{Deserialize, Serialize};

use crate::avi::FrameSize;

/// Settings the clip recorder runs with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderSettings {
    pub frame_size: FrameSize,
    /// Frame clock rate while recording
    pub fps: u32,
    /// Flush block size of the ring buffer
    pub ram_size: usize,
    /// Clips shorter than this are discarded
    pub min_seconds: u32,
    /// Free space below which recording is switched off after a close
    pub min_free_bytes: u64,
}

impl RecorderSettings {
    pub fn new(frame_size: FrameSize, fps: u32, ram_size: usize) -> Self {
        Self {
            frame_size,
            fps,
            ram_size,
            min_seconds: 30,
            min_free_bytes: 100 * 1024 * 1024,
        }
    }

    pub fn with_min_seconds(mut self, secs: u32) -> Self {
        self.min_seconds = secs;
        self
    }

    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }
}

/// Time-lapse cadence and output settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLapseSettings {
    pub secs_between_frames: u32,
    pub duration_mins: u32,
    pub playback_fps: u32,
}

impl TimeLapseSettings {
    /// Frames in a complete time-lapse
    pub fn required_frames(&self) -> u32 {
        (self.duration_mins * 60 / self.secs_between_frames.max(1)).max(1)
    }
}

impl Default for TimeLapseSettings {
    fn default() -> Self {
        Self {
            secs_between_frames: 10,
            duration_mins: 60,
            playback_fps: 1,
        }
    }
}

/// Counters kept by the ring-buffer writer for one clip
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterStats {
    /// Full blocks written to storage
    pub block_flushes: u32,
    pub block_bytes: u64,
    /// Bytes written when the tail was flushed on close
    pub tail_bytes: u64,
    pub write_errors: u32,
    pub rejected_frames: u32,
    pub video_bytes: u64,
    pub buffer_ms: u64,
    pub write_ms: u64,
    /// Final file length
    pub file_bytes: u64,
}

/// Statistics of a saved clip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStats {
    pub path: String,
    pub session_id: String,
    pub cause: String,
    pub duration_ms: u64,
    pub frames: u32,
    pub required_fps: u32,
    pub actual_fps: f64,
    pub open_ms: u64,
    pub close_ms: u64,
    pub writer: WriterStats,
}

impl RecordingStats {
    pub fn avg_frame_bytes(&self) -> u64 {
        if self.frames > 0 {
            self.writer.video_bytes / self.frames as u64
        } else {
            0
        }
    }

    /// Storage write throughput in kB/s
    pub fn write_kbps(&self) -> u64 {
        let written = self.writer.block_bytes + self.writer.tail_bytes;
        written * 1000 / 1024 / self.writer.write_ms.max(1)
    }

    /// Share of the clip duration spent buffering and writing
    pub fn busy_percent(&self) -> u64 {
        let busy = self.writer.buffer_ms + self.writer.write_ms + self.open_ms + self.close_ms;
        (busy * 100 / self.duration_ms.max(1)).min(100)
    }

    pub fn log(&self) {
        log::info!("******** AVI recording stats ********");
        log::info!("Recorded {}", self.path);
        log::info!("Trigger: {} (session {})", self.cause, self.session_id);
        log::info!("AVI duration: {} secs", self.duration_ms / 1000);
        log::info!("Number of frames: {}", self.frames);
        log::info!("Required FPS: {}", self.required_fps);
        log::info!("Actual FPS: {:.1}", self.actual_fps);
        log::info!("File size: {} bytes", self.writer.file_bytes);
        if self.frames > 0 {
            log::info!("Average frame length: {} bytes", self.avg_frame_bytes());
            log::info!(
                "Average frame buffering time: {} ms",
                self.writer.buffer_ms / self.frames as u64
            );
            log::info!(
                "Average frame storage time: {} ms",
                self.writer.write_ms / self.frames as u64
            );
        }
        log::info!("Average storage write speed: {} kB/s", self.write_kbps());
        log::info!("File open / completion times: {} ms / {} ms", self.open_ms, self.close_ms);
        log::info!("Busy: {}%", self.busy_percent());
        if self.writer.write_errors > 0 {
            log::warn!("Failed block writes: {}", self.writer.write_errors);
        }
        log::info!("*************************************");
    }
}

/// Result of closing a clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipOutcome {
    /// Finalized and renamed to this path
    Saved(String),
    /// Shorter than the minimum duration; the temporary file was removed
    Discarded { secs: u32 },
    /// Finalization failed; the reason was logged
    Failed,
}

impl ClipOutcome {
    pub fn saved_path(&self) -> Option<&str> {
        match self {
            ClipOutcome::Saved(p) => Some(p),
            _ => None,
        }
    }
}
