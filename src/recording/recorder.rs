//! Clip lifecycle: open under a temporary name, append frames, then either
//! finalize and rename or discard a clip that turned out too short.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::config::{ClipOutcome, RecorderSettings, RecordingStats};
use super::muxer::AviWriter;
use crate::avi::naming::date_folder;
use crate::avi::{AudioTrack, AviHeaderInfo, ClipName, HeaderScratch, AVI_TEMP};
use crate::capture::Frame;
use crate::collaborators::{AncillaryStream, ClipNotifier, Collaborators, Peripherals};
use crate::errors::DvrError;
use crate::storage::Storage;
use crate::timing::Clock;

struct ClipSession {
    id: Uuid,
    cause: String,
    started_ms: u64,
    started_at: NaiveDateTime,
    open_ms: u64,
    audio: bool,
    telemetry: bool,
}

pub struct Recorder {
    settings: RecorderSettings,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    scratch: Arc<HeaderScratch>,
    audio: Arc<dyn AncillaryStream>,
    telemetry: Arc<dyn AncillaryStream>,
    notifier: Arc<dyn ClipNotifier>,
    peripherals: Arc<dyn Peripherals>,
    recording_enabled: Arc<AtomicBool>,
    writer: AviWriter,
    session: Option<ClipSession>,
    last_stats: Option<RecordingStats>,
}

impl Recorder {
    pub fn new(
        settings: RecorderSettings,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        scratch: Arc<HeaderScratch>,
        collaborators: &Collaborators,
        recording_enabled: Arc<AtomicBool>,
    ) -> Self {
        let writer = AviWriter::new(settings.ram_size);
        Self {
            settings,
            storage,
            clock,
            scratch,
            audio: collaborators.audio.clone(),
            telemetry: collaborators.telemetry.clone(),
            notifier: collaborators.notifier.clone(),
            peripherals: collaborators.peripherals.clone(),
            recording_enabled,
            writer,
            session: None,
            last_stats: None,
        }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn writer(&self) -> &AviWriter {
        &self.writer
    }

    pub fn last_stats(&self) -> Option<&RecordingStats> {
        self.last_stats.as_ref()
    }

    /// Open a new clip under the temporary name
    pub fn open(&mut self, cause: &str) -> Result<(), DvrError> {
        if self.session.is_some() {
            return Err(DvrError::MuxingError("a clip is already open".to_string()));
        }
        let t0 = Instant::now();
        let started_at = self.clock.local_time();

        self.storage.mkdir(&date_folder(&started_at))?;
        if self.storage.exists(AVI_TEMP) {
            log::debug!("Removing stale {}", AVI_TEMP);
            self.storage.remove(AVI_TEMP)?;
        }
        let file = self.storage.create(AVI_TEMP)?;

        let (w, h) = self.settings.frame_size.dimensions();
        self.writer
            .begin(file, &AviHeaderInfo::placeholder(self.settings.fps, w, h));

        let audio = self.audio.begin();
        let telemetry = self.telemetry.begin();
        self.peripherals.recording_started();

        let id = Uuid::new_v4();
        let open_ms = t0.elapsed().as_millis() as u64;
        log::info!("Capture started by {} (session {})", cause, id);
        log::trace!("File opening time: {} ms", open_ms);

        self.session = Some(ClipSession {
            id,
            cause: cause.to_string(),
            started_ms: self.clock.now_ms(),
            started_at,
            open_ms,
            audio,
            telemetry,
        });
        Ok(())
    }

    pub fn append(&mut self, frame: &Frame) -> bool {
        if self.session.is_none() {
            return false;
        }
        self.writer.append_frame(frame.as_slice())
    }

    /// Finalize the open clip, or discard it if it is too short
    pub fn close(&mut self) -> ClipOutcome {
        let Some(session) = self.session.take() else {
            log::debug!("Close requested with no clip open");
            return ClipOutcome::Failed;
        };
        let t0 = Instant::now();
        self.peripherals.recording_stopped();

        let elapsed_ms = self.clock.now_ms().saturating_sub(session.started_ms);
        if elapsed_ms < self.settings.min_seconds as u64 * 1000 {
            self.writer.abandon();
            if session.audio {
                self.audio.finish();
            }
            if session.telemetry {
                self.telemetry.finish();
            }
            if let Err(e) = self.storage.remove(AVI_TEMP) {
                log::warn!("Could not remove short clip: {}", e);
            }
            let secs = (elapsed_ms / 1000) as u32;
            log::info!("Insufficient capture duration: {} secs", secs);
            return ClipOutcome::Discarded { secs };
        }

        let frames = self.writer.frames();
        let actual_fps = frames as f64 * 1000.0 / elapsed_ms.max(1) as f64;
        let fps = (actual_fps.round() as u32).max(1);
        let secs = ((elapsed_ms + 500) / 1000) as u32;

        let audio_len = if session.audio {
            self.writer.append_ancillary(self.audio.as_ref())
        } else {
            0
        };
        let (w, h) = self.settings.frame_size.dimensions();
        let info = AviHeaderInfo {
            fps,
            width: w,
            height: h,
            frame_count: frames,
            movi_len: 0,
            index_len: 0,
            audio: (audio_len > 0).then(|| AudioTrack {
                format: self.audio.audio_format(),
                data_len: audio_len,
            }),
        };

        let writer_stats = match self.writer.finish(&self.scratch, info) {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("Failed to finalize clip: {}", e);
                let _ = self.storage.remove(AVI_TEMP);
                return ClipOutcome::Failed;
            }
        };

        let telemetry_len = if session.telemetry {
            self.telemetry.finish()
        } else {
            0
        };
        let name = ClipName::recording(
            session.started_at,
            self.settings.frame_size,
            fps,
            secs,
            audio_len > 0,
            telemetry_len > 0,
        );
        let path = name.path();
        if let Err(e) = self.storage.rename(AVI_TEMP, &path) {
            log::warn!("Failed to rename clip: {}", e);
            return ClipOutcome::Failed;
        }
        if telemetry_len > 0 {
            if let Err(e) = self.write_sidecar(&name.srt_path()) {
                log::warn!("Telemetry sidecar not written: {}", e);
            }
        }

        let stats = RecordingStats {
            path: path.clone(),
            session_id: session.id.to_string(),
            cause: session.cause,
            duration_ms: elapsed_ms,
            frames,
            required_fps: self.settings.fps,
            actual_fps,
            open_ms: session.open_ms,
            close_ms: t0.elapsed().as_millis() as u64,
            writer: writer_stats,
        };
        stats.log();
        self.last_stats = Some(stats);

        self.notifier.clip_saved(&path);
        self.check_free_space();
        ClipOutcome::Saved(path)
    }

    fn write_sidecar(&self, path: &str) -> Result<(), DvrError> {
        let mut file = self.storage.create(path)?;
        let mut buf = [0u8; 4096];
        loop {
            let n = self.telemetry.drain_into(&mut buf);
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
        }
        file.flush()?;
        Ok(())
    }

    fn check_free_space(&self) {
        if let Some(free) = self.storage.free_bytes() {
            if free < self.settings.min_free_bytes {
                self.recording_enabled.store(false, Ordering::SeqCst);
                log::warn!(
                    "Storage low, {} MB free: recording disabled",
                    free / (1024 * 1024)
                );
            }
        }
    }
}
