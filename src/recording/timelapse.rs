//! Time-lapse muxer.
//!
//! Keeps its own writer and temporary file, independent of clip
//! recording. One frame is kept every `secs_between_frames` worth of ticks
//! until the planned number of frames is reached; the file is then
//! finalized at the configured playback rate.

use std::sync::Arc;

use super::config::{ClipOutcome, TimeLapseSettings};
use super::muxer::AviWriter;
use crate::avi::naming::date_folder;
use crate::avi::{AviHeaderInfo, ClipName, FrameSize, HeaderScratch, TIMELAPSE_TEMP};
use crate::capture::Frame;
use crate::collaborators::ClipNotifier;
use crate::errors::DvrError;
use crate::storage::Storage;
use crate::timing::Clock;

struct TimeLapseSession {
    name: ClipName,
    required: u32,
}

pub struct TimeLapse {
    settings: TimeLapseSettings,
    frame_size: FrameSize,
    /// Ticks between kept frames at the current capture rate
    interval_mark: u32,
    interval_cnt: u32,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    scratch: Arc<HeaderScratch>,
    notifier: Arc<dyn ClipNotifier>,
    writer: AviWriter,
    session: Option<TimeLapseSession>,
}

impl TimeLapse {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: TimeLapseSettings,
        frame_size: FrameSize,
        capture_fps: u32,
        ram_size: usize,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        scratch: Arc<HeaderScratch>,
        notifier: Arc<dyn ClipNotifier>,
    ) -> Self {
        Self {
            settings,
            frame_size,
            interval_mark: Self::mark(settings.secs_between_frames, capture_fps),
            interval_cnt: 0,
            storage,
            clock,
            scratch,
            notifier,
            writer: AviWriter::new(ram_size),
            session: None,
        }
    }

    fn mark(secs_between_frames: u32, fps: u32) -> u32 {
        secs_between_frames.saturating_mul(fps).max(1)
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn frames(&self) -> u32 {
        self.writer.frames()
    }

    pub fn interval_mark(&self) -> u32 {
        self.interval_mark
    }

    /// Offer this tick's frame, captured while frames arrive at `fps`.
    /// Returns an outcome when a time-lapse completed on this frame.
    pub fn offer(&mut self, frame: &Frame, fps: u32) -> Option<ClipOutcome> {
        // playback and reconfiguration both change the tick rate mid-session
        self.interval_mark = Self::mark(self.settings.secs_between_frames, fps);
        if self.session.is_none() {
            if let Err(e) = self.start() {
                log::warn!("Time lapse not started: {}", e);
                return None;
            }
            // first frame of a session is kept straight away
            self.interval_cnt = self.interval_mark;
        }

        self.interval_cnt += 1;
        if self.interval_cnt < self.interval_mark {
            return None;
        }
        self.interval_cnt = 0;
        self.writer.append_frame(frame.as_slice());

        let required = self.session.as_ref().map(|s| s.required).unwrap_or(0);
        if self.writer.frames() >= required {
            return Some(self.finish());
        }
        None
    }

    /// Close a partial time-lapse with the frames collected so far
    pub fn shutdown(&mut self) -> Option<ClipOutcome> {
        if self.session.is_none() {
            return None;
        }
        if self.writer.frames() == 0 {
            self.writer.abandon();
            self.session = None;
            let _ = self.storage.remove(TIMELAPSE_TEMP);
            log::info!("Time lapse abandoned with no frames");
            return Some(ClipOutcome::Discarded { secs: 0 });
        }
        log::info!("Closing partial time lapse at {} frames", self.writer.frames());
        Some(self.finish())
    }

    fn start(&mut self) -> Result<(), DvrError> {
        let at = self.clock.local_time();
        self.storage.mkdir(&date_folder(&at))?;
        if self.storage.exists(TIMELAPSE_TEMP) {
            self.storage.remove(TIMELAPSE_TEMP)?;
        }
        let file = self.storage.create(TIMELAPSE_TEMP)?;
        let (w, h) = self.frame_size.dimensions();
        self.writer.begin(
            file,
            &AviHeaderInfo::placeholder(self.settings.playback_fps, w, h),
        );

        let name = ClipName::time_lapse(
            at,
            self.frame_size,
            self.settings.playback_fps,
            self.settings.duration_mins,
        );
        let required = self.settings.required_frames();
        log::info!(
            "Started time lapse file {}, duration {} mins, for {} frames",
            name.path(),
            self.settings.duration_mins,
            required
        );
        self.session = Some(TimeLapseSession { name, required });
        Ok(())
    }

    fn finish(&mut self) -> ClipOutcome {
        let Some(session) = self.session.take() else {
            return ClipOutcome::Failed;
        };
        self.interval_cnt = 0;
        let (w, h) = self.frame_size.dimensions();
        let mut info = AviHeaderInfo::placeholder(self.settings.playback_fps, w, h);
        info.frame_count = self.writer.frames();

        if let Err(e) = self.writer.finish(&self.scratch, info) {
            log::warn!("Failed to finalize time lapse: {}", e);
            let _ = self.storage.remove(TIMELAPSE_TEMP);
            return ClipOutcome::Failed;
        }
        let path = session.name.path();
        if let Err(e) = self.storage.rename(TIMELAPSE_TEMP, &path) {
            log::warn!("Failed to rename time lapse: {}", e);
            return ClipOutcome::Failed;
        }
        log::info!("Finished time lapse: {}", path);
        self.notifier.clip_saved(&path);
        ClipOutcome::Saved(path)
    }
}
