//! The recorder as one context object.
//!
//! [`Dvr`] owns the frame clock, the capture worker, the playback engine
//! and the flags shared between them. Nothing here is process-global:
//! dropping the `Dvr` (or calling [`Dvr::shutdown`]) closes open clips and
//! joins every thread it started.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::avi::HeaderScratch;
use crate::capture::{
    CaptureControls, CaptureScheduler, CaptureWorker, LiveStreams, RecordState, SchedulerStats,
    StillCapture,
};
use crate::collaborators::Collaborators;
use crate::config::DvrConfig;
use crate::errors::DvrError;
use crate::playback::{PlaybackControl, PlaybackEngine};
use crate::recording::{Recorder, TimeLapse};
use crate::signal::{PacingToken, TickNotify, MAX_TICK_BACKLOG};
use crate::storage::{FsStorage, Storage};
use crate::timing::{Clock, FrameClock, MonotonicClock};

pub struct Dvr {
    config: DvrConfig,
    storage: Arc<dyn Storage>,
    frame_clock: Arc<FrameClock>,
    playback: Arc<PlaybackControl>,
    controls: Arc<CaptureControls>,
    streams: Arc<LiveStreams>,
    still: Arc<StillCapture>,
    player: Mutex<PlaybackEngine>,
    worker: Option<CaptureWorker>,
}

impl Dvr {
    /// Start recording into the configured storage root.
    ///
    /// Errors here are fatal for recording: nothing has been started.
    pub fn start(config: DvrConfig, collaborators: Collaborators) -> Result<Self, DvrError> {
        config.validate().map_err(DvrError::ConfigError)?;
        let storage = Arc::new(FsStorage::new(&config.storage.root)?);
        Self::start_with(config, collaborators, storage, Arc::new(MonotonicClock::new()))
    }

    /// Start on a caller-supplied storage and clock
    pub fn start_with(
        config: DvrConfig,
        collaborators: Collaborators,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DvrError> {
        config.validate().map_err(DvrError::ConfigError)?;

        let ticks = Arc::new(TickNotify::new(MAX_TICK_BACKLOG));
        let pacing = Arc::new(PacingToken::new());
        let frame_clock = Arc::new(FrameClock::new(ticks.clone(), pacing.clone()));
        let playback = Arc::new(PlaybackControl::new(frame_clock.clone(), pacing));
        let controls = Arc::new(CaptureControls::new(config.recording.enabled));
        let scratch = Arc::new(HeaderScratch::new());
        let streams = Arc::new(LiveStreams::new(config.camera.live_streams));
        let still = Arc::new(StillCapture::new(config.max_frame_bytes()));

        let recorder = Recorder::new(
            config.recorder_settings(),
            storage.clone(),
            clock.clone(),
            scratch.clone(),
            &collaborators,
            controls.enabled_flag(),
        );
        let mut scheduler = CaptureScheduler::new(
            config.scheduler_settings(),
            &collaborators,
            recorder,
            clock.clone(),
            controls.clone(),
            playback.clone(),
        )
        .with_streams(streams.clone())
        .with_still(still.clone());
        if config.timelapse.enabled {
            scheduler = scheduler.with_timelapse(TimeLapse::new(
                config.timelapse_settings(),
                config.camera.frame_size,
                config.fps(),
                config.storage.ram_size,
                storage.clone(),
                clock,
                scratch,
                collaborators.notifier.clone(),
            ));
        }

        let player = PlaybackEngine::new(
            storage.clone(),
            playback.clone(),
            config.storage.ram_size,
            config.playback.fps_override,
        )?;

        frame_clock.start(config.fps())?;
        let worker = CaptureWorker::spawn(scheduler, ticks)?;

        log::info!(
            "Recorder started: {} at {} fps, {} byte blocks, min {}s max {}s{}",
            config.camera.frame_size,
            config.fps(),
            config.storage.ram_size,
            config.recording.min_seconds,
            config.recording.max_seconds,
            if config.timelapse.enabled { ", time lapse on" } else { "" }
        );

        Ok(Self {
            config,
            storage,
            frame_clock,
            playback,
            controls,
            streams,
            still,
            player: Mutex::new(player),
            worker: Some(worker),
        })
    }

    pub fn config(&self) -> &DvrConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn controls(&self) -> &Arc<CaptureControls> {
        &self.controls
    }

    pub fn state(&self) -> RecordState {
        self.controls.state()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| w.is_running())
    }

    /// Record until switched off or until a cap closes the clip
    pub fn force_record(&self, on: bool) {
        self.controls.set_force_record(on);
    }

    /// Re-enable recording after storage was freed
    pub fn set_recording_enabled(&self, on: bool) {
        self.controls.set_recording_enabled(on);
    }

    pub fn live_streams(&self) -> &Arc<LiveStreams> {
        &self.streams
    }

    /// Ask for a copy of the next valid frame
    pub fn request_still(&self) {
        self.still.request();
    }

    pub fn take_still(&self) -> Option<Vec<u8>> {
        self.still.take()
    }

    /// Exclusive access to the playback engine for one consumer
    pub fn player(&self) -> MutexGuard<'_, PlaybackEngine> {
        self.player.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop playback from outside the consumer. Returns false if it had to
    /// be forced.
    pub fn stop_playback(&self) -> bool {
        self.playback
            .stop_playing(Duration::from_millis(self.config.playback.stop_timeout_ms))
    }

    /// Stop everything, closing the open clip and the time-lapse with what
    /// they have. Returns the capture statistics.
    pub fn shutdown(mut self) -> Option<SchedulerStats> {
        self.halt()
    }

    fn halt(&mut self) -> Option<SchedulerStats> {
        let worker = self.worker.take()?;
        log::info!("Recorder shutting down");
        self.stop_playback();
        self.frame_clock.stop();
        let stats = worker.stop().map(|scheduler| scheduler.stats().clone());
        if let Some(stats) = &stats {
            log::info!(
                "Captured {} frames ({} dropped), {} clips saved, {} discarded",
                stats.frames,
                stats.dropped,
                stats.clips_saved,
                stats.clips_discarded
            );
        }
        stats
    }
}

impl Drop for Dvr {
    fn drop(&mut self) {
        self.halt();
    }
}
