//! Per-tick capture work and the worker thread that runs it.
//!
//! Each frame clock tick pulls frames from the source, feeds the
//! time-lapse, live streams and still capture, decides whether motion is
//! evaluated, and steps the record state machine. Every acquired frame is
//! released before the tick returns, whatever happened to it.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cadence::MotionCadence;
use super::frame::Frame;
use super::state::{CloseReason, RecordAction, RecordLimits, RecordState, RecordStateMachine};
use super::streams::{LiveStreams, StillCapture};
use crate::collaborators::{Collaborators, FrameSource, MotionDetector, MotionResult, TriggerSensor};
use crate::errors::DvrError;
use crate::playback::PlaybackControl;
use crate::recording::{ClipOutcome, Recorder, TimeLapse};
use crate::signal::TickNotify;
use crate::timing::Clock;

const WAKE_TIMEOUT: Duration = Duration::from_millis(100);

/// Flags shared between the capture worker and the outside world
pub struct CaptureControls {
    force_record: AtomicBool,
    recording_enabled: Arc<AtomicBool>,
    state: AtomicU8,
}

impl CaptureControls {
    pub fn new(recording_enabled: bool) -> Self {
        Self {
            force_record: AtomicBool::new(false),
            recording_enabled: Arc::new(AtomicBool::new(recording_enabled)),
            state: AtomicU8::new(RecordState::Idle.as_u8()),
        }
    }

    /// Record regardless of motion until switched off or a cap is hit
    pub fn set_force_record(&self, on: bool) {
        self.force_record.store(on, Ordering::SeqCst);
    }

    pub fn force_record(&self) -> bool {
        self.force_record.load(Ordering::SeqCst)
    }

    pub fn set_recording_enabled(&self, on: bool) {
        self.recording_enabled.store(on, Ordering::SeqCst);
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording_enabled.load(Ordering::SeqCst)
    }

    /// The flag the recorder clears when storage runs low
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        self.recording_enabled.clone()
    }

    /// Last state published by the capture worker
    pub fn state(&self) -> RecordState {
        RecordState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn publish(&self, state: RecordState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

impl Default for CaptureControls {
    fn default() -> Self {
        Self::new(true)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub fps: u32,
    /// Frames larger than this are dropped
    pub max_frame_bytes: usize,
    /// Most frames processed for one wake, however large the backlog
    pub max_in_flight: u32,
    pub use_motion: bool,
    /// Seconds between motion checks while recording
    pub move_stop_secs: u32,
    pub limits: RecordLimits,
    /// How long an opening clip waits for playback to stop by itself
    pub stop_playback_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub wakes: u64,
    pub frames: u64,
    pub dropped: u64,
    pub motion_checks: u64,
    pub clips_saved: u64,
    pub clips_discarded: u64,
    pub clips_failed: u64,
    pub timelapses_saved: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Dropped,
    Processed(RecordAction),
}

pub struct CaptureScheduler {
    settings: SchedulerSettings,
    source: Arc<dyn FrameSource>,
    motion: Arc<dyn MotionDetector>,
    sensor: Arc<dyn TriggerSensor>,
    clock: Arc<dyn Clock>,
    machine: RecordStateMachine,
    cadence: MotionCadence,
    last_motion: MotionResult,
    recorder: Recorder,
    timelapse: Option<TimeLapse>,
    streams: Arc<LiveStreams>,
    still: Arc<StillCapture>,
    controls: Arc<CaptureControls>,
    playback: Arc<PlaybackControl>,
    stats: SchedulerStats,
}

impl CaptureScheduler {
    pub fn new(
        settings: SchedulerSettings,
        collaborators: &Collaborators,
        recorder: Recorder,
        clock: Arc<dyn Clock>,
        controls: Arc<CaptureControls>,
        playback: Arc<PlaybackControl>,
    ) -> Self {
        Self {
            machine: RecordStateMachine::new(settings.limits),
            cadence: MotionCadence::new(settings.move_stop_secs, settings.fps),
            still: Arc::new(StillCapture::new(settings.max_frame_bytes)),
            settings,
            source: collaborators.source.clone(),
            motion: collaborators.motion.clone(),
            sensor: collaborators.sensor.clone(),
            clock,
            last_motion: MotionResult::default(),
            recorder,
            timelapse: None,
            streams: Arc::new(LiveStreams::new(0)),
            controls,
            playback,
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_timelapse(mut self, timelapse: TimeLapse) -> Self {
        self.timelapse = Some(timelapse);
        self
    }

    pub fn with_streams(mut self, streams: Arc<LiveStreams>) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_still(mut self, still: Arc<StillCapture>) -> Self {
        self.still = still;
        self
    }

    pub fn state(&self) -> RecordState {
        self.machine.state()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn timelapse(&self) -> Option<&TimeLapse> {
        self.timelapse.as_ref()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn controls(&self) -> &Arc<CaptureControls> {
        &self.controls
    }

    /// Handle one wake with `pending` ticks owed. Returns frames processed.
    pub fn run_tick(&mut self, pending: u32) -> u32 {
        let n = pending.min(self.settings.max_in_flight.max(1));
        if n < pending {
            log::debug!("Capture backlog of {} ticks, processing {}", pending, n);
        }
        self.stats.wakes += 1;
        for _ in 0..n {
            self.process_frame();
        }
        n
    }

    /// Acquire, use and release one frame
    pub fn process_frame(&mut self) -> FrameStatus {
        let Some(frame) = self.source.acquire() else {
            self.stats.dropped += 1;
            log::warn!("Frame acquisition failed");
            return FrameStatus::Dropped;
        };

        let status = if frame.is_empty() || frame.len() > self.settings.max_frame_bytes {
            self.stats.dropped += 1;
            log::warn!(
                "Dropped frame {} of {} bytes (limit {})",
                frame.seq,
                frame.len(),
                self.settings.max_frame_bytes
            );
            FrameStatus::Dropped
        } else {
            self.stats.frames += 1;
            FrameStatus::Processed(self.handle(&frame))
        };

        self.source.release(frame);
        status
    }

    /// Rate ticks are arriving at. Playback retunes the shared clock, so
    /// this is not always the configured capture rate.
    fn tick_fps(&self) -> u32 {
        match self.playback.clock().fps() {
            0 => self.settings.fps,
            fps => fps,
        }
    }

    fn handle(&mut self, frame: &Frame) -> RecordAction {
        let fps = self.tick_fps();
        if let Some(timelapse) = self.timelapse.as_mut() {
            if let Some(outcome) = timelapse.offer(frame, fps) {
                if outcome.saved_path().is_some() {
                    self.stats.timelapses_saved += 1;
                }
            }
        }
        self.streams.offer(frame);
        if self.still.offer(frame) {
            log::debug!("Still captured from frame {}", frame.seq);
        }

        let evaluate = match self.machine.state() {
            RecordState::Idle => true,
            RecordState::Recording => self.cadence.tick(),
            RecordState::Cooldown => false,
        };
        if evaluate {
            let mut result = self.motion.check(frame);
            self.stats.motion_checks += 1;
            if !self.settings.use_motion {
                result.motion = false;
            }
            if result.night != self.last_motion.night {
                log::debug!("Light level now {}", if result.night { "night" } else { "day" });
            }
            self.last_motion = result;
        }

        let sensor = self.sensor.poll();
        let manual = self.controls.force_record();
        let triggered =
            self.controls.recording_enabled() && (self.last_motion.motion || sensor || manual);

        let now = self.clock.now_ms();
        let action = self.machine.step(now, triggered);
        match action {
            RecordAction::Rest => {}
            RecordAction::Open => {
                let cause = self.trigger_cause(sensor, manual);
                self.open_clip(now, &cause);
            }
            RecordAction::Mux => self.mux(frame),
            RecordAction::MuxAndClose(reason) => {
                self.mux(frame);
                self.close_clip(reason);
            }
        }
        self.controls.publish(self.machine.state());
        action
    }

    fn mux(&mut self, frame: &Frame) {
        if !self.recorder.append(frame) {
            log::debug!("Frame {} not taken by the clip", frame.seq);
        }
        self.machine.sync_frames(self.recorder.writer().frames());
    }

    fn trigger_cause(&self, sensor: bool, manual: bool) -> String {
        let mut causes = Vec::new();
        if self.last_motion.motion {
            causes.push(
                self.last_motion
                    .cause
                    .clone()
                    .unwrap_or_else(|| "Motion".to_string()),
            );
        }
        if sensor {
            causes.push(self.sensor.label().to_string());
        }
        if manual {
            causes.push("Button".to_string());
        }
        causes.join(" ")
    }

    fn open_clip(&mut self, now: u64, cause: &str) {
        self.playback.set_recording(true);
        self.playback.stop_playing(self.settings.stop_playback_timeout);
        match self.recorder.open(cause) {
            Ok(()) => self.cadence.reset(),
            Err(e) => {
                log::warn!("Could not open clip: {}", e);
                self.machine.abort(now);
                self.playback.set_recording(false);
                self.stats.clips_failed += 1;
            }
        }
    }

    fn close_clip(&mut self, reason: CloseReason) {
        log::debug!("Closing clip: {:?}", reason);
        if reason.is_forced() {
            self.controls.set_force_record(false);
        }
        let outcome = self.recorder.close();
        self.count(&outcome);
        self.playback.set_recording(false);
    }

    fn count(&mut self, outcome: &ClipOutcome) {
        match outcome {
            ClipOutcome::Saved(_) => self.stats.clips_saved += 1,
            ClipOutcome::Discarded { .. } => self.stats.clips_discarded += 1,
            ClipOutcome::Failed => self.stats.clips_failed += 1,
        }
    }

    /// Close any open clip and the time-lapse with what they have
    pub fn shutdown(&mut self) {
        let now = self.clock.now_ms();
        if self.machine.abort(now) {
            let outcome = self.recorder.close();
            self.count(&outcome);
            self.playback.set_recording(false);
        }
        if let Some(timelapse) = self.timelapse.as_mut() {
            if let Some(ClipOutcome::Saved(_)) = timelapse.shutdown() {
                self.stats.timelapses_saved += 1;
            }
        }
        self.controls.publish(self.machine.state());
    }
}

/// Thread that runs a [`CaptureScheduler`] on every frame clock wake
pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    ticks: Arc<TickNotify>,
    handle: Option<JoinHandle<CaptureScheduler>>,
}

impl CaptureWorker {
    pub fn spawn(mut scheduler: CaptureScheduler, ticks: Arc<TickNotify>) -> Result<Self, DvrError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let wake = ticks.clone();
        let handle = std::thread::Builder::new()
            .name("crabdvr-capture".to_string())
            .spawn(move || {
                log::debug!("Capture worker started");
                while !stop_flag.load(Ordering::SeqCst) {
                    let pending = wake.wait(WAKE_TIMEOUT);
                    if stop_flag.load(Ordering::SeqCst) {
                        break;
                    }
                    if pending > 0 {
                        scheduler.run_tick(pending);
                    }
                }
                scheduler.shutdown();
                log::debug!("Capture worker stopped");
                scheduler
            })
            .map_err(|e| {
                DvrError::InitializationError(format!("Failed to start capture worker: {}", e))
            })?;
        Ok(Self {
            stop,
            ticks,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker, closing open clips, and hand the scheduler back
    pub fn stop(mut self) -> Option<CaptureScheduler> {
        self.halt()
    }

    fn halt(&mut self) -> Option<CaptureScheduler> {
        let handle = self.handle.take()?;
        self.stop.store(true, Ordering::SeqCst);
        self.ticks.interrupt();
        match handle.join() {
            Ok(scheduler) => Some(scheduler),
            Err(_) => {
                log::warn!("Capture worker panicked");
                None
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.halt();
    }
}
