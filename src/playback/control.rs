//! Playback ownership flags and the forced-stop escape hatch.
//!
//! Shared between the playback engine, the capture scheduler (which stops
//! playback when a clip opens and blocks new playback while recording) and
//! shutdown.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use super::reader::ReadEvent;
use crate::errors::DvrError;
use crate::signal::PacingToken;
use crate::timing::FrameClock;

pub struct PlaybackControl {
    playing: AtomicBool,
    stop: AtomicBool,
    recording: AtomicBool,
    saved_fps: AtomicU32,
    clock: Arc<FrameClock>,
    pacing: Arc<PacingToken>,
    read_waker: Mutex<Option<Sender<ReadEvent>>>,
}

impl PlaybackControl {
    pub fn new(clock: Arc<FrameClock>, pacing: Arc<PacingToken>) -> Self {
        Self {
            playing: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            saved_fps: AtomicU32::new(0),
            clock,
            pacing,
            read_waker: Mutex::new(None),
        }
    }

    pub fn clock(&self) -> &Arc<FrameClock> {
        &self.clock
    }

    pub fn pacing(&self) -> &Arc<PacingToken> {
        &self.pacing
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Called by capture when a clip opens or closes
    pub fn set_recording(&self, active: bool) {
        self.recording.store(active, Ordering::SeqCst);
    }

    pub(crate) fn set_read_waker(&self, waker: Sender<ReadEvent>) {
        *self.read_waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(waker);
    }

    /// True once the running session has to end: stop requested, playback
    /// released elsewhere, or a clip has started recording
    pub fn should_stop(&self) -> bool {
        self.stop_requested() || !self.is_playing() || self.is_recording()
    }

    /// Claim playback for a new session, remembering the capture rate.
    ///
    /// `playing` is claimed before `recording` is read. Capture sets
    /// `recording` before it looks at `playing`, so one side always sees
    /// the other.
    pub(crate) fn begin(&self) -> Result<(), DvrError> {
        let fps = if self.clock.is_running() { self.clock.fps() } else { 0 };
        self.stop.store(false, Ordering::SeqCst);
        if self
            .playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DvrError::PlaybackRefused(
                "playback already running".to_string(),
            ));
        }
        if self.is_recording() {
            self.playing.store(false, Ordering::SeqCst);
            log::warn!("Playback refused - capture in progress");
            return Err(DvrError::PlaybackRefused(
                "capture in progress".to_string(),
            ));
        }
        self.saved_fps.store(fps, Ordering::SeqCst);
        Ok(())
    }

    /// Release playback. Returns false if someone else already released it.
    pub(crate) fn finish(&self) -> bool {
        if self
            .playing
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.pacing.deactivate();
        self.restore_fps();
        self.stop.store(false, Ordering::SeqCst);
        true
    }

    /// Stop any running playback, waiting up to `timeout` for the engine to
    /// tear down by itself before forcing it.
    ///
    /// Returns false if teardown had to be forced. Safe to call repeatedly.
    pub fn stop_playing(&self, timeout: Duration) -> bool {
        if !self.is_playing() {
            return true;
        }
        self.stop.store(true, Ordering::SeqCst);
        self.pacing.force_give();

        let started = Instant::now();
        while self.is_playing() && started.elapsed() < timeout {
            std::thread::sleep(Duration::from_millis(10));
        }

        if self
            .playing
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }

        log::warn!("Force closed playback");
        self.pacing.deactivate();
        self.restore_fps();
        self.pacing.force_give();
        if let Some(waker) = self
            .read_waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = waker.try_send(ReadEvent::Woken);
        }
        self.stop.store(false, Ordering::SeqCst);
        false
    }

    fn restore_fps(&self) {
        let fps = self.saved_fps.load(Ordering::SeqCst);
        if fps == 0 {
            // the clock was idle before playback
            self.clock.stop();
        } else if self.clock.fps() != fps || !self.clock.is_running() {
            if let Err(e) = self.clock.set_fps(fps) {
                log::warn!("Could not restore frame rate {}: {}", fps, e);
            }
        }
    }
}
