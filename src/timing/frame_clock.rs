//! Periodic frame clock.
//!
//! A dedicated ticker thread fires at the configured rate. Each tick wakes
//! the capture worker through [`TickNotify`] and, while playback is active,
//! releases one [`PacingToken`] permit. Nothing else happens on the tick
//! path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::errors::DvrError;
use crate::signal::{PacingToken, TickNotify};

struct Ticker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct FrameClock {
    ticks: Arc<TickNotify>,
    pacing: Arc<PacingToken>,
    fps: AtomicU32,
    ticker: Mutex<Option<Ticker>>,
}

impl FrameClock {
    pub fn new(ticks: Arc<TickNotify>, pacing: Arc<PacingToken>) -> Self {
        Self {
            ticks,
            pacing,
            fps: AtomicU32::new(0),
            ticker: Mutex::new(None),
        }
    }

    /// Arm the clock at `fps`, replacing any running ticker
    pub fn start(&self, fps: u32) -> Result<(), DvrError> {
        if fps == 0 {
            return Err(DvrError::InitializationError(
                "frame clock needs a non-zero rate".to_string(),
            ));
        }

        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = ticker.take() {
            Self::halt(old);
        }

        let period = Duration::from_micros(1_000_000 / fps as u64);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticks = self.ticks.clone();
        let pacing = self.pacing.clone();

        let handle = std::thread::Builder::new()
            .name("crabdvr-frame-clock".to_string())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            ticks.notify();
                            pacing.give_if_active();
                            next += period;
                            let now = Instant::now();
                            if next < now {
                                // stalled: resume from now, the backlog cap covers missed ticks
                                next = now + period;
                            }
                        }
                        _ => break,
                    }
                }
            })
            .map_err(|e| {
                DvrError::InitializationError(format!("failed to arm frame clock: {}", e))
            })?;

        *ticker = Some(Ticker { stop_tx, handle });
        self.fps.store(fps, Ordering::SeqCst);
        log::debug!("Frame clock armed at {} fps", fps);
        Ok(())
    }

    /// Stop ticking. No tick fires after this returns.
    pub fn stop(&self) {
        let old = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(old) = old {
            Self::halt(old);
        }
    }

    /// Change the rate by restarting the ticker
    pub fn set_fps(&self, fps: u32) -> Result<(), DvrError> {
        if fps == self.fps() && self.is_running() {
            return Ok(());
        }
        self.start(fps)
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn halt(ticker: Ticker) {
        let _ = ticker.stop_tx.send(());
        if ticker.handle.join().is_err() {
            log::warn!("Frame clock thread panicked");
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> (FrameClock, Arc<TickNotify>, Arc<PacingToken>) {
        let ticks = Arc::new(TickNotify::default());
        let pacing = Arc::new(PacingToken::new());
        (FrameClock::new(ticks.clone(), pacing.clone()), ticks, pacing)
    }

    #[test]
    fn test_zero_fps_cannot_arm() {
        let (clock, _, _) = clock();
        let err = clock.start(0).unwrap_err();
        assert!(err.is_fatal());
        assert!(!clock.is_running());
    }

    #[test]
    fn test_ticks_wake_waiter() {
        let (clock, ticks, _) = clock();
        clock.start(100).unwrap();
        assert!(ticks.wait(Duration::from_secs(2)) >= 1);
        clock.stop();
    }

    #[test]
    fn test_no_tick_after_stop() {
        let (clock, ticks, _) = clock();
        clock.start(200).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        clock.stop();
        ticks.wait(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.pending(), 0);
    }

    #[test]
    fn test_pacing_released_only_during_playback() {
        let (clock, _, pacing) = clock();
        clock.start(100).unwrap();
        assert!(!pacing.take_timeout(Duration::from_millis(50)));
        pacing.activate();
        assert!(pacing.take_timeout(Duration::from_secs(1)));
        clock.stop();
    }

    #[test]
    fn test_set_fps_restarts() {
        let (clock, _, _) = clock();
        clock.start(10).unwrap();
        clock.set_fps(25).unwrap();
        assert_eq!(clock.fps(), 25);
        assert!(clock.is_running());
    }
}
