//! Wake-up primitives shared between the frame clock and the workers.
//!
//! The frame clock only ever calls [`TickNotify::notify`] and
//! [`PacingToken::give_if_active`]; both are a lock or a channel send and
//! return immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Most ticks the capture worker can fall behind by
pub const MAX_TICK_BACKLOG: u32 = 4;

struct TickState {
    pending: u32,
    interrupted: bool,
}

/// Counting wake signal with a bounded backlog.
///
/// Ticks that arrive while the worker is busy accumulate up to the cap;
/// anything beyond it is lost rather than replayed later.
pub struct TickNotify {
    state: Mutex<TickState>,
    cv: Condvar,
    cap: u32,
}

impl TickNotify {
    pub fn new(cap: u32) -> Self {
        Self {
            state: Mutex::new(TickState {
                pending: 0,
                interrupted: false,
            }),
            cv: Condvar::new(),
            cap: cap.max(1),
        }
    }

    pub fn notify(&self) {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if s.pending < self.cap {
            s.pending += 1;
        }
        self.cv.notify_one();
    }

    /// Wake a waiter without adding a tick
    pub fn interrupt(&self) {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        s.interrupted = true;
        self.cv.notify_all();
    }

    pub fn pending(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
    }

    /// Wait for at least one tick and take all pending ticks.
    ///
    /// Returns 0 on timeout or interrupt.
    pub fn wait(&self, timeout: Duration) -> u32 {
        let deadline = Instant::now() + timeout;
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if s.pending > 0 {
                return std::mem::take(&mut s.pending);
            }
            if s.interrupted {
                s.interrupted = false;
                return 0;
            }
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            let (ns, _) = self
                .cv
                .wait_timeout(s, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            s = ns;
        }
    }
}

impl Default for TickNotify {
    fn default() -> Self {
        Self::new(MAX_TICK_BACKLOG)
    }
}

/// Binary semaphore: giving an already available permit is a no-op.
pub struct BinarySemaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl BinarySemaphore {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn give(&self) {
        let _ = self.tx.try_send(());
    }

    pub fn try_take(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    pub fn take_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

impl Default for BinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-frame pacing permit released by the frame clock while playback runs
pub struct PacingToken {
    active: AtomicBool,
    permit: BinarySemaphore,
}

impl PacingToken {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            permit: BinarySemaphore::new(),
        }
    }

    pub fn activate(&self) {
        self.permit.try_take();
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn give_if_active(&self) {
        if self.active.load(Ordering::Relaxed) {
            self.permit.give();
        }
    }

    /// Release a permit regardless of state, used to unblock a stuck waiter
    pub fn force_give(&self) {
        self.permit.give();
    }

    pub fn take_timeout(&self, timeout: Duration) -> bool {
        self.permit.take_timeout(timeout)
    }
}

impl Default for PacingToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_tick_backlog_is_capped() {
        let ticks = TickNotify::new(4);
        for _ in 0..10 {
            ticks.notify();
        }
        assert_eq!(ticks.pending(), 4);
        assert_eq!(ticks.wait(Duration::from_millis(10)), 4);
        assert_eq!(ticks.wait(Duration::from_millis(10)), 0);
    }

    #[test]
    fn test_tick_wakes_waiter() {
        let ticks = Arc::new(TickNotify::default());
        let t = ticks.clone();
        let waiter = thread::spawn(move || t.wait(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        ticks.notify();
        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn test_interrupt_returns_zero() {
        let ticks = Arc::new(TickNotify::default());
        let t = ticks.clone();
        let waiter = thread::spawn(move || t.wait(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        ticks.interrupt();
        assert_eq!(waiter.join().unwrap(), 0);
    }

    #[test]
    fn test_binary_semaphore_does_not_count() {
        let sem = BinarySemaphore::new();
        sem.give();
        sem.give();
        assert!(sem.try_take());
        assert!(!sem.try_take());
    }

    #[test]
    fn test_pacing_only_released_when_active() {
        let pacing = PacingToken::new();
        pacing.give_if_active();
        assert!(!pacing.take_timeout(Duration::from_millis(5)));
        pacing.activate();
        pacing.give_if_active();
        assert!(pacing.take_timeout(Duration::from_millis(5)));
        pacing.deactivate();
        pacing.give_if_active();
        assert!(!pacing.take_timeout(Duration::from_millis(5)));
    }
}
