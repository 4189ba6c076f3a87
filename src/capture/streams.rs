//! Lossy live-stream fan-out and one-shot still capture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::frame::Frame;
use crate::signal::BinarySemaphore;

struct StreamSlot {
    open: AtomicBool,
    pending: Mutex<Option<Frame>>,
    ready: BinarySemaphore,
    skipped: AtomicU64,
}

impl StreamSlot {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            pending: Mutex::new(None),
            ready: BinarySemaphore::new(),
            skipped: AtomicU64::new(0),
        }
    }
}

/// Fixed set of live-stream slots.
///
/// Each open slot holds at most one frame. A slot whose consumer has not
/// taken its previous frame yet skips the new one; nothing is queued.
pub struct LiveStreams {
    slots: Vec<StreamSlot>,
}

impl LiveStreams {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| StreamSlot::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Attach a consumer to slot `idx`
    pub fn open(&self, idx: usize) -> bool {
        match self.slots.get(idx) {
            Some(slot) => {
                slot.open.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn close(&self, idx: usize) {
        if let Some(slot) = self.slots.get(idx) {
            slot.open.store(false, Ordering::SeqCst);
            slot.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            slot.ready.give();
        }
    }

    /// Offer a frame to every open slot. Returns how many slots took it.
    pub fn offer(&self, frame: &Frame) -> usize {
        let mut taken = 0;
        for slot in self.slots.iter().filter(|s| s.open.load(Ordering::Relaxed)) {
            let mut pending = slot.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.is_none() {
                *pending = Some(frame.clone());
                slot.ready.give();
                taken += 1;
            } else {
                slot.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        taken
    }

    /// Wait for the next frame on slot `idx`
    pub fn take(&self, idx: usize, timeout: Duration) -> Option<Frame> {
        let slot = self.slots.get(idx)?;
        if !slot.ready.take_timeout(timeout) {
            return None;
        }
        slot.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn skipped(&self, idx: usize) -> u64 {
        self.slots
            .get(idx)
            .map(|s| s.skipped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Alert buffer filled with the next valid frame after a request
pub struct StillCapture {
    requested: AtomicBool,
    max_bytes: usize,
    buffer: Mutex<Option<Vec<u8>>>,
}

impl StillCapture {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            requested: AtomicBool::new(false),
            max_bytes,
            buffer: Mutex::new(None),
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Copy `frame` into the alert buffer if a still was requested
    pub fn offer(&self, frame: &Frame) -> bool {
        if !self.requested.load(Ordering::Relaxed) || frame.len() > self.max_bytes {
            return false;
        }
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.as_slice().to_vec());
        self.requested.store(false, Ordering::SeqCst);
        true
    }

    pub fn take(&self) -> Option<Vec<u8>> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![seq as u8; 16], seq, seq * 100)
    }

    #[test]
    fn test_latest_frame_wins_without_queueing() {
        let streams = LiveStreams::new(2);
        streams.open(0);
        assert_eq!(streams.offer(&frame(1)), 1);
        assert_eq!(streams.offer(&frame(2)), 0);
        assert_eq!(streams.skipped(0), 1);
        assert_eq!(streams.take(0, Duration::from_millis(10)).unwrap().seq, 1);
        assert_eq!(streams.offer(&frame(3)), 1);
        assert_eq!(streams.take(0, Duration::from_millis(10)).unwrap().seq, 3);
    }

    #[test]
    fn test_closed_slots_get_nothing() {
        let streams = LiveStreams::new(1);
        assert_eq!(streams.offer(&frame(1)), 0);
        assert!(streams.take(0, Duration::from_millis(5)).is_none());
        assert!(!streams.open(5));
    }

    #[test]
    fn test_still_is_one_shot() {
        let still = StillCapture::new(1024);
        assert!(!still.offer(&frame(1)));
        still.request();
        assert!(still.offer(&frame(2)));
        assert!(!still.is_requested());
        assert!(!still.offer(&frame(3)));
        assert_eq!(still.take().unwrap(), vec![2u8; 16]);
        assert!(still.take().is_none());
    }
}
