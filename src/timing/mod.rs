//! Time sources and the frame clock that paces capture and playback.

mod clock;
mod frame_clock;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use frame_clock::FrameClock;
