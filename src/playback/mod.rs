//! Clip playback
//!
//! [`PlaybackEngine`] streams a stored clip frame by frame at its recorded
//! rate, paced by the frame clock, with a read-ahead worker keeping the
//! next storage block ready. [`PlaybackControl`] is the handle the rest of
//! the system uses to stop playback or keep it out while recording.

mod control;
mod engine;
mod reader;

pub use control::PlaybackControl;
pub use engine::{PlaybackChunk, PlaybackEngine, PlaybackStats};
pub use reader::{ReadAhead, ReadCommand, ReadEvent};
