//! Clip recording
//!
//! - [`AviWriter`]: ring-buffer MJPEG AVI writer with a fixed RAM budget
//! - [`Recorder`]: clip lifecycle on top of the writer, with the
//!   minimum-duration policy, ancillary streams and the free-space check
//! - [`TimeLapse`]: independent slow-cadence muxer
//!
//! # Example
//! ```rust,ignore
//! let mut recorder = Recorder::new(settings, storage, clock, scratch, &collaborators, enabled);
//! recorder.open("Motion")?;
//! recorder.append(&frame);
//! match recorder.close() {
//!     ClipOutcome::Saved(path) => println!("saved {}", path),
//!     other => println!("{:?}", other),
//! }
//! ```

mod config;
mod muxer;
mod recorder;
mod timelapse;

pub use config::{ClipOutcome, RecorderSettings, RecordingStats, TimeLapseSettings, WriterStats};
pub use muxer::AviWriter;
pub use recorder::Recorder;
pub use timelapse::TimeLapse;
