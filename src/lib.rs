//! crabdvr: motion-triggered MJPEG/AVI recorder and playback engine
//!
//! This crate is the capture/mux/playback core of a camera DVR. Frames
//! arrive pre-compressed from a camera driver; crabdvr decides when to
//! record them, streams them into AVI files under a fixed RAM budget and
//! replays stored clips at their recorded frame rate.
//!
//! # Features
//! - Interrupt-style frame clock with a bounded tick backlog
//! - IDLE / RECORDING / COOLDOWN state machine with minimum duration,
//!   hard caps and a cooldown window
//! - Ring-buffer AVI muxer with `idx1` index, audio trailer and telemetry
//!   sidecar
//! - Independent time-lapse muxer
//! - Double-buffered playback with a read-ahead worker and forced stop
//!
//! # Usage
//! ```rust,ignore
//! use crabdvr::{Collaborators, Dvr, DvrConfig};
//!
//! crabdvr::init_logging();
//! let config = DvrConfig::load_or_default();
//! let dvr = Dvr::start(config, Collaborators::new(camera))?;
//! dvr.force_record(true);
//! // ...
//! dvr.shutdown();
//! ```
pub mod avi;
pub mod capture;
pub mod collaborators;
pub mod config;
pub mod dvr;
pub mod errors;
pub mod invariants;
pub mod playback;
pub mod recording;
pub mod signal;
pub mod storage;
pub mod timing;

// Testing utilities - synthetic frames and scripted collaborators
pub mod testing;

// Re-exports for convenience
pub use avi::{ClipName, ClipSummary, FrameSize};
pub use capture::{CaptureControls, Frame, RecordState};
pub use collaborators::{
    AncillaryKind, AncillaryStream, ClipNotifier, Collaborators, FrameSource, MotionDetector,
    MotionResult, Peripherals, TriggerSensor,
};
pub use config::DvrConfig;
pub use dvr::Dvr;
pub use errors::DvrError;
pub use playback::{PlaybackChunk, PlaybackEngine, PlaybackStats};
pub use recording::ClipOutcome;
pub use storage::{FsStorage, Storage};

/// Initialize logging for the recorder
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabdvr=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "crabdvr");
        assert!(DESCRIPTION.contains("AVI"));
    }
}
