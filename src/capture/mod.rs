//! Frame capture
//!
//! Everything that happens once per frame clock tick: the record state
//! machine, the motion cadence, live-stream fan-out, still capture and
//! the [`CaptureScheduler`] that drives them from the capture worker.

mod cadence;
mod frame;
mod scheduler;
mod state;
mod streams;

pub use cadence::MotionCadence;
pub use frame::Frame;
pub use scheduler::{
    CaptureControls, CaptureScheduler, CaptureWorker, FrameStatus, SchedulerSettings,
    SchedulerStats,
};
pub use state::{CloseReason, RecordAction, RecordLimits, RecordState, RecordStateMachine};
pub use streams::{LiveStreams, StillCapture};
