//! Testing utilities
//!
//! Synthetic camera payloads plus in-memory storage and scripted
//! collaborators, so the whole pipeline can be exercised without a camera
//! or a storage card.

pub mod fakes;
pub mod synthetic_data;

pub use fakes::{
    CollectingNotifier, CountingPeripherals, MemoryAncillary, MemoryStorage, ScriptedMotion,
    ScriptedSensor, ScriptedSource, SharedFile,
};
pub use synthetic_data::{synthetic_frame, synthetic_jpeg, synthetic_pcm, synthetic_srt};
