//! Capability interfaces for everything outside the capture/mux/playback
//! core: the camera, motion and sensor signals, ancillary audio and
//! telemetry streams, clip notification and peripherals.
//!
//! Optional capabilities have a no-op implementation that is used when the
//! feature is absent.

use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::avi::AudioFormat;
use crate::capture::Frame;

/// Camera frame buffer pool
pub trait FrameSource: Send + Sync {
    /// Take the next frame, or `None` when acquisition failed
    fn acquire(&self) -> Option<Frame>;
    /// Hand a frame back to the pool
    fn release(&self, frame: Frame);
}

/// Outcome of a motion check on one frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionResult {
    pub motion: bool,
    /// Light level classification, passed through for logging
    pub night: bool,
    pub cause: Option<String>,
}

impl MotionResult {
    pub fn detected(cause: impl Into<String>) -> Self {
        Self {
            motion: true,
            night: false,
            cause: Some(cause.into()),
        }
    }
}

pub trait MotionDetector: Send + Sync {
    fn check(&self, frame: &Frame) -> MotionResult;
}

/// External trigger such as a PIR sensor
pub trait TriggerSensor: Send + Sync {
    fn poll(&self) -> bool;

    fn label(&self) -> &str {
        "sensor"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AncillaryKind {
    Audio,
    Telemetry,
}

/// Side stream captured alongside a clip
pub trait AncillaryStream: Send + Sync {
    fn kind(&self) -> AncillaryKind;

    /// Start capturing for a new clip. Returns false when the stream is
    /// unavailable and nothing will be produced.
    fn begin(&self) -> bool;

    /// Stop capturing and report how many bytes are waiting to be drained
    fn finish(&self) -> u32;

    /// Copy the next piece of captured data into `buf`. Returns 0 once
    /// everything has been drained.
    fn drain_into(&self, buf: &mut [u8]) -> usize;

    fn audio_format(&self) -> AudioFormat {
        AudioFormat::default()
    }
}

/// Receives the path of every saved clip, e.g. to start an upload
pub trait ClipNotifier: Send + Sync {
    fn clip_saved(&self, path: &str);
}

/// Lamp, buzzer and similar outputs tied to recording
pub trait Peripherals: Send + Sync {
    fn recording_started(&self) {}
    fn recording_stopped(&self) {}
}

pub struct NoMotion;

impl MotionDetector for NoMotion {
    fn check(&self, _frame: &Frame) -> MotionResult {
        MotionResult::default()
    }
}

pub struct NoSensor;

impl TriggerSensor for NoSensor {
    fn poll(&self) -> bool {
        false
    }
}

pub struct NoAncillary(pub AncillaryKind);

impl AncillaryStream for NoAncillary {
    fn kind(&self) -> AncillaryKind {
        self.0
    }

    fn begin(&self) -> bool {
        false
    }

    fn finish(&self) -> u32 {
        0
    }

    fn drain_into(&self, _buf: &mut [u8]) -> usize {
        0
    }
}

pub struct NoNotifier;

impl ClipNotifier for NoNotifier {
    fn clip_saved(&self, _path: &str) {}
}

pub struct NoPeripherals;

impl Peripherals for NoPeripherals {}

/// Forwards saved clip paths over a channel without ever blocking
pub struct ChannelNotifier {
    tx: Sender<String>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }
}

impl ClipNotifier for ChannelNotifier {
    fn clip_saved(&self, path: &str) {
        match self.tx.try_send(path.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(p)) => log::warn!("Clip notification dropped, receiver busy: {}", p),
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Clip notification receiver gone")
            }
        }
    }
}

/// Every collaborator the recorder talks to
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn FrameSource>,
    pub motion: Arc<dyn MotionDetector>,
    pub sensor: Arc<dyn TriggerSensor>,
    pub audio: Arc<dyn AncillaryStream>,
    pub telemetry: Arc<dyn AncillaryStream>,
    pub notifier: Arc<dyn ClipNotifier>,
    pub peripherals: Arc<dyn Peripherals>,
}

impl Collaborators {
    /// A frame source with every optional capability switched off
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            motion: Arc::new(NoMotion),
            sensor: Arc::new(NoSensor),
            audio: Arc::new(NoAncillary(AncillaryKind::Audio)),
            telemetry: Arc::new(NoAncillary(AncillaryKind::Telemetry)),
            notifier: Arc::new(NoNotifier),
            peripherals: Arc::new(NoPeripherals),
        }
    }

    pub fn with_motion(mut self, motion: Arc<dyn MotionDetector>) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_sensor(mut self, sensor: Arc<dyn TriggerSensor>) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn with_audio(mut self, audio: Arc<dyn AncillaryStream>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn AncillaryStream>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ClipNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_peripherals(mut self, peripherals: Arc<dyn Peripherals>) -> Self {
        self.peripherals = peripherals;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_channel_notifier_never_blocks() {
        let (tx, rx) = bounded(1);
        let notifier = ChannelNotifier::new(tx);
        notifier.clip_saved("/a.avi");
        notifier.clip_saved("/b.avi");
        assert_eq!(rx.try_recv().unwrap(), "/a.avi");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_no_ancillary_is_inert() {
        let audio = NoAncillary(AncillaryKind::Audio);
        assert!(!audio.begin());
        assert_eq!(audio.finish(), 0);
        assert_eq!(audio.drain_into(&mut [0u8; 16]), 0);
    }
}
