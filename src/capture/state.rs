//! Record state machine: IDLE -> RECORDING -> COOLDOWN -> IDLE.
//!
//! The machine is pure: it is stepped once per valid frame with the current
//! time and whether any trigger is active, and answers with what the muxer
//! has to do with that frame.

use serde::{Deserialize, Serialize};

use crate::check_invariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    Idle,
    Recording,
    Cooldown,
}

impl RecordState {
    pub fn as_u8(self) -> u8 {
        match self {
            RecordState::Idle => 0,
            RecordState::Recording => 1,
            RecordState::Cooldown => 2,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => RecordState::Recording,
            2 => RecordState::Cooldown,
            _ => RecordState::Idle,
        }
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordState::Idle => "IDLE",
            RecordState::Recording => "RECORDING",
            RecordState::Cooldown => "COOLDOWN",
        };
        f.write_str(s)
    }
}

/// Timers and hard caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimits {
    pub min_ms: u64,
    pub max_ms: u64,
    pub max_frames: u32,
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// No trigger active and minimum duration reached
    TriggerCleared,
    MaxDuration,
    MaxFrames,
}

impl CloseReason {
    /// Closed by a safety cap rather than by the trigger going away
    pub fn is_forced(&self) -> bool {
        !matches!(self, CloseReason::TriggerCleared)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    /// Nothing to record this frame
    Rest,
    /// Open a new clip; this frame is not part of it
    Open,
    /// Append this frame to the open clip
    Mux,
    /// Append this frame, then finalize the clip
    MuxAndClose(CloseReason),
}

#[derive(Debug)]
pub struct RecordStateMachine {
    state: RecordState,
    limits: RecordLimits,
    started_ms: u64,
    cooldown_from_ms: u64,
    frames: u32,
}

impl RecordStateMachine {
    pub fn new(limits: RecordLimits) -> Self {
        Self {
            state: RecordState::Idle,
            limits,
            started_ms: 0,
            cooldown_from_ms: 0,
            frames: 0,
        }
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn limits(&self) -> RecordLimits {
        self.limits
    }

    /// Frames in the open clip. During `step` this tick's frame is counted
    /// as if it will be accepted; `sync_frames` then corrects it.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Take the muxer's accepted-frame total as the frame count, so frames
    /// the writer rejected do not count towards `max_frames`
    pub fn sync_frames(&mut self, muxed: u32) {
        if self.state == RecordState::Recording {
            self.frames = muxed;
        }
    }

    pub fn started_ms(&self) -> u64 {
        self.started_ms
    }

    pub fn step(&mut self, now_ms: u64, triggered: bool) -> RecordAction {
        match self.state {
            RecordState::Idle => {
                if triggered {
                    self.enter(RecordState::Recording);
                    self.started_ms = now_ms;
                    self.frames = 0;
                    RecordAction::Open
                } else {
                    RecordAction::Rest
                }
            }
            RecordState::Recording => {
                self.frames += 1;
                let elapsed = now_ms.saturating_sub(self.started_ms);
                let reason = if elapsed >= self.limits.max_ms {
                    Some(CloseReason::MaxDuration)
                } else if self.frames >= self.limits.max_frames {
                    Some(CloseReason::MaxFrames)
                } else if !triggered && elapsed >= self.limits.min_ms {
                    Some(CloseReason::TriggerCleared)
                } else {
                    None
                };
                match reason {
                    Some(reason) => {
                        self.begin_cooldown(now_ms);
                        RecordAction::MuxAndClose(reason)
                    }
                    None => RecordAction::Mux,
                }
            }
            RecordState::Cooldown => {
                if now_ms.saturating_sub(self.cooldown_from_ms) >= self.limits.cooldown_ms {
                    self.enter(RecordState::Idle);
                }
                RecordAction::Rest
            }
        }
    }

    /// Leave RECORDING without a regular close, e.g. when the clip could
    /// not be opened or the system is shutting down. Returns true if a clip
    /// was being recorded.
    pub fn abort(&mut self, now_ms: u64) -> bool {
        if self.state == RecordState::Recording {
            self.begin_cooldown(now_ms);
            true
        } else {
            false
        }
    }

    fn begin_cooldown(&mut self, now_ms: u64) {
        self.enter(RecordState::Cooldown);
        self.cooldown_from_ms = now_ms;
    }

    fn enter(&mut self, next: RecordState) {
        let allowed = matches!(
            (self.state, next),
            (RecordState::Idle, RecordState::Recording)
                | (RecordState::Recording, RecordState::Cooldown)
                | (RecordState::Cooldown, RecordState::Idle)
        );
        check_invariant!(
            allowed,
            "Record state only moves IDLE -> RECORDING -> COOLDOWN -> IDLE",
            "RecordStateMachine::enter"
        );
        log::debug!("Record state {} -> {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RecordLimits {
        RecordLimits {
            min_ms: 3_000,
            max_ms: 10_000,
            max_frames: 1_000,
            cooldown_ms: 2_000,
        }
    }

    #[test]
    fn test_full_cycle() {
        let mut sm = RecordStateMachine::new(limits());
        assert_eq!(sm.step(0, false), RecordAction::Rest);
        assert_eq!(sm.step(100, true), RecordAction::Open);
        assert_eq!(sm.state(), RecordState::Recording);
        assert_eq!(sm.step(200, false), RecordAction::Mux);
        assert_eq!(
            sm.step(3_100, false),
            RecordAction::MuxAndClose(CloseReason::TriggerCleared)
        );
        assert_eq!(sm.state(), RecordState::Cooldown);
        // triggers are ignored while cooling down
        assert_eq!(sm.step(4_000, true), RecordAction::Rest);
        assert_eq!(sm.step(5_100, true), RecordAction::Rest);
        assert_eq!(sm.state(), RecordState::Idle);
        assert_eq!(sm.step(5_200, true), RecordAction::Open);
    }

    #[test]
    fn test_trigger_keeps_recording_until_cap() {
        let mut sm = RecordStateMachine::new(limits());
        sm.step(0, true);
        for t in (100..10_000).step_by(100) {
            assert_eq!(sm.step(t, true), RecordAction::Mux);
        }
        let action = sm.step(10_000, true);
        assert_eq!(action, RecordAction::MuxAndClose(CloseReason::MaxDuration));
        assert!(CloseReason::MaxDuration.is_forced());
    }

    #[test]
    fn test_frame_ceiling_forces_close() {
        let mut sm = RecordStateMachine::new(RecordLimits {
            max_frames: 5,
            ..limits()
        });
        sm.step(0, true);
        for t in 1..5 {
            assert_eq!(sm.step(t, true), RecordAction::Mux);
        }
        assert_eq!(
            sm.step(5, true),
            RecordAction::MuxAndClose(CloseReason::MaxFrames)
        );
    }

    #[test]
    fn test_frame_ceiling_counts_accepted_frames() {
        let mut sm = RecordStateMachine::new(RecordLimits {
            max_frames: 3,
            ..limits()
        });
        sm.step(0, true);
        assert_eq!(sm.step(1, true), RecordAction::Mux);
        sm.sync_frames(1);
        // the next two frames are rejected by the writer
        assert_eq!(sm.step(2, true), RecordAction::Mux);
        sm.sync_frames(1);
        assert_eq!(sm.step(3, true), RecordAction::Mux);
        sm.sync_frames(1);
        assert_eq!(sm.step(4, true), RecordAction::Mux);
        sm.sync_frames(2);
        assert_eq!(
            sm.step(5, true),
            RecordAction::MuxAndClose(CloseReason::MaxFrames)
        );
        // outside RECORDING the count is left alone
        sm.sync_frames(99);
        assert_eq!(sm.frames(), 3);
    }

    #[test]
    fn test_abort_goes_through_cooldown() {
        let mut sm = RecordStateMachine::new(limits());
        assert!(!sm.abort(0));
        sm.step(0, true);
        assert!(sm.abort(50));
        assert_eq!(sm.state(), RecordState::Cooldown);
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for s in [RecordState::Idle, RecordState::Recording, RecordState::Cooldown] {
            assert_eq!(RecordState::from_u8(s.as_u8()), s);
        }
    }
}
