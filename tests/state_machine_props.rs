//! Property-Based Tests for the record state machine
//!
//! Run with: cargo test --test state_machine_props

use crabdvr::capture::{CloseReason, RecordAction, RecordLimits, RecordState, RecordStateMachine};
use proptest::prelude::*;

fn limits() -> RecordLimits {
    RecordLimits {
        min_ms: 3_000,
        max_ms: 20_000,
        max_frames: 150,
        cooldown_ms: 1_000,
    }
}

/// Trigger level per 100 ms tick
fn trigger_script() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..600)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// INVARIANT: states only move IDLE -> RECORDING -> COOLDOWN -> IDLE
    #[test]
    fn transitions_follow_the_cycle(script in trigger_script()) {
        let mut machine = RecordStateMachine::new(limits());
        let mut prev = machine.state();
        for (tick, triggered) in script.iter().enumerate() {
            machine.step(tick as u64 * 100, *triggered);
            let next = machine.state();
            let allowed = prev == next
                || matches!(
                    (prev, next),
                    (RecordState::Idle, RecordState::Recording)
                        | (RecordState::Recording, RecordState::Cooldown)
                        | (RecordState::Cooldown, RecordState::Idle)
                );
            prop_assert!(allowed, "illegal transition {} -> {}", prev, next);
            prev = next;
        }
    }

    /// INVARIANT: every Open is followed by muxing until exactly one close,
    /// and a trigger-cleared close never happens before the minimum
    #[test]
    fn actions_bracket_each_clip(script in trigger_script()) {
        let mut machine = RecordStateMachine::new(limits());
        let mut open_at: Option<u64> = None;
        for (tick, triggered) in script.iter().enumerate() {
            let now = tick as u64 * 100;
            match machine.step(now, *triggered) {
                RecordAction::Open => {
                    prop_assert!(open_at.is_none());
                    open_at = Some(now);
                }
                RecordAction::Mux => prop_assert!(open_at.is_some()),
                RecordAction::MuxAndClose(reason) => {
                    let started = open_at.take();
                    prop_assert!(started.is_some());
                    let elapsed = now - started.unwrap_or(0);
                    match reason {
                        CloseReason::TriggerCleared => {
                            prop_assert!(elapsed >= limits().min_ms);
                            prop_assert!(!*triggered);
                        }
                        CloseReason::MaxDuration => prop_assert!(elapsed >= limits().max_ms),
                        CloseReason::MaxFrames => {}
                    }
                }
                RecordAction::Rest => prop_assert!(open_at.is_none()),
            }
        }
    }

    /// INVARIANT: the hard caps close a clip even with the trigger held
    #[test]
    fn caps_close_despite_trigger(max_frames in 10u32..400, max_secs in 4u64..60) {
        let mut machine = RecordStateMachine::new(RecordLimits {
            min_ms: 3_000,
            max_ms: max_secs * 1000,
            max_frames,
            cooldown_ms: 1_000,
        });
        prop_assert_eq!(machine.step(0, true), RecordAction::Open);
        let mut tick = 1u64;
        let reason = loop {
            if let RecordAction::MuxAndClose(reason) = machine.step(tick * 100, true) {
                break reason;
            }
            tick += 1;
            prop_assert!(tick < 10_000);
        };
        prop_assert!(reason.is_forced());
        let by_time = max_secs * 10;
        prop_assert_eq!(tick, by_time.min(max_frames as u64));
        prop_assert_eq!(machine.state(), RecordState::Cooldown);
    }
}

#[test]
fn cooldown_ignores_triggers() {
    let mut machine = RecordStateMachine::new(limits());
    machine.step(0, true);
    machine.step(3_000, false);
    assert_eq!(machine.state(), RecordState::Cooldown);
    for t in (3_100..4_000).step_by(100) {
        assert_eq!(machine.step(t, true), RecordAction::Rest);
        assert_eq!(machine.state(), RecordState::Cooldown);
    }
    assert_eq!(machine.step(4_000, true), RecordAction::Rest);
    assert_eq!(machine.state(), RecordState::Idle);
    assert_eq!(machine.step(4_100, true), RecordAction::Open);
}
