use crate::safety::ValvePosition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveState {
    #[default]
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerStep {
    /// Not closing; the valve was left alone.
    Idle,
    Closing(ValvePosition),
    /// Reached zero on this step. Returned once per cycle.
    Closed,
}

/// Emergency valve ramp: Open -> Closing -> Closed.
///
/// Closed is terminal until [`ShutdownSequencer::reset`].
#[derive(Debug, Clone)]
pub struct ShutdownSequencer {
    state: ValveState,
    step_pct: u8,
}

impl ShutdownSequencer {
    pub fn new(step_pct: u8) -> Self {
        Self {
            state: ValveState::Open,
            step_pct: step_pct.max(1),
        }
    }

    pub fn state(&self) -> ValveState {
        self.state
    }

    /// Start closing. Returns false if a shutdown already ran or is running.
    pub fn trigger(&mut self) -> bool {
        if self.state != ValveState::Open {
            return false;
        }
        self.state = ValveState::Closing;
        true
    }

    pub fn step(&mut self, current: ValvePosition) -> SequencerStep {
        if self.state != ValveState::Closing {
            return SequencerStep::Idle;
        }
        let next = current.step_down(self.step_pct);
        if next.is_closed() {
            self.state = ValveState::Closed;
            SequencerStep::Closed
        } else {
            SequencerStep::Closing(next)
        }
    }

    pub fn reset(&mut self) {
        self.state = ValveState::Open;
    }
}

impl Default for ShutdownSequencer {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_close(seq: &mut ShutdownSequencer, start: ValvePosition) -> (usize, ValvePosition) {
        let mut pos = start;
        let mut steps = 0;
        loop {
            steps += 1;
            match seq.step(pos) {
                SequencerStep::Closing(next) => pos = next,
                SequencerStep::Closed => return (steps, ValvePosition::CLOSED),
                SequencerStep::Idle => panic!("sequencer went idle while closing"),
            }
        }
    }

    #[test]
    fn idle_until_triggered() {
        let mut seq = ShutdownSequencer::default();
        assert_eq!(seq.step(ValvePosition::FULLY_OPEN), SequencerStep::Idle);
        assert_eq!(seq.state(), ValveState::Open);
    }

    #[test]
    fn full_ramp_takes_twenty_steps() {
        let mut seq = ShutdownSequencer::default();
        assert!(seq.trigger());
        let (steps, pos) = run_to_close(&mut seq, ValvePosition::FULLY_OPEN);
        assert_eq!(steps, 20);
        assert!(pos.is_closed());
        assert_eq!(seq.state(), ValveState::Closed);
    }

    #[test]
    fn uneven_start_clamps_to_zero() {
        let mut seq = ShutdownSequencer::default();
        seq.trigger();
        let (steps, _) = run_to_close(&mut seq, ValvePosition::new(12));
        assert_eq!(steps, 3);
    }

    #[test]
    fn closed_fires_once_and_retrigger_is_ignored() {
        let mut seq = ShutdownSequencer::new(50);
        seq.trigger();
        assert_eq!(
            seq.step(ValvePosition::FULLY_OPEN),
            SequencerStep::Closing(ValvePosition::new(50))
        );
        assert_eq!(seq.step(ValvePosition::new(50)), SequencerStep::Closed);
        assert_eq!(seq.step(ValvePosition::CLOSED), SequencerStep::Idle);
        assert!(!seq.trigger());
    }

    #[test]
    fn reset_rearms() {
        let mut seq = ShutdownSequencer::default();
        seq.trigger();
        seq.reset();
        assert_eq!(seq.state(), ValveState::Open);
        assert!(seq.trigger());
    }
}
