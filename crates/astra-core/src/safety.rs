use serde::{Deserialize, Serialize};
use std::fmt;

/// Valve opening in percent. 100 is fully open, 0 is fully closed.
///
/// The constructor clamps, so a `ValvePosition` can never leave `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValvePosition(u8);

impl ValvePosition {
    pub const FULLY_OPEN: Self = Self(100);
    pub const CLOSED: Self = Self(0);

    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    pub fn fraction(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    pub fn is_closed(self) -> bool {
        self.0 == 0
    }

    pub fn is_fully_open(self) -> bool {
        self.0 == 100
    }

    /// Close by `step` percentage points, stopping at zero.
    pub fn step_down(self, step: u8) -> Self {
        Self(self.0.saturating_sub(step))
    }
}

impl Default for ValvePosition {
    fn default() -> Self {
        Self::FULLY_OPEN
    }
}

impl fmt::Display for ValvePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TripLimits {
    /// Flow above this value (L/s) trips the emergency shutdown.
    pub critical_flow_lps: f64,
}

impl Default for TripLimits {
    fn default() -> Self {
        Self {
            critical_flow_lps: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripCause {
    CriticalFlow { flow_lps: f64, limit_lps: f64 },
}

impl fmt::Display for TripCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripCause::CriticalFlow {
                flow_lps,
                limit_lps,
            } => write!(f, "flow {flow_lps:.2} L/s above critical {limit_lps:.2} L/s"),
        }
    }
}

impl TripLimits {
    /// Threshold-crossing check for one telemetry sample.
    ///
    /// A closed valve can't be shut any further, so it never trips. The
    /// caller owns the single-fire latch.
    pub fn check(&self, flow_lps: f64, valve: ValvePosition) -> Option<TripCause> {
        if valve.is_closed() || !flow_lps.is_finite() {
            return None;
        }
        if flow_lps > self.critical_flow_lps {
            return Some(TripCause::CriticalFlow {
                flow_lps,
                limit_lps: self.critical_flow_lps,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_position() {
        assert_eq!(ValvePosition::new(250).percent(), 100);
        assert_eq!(ValvePosition::new(42).percent(), 42);
    }

    #[test]
    fn step_down_saturates_at_zero() {
        assert_eq!(ValvePosition::new(3).step_down(5), ValvePosition::CLOSED);
        assert_eq!(ValvePosition::new(100).step_down(5).percent(), 95);
    }

    #[test]
    fn trips_strictly_above_limit() {
        let limits = TripLimits::default();
        assert!(limits.check(2.0, ValvePosition::FULLY_OPEN).is_none());
        assert!(matches!(
            limits.check(2.01, ValvePosition::FULLY_OPEN),
            Some(TripCause::CriticalFlow { .. })
        ));
    }

    #[test]
    fn partially_open_valve_still_trips() {
        let limits = TripLimits::default();
        assert!(limits.check(2.5, ValvePosition::new(70)).is_some());
    }

    #[test]
    fn closed_valve_or_nan_never_trips() {
        let limits = TripLimits::default();
        assert!(limits.check(3.0, ValvePosition::CLOSED).is_none());
        assert!(limits.check(f64::NAN, ValvePosition::FULLY_OPEN).is_none());
    }
}
