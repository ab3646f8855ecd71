use crate::event_log::LogEntry;
use crate::history::TelemetrySample;
use crate::report::AiReport;
use crate::safety::ValvePosition;
use crate::sequencer::ValveState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryState {
    pub pressure_bar: f64,
    pub flow_lps: f64,
    pub valve_position_pct: ValvePosition,
    pub is_leaking: bool,
    pub is_emergency: bool,
    pub uptime_s: u64,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self {
            pressure_bar: 4.0,
            flow_lps: 0.5,
            valve_position_pct: ValvePosition::FULLY_OPEN,
            is_leaking: false,
            is_emergency: false,
            uptime_s: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    #[default]
    Nominal,
    /// Leak present, shutdown not (yet) tripped.
    Degraded,
    Critical,
}

impl SystemStatus {
    pub fn from_state(state: &TelemetryState) -> Self {
        if state.is_emergency {
            SystemStatus::Critical
        } else if state.is_leaking {
            SystemStatus::Degraded
        } else {
            SystemStatus::Nominal
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SystemStatus::Nominal => "NORMAL OPERATION",
            SystemStatus::Degraded => "LEAK DETECTED",
            SystemStatus::Critical => "CRITICAL FAILURE",
        }
    }
}

/// Immutable copy of everything the operator surfaces show.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    #[serde(flatten)]
    pub telemetry: TelemetryState,
    pub status: SystemStatus,
    pub valve_state: ValveState,
    pub leak_volume_l: f64,
    pub telemetry_ticks: u64,
    pub report_pending: bool,
    pub report: Option<AiReport>,
    pub logs: Vec<LogEntry>,
    pub trend: Vec<TelemetrySample>,
}
