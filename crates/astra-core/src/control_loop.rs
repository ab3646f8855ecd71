use crate::event_log::{EventLog, LogCategory};
use crate::hal::{WellReading, WellheadIO};
use crate::history::{TelemetrySample, TrendWindow};
use crate::report::{AiReport, ReportDraft, ReportRequest};
use crate::safety::{TripCause, TripLimits, ValvePosition};
use crate::sequencer::{SequencerStep, ShutdownSequencer, ValveState};
use crate::snapshot::{DashboardSnapshot, SystemStatus, TelemetryState};
use crate::timebase::TimeBase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub telemetry_period: Duration,
    pub valve_period: Duration,
    pub trip_limits: TripLimits,
    pub valve_step_pct: u8,
    pub trend_len: usize,
    pub log_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            telemetry_period: Duration::from_millis(1000),
            valve_period: Duration::from_millis(100),
            trip_limits: TripLimits::default(),
            valve_step_pct: 5,
            trend_len: 20,
            log_capacity: 50,
        }
    }
}

#[derive(Clone, Default, Debug, Serialize)]
pub struct ScanStats {
    pub telemetry_ticks: u64,
    pub valve_steps: u64,
    pub emergency_shutdowns: u64,
    pub reports_completed: u64,
    pub report_fallbacks: u64,
    pub stale_reports: u64,
    pub commands_rejected: u64,
}

/// Operator actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    SimulateFailure,
    Reset,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::SimulateFailure => "simulate_failure",
            Command::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("a leak is already active")]
    LeakActive,
    #[error("emergency shutdown is active")]
    EmergencyActive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub reading: WellReading,
    pub trip: Option<TripCause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDisposition {
    Accepted,
    Fallback,
    /// The cycle was reset before the result arrived.
    Stale,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Wellhead monitoring state and the two timer-driven updaters acting on it.
///
/// Nothing here sleeps or spawns: the caller drives [`Dashboard::telemetry_tick`]
/// and [`Dashboard::valve_tick`] from its timers and performs the report call
/// described by the returned [`ReportRequest`].
pub struct Dashboard<IO: WellheadIO> {
    io: IO,
    config: ScanConfig,
    timebase: TimeBase,
    state: TelemetryState,
    sequencer: ShutdownSequencer,
    logs: EventLog,
    trend: TrendWindow,
    leak_volume_l: f64,
    report: Option<AiReport>,
    report_pending: bool,
    generation: u64,
    stats: ScanStats,
}

impl<IO: WellheadIO> Dashboard<IO> {
    pub fn new(io: IO, config: ScanConfig, timebase: TimeBase) -> Self {
        let state = TelemetryState::default();
        let trend = TrendWindow::filled(
            config.trend_len,
            TelemetrySample {
                pressure_bar: state.pressure_bar,
                flow_lps: state.flow_lps,
            },
        );
        Self {
            io,
            sequencer: ShutdownSequencer::new(config.valve_step_pct),
            logs: EventLog::new(config.log_capacity),
            trend,
            config,
            timebase,
            state,
            leak_volume_l: 0.0,
            report: None,
            report_pending: false,
            generation: 0,
            stats: ScanStats::default(),
        }
    }

    /// Telemetry simulator step (one per telemetry period).
    pub fn telemetry_tick(&mut self) -> TickOutcome {
        self.state.uptime_s += 1;

        let valve = self.io.valve_position();
        let leaking = self.io.is_leaking();
        let reading = self.io.step();
        if !self.io.is_healthy() {
            warn!(?reading, "Wellhead sensors report implausible values");
        }

        if leaking && !valve.is_closed() {
            self.leak_volume_l += reading.flow_lps.max(0.0);
        }

        self.state.pressure_bar = round2(reading.pressure_bar);
        self.state.flow_lps = round2(reading.flow_lps);
        self.trend.push(reading.into());
        self.stats.telemetry_ticks += 1;

        let trip = if self.state.is_emergency {
            None
        } else {
            self.config.trip_limits.check(reading.flow_lps, valve)
        };
        if let Some(cause) = trip {
            self.trip(cause);
        }

        TickOutcome { reading, trip }
    }

    fn trip(&mut self, cause: TripCause) {
        self.state.is_emergency = true;
        self.stats.emergency_shutdowns += 1;
        self.log("ABNORMAL FLOW DETECTED!", LogCategory::Error);
        self.log("EMERGENCY SHUTDOWN INITIATED", LogCategory::Error);
        self.sequencer.trigger();
        warn!(%cause, valve = %self.state.valve_position_pct, "Emergency shutdown initiated");
    }

    /// Shutdown sequencer step (one per valve period).
    ///
    /// Returns the report request exactly once per cycle, on the step that
    /// closes the valve.
    pub fn valve_tick(&mut self) -> Option<ReportRequest> {
        match self.sequencer.step(self.io.valve_position()) {
            SequencerStep::Idle => None,
            SequencerStep::Closing(next) => {
                self.set_valve(next);
                debug!(valve = %next, "Valve closing");
                None
            }
            SequencerStep::Closed => {
                self.set_valve(ValvePosition::CLOSED);
                self.log("VALVE CLOSED. LEAK CONTAINED.", LogCategory::Success);
                info!(
                    leak_volume_l = self.leak_volume_l,
                    "Valve closed, leak contained"
                );
                Some(self.begin_report())
            }
        }
    }

    fn set_valve(&mut self, position: ValvePosition) {
        self.io.write_valve(position);
        self.state.valve_position_pct = position;
        self.stats.valve_steps += 1;
    }

    fn begin_report(&mut self) -> ReportRequest {
        self.report_pending = true;
        self.log("AI Sentinel analyzing telemetry...", LogCategory::Ai);
        ReportRequest::new(self.generation, self.leak_volume_l)
    }

    /// Apply the outcome of the report call for `request`.
    ///
    /// Any error substitutes the local fallback report.
    pub fn apply_report<E: fmt::Display>(
        &mut self,
        request: &ReportRequest,
        result: Result<ReportDraft, E>,
    ) -> ReportDisposition {
        if request.generation != self.generation || !self.report_pending {
            self.stats.stale_reports += 1;
            debug!(
                generation = request.generation,
                current = self.generation,
                "Dropping report for a reset cycle"
            );
            return ReportDisposition::Stale;
        }

        self.report_pending = false;
        self.stats.reports_completed += 1;
        match result {
            Ok(draft) => {
                self.report = Some(AiReport::from_draft(draft, &request.economics));
                self.log("AI Analysis complete.", LogCategory::Success);
                info!(roi = %request.economics.roi_label(), "Incident report received");
                ReportDisposition::Accepted
            }
            Err(err) => {
                self.report = Some(AiReport::fallback(&request.economics));
                self.stats.report_fallbacks += 1;
                self.log("AI Offline. Using local heuristic.", LogCategory::Error);
                warn!(error = %err, "Report service unavailable, using local heuristic");
                ReportDisposition::Fallback
            }
        }
    }

    /// Start leaking. Refused while a leak or an emergency is already active.
    pub fn simulate_failure(&mut self) -> Result<(), CommandError> {
        if self.state.is_emergency {
            return Err(CommandError::EmergencyActive);
        }
        if self.state.is_leaking {
            return Err(CommandError::LeakActive);
        }
        self.io.inject_leak();
        self.state.is_leaking = true;
        info!("Leak injected");
        Ok(())
    }

    /// Back to nominal. Uptime keeps counting; an in-flight report is orphaned.
    pub fn reset(&mut self) {
        self.io.restore();
        self.sequencer.reset();
        self.state = TelemetryState {
            uptime_s: self.state.uptime_s,
            ..TelemetryState::default()
        };
        self.logs.clear();
        self.leak_volume_l = 0.0;
        self.report = None;
        self.report_pending = false;
        self.generation += 1;
        info!(generation = self.generation, "System rebooted, parameters normalized");
    }

    pub fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        let result = match command {
            Command::SimulateFailure => self.simulate_failure(),
            Command::Reset => {
                self.reset();
                Ok(())
            }
        };
        if result.is_err() {
            self.stats.commands_rejected += 1;
        }
        result
    }

    fn log(&mut self, message: &str, category: LogCategory) {
        self.logs
            .push(self.timebase.local_clock(), message, category);
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            telemetry: self.state,
            status: SystemStatus::from_state(&self.state),
            valve_state: self.sequencer.state(),
            leak_volume_l: self.leak_volume_l,
            telemetry_ticks: self.stats.telemetry_ticks,
            report_pending: self.report_pending,
            report: self.report.clone(),
            logs: self.logs.entries().cloned().collect(),
            trend: self.trend.to_vec(),
        }
    }

    pub fn state(&self) -> &TelemetryState {
        &self.state
    }

    pub fn valve_state(&self) -> ValveState {
        self.sequencer.state()
    }

    pub fn leak_volume_l(&self) -> f64 {
        self.leak_volume_l
    }

    pub fn report(&self) -> Option<&AiReport> {
        self.report.as_ref()
    }

    pub fn report_pending(&self) -> bool {
        self.report_pending
    }

    pub fn logs(&self) -> &EventLog {
        &self.logs
    }

    pub fn trend(&self) -> &TrendWindow {
        &self.trend
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn io(&self) -> &IO {
        &self.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_sim::{FixedNoise, SimulatedWell, WellParams};

    type QuietDashboard = Dashboard<SimulatedWell<FixedNoise>>;

    fn dashboard(noise: f64) -> QuietDashboard {
        let well = SimulatedWell::with_noise(WellParams::default(), FixedNoise(noise));
        Dashboard::new(well, ScanConfig::default(), TimeBase::new())
    }

    /// Drive the sequencer to the end; returns the report request.
    fn close_valve(d: &mut QuietDashboard) -> ReportRequest {
        for _ in 0..100 {
            if let Some(req) = d.valve_tick() {
                return req;
            }
        }
        panic!("valve never closed");
    }

    #[test]
    fn nominal_tick_updates_state_and_trend() {
        let mut d = dashboard(0.013);
        let out = d.telemetry_tick();
        assert!(out.trip.is_none());
        assert_eq!(d.state().uptime_s, 1);
        assert_eq!(d.state().flow_lps, 0.51);
        assert_eq!(d.state().pressure_bar, 4.01);
        assert_eq!(d.trend().len(), 20);
        let raw = d.trend().latest().map(|s| s.flow_lps).unwrap();
        assert!((raw - 0.513).abs() < 1e-12);
        assert_eq!(d.leak_volume_l(), 0.0);
    }

    #[test]
    fn leak_trips_emergency_once() {
        let mut d = dashboard(0.0);
        d.simulate_failure().unwrap();
        let out = d.telemetry_tick();
        assert!(matches!(out.trip, Some(TripCause::CriticalFlow { .. })));
        assert!(d.state().is_emergency);
        assert_eq!(d.valve_state(), ValveState::Closing);
        assert_eq!(d.state().pressure_bar, 1.5);
        assert!((d.leak_volume_l() - 3.8).abs() < 1e-9);

        let msgs: Vec<_> = d.logs().entries().map(|e| e.message.as_str()).collect();
        assert_eq!(
            msgs,
            ["EMERGENCY SHUTDOWN INITIATED", "ABNORMAL FLOW DETECTED!"]
        );

        // Latched: further critical ticks don't re-trip.
        let again = d.telemetry_tick();
        assert!(again.trip.is_none());
        assert_eq!(d.stats().emergency_shutdowns, 1);
    }

    #[test]
    fn shutdown_closes_valve_and_requests_report_once() {
        let mut d = dashboard(0.0);
        d.simulate_failure().unwrap();
        d.telemetry_tick();

        let req = close_valve(&mut d);
        assert_eq!(d.state().valve_position_pct, ValvePosition::CLOSED);
        assert_eq!(d.valve_state(), ValveState::Closed);
        assert_eq!(d.stats().valve_steps, 20);
        assert!(d.report_pending());
        assert_eq!(req.leak_volume_l, d.leak_volume_l());
        assert_eq!(
            d.logs().latest().map(|e| e.category),
            Some(LogCategory::Ai)
        );
        assert!(d.valve_tick().is_none());
    }

    #[test]
    fn closed_valve_freezes_leak_volume() {
        let mut d = dashboard(0.0);
        d.simulate_failure().unwrap();
        d.telemetry_tick();
        close_valve(&mut d);

        let frozen = d.leak_volume_l();
        for _ in 0..5 {
            d.telemetry_tick();
        }
        assert_eq!(d.leak_volume_l(), frozen);
        assert_eq!(d.state().flow_lps, 0.0);
        assert_eq!(d.state().pressure_bar, 4.0);
    }

    #[test]
    fn successful_report_is_applied() {
        let mut d = dashboard(0.0);
        d.simulate_failure().unwrap();
        d.telemetry_tick();
        let req = close_valve(&mut d);

        let draft = ReportDraft {
            summary: "Утечка локализована".into(),
            finance_note: "Сэкономлено".into(),
        };
        let disposition = d.apply_report(&req, Ok::<_, String>(draft));
        assert_eq!(disposition, ReportDisposition::Accepted);
        let report = d.report().unwrap();
        assert!(!report.fallback);
        assert_eq!(report.roi_percent, req.economics.roi_label());
        assert!(!d.report_pending());
    }

    #[test]
    fn failed_report_falls_back() {
        let mut d = dashboard(0.0);
        d.simulate_failure().unwrap();
        d.telemetry_tick();
        let req = close_valve(&mut d);

        let disposition = d.apply_report(&req, Err::<ReportDraft, _>("connection refused"));
        assert_eq!(disposition, ReportDisposition::Fallback);
        let report = d.report().unwrap();
        assert!(report.fallback);
        assert!(!report.summary.is_empty());
        assert!(report.roi_percent.ends_with('%'));
        assert_eq!(
            d.logs().latest().map(|e| e.message.as_str()),
            Some("AI Offline. Using local heuristic.")
        );
    }

    #[test]
    fn report_after_reset_is_stale() {
        let mut d = dashboard(0.0);
        d.simulate_failure().unwrap();
        d.telemetry_tick();
        let req = close_valve(&mut d);
        d.reset();

        let disposition = d.apply_report(&req, Err::<ReportDraft, _>("late"));
        assert_eq!(disposition, ReportDisposition::Stale);
        assert!(d.report().is_none());
        assert!(d.logs().is_empty());
    }

    #[test]
    fn reset_restores_defaults_but_keeps_uptime() {
        let mut d = dashboard(0.02);
        d.simulate_failure().unwrap();
        d.telemetry_tick();
        d.valve_tick();
        d.reset();

        let s = d.state();
        assert_eq!(s.pressure_bar, 4.0);
        assert_eq!(s.flow_lps, 0.5);
        assert_eq!(s.valve_position_pct, ValvePosition::FULLY_OPEN);
        assert!(!s.is_leaking);
        assert!(!s.is_emergency);
        assert_eq!(s.uptime_s, 1);
        assert!(d.logs().is_empty());
        assert_eq!(d.leak_volume_l(), 0.0);
        assert_eq!(d.valve_state(), ValveState::Open);
        assert!(d.valve_tick().is_none());
    }

    #[test]
    fn simulate_failure_rejected_while_active() {
        let mut d = dashboard(0.0);
        assert!(d.execute(Command::SimulateFailure).is_ok());
        assert_eq!(
            d.execute(Command::SimulateFailure),
            Err(CommandError::LeakActive)
        );
        d.telemetry_tick();
        assert_eq!(
            d.execute(Command::SimulateFailure),
            Err(CommandError::EmergencyActive)
        );
        assert_eq!(d.stats().commands_rejected, 2);
    }

    #[test]
    fn snapshot_mirrors_state() {
        let mut d = dashboard(0.0);
        d.simulate_failure().unwrap();
        d.telemetry_tick();
        let snap = d.snapshot();
        assert_eq!(snap.status, SystemStatus::Critical);
        assert_eq!(snap.valve_state, ValveState::Closing);
        assert_eq!(snap.logs.len(), 2);
        assert_eq!(snap.trend.len(), 20);
        assert_eq!(snap.telemetry_ticks, 1);
    }
}
