use crate::infra::audit::{AuditEventType, AuditLogger};
use astra_core::{
    Command, CommandError, Dashboard, DashboardSnapshot, ReportDisposition, ReportDraft,
    ReportRequest, ScanStats, TimeBase, ValveState, WellheadIO,
};
use astra_io::completion::{CompletionBackend, ReportError};
use astra_io::metrics::{
    COMMANDS_REJECTED, EMERGENCY_SHUTDOWNS, REPORTS_GENERATED, REPORT_FALLBACKS,
    REPORT_LATENCY_S, VALVE_STEPS,
};
use astra_io::OperatorRequest;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const STOP_POLL: Duration = Duration::from_millis(50);

struct ReportOutcome {
    request: ReportRequest,
    result: Result<ReportDraft, ReportError>,
    elapsed: Duration,
}

/// Owns the dashboard and drives it from the two timers, operator commands
/// and completed report calls. Nothing else mutates dashboard state.
pub struct ScanLoop<IO: WellheadIO> {
    dashboard: Dashboard<IO>,
    backend: Arc<dyn CompletionBackend>,
    audit: Option<Arc<AuditLogger>>,
    timebase: TimeBase,
    failure_after: Option<u64>,
    failure_injected: bool,
}

impl<IO: WellheadIO + 'static> ScanLoop<IO> {
    pub fn new(
        dashboard: Dashboard<IO>,
        backend: Arc<dyn CompletionBackend>,
        audit: Option<Arc<AuditLogger>>,
        timebase: TimeBase,
    ) -> Self {
        Self {
            dashboard,
            backend,
            audit,
            timebase,
            failure_after: None,
            failure_injected: false,
        }
    }

    /// Inject one leak once uptime reaches `after` seconds.
    pub fn with_scheduled_failure(mut self, after: Option<u64>) -> Self {
        self.failure_after = after;
        self
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<OperatorRequest>,
        snapshots: watch::Sender<DashboardSnapshot>,
        stop: Arc<AtomicBool>,
    ) -> ScanStats {
        let config = self.dashboard.config().clone();
        let start = Instant::now();
        let mut telemetry = interval_at(start + config.telemetry_period, config.telemetry_period);
        telemetry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut valve = interval_at(start + config.valve_period, config.valve_period);
        valve.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stop_poll = interval(STOP_POLL);
        let (report_tx, mut report_rx) = mpsc::channel::<ReportOutcome>(4);

        info!(
            telemetry_period_ms = config.telemetry_period.as_millis() as u64,
            valve_period_ms = config.valve_period.as_millis() as u64,
            critical_flow_lps = config.trip_limits.critical_flow_lps,
            backend = self.backend.name(),
            "Scan loop started"
        );
        snapshots.send_replace(self.dashboard.snapshot());

        loop {
            let changed = tokio::select! {
                _ = telemetry.tick() => {
                    if self.on_telemetry() {
                        // Ramp starts one valve period after the trip
                        valve.reset();
                    }
                    true
                }
                _ = valve.tick(), if self.dashboard.valve_state() == ValveState::Closing => {
                    self.on_valve(&report_tx);
                    true
                }
                Some(request) = commands.recv() => {
                    let result = self.on_command(request.command, "operator");
                    if request.reply.send(result).is_err() {
                        debug!("Command requester went away before the ack");
                    }
                    true
                }
                Some(outcome) = report_rx.recv() => {
                    self.on_report(outcome);
                    true
                }
                _ = stop_poll.tick() => {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    false
                }
            };
            if changed {
                snapshots.send_replace(self.dashboard.snapshot());
            }
        }

        info!("Scan loop stopped");
        self.dashboard.stats().clone()
    }

    /// Returns true when this tick tripped the emergency shutdown.
    fn on_telemetry(&mut self) -> bool {
        let outcome = self.dashboard.telemetry_tick();
        if let Some(cause) = outcome.trip {
            EMERGENCY_SHUTDOWNS.inc();
            self.audit(
                AuditEventType::EmergencyShutdown,
                json!({
                    "cause": cause.to_string(),
                    "flow_lps": outcome.reading.flow_lps,
                    "pressure_bar": outcome.reading.pressure_bar,
                    "valve_position_pct": self.dashboard.state().valve_position_pct.percent(),
                    "leak_volume_l": self.dashboard.leak_volume_l(),
                }),
            );
        }

        if let Some(after) = self.failure_after {
            if !self.failure_injected && self.dashboard.state().uptime_s >= after {
                self.failure_injected = true;
                info!(uptime_s = self.dashboard.state().uptime_s, "Scheduled leak injection");
                let _ = self.on_command(Command::SimulateFailure, "schedule");
            }
        }

        outcome.trip.is_some()
    }

    fn on_valve(&mut self, report_tx: &mpsc::Sender<ReportOutcome>) {
        VALVE_STEPS.inc();
        if let Some(request) = self.dashboard.valve_tick() {
            self.audit(
                AuditEventType::ValveClosed,
                json!({
                    "generation": request.generation,
                    "leak_volume_l": request.leak_volume_l,
                    "saved_tenge": request.economics.saved_tenge,
                    "roi_percent": request.economics.roi_label(),
                }),
            );
            self.spawn_report(request, report_tx.clone());
        }
    }

    fn spawn_report(&self, request: ReportRequest, tx: mpsc::Sender<ReportOutcome>) {
        let backend = Arc::clone(&self.backend);
        debug!(
            backend = backend.name(),
            generation = request.generation,
            leak_volume_l = request.leak_volume_l,
            "Requesting incident report"
        );
        tokio::spawn(async move {
            let started = Instant::now();
            let result = backend.generate(request.prompt.clone()).await;
            let outcome = ReportOutcome {
                request,
                result,
                elapsed: started.elapsed(),
            };
            if tx.send(outcome).await.is_err() {
                debug!("Scan loop stopped before the report arrived");
            }
        });
    }

    fn on_report(&mut self, outcome: ReportOutcome) {
        REPORT_LATENCY_S.observe(outcome.elapsed.as_secs_f64());
        let error = outcome.result.as_ref().err().map(|e| e.to_string());
        let generation = outcome.request.generation;
        let latency_ms = outcome.elapsed.as_millis() as u64;

        match self.dashboard.apply_report(&outcome.request, outcome.result) {
            ReportDisposition::Accepted => {
                REPORTS_GENERATED.inc();
                self.audit(
                    AuditEventType::ReportGenerated,
                    json!({
                        "generation": generation,
                        "latency_ms": latency_ms,
                        "roi_percent": self.dashboard.report().map(|r| r.roi_percent.clone()),
                    }),
                );
            }
            ReportDisposition::Fallback => {
                REPORT_FALLBACKS.inc();
                self.audit(
                    AuditEventType::ReportFallback,
                    json!({
                        "generation": generation,
                        "latency_ms": latency_ms,
                        "error": error,
                        "roi_percent": self.dashboard.report().map(|r| r.roi_percent.clone()),
                    }),
                );
            }
            ReportDisposition::Stale => {
                self.audit(
                    AuditEventType::ReportDiscarded,
                    json!({ "generation": generation, "latency_ms": latency_ms }),
                );
            }
        }
    }

    fn on_command(&mut self, command: Command, source: &'static str) -> Result<(), CommandError> {
        let result = self.dashboard.execute(command);
        match (command, &result) {
            (_, Err(err)) => {
                COMMANDS_REJECTED.inc();
                warn!(command = command.as_str(), source, reason = %err, "Command rejected");
                self.audit(
                    AuditEventType::CommandRejected,
                    json!({ "command": command, "source": source, "reason": err.to_string() }),
                );
            }
            (Command::SimulateFailure, Ok(())) => {
                self.audit(
                    AuditEventType::LeakInjected,
                    json!({ "source": source, "uptime_s": self.dashboard.state().uptime_s }),
                );
            }
            (Command::Reset, Ok(())) => {
                self.audit(
                    AuditEventType::SystemReset,
                    json!({ "source": source, "uptime_s": self.dashboard.state().uptime_s }),
                );
            }
        }
        result
    }

    fn audit(&self, event_type: AuditEventType, details: serde_json::Value) {
        if let Some(logger) = &self.audit {
            logger.record(self.timebase, event_type, details);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::{FixedNoise, ScanConfig, SimulatedWell, ValvePosition, WellParams};
    use astra_io::completion::OfflineBackend;
    use futures::future::{BoxFuture, FutureExt};

    type TestWell = SimulatedWell<FixedNoise>;

    struct SlowBackend(Duration);

    impl CompletionBackend for SlowBackend {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<ReportDraft, ReportError>> {
            let delay = self.0;
            async move {
                tokio::time::sleep(delay).await;
                Ok(ReportDraft {
                    summary: "Поток перекрыт".to_string(),
                    finance_note: "Экономия".to_string(),
                })
            }
            .boxed()
        }
    }

    struct Running {
        snapshots: watch::Receiver<DashboardSnapshot>,
        commands: mpsc::Sender<OperatorRequest>,
        stop: Arc<AtomicBool>,
        task: tokio::task::JoinHandle<ScanStats>,
    }

    fn start(backend: Arc<dyn CompletionBackend>, failure_after: Option<u64>) -> Running {
        let config = ScanConfig {
            telemetry_period: Duration::from_millis(20),
            valve_period: Duration::from_millis(2),
            ..ScanConfig::default()
        };
        let well: TestWell = SimulatedWell::with_noise(WellParams::default(), FixedNoise(0.0));
        let timebase = TimeBase::new();
        let dashboard = Dashboard::new(well, config, timebase);
        let (snap_tx, snap_rx) = watch::channel(dashboard.snapshot());
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let stop = Arc::new(AtomicBool::new(false));

        let scan = ScanLoop::new(dashboard, backend, None, timebase)
            .with_scheduled_failure(failure_after);
        let task = tokio::spawn(scan.run(cmd_rx, snap_tx, Arc::clone(&stop)));
        Running {
            snapshots: snap_rx,
            commands: cmd_tx,
            stop,
            task,
        }
    }

    async fn wait_for(
        rx: &mut watch::Receiver<DashboardSnapshot>,
        pred: impl Fn(&DashboardSnapshot) -> bool,
    ) -> DashboardSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if pred(&snapshot) {
                    return snapshot;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("condition not reached")
    }

    async fn send(commands: &mpsc::Sender<OperatorRequest>, command: Command) -> Result<(), CommandError> {
        let (request, reply) = OperatorRequest::new(command);
        commands.send(request).await.unwrap();
        reply.await.unwrap()
    }

    async fn finish(running: Running) -> ScanStats {
        running.stop.store(true, Ordering::Relaxed);
        running.task.await.unwrap()
    }

    #[tokio::test]
    async fn scheduled_leak_runs_full_shutdown_cycle() {
        let mut running = start(Arc::new(OfflineBackend), Some(1));

        let snap = wait_for(&mut running.snapshots, |s| s.report.is_some()).await;
        assert!(snap.telemetry.is_emergency);
        assert_eq!(snap.telemetry.valve_position_pct, ValvePosition::CLOSED);
        assert_eq!(snap.valve_state, ValveState::Closed);
        let report = snap.report.unwrap();
        assert!(report.fallback);
        assert!(report.roi_percent.ends_with('%'));
        assert_eq!(
            snap.logs.first().map(|e| e.message.as_str()),
            Some("AI Offline. Using local heuristic.")
        );

        let stats = finish(running).await;
        assert_eq!(stats.emergency_shutdowns, 1);
        assert_eq!(stats.report_fallbacks, 1);
        assert_eq!(stats.valve_steps, 20);
    }

    #[tokio::test]
    async fn operator_commands_are_acknowledged() {
        let mut running = start(Arc::new(OfflineBackend), None);

        assert_eq!(send(&running.commands, Command::SimulateFailure).await, Ok(()));
        assert!(send(&running.commands, Command::SimulateFailure).await.is_err());

        wait_for(&mut running.snapshots, |s| s.report.is_some()).await;
        assert_eq!(send(&running.commands, Command::Reset).await, Ok(()));

        let snap = wait_for(&mut running.snapshots, |s| s.report.is_none()).await;
        assert!(!snap.telemetry.is_emergency);
        assert!(!snap.telemetry.is_leaking);
        assert_eq!(snap.telemetry.valve_position_pct, ValvePosition::FULLY_OPEN);
        assert!(snap.logs.is_empty());
        assert_eq!(snap.leak_volume_l, 0.0);

        let stats = finish(running).await;
        assert_eq!(stats.commands_rejected, 1);
    }

    #[tokio::test]
    async fn report_for_reset_cycle_is_discarded() {
        let mut running = start(Arc::new(SlowBackend(Duration::from_millis(300))), Some(1));

        wait_for(&mut running.snapshots, |s| s.report_pending).await;
        assert_eq!(send(&running.commands, Command::Reset).await, Ok(()));
        tokio::time::sleep(Duration::from_millis(500)).await;

        let snap = running.snapshots.borrow().clone();
        assert!(snap.report.is_none());
        assert!(!snap.report_pending);
        assert!(snap.logs.is_empty());

        let stats = finish(running).await;
        assert_eq!(stats.stale_reports, 1);
        assert_eq!(stats.reports_completed, 0);
    }
}
