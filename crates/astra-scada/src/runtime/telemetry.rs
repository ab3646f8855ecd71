use astra_core::DashboardSnapshot;
use astra_io::metrics::{init_metrics, record_snapshot, serve_metrics, TELEMETRY_TICKS};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Mirror the published snapshot into the process gauges.
pub fn start_metrics_updater(
    snapshots: watch::Receiver<DashboardSnapshot>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_ticks = 0u64;
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            let snapshot = snapshots.borrow().clone();
            record_snapshot(&snapshot);
            if snapshot.telemetry_ticks > last_ticks {
                TELEMETRY_TICKS.inc_by(snapshot.telemetry_ticks - last_ticks);
                last_ticks = snapshot.telemetry_ticks;
            }

            thread::sleep(Duration::from_millis(200));
        }
    })
}
