//! Prometheus metrics for ASTRA SCADA.
//!
//! Process gauges mirror the dashboard snapshot; counters track the
//! shutdown and reporting lifecycle.

use astra_core::{tags, DashboardSnapshot};
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Scan Loop Metrics
// ============================================================================

/// Telemetry simulator ticks executed
pub static TELEMETRY_TICKS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "astra_telemetry_ticks_total",
        "Telemetry simulator ticks executed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Valve ramp steps taken by the shutdown sequencer
pub static VALVE_STEPS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "astra_valve_steps_total",
        "Valve ramp steps taken by the shutdown sequencer",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Safety Metrics
// ============================================================================

/// Emergency shutdowns triggered by critical flow
pub static EMERGENCY_SHUTDOWNS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "astra_emergency_shutdowns_total",
        "Emergency shutdowns triggered by critical flow",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Operator commands refused
pub static COMMANDS_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "astra_commands_rejected_total",
        "Operator commands refused in the current state",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Reporting Metrics
// ============================================================================

/// Incident reports produced by the completion service
pub static REPORTS_GENERATED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "astra_reports_generated_total",
        "Incident reports produced by the completion service",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Incident reports replaced by the local heuristic
pub static REPORT_FALLBACKS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "astra_report_fallbacks_total",
        "Incident reports replaced by the local heuristic",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Completion call latency in seconds
pub static REPORT_LATENCY_S: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "astra_report_latency_seconds",
            "Completion call latency in seconds",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

// ============================================================================
// Process State Metrics
// ============================================================================

/// Current wellhead pressure in bar
pub static PRESSURE_BAR: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::PRESSURE_BAR.metric, "Current wellhead pressure in bar").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Current wellhead flow in litres per second
pub static FLOW_LPS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::FLOW_LPS.metric,
        "Current wellhead flow in litres per second",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Valve opening in percent
pub static VALVE_POSITION_PCT: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::VALVE_POSITION_PCT.metric,
        "Valve opening in percent (100 = fully open)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Litres leaked in the current cycle
pub static LEAK_VOLUME_L: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::LEAK_VOLUME_L.metric,
        "Litres leaked in the current cycle",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Simulator uptime in seconds
pub static UPTIME_S: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::UPTIME_S.metric, "Simulator uptime in seconds").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Emergency latch (1 = active)
pub static EMERGENCY_ACTIVE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        tags::EMERGENCY_ACTIVE.metric,
        "Emergency latch (1=active, 0=clear)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Leak flag (1 = leaking)
pub static LEAK_ACTIVE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(tags::LEAK_ACTIVE.metric, "Leak flag (1=leaking, 0=sealed)").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Bridge client connection status (1 = connected, 0 = disconnected)
pub static BRIDGE_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "astra_bridge_connected",
        "Bridge client connection status (1=connected, 0=disconnected)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Copy a snapshot into the process gauges.
pub fn record_snapshot(snapshot: &DashboardSnapshot) {
    let t = &snapshot.telemetry;
    PRESSURE_BAR.set(t.pressure_bar);
    FLOW_LPS.set(t.flow_lps);
    VALVE_POSITION_PCT.set(f64::from(t.valve_position_pct.percent()));
    UPTIME_S.set(t.uptime_s as f64);
    EMERGENCY_ACTIVE.set(flag(t.is_emergency));
    LEAK_ACTIVE.set(flag(t.is_leaking));
    LEAK_VOLUME_L.set(snapshot.leak_volume_l);
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = route(request.url());
            let _ = request.respond(response);
        }
    })
}

fn route(path: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    match path {
        "/metrics" => {
            let encoder = TextEncoder::new();
            let metric_families = REGISTRY.gather();
            let mut buffer = Vec::new();

            if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                tracing::warn!("Failed to encode metrics: {}", e);
                return Response::from_string("Internal Server Error").with_status_code(500);
            }

            let response = Response::from_data(buffer);
            match tiny_http::Header::from_bytes(
                &b"Content-Type"[..],
                &b"text/plain; version=0.0.4"[..],
            ) {
                Ok(header) => response.with_header(header),
                Err(()) => response,
            }
        }
        "/health" => Response::from_string("OK"),
        "/ready" => {
            // Ready once the simulator has produced a sample
            if TELEMETRY_TICKS.get() > 0 {
                Response::from_string("Ready")
            } else {
                Response::from_string("Not Ready").with_status_code(503)
            }
        }
        _ => Response::from_string("Not Found").with_status_code(404),
    }
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    // Touch each metric to force initialization
    let _ = TELEMETRY_TICKS.get();
    let _ = VALVE_STEPS.get();
    let _ = EMERGENCY_SHUTDOWNS.get();
    let _ = COMMANDS_REJECTED.get();
    let _ = REPORTS_GENERATED.get();
    let _ = REPORT_FALLBACKS.get();
    let _ = REPORT_LATENCY_S.get_sample_count();
    let _ = PRESSURE_BAR.get();
    let _ = FLOW_LPS.get();
    let _ = VALVE_POSITION_PCT.get();
    let _ = LEAK_VOLUME_L.get();
    let _ = UPTIME_S.get();
    let _ = EMERGENCY_ACTIVE.get();
    let _ = LEAK_ACTIVE.get();
    let _ = BRIDGE_CONNECTED.get();
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_core::ValvePosition;

    #[test]
    fn snapshot_sets_gauges() {
        init_metrics();
        let mut snapshot = DashboardSnapshot::default();
        snapshot.telemetry.valve_position_pct = ValvePosition::new(35);
        snapshot.telemetry.is_emergency = true;
        snapshot.leak_volume_l = 12.5;
        record_snapshot(&snapshot);

        assert_eq!(VALVE_POSITION_PCT.get(), 35.0);
        assert_eq!(EMERGENCY_ACTIVE.get(), 1.0);
        assert_eq!(LEAK_VOLUME_L.get(), 12.5);
    }

    #[test]
    fn exposition_names_wellhead_metrics() {
        init_metrics();
        let families = REGISTRY.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().any(|n| n == tags::FLOW_LPS.metric));
        assert!(names.iter().any(|n| n == "astra_report_fallbacks_total"));
    }

    #[test]
    fn unknown_path_is_404() {
        assert_eq!(route("/nope").status_code().0, 404);
        assert_eq!(route("/health").status_code().0, 200);
    }
}
