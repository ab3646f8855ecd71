use crate::infra::audit::{AuditEventType, AuditLogger};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::scan::ScanLoop;
use crate::runtime::telemetry;
use astra_core::{Dashboard, ScanConfig, SimulatedWell, TimeBase};
use astra_io::bridge::{bind_bridge, run_bridge, BridgeConfig, BridgeError};
use astra_io::completion::{CompletionBackend, HttpCompletionClient, OfflineBackend, ReportError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("failed to open audit log {path}: {source}")]
    Audit {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to build completion client: {0}")]
    Completion(#[from] ReportError),

    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}

pub fn run_from_args() -> Result<(), RuntimeError> {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> Result<(), RuntimeError> {
    init_tracing(config.json_logs);

    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();
    let audit_logger = init_audit_logger(config.audit_path.as_ref())?;

    if let Some(ref logger) = audit_logger {
        logger.record(
            timebase,
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "bridge_enabled": config.bridge_enabled,
                "metrics_enabled": metrics_enabled,
                "offline": config.offline,
                "seed": config.seed,
            }),
        );
    }

    let well = match config.seed {
        Some(seed) => SimulatedWell::seeded(seed),
        None => SimulatedWell::new(),
    };
    let dashboard = Dashboard::new(well, ScanConfig::default(), timebase);
    let backend = build_backend(&config)?;

    let stop = Arc::new(AtomicBool::new(false));
    let (snapshot_tx, snapshot_rx) = watch::channel(dashboard.snapshot());
    let (command_tx, command_rx) = mpsc::channel(16);

    let bridge_handle = if config.bridge_enabled {
        let bridge_config = BridgeConfig {
            bind_addr: config.bind_addr.clone(),
            require_handshake: config.bridge_require_handshake,
            ..BridgeConfig::default()
        };
        let listener = bind_bridge(&bridge_config)?;
        let snapshots = snapshot_rx.clone();
        let stop_bridge = Arc::clone(&stop);
        info!(addr = %bridge_config.bind_addr, "Starting bridge");
        Some(thread::spawn(move || {
            run_bridge(
                listener,
                snapshots,
                command_tx,
                timebase,
                bridge_config,
                stop_bridge,
            )
        }))
    } else {
        info!("Bridge disabled");
        drop(command_tx);
        None
    };

    let updater_handle = metrics_enabled
        .then(|| telemetry::start_metrics_updater(snapshot_rx.clone(), Arc::clone(&stop)));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RuntimeError::Runtime)?;

    let scan = ScanLoop::new(dashboard, backend, audit_logger.clone(), timebase)
        .with_scheduled_failure(config.simulate_failure_after);

    info!("ASTRA SCADA running. Connect an operator console to the bridge.");

    let stats = runtime.block_on(async {
        tokio::spawn(wait_for_shutdown(config.run_seconds, Arc::clone(&stop)));
        scan.run(command_rx, snapshot_tx, Arc::clone(&stop)).await
    });

    stop.store(true, Ordering::Relaxed);
    if let Some(handle) = bridge_handle {
        match handle.join() {
            Ok(Err(e)) => warn!(error = %e, "Bridge exited with error"),
            Err(_) => warn!("Bridge thread panicked"),
            Ok(Ok(())) => {}
        }
    }
    if let Some(handle) = updater_handle {
        let _ = handle.join();
    }

    info!(
        telemetry_ticks = stats.telemetry_ticks,
        emergency_shutdowns = stats.emergency_shutdowns,
        reports_completed = stats.reports_completed,
        report_fallbacks = stats.report_fallbacks,
        stale_reports = stats.stale_reports,
        commands_rejected = stats.commands_rejected,
        "Run complete"
    );

    if let Some(ref logger) = audit_logger {
        match serde_json::to_value(&stats) {
            Ok(details) => {
                logger.record(timebase, AuditEventType::SystemShutdown, details);
            }
            Err(e) => warn!(error = %e, "Failed to encode run statistics"),
        }
    }

    Ok(())
}

/// Raise `stop` after `run_seconds`, or on Ctrl-C.
async fn wait_for_shutdown(run_seconds: Option<u64>, stop: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, shutting down");
    };

    match run_seconds {
        Some(seconds) => {
            info!(seconds, "Running for limited duration");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = ctrl_c => {}
            }
        }
        None => ctrl_c.await,
    }
    stop.store(true, Ordering::Relaxed);
}

fn build_backend(config: &RuntimeConfig) -> Result<Arc<dyn CompletionBackend>, RuntimeError> {
    if config.offline {
        info!("Offline mode, incident reports use the local heuristic");
        return Ok(Arc::new(OfflineBackend));
    }

    let completion = config.completion_config();
    if !completion.has_api_key() {
        warn!("No completion API key configured, incident reports will use the local heuristic");
    }
    info!(endpoint = %completion.endpoint, model = %completion.model, "Completion service configured");
    Ok(Arc::new(HttpCompletionClient::new(completion)?))
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> Result<Option<Arc<AuditLogger>>, RuntimeError> {
    let Some(path) = audit_path else {
        return Ok(None);
    };
    let logger = AuditLogger::new(path).map_err(|source| RuntimeError::Audit {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "Audit logging enabled");
    Ok(Some(Arc::new(logger)))
}
