use astra_io::completion::{CompletionConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, PLACEHOLDER_API_KEY};
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_ENV: &str = "ASTRA_API_KEY";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub bind_addr: String,
    pub bridge_enabled: bool,
    pub bridge_require_handshake: bool,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub offline: bool,
    /// 0 disables the deadline.
    pub report_timeout_secs: u64,
    pub seed: Option<u64>,
    /// Inject a leak once uptime reaches this many seconds.
    pub simulate_failure_after: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            bind_addr: "127.0.0.1:7100".to_string(),
            bridge_enabled: true,
            bridge_require_handshake: false,
            json_logs: false,
            metrics_addr: None,
            audit_path: None,
            api_url: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            offline: false,
            report_timeout_secs: 30,
            seed: None,
            simulate_failure_after: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut cfg = Self::from_args(&args);
        if cfg.api_key.is_none() {
            cfg.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
        }
        cfg
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--bind" => {
                    if i + 1 < args.len() {
                        cfg.bind_addr = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--no-bridge" => {
                    cfg.bridge_enabled = false;
                }
                "--require-handshake" => {
                    cfg.bridge_require_handshake = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if i + 1 < args.len() {
                        cfg.audit_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--api-url" => {
                    if i + 1 < args.len() {
                        cfg.api_url = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--model" => {
                    if i + 1 < args.len() {
                        cfg.model = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--api-key" => {
                    if i + 1 < args.len() {
                        cfg.api_key = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--offline" => {
                    cfg.offline = true;
                }
                "--report-timeout-secs" => {
                    if i + 1 < args.len() {
                        cfg.report_timeout_secs = args[i + 1].parse().unwrap_or(30);
                        i += 1;
                    }
                }
                "--seed" => {
                    if i + 1 < args.len() {
                        cfg.seed = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--simulate-failure-after" => {
                    if i + 1 < args.len() {
                        cfg.simulate_failure_after = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            endpoint: self.api_url.clone(),
            model: self.model.clone(),
            api_key: self
                .api_key
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string()),
            timeout: (self.report_timeout_secs > 0)
                .then(|| Duration::from_secs(self.report_timeout_secs)),
        }
    }

    pub fn print_help() {
        println!(
            r#"ASTRA SCADA - Wellhead leak simulator with automatic emergency shutdown

USAGE:
    astra-scada [OPTIONS]

OPTIONS:
    --bind <ADDR>                 Bridge TCP bind address [default: 127.0.0.1:7100]
    --no-bridge                   Disable the operator bridge (headless simulation)
    --require-handshake           Require a hello message before accepting commands
    --run-seconds <SECS>          Run for a fixed duration then exit
    --json-logs                   Output logs in JSON format (for log aggregation)
    --metrics-addr <ADDR>         Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>            Enable audit logging to specified JSONL file
    --api-url <URL>               Chat-completions endpoint [default: {endpoint}]
    --model <NAME>                Completion model [default: {model}]
    --api-key <KEY>               Bearer token for the completion service
    --offline                     Never call the completion service; always use the local report
    --report-timeout-secs <SECS>  Completion call deadline, 0 = none [default: 30]
    --seed <N>                    Seed the sensor noise for reproducible runs
    --simulate-failure-after <S>  Inject a leak once uptime reaches S seconds
    -h, --help                    Print this help message

ENVIRONMENT VARIABLES:
    ASTRA_API_KEY                 Completion service token (when --api-key is absent)
    RUST_LOG                      Set log filter (e.g., RUST_LOG=debug,astra_core=trace)

EXAMPLES:
    # Operator console on the default port, reports from the completion service
    ASTRA_API_KEY=sk-... astra-scada --metrics-addr 0.0.0.0:9090

    # Scripted demo: leak after 5 s, local reports, stop after 30 s
    astra-scada --offline --no-bridge --simulate-failure-after 5 --run-seconds 30
"#,
            endpoint = DEFAULT_ENDPOINT,
            model = DEFAULT_MODEL,
        );
    }
}
