mod app;
mod config;
mod logging;
mod scan;
mod telemetry;

pub use app::run_from_args;
