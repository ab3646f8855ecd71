pub mod control_loop;
pub mod event_log;
pub mod hal;
pub mod hal_sim;
pub mod history;
pub mod report;
pub mod safety;
pub mod sequencer;
pub mod snapshot;
pub mod tags;
pub mod timebase;

pub use control_loop::{
    Command, CommandError, Dashboard, ReportDisposition, ScanConfig, ScanStats, TickOutcome,
};
pub use event_log::{EventLog, LogCategory, LogEntry};
pub use hal::{WellReading, WellheadIO};
pub use hal_sim::{FixedNoise, NoiseSource, SimulatedWell, UniformNoise, WellParams};
pub use history::{TelemetrySample, TrendWindow};
pub use report::{AiReport, LeakEconomics, ReportDraft, ReportRequest};
pub use safety::{TripCause, TripLimits, ValvePosition};
pub use sequencer::{SequencerStep, ShutdownSequencer, ValveState};
pub use snapshot::{DashboardSnapshot, SystemStatus, TelemetryState};
pub use timebase::TimeBase;
