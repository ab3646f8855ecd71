use crate::safety::ValvePosition;

/// One raw (unrounded) telemetry sample.
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct WellReading {
    pub pressure_bar: f64,
    pub flow_lps: f64,
}

pub trait WellheadIO: Send {
    /// Advance one telemetry period and return the new reading.
    fn step(&mut self) -> WellReading;
    fn write_valve(&mut self, position: ValvePosition);
    fn valve_position(&self) -> ValvePosition;
    fn inject_leak(&mut self);
    fn is_leaking(&self) -> bool;
    /// Seal the leak and reopen the valve.
    fn restore(&mut self);
    fn is_healthy(&self) -> bool;
}
