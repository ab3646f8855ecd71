use chrono::Local;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds since Unix epoch (for cross-process logs only).
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }

    /// Local wall-clock time as `HH:MM:SS`, used to stamp operator log entries.
    pub fn local_clock(&self) -> String {
        Local::now().format("%H:%M:%S").to_string()
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Render an uptime counter as `HH:MM:SS`. Hours wrap at 24 like a wall clock.
pub fn format_uptime(seconds: u64) -> String {
    let s = seconds % 86_400;
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(0), "00:00:00");
        assert_eq!(format_uptime(3_725), "01:02:05");
        assert_eq!(format_uptime(86_401), "00:00:01");
    }

    #[test]
    fn local_clock_is_hms() {
        let clock = TimeBase::new().local_clock();
        assert_eq!(clock.len(), 8);
        assert_eq!(clock.matches(':').count(), 2);
    }
}
