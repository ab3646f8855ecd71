use crate::hal::WellReading;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub pressure_bar: f64,
    pub flow_lps: f64,
}

impl From<WellReading> for TelemetrySample {
    fn from(r: WellReading) -> Self {
        Self {
            pressure_bar: r.pressure_bar,
            flow_lps: r.flow_lps,
        }
    }
}

/// Fixed-length rolling window of recent samples, oldest first.
///
/// Always holds exactly `len` samples; it starts pre-filled.
#[derive(Debug, Clone)]
pub struct TrendWindow {
    samples: VecDeque<TelemetrySample>,
}

impl TrendWindow {
    pub fn filled(len: usize, fill: TelemetrySample) -> Self {
        let len = len.max(1);
        Self {
            samples: std::iter::repeat(fill).take(len).collect(),
        }
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        self.samples.pop_front();
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    pub fn to_vec(&self) -> Vec<TelemetrySample> {
        self.samples.iter().copied().collect()
    }
}
