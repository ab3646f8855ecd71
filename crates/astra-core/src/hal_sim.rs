use crate::hal::{WellReading, WellheadIO};
use crate::safety::ValvePosition;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Additive sensor noise. One draw is shared by both channels each step.
pub trait NoiseSource: Send {
    fn sample(&mut self) -> f64;
}

/// Uniform noise in `[-amplitude, amplitude)`.
#[derive(Debug, Clone)]
pub struct UniformNoise {
    rng: StdRng,
    amplitude: f64,
}

impl UniformNoise {
    pub fn from_entropy(amplitude: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            amplitude,
        }
    }

    pub fn seeded(seed: u64, amplitude: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            amplitude,
        }
    }
}

impl NoiseSource for UniformNoise {
    fn sample(&mut self) -> f64 {
        if self.amplitude <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-self.amplitude..self.amplitude)
    }
}

/// Constant noise, for deterministic runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedNoise(pub f64);

impl NoiseSource for FixedNoise {
    fn sample(&mut self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WellParams {
    pub nominal_pressure_bar: f64,
    pub nominal_flow_lps: f64,
    pub leak_pressure_bar: f64,
    /// Leak flow with the valve fully open.
    pub leak_flow_lps: f64,
    pub noise_amplitude: f64,
}

impl Default for WellParams {
    fn default() -> Self {
        Self {
            nominal_pressure_bar: 4.0,
            nominal_flow_lps: 0.5,
            leak_pressure_bar: 1.5,
            leak_flow_lps: 3.8,
            noise_amplitude: 0.05,
        }
    }
}

/// Simulated ISR wellhead: a flow line behind one valve that can spring a leak.
#[derive(Debug, Clone)]
pub struct SimulatedWell<N: NoiseSource = UniformNoise> {
    params: WellParams,
    noise: N,
    valve: ValvePosition,
    leaking: bool,
    pressure_bar: f64,
    flow_lps: f64,
}

impl SimulatedWell<UniformNoise> {
    pub fn new() -> Self {
        let params = WellParams::default();
        Self::with_noise(params, UniformNoise::from_entropy(params.noise_amplitude))
    }

    pub fn seeded(seed: u64) -> Self {
        let params = WellParams::default();
        Self::with_noise(params, UniformNoise::seeded(seed, params.noise_amplitude))
    }
}

impl Default for SimulatedWell<UniformNoise> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NoiseSource> SimulatedWell<N> {
    pub fn with_noise(params: WellParams, noise: N) -> Self {
        Self {
            params,
            noise,
            valve: ValvePosition::FULLY_OPEN,
            leaking: false,
            pressure_bar: params.nominal_pressure_bar,
            flow_lps: params.nominal_flow_lps,
        }
    }
}

impl<N: NoiseSource> WellheadIO for SimulatedWell<N> {
    fn step(&mut self) -> WellReading {
        let noise = self.noise.sample();
        let p = &self.params;

        let (pressure, flow) = if !self.leaking {
            (p.nominal_pressure_bar + noise, p.nominal_flow_lps + noise)
        } else if self.valve.is_closed() {
            // Line isolated: pressure recovers, nothing escapes.
            (p.nominal_pressure_bar + noise, 0.0)
        } else {
            (
                p.leak_pressure_bar + noise,
                p.leak_flow_lps * self.valve.fraction() + noise,
            )
        };

        self.pressure_bar = pressure;
        self.flow_lps = flow;
        WellReading {
            pressure_bar: pressure,
            flow_lps: flow,
        }
    }

    fn write_valve(&mut self, position: ValvePosition) {
        self.valve = position;
    }

    fn valve_position(&self) -> ValvePosition {
        self.valve
    }

    fn inject_leak(&mut self) {
        self.leaking = true;
    }

    fn is_leaking(&self) -> bool {
        self.leaking
    }

    fn restore(&mut self) {
        self.leaking = false;
        self.valve = ValvePosition::FULLY_OPEN;
        self.pressure_bar = self.params.nominal_pressure_bar;
        self.flow_lps = self.params.nominal_flow_lps;
    }

    fn is_healthy(&self) -> bool {
        self.pressure_bar.is_finite() && self.flow_lps.is_finite() && self.flow_lps >= -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_well() -> SimulatedWell<FixedNoise> {
        SimulatedWell::with_noise(WellParams::default(), FixedNoise(0.0))
    }

    #[test]
    fn nominal_reading_without_leak() {
        let mut well = quiet_well();
        let r = well.step();
        assert_eq!(r.pressure_bar, 4.0);
        assert_eq!(r.flow_lps, 0.5);
    }

    #[test]
    fn leak_flow_scales_with_valve() {
        let mut well = SimulatedWell::with_noise(WellParams::default(), FixedNoise(0.02));
        well.inject_leak();
        let open = well.step();
        assert!((open.flow_lps - 3.82).abs() < 1e-9);
        assert!((open.pressure_bar - 1.52).abs() < 1e-9);

        well.write_valve(ValvePosition::new(50));
        let half = well.step();
        assert!((half.flow_lps - (1.9 + 0.02)).abs() < 1e-9);
    }

    #[test]
    fn closed_valve_stops_flow_and_restores_pressure() {
        let mut well = quiet_well();
        well.inject_leak();
        well.write_valve(ValvePosition::CLOSED);
        let r = well.step();
        assert_eq!(r.flow_lps, 0.0);
        assert_eq!(r.pressure_bar, 4.0);
    }

    #[test]
    fn uniform_noise_stays_in_band() {
        let mut noise = UniformNoise::seeded(7, 0.05);
        for _ in 0..1_000 {
            let n = noise.sample();
            assert!((-0.05..0.05).contains(&n), "noise {n} out of band");
        }
    }

    #[test]
    fn restore_clears_leak_and_reopens() {
        let mut well = quiet_well();
        well.inject_leak();
        well.write_valve(ValvePosition::new(10));
        well.restore();
        assert!(!well.is_leaking());
        assert!(well.valve_position().is_fully_open());
        assert!(well.is_healthy());
    }
}
