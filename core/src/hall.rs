//! Hall-probe signal conditioner: affine voltage-to-field calibration plus
//! an optional moving-average or first-order low-pass filter (`spec.md`
//! §4.1).

use crate::error::{ControlError, ControlResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Calibration and filter configuration for the Hall conditioner, persisted
/// as part of the session config (mirrors the teacher's per-device `Config`
/// structs, e.g. `el3356::Config`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct HallConfig {
    /// Probe offset voltage V0, in volts.
    pub offset_v: f64,
    /// Sensitivity S, in tesla per volt. Must satisfy |S| >= 1e-15.
    pub sensitivity_t_per_v: f64,
    /// Selected filter mode.
    pub filter: FilterConfig,
}

impl Default for HallConfig {
    fn default() -> Self {
        Self {
            offset_v: 0.0,
            sensitivity_t_per_v: 1.0,
            filter: FilterConfig::None,
        }
    }
}

/// Filter mode selector, serialized alongside its parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FilterConfig {
    None,
    MovingAverage { samples: usize },
    LowPass { tau_s: f64 },
}

#[derive(Debug, Clone)]
enum FilterState {
    None,
    MovingAverage(MovingAverage),
    LowPass(LowPass),
}

#[derive(Debug, Clone)]
struct MovingAverage {
    buffer: Vec<f64>,
    write_index: usize,
    filled: usize,
    sum: f64,
}

impl MovingAverage {
    fn new(n: usize) -> Self {
        Self {
            buffer: vec![0.0; n],
            write_index: 0,
            filled: 0,
            sum: 0.0,
        }
    }

    fn push(&mut self, x: f64) -> f64 {
        let n = self.buffer.len();
        let old = self.buffer[self.write_index];
        self.sum -= old;
        self.sum += x;
        self.buffer[self.write_index] = x;
        self.write_index = (self.write_index + 1) % n;
        if self.filled < n {
            self.filled += 1;
        }
        self.sum / self.filled as f64
    }
}

#[derive(Debug, Clone)]
struct LowPass {
    tau_s: f64,
    state: f64,
    primed: bool,
}

impl LowPass {
    fn new(tau_s: f64) -> Self {
        Self {
            tau_s,
            state: 0.0,
            primed: false,
        }
    }

    fn push(&mut self, x: f64, dt: f64) -> f64 {
        if !self.primed {
            self.primed = true;
            self.state = x;
            return x;
        }
        let alpha = if self.tau_s > 0.0 && dt > 0.0 {
            dt / (self.tau_s + dt)
        } else {
            1.0
        };
        self.state += alpha * (x - self.state);
        self.state
    }
}

/// Converts Hall-probe voltage into calibrated magnetic field, with optional
/// filtering.
pub struct HallConditioner {
    offset_v: f64,
    sensitivity_t_per_v: f64,
    filter: FilterState,
}

impl Default for HallConditioner {
    fn default() -> Self {
        Self::new()
    }
}

impl HallConditioner {
    pub fn new() -> Self {
        Self {
            offset_v: 0.0,
            sensitivity_t_per_v: 1.0,
            filter: FilterState::None,
        }
    }

    pub fn set_offset(&mut self, offset_v: f64) {
        self.offset_v = offset_v;
    }

    pub fn offset(&self) -> f64 {
        self.offset_v
    }

    pub fn set_sensitivity(&mut self, sensitivity_t_per_v: f64) -> ControlResult<()> {
        if sensitivity_t_per_v.abs() < ControlError::SENSITIVITY_EPS {
            return Err(ControlError::Calibration(format!(
                "sensitivity {sensitivity_t_per_v} below minimum magnitude {}",
                ControlError::SENSITIVITY_EPS
            )));
        }
        self.sensitivity_t_per_v = sensitivity_t_per_v;
        Ok(())
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity_t_per_v
    }

    /// Changes the filter mode, resetting any filter state.
    pub fn set_filter_mode_none(&mut self) {
        self.filter = FilterState::None;
    }

    /// Configures (or reconfigures) the moving-average filter, clamping N to
    /// [1, 10000] and resetting state.
    pub fn configure_moving_average(&mut self, n: usize) {
        let n = n.clamp(1, 10_000);
        self.filter = FilterState::MovingAverage(MovingAverage::new(n));
    }

    /// Configures (or reconfigures) the low-pass filter, resetting state.
    pub fn configure_low_pass(&mut self, tau_s: f64) -> ControlResult<()> {
        if tau_s < 0.0 {
            return Err(ControlError::Calibration(format!(
                "low-pass time constant must be >= 0, got {tau_s}"
            )));
        }
        self.filter = FilterState::LowPass(LowPass::new(tau_s));
        Ok(())
    }

    /// Applies the session config wholesale (used at load time).
    pub fn apply_config(&mut self, config: &HallConfig) -> ControlResult<()> {
        self.set_offset(config.offset_v);
        self.set_sensitivity(config.sensitivity_t_per_v)?;
        match config.filter {
            FilterConfig::None => self.set_filter_mode_none(),
            FilterConfig::MovingAverage { samples } => self.configure_moving_average(samples),
            FilterConfig::LowPass { tau_s } => self.configure_low_pass(tau_s)?,
        }
        Ok(())
    }

    /// Pure affine conversion, no filtering.
    pub fn voltage_to_field(&self, v: f64) -> f64 {
        (v - self.offset_v) * self.sensitivity_t_per_v
    }

    /// Converts, then applies the selected filter.
    pub fn voltage_to_field_filtered(&mut self, v: f64, dt: f64) -> f64 {
        let b = self.voltage_to_field(v);
        match &mut self.filter {
            FilterState::None => b,
            FilterState::MovingAverage(ma) => ma.push(b),
            FilterState::LowPass(lp) => lp.push(b, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_to_field_at_offset_is_zero() {
        let mut h = HallConditioner::new();
        h.set_offset(1.5);
        h.set_sensitivity(0.2).unwrap();
        assert_eq!(h.voltage_to_field(1.5), 0.0);
    }

    #[test]
    fn sensitivity_below_epsilon_rejected_and_state_unchanged() {
        let mut h = HallConditioner::new();
        h.set_sensitivity(2.0).unwrap();
        let err = h.set_sensitivity(1e-16).unwrap_err();
        assert!(matches!(err, ControlError::Calibration(_)));
        assert_eq!(h.sensitivity(), 2.0);
    }

    #[test]
    fn moving_average_n1_is_identity() {
        let mut h = HallConditioner::new();
        h.configure_moving_average(1);
        assert_eq!(h.voltage_to_field_filtered(1.0, 0.1), 1.0);
        assert_eq!(h.voltage_to_field_filtered(5.0, 0.1), 5.0);
    }

    #[test]
    fn moving_average_ramps_up_then_tracks_full_window() {
        let mut h = HallConditioner::new();
        h.configure_moving_average(3);
        assert_eq!(h.voltage_to_field_filtered(3.0, 0.1), 3.0);
        assert_eq!(h.voltage_to_field_filtered(6.0, 0.1), 4.5);
        assert_eq!(h.voltage_to_field_filtered(9.0, 0.1), 6.0);
        // Window now full; oldest sample (3.0) rolls off.
        assert_eq!(h.voltage_to_field_filtered(0.0, 0.1), 5.0);
    }

    #[test]
    fn low_pass_tau_zero_is_identity() {
        let mut h = HallConditioner::new();
        h.configure_low_pass(0.0).unwrap();
        assert_eq!(h.voltage_to_field_filtered(1.0, 0.1), 1.0);
        assert_eq!(h.voltage_to_field_filtered(4.0, 0.1), 4.0);
    }

    #[test]
    fn low_pass_first_sample_primes_state() {
        let mut h = HallConditioner::new();
        h.configure_low_pass(1.0).unwrap();
        assert_eq!(h.voltage_to_field_filtered(2.0, 0.1), 2.0);
        let next = h.voltage_to_field_filtered(4.0, 0.1);
        assert!(next > 2.0 && next < 4.0);
    }

    #[test]
    fn negative_tau_rejected() {
        let mut h = HallConditioner::new();
        assert!(h.configure_low_pass(-1.0).is_err());
    }

    #[test]
    fn filter_mode_change_resets_state() {
        let mut h = HallConditioner::new();
        h.configure_moving_average(4);
        h.voltage_to_field_filtered(10.0, 0.1);
        h.configure_moving_average(4);
        // Freshly reset window should behave like the very first sample again.
        assert_eq!(h.voltage_to_field_filtered(2.0, 0.1), 2.0);
    }
}
