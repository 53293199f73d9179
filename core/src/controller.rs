//! Setpoint-ramping PID field controller with derivative filtering,
//! feedforward, integrator anti-windup, and output clamp + slew limit
//! (`spec.md` §4.3).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Gains, limits, and feedforward configuration, persisted as part of the
/// session config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct ControllerConfig {
    pub kp_v_per_t: f64,
    pub ki_v_per_t_s: f64,
    pub kd_v_s_per_t: f64,
    pub integrator_min_v: f64,
    pub integrator_max_v: f64,
    pub output_min_v: f64,
    pub output_max_v: f64,
    pub output_slew_v_per_s: f64,
    pub derivative_tau_s: f64,
    pub ramp_rate_t_per_s: f64,
    pub feedforward_enabled: bool,
    pub feedforward_v0: f64,
    pub feedforward_v_per_t: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp_v_per_t: 1.0,
            ki_v_per_t_s: 0.0,
            kd_v_s_per_t: 0.0,
            integrator_min_v: -10.0,
            integrator_max_v: 10.0,
            output_min_v: -10.0,
            output_max_v: 10.0,
            output_slew_v_per_s: 0.0,
            derivative_tau_s: 0.0,
            ramp_rate_t_per_s: 0.0,
            feedforward_enabled: false,
            feedforward_v0: 0.0,
            feedforward_v_per_t: 0.0,
        }
    }
}

/// Breakdown of a single tick's output composition, used for telemetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickOutput {
    pub b_ramp_t: f64,
    pub error_t: f64,
    pub p_v: f64,
    pub i_v: f64,
    pub d_v: f64,
    pub feedforward_v: f64,
    pub output_v: f64,
    pub saturated: bool,
}

/// Ramped-setpoint PID controller. Produces a commanded program voltage from
/// a target field and a measured field each tick.
pub struct FieldController {
    kp: f64,
    ki: f64,
    kd: f64,
    integrator_min: f64,
    integrator_max: f64,
    output_min: f64,
    output_max: f64,
    output_slew: f64,
    derivative_tau: f64,
    ramp_rate: f64,

    feedforward_enabled: bool,
    feedforward_v0: f64,
    feedforward_v_per_t: f64,

    b_target: f64,
    b_ramp: f64,
    accum_t_s: f64,
    filtered_derivative: f64,
    prev_b_meas: f64,
    last_output_v: f64,
    last_t: Option<f64>,
}

const ANTI_WINDUP_EPS: f64 = 1e-12;
const DT_FLOOR: f64 = 1e-6;

impl Default for FieldController {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldController {
    pub fn new() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            integrator_min: 0.0,
            integrator_max: 0.0,
            output_min: 0.0,
            output_max: 0.0,
            output_slew: 0.0,
            derivative_tau: 0.0,
            ramp_rate: 0.0,
            feedforward_enabled: false,
            feedforward_v0: 0.0,
            feedforward_v_per_t: 0.0,
            b_target: 0.0,
            b_ramp: 0.0,
            accum_t_s: 0.0,
            filtered_derivative: 0.0,
            prev_b_meas: 0.0,
            last_output_v: 0.0,
            last_t: None,
        }
    }

    pub fn apply_config(&mut self, config: &ControllerConfig) {
        self.kp = config.kp_v_per_t;
        self.ki = config.ki_v_per_t_s;
        self.kd = config.kd_v_s_per_t;
        self.integrator_min = config.integrator_min_v;
        self.integrator_max = config.integrator_max_v;
        self.output_min = config.output_min_v;
        self.output_max = config.output_max_v;
        self.output_slew = config.output_slew_v_per_s;
        self.derivative_tau = config.derivative_tau_s;
        self.ramp_rate = config.ramp_rate_t_per_s;
        self.feedforward_enabled = config.feedforward_enabled;
        self.feedforward_v0 = config.feedforward_v0;
        self.feedforward_v_per_t = config.feedforward_v_per_t;
    }

    pub fn set_target(&mut self, b_target: f64) {
        self.b_target = b_target;
    }

    pub fn target(&self) -> f64 {
        self.b_target
    }

    pub fn ramped_setpoint(&self) -> f64 {
        self.b_ramp
    }

    /// Resets ramp, integrator, derivative, and output state to track
    /// `b_initial` with no transient.
    pub fn reset(&mut self, b_initial: f64) {
        self.b_target = b_initial;
        self.b_ramp = b_initial;
        self.accum_t_s = 0.0;
        self.filtered_derivative = 0.0;
        self.last_output_v = 0.0;
        self.last_t = None;
    }

    /// Advances the controller by one tick, given the current time (monotonic
    /// seconds) and measured field, returning the commanded program voltage.
    pub fn update(&mut self, t: f64, b_meas: f64) -> TickOutput {
        let Some(last_t) = self.last_t else {
            self.last_t = Some(t);
            self.prev_b_meas = b_meas;
            self.b_ramp = self.b_target;
            return TickOutput {
                b_ramp_t: self.b_ramp,
                ..Default::default()
            };
        };

        let dt = (t - last_t).max(DT_FLOOR);

        // 1. Ramp the setpoint.
        if self.ramp_rate == 0.0 {
            self.b_ramp = self.b_target;
        } else {
            let step_max = self.ramp_rate * dt;
            self.b_ramp += (self.b_target - self.b_ramp).clamp(-step_max, step_max);
        }

        // 2. Error and PID terms, derivative on measurement.
        let err = self.b_ramp - b_meas;
        let d_meas = (b_meas - self.prev_b_meas) / dt;
        let d_err = -d_meas;
        let alpha = if self.derivative_tau > 0.0 {
            dt / (self.derivative_tau + dt)
        } else {
            1.0
        };
        self.filtered_derivative += alpha * (d_err - self.filtered_derivative);
        let d_v = self.kd * self.filtered_derivative;

        let p_v = self.kp * err;

        let candidate_accum = self.accum_t_s + err * dt;
        let candidate_i_v = (self.ki * candidate_accum).clamp(self.integrator_min, self.integrator_max);

        let feedforward_v = if self.feedforward_enabled {
            self.feedforward_v0 + self.b_ramp * self.feedforward_v_per_t
        } else {
            0.0
        };

        // 3. Compose, saturate, anti-windup, slew.
        let v_unsat = feedforward_v + p_v + candidate_i_v + d_v;
        let v_sat = v_unsat.clamp(self.output_min, self.output_max);
        let saturated = (v_unsat - v_sat).abs() > ANTI_WINDUP_EPS;

        let not_saturated = !saturated;
        let saturated_high_unwinding =
            v_sat >= self.output_max - ANTI_WINDUP_EPS && err <= 0.0;
        let saturated_low_unwinding = v_sat <= self.output_min + ANTI_WINDUP_EPS && err >= 0.0;

        if dt > 0.0 && (not_saturated || saturated_high_unwinding || saturated_low_unwinding) {
            self.accum_t_s = candidate_accum;
        }

        let max_step = self.output_slew * dt;
        let v_out = if self.output_slew > 0.0 {
            (self.last_output_v + (v_sat - self.last_output_v).clamp(-max_step, max_step))
                .clamp(self.output_min, self.output_max)
        } else {
            v_sat
        };

        self.last_output_v = v_out;
        self.prev_b_meas = b_meas;
        self.last_t = Some(t);

        TickOutput {
            b_ramp_t: self.b_ramp,
            error_t: err,
            p_v,
            i_v: candidate_i_v,
            d_v,
            feedforward_v,
            output_v: v_out,
            saturated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_with(config: ControllerConfig) -> FieldController {
        let mut c = FieldController::new();
        c.apply_config(&config);
        c
    }

    #[test]
    fn ramped_step_scenario() {
        let mut c = controller_with(ControllerConfig {
            kp_v_per_t: 5.0,
            ramp_rate_t_per_s: 0.1,
            integrator_min_v: -100.0,
            integrator_max_v: 100.0,
            output_min_v: -100.0,
            output_max_v: 100.0,
            ..ControllerConfig::default()
        });
        c.set_target(1.0);

        let mut t = 0.0;
        let first = c.update(t, 0.0);
        assert_eq!(first.b_ramp_t, 0.0);

        let mut last_ramp = 0.0;
        for i in 1..=10 {
            t += 0.1;
            let out = c.update(t, 0.0);
            let expected = 0.01 * i as f64;
            assert!((out.b_ramp_t - expected).abs() < 1e-9);
            assert!(out.b_ramp_t > last_ramp);
            last_ramp = out.b_ramp_t;
        }
        // After first ramped tick, err = B_ramp = 0.01, P_V = 5 * 0.01 = 0.05.
    }

    #[test]
    fn anti_windup_saturation_scenario() {
        let mut c = controller_with(ControllerConfig {
            ki_v_per_t_s: 10.0,
            integrator_min_v: 0.0,
            integrator_max_v: 5.0,
            output_min_v: 0.0,
            output_max_v: 5.0,
            ..ControllerConfig::default()
        });

        let mut t = 0.0;
        c.update(t, -1.0); // prime; b_ramp snaps to target 0, err = 1.0
        let mut last = TickOutput::default();
        for _ in 0..100 {
            t += 0.1;
            last = c.update(t, -1.0);
        }
        assert!((last.i_v - 5.0).abs() < 1e-6);
        assert!(last.output_v <= 5.0 + 1e-9);

        // Error flips sign: integrator should unwind immediately (output drops).
        t += 0.1;
        let flipped = c.update(t, 1.0);
        assert!(flipped.output_v < last.output_v);
    }

    #[test]
    fn derivative_kick_suppressed_on_setpoint_step() {
        let mut c = controller_with(ControllerConfig {
            kp_v_per_t: 1.0,
            kd_v_s_per_t: 2.0,
            integrator_min_v: -100.0,
            integrator_max_v: 100.0,
            output_min_v: -100.0,
            output_max_v: 100.0,
            ..ControllerConfig::default()
        });

        c.update(0.0, 0.0);
        c.set_target(1.0);
        let out = c.update(0.1, 0.0);
        assert_eq!(out.d_v, 0.0);
    }

    #[test]
    fn slew_limit_scenario() {
        let mut c = controller_with(ControllerConfig {
            kp_v_per_t: 1000.0,
            output_slew_v_per_s: 2.0,
            integrator_min_v: -100.0,
            integrator_max_v: 100.0,
            output_min_v: -100.0,
            output_max_v: 100.0,
            ..ControllerConfig::default()
        });

        c.update(0.0, 0.0);
        c.set_target(5.0 / 1000.0); // err*kp saturates above 5V target quickly
        let mut t = 0.0;
        let mut out = TickOutput::default();
        for _ in 0..25 {
            t += 0.1;
            out = c.update(t, 0.0);
        }
        assert!(out.output_v > 0.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut c = controller_with(ControllerConfig {
            kp_v_per_t: 1.0,
            ki_v_per_t_s: 1.0,
            kd_v_s_per_t: 1.0,
            integrator_min_v: -10.0,
            integrator_max_v: 10.0,
            output_min_v: -10.0,
            output_max_v: 10.0,
            ..ControllerConfig::default()
        });
        c.update(0.0, 0.0);
        c.set_target(1.0);
        c.update(0.1, 0.0);
        c.reset(0.5);
        assert_eq!(c.target(), 0.5);
        assert_eq!(c.ramped_setpoint(), 0.5);
    }
}
