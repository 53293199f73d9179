//! Power-supply driver: affine program-voltage/current/field calibration,
//! output clamp, slew-rate limiting, and a digital enable/interlock line
//! (`spec.md` §4.2).
//!
//! The driver borrows the [`AnalogIoPort`](crate::io::AnalogIoPort) rather
//! than owning it — the port is shared with the Hall read path and must
//! outlive the driver (`spec.md` §3).

use crate::error::{ControlError, ControlResult};
use crate::io::AnalogIoPort;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the supply's enable state is reflected on hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnableMode {
    /// No digital interlock line; enable/disable only gates software commands.
    None,
    /// A digital output line is driven high/low alongside the enable state.
    DigitalLine,
}

/// Calibration and I/O configuration for the supply driver, persisted as
/// part of the session config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct SupplyConfig {
    pub ao_channel: u32,
    pub ao_range_index: u32,
    pub clamp_min_v: f64,
    pub clamp_max_v: f64,
    pub slew_limit_v_per_s: f64,
    pub enable_mode: EnableMode,
    pub digital_enable_channel: u32,
    /// Program-voltage -> current affine map: I = i0 + (V - v0_prog) * i_per_v.
    pub prog_v0_v: f64,
    pub i0_a: f64,
    pub i_per_v: f64,
    /// Current -> field affine map: B = b0 + I * t_per_a.
    pub b0_t: f64,
    pub t_per_a: f64,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            ao_channel: 0,
            ao_range_index: 0,
            clamp_min_v: -10.0,
            clamp_max_v: 10.0,
            slew_limit_v_per_s: 0.0,
            enable_mode: EnableMode::None,
            digital_enable_channel: 0,
            prog_v0_v: 0.0,
            i0_a: 0.0,
            i_per_v: 1.0,
            b0_t: 0.0,
            t_per_a: 1.0,
        }
    }
}

/// Drives a bipolar power supply's program voltage through a clamp +
/// slew-limit + enable/interlock pipeline.
pub struct SupplyDriver<'a, P: AnalogIoPort> {
    port: &'a P,

    ao_channel: u32,
    ao_range_index: u32,
    clamp_min_v: f64,
    clamp_max_v: f64,
    slew_limit_v_per_s: f64,

    prog_v0_v: f64,
    i0_a: f64,
    i_per_v: f64,
    b0_t: f64,
    t_per_a: f64,

    enable_mode: EnableMode,
    digital_enable_channel: u32,
    enabled: bool,

    last_cmd_v: f64,
    last_update_s: Option<f64>,
}

impl<'a, P: AnalogIoPort> SupplyDriver<'a, P> {
    pub fn new(port: &'a P) -> Self {
        Self {
            port,
            ao_channel: 0,
            ao_range_index: 0,
            clamp_min_v: -10.0,
            clamp_max_v: 10.0,
            slew_limit_v_per_s: 0.0,
            prog_v0_v: 0.0,
            i0_a: 0.0,
            i_per_v: 1.0,
            b0_t: 0.0,
            t_per_a: 1.0,
            enable_mode: EnableMode::None,
            digital_enable_channel: 0,
            enabled: false,
            last_cmd_v: 0.0,
            last_update_s: None,
        }
    }

    pub fn configure_analog_output(
        &mut self,
        channel: u32,
        range_index: u32,
        clamp_min: f64,
        clamp_max: f64,
    ) -> ControlResult<()> {
        if clamp_max <= clamp_min {
            return Err(ControlError::Configuration(format!(
                "clamp_max ({clamp_max}) must be greater than clamp_min ({clamp_min})"
            )));
        }
        self.ao_channel = channel;
        self.ao_range_index = range_index;
        self.clamp_min_v = clamp_min;
        self.clamp_max_v = clamp_max;
        Ok(())
    }

    pub fn set_slew_limit(&mut self, v_per_s: f64) -> ControlResult<()> {
        if v_per_s < 0.0 {
            return Err(ControlError::Configuration(format!(
                "slew limit must be >= 0, got {v_per_s}"
            )));
        }
        self.slew_limit_v_per_s = v_per_s;
        Ok(())
    }

    pub fn set_prog_to_current(&mut self, v0: f64, i0: f64, i_per_v: f64) -> ControlResult<()> {
        if i_per_v.abs() < ControlError::CALIBRATION_EPS {
            return Err(ControlError::Calibration(format!(
                "I/V slope {i_per_v} below minimum magnitude {}",
                ControlError::CALIBRATION_EPS
            )));
        }
        self.prog_v0_v = v0;
        self.i0_a = i0;
        self.i_per_v = i_per_v;
        Ok(())
    }

    pub fn set_current_to_field(&mut self, b0: f64, t_per_a: f64) {
        self.b0_t = b0;
        self.t_per_a = t_per_a;
    }

    pub fn configure_digital_enable(&mut self, mode: EnableMode, channel: u32) {
        self.enable_mode = mode;
        self.digital_enable_channel = channel;
    }

    /// Applies a full [`SupplyConfig`] at session start.
    pub fn apply_config(&mut self, config: &SupplyConfig) -> ControlResult<()> {
        self.configure_analog_output(
            config.ao_channel,
            config.ao_range_index,
            config.clamp_min_v,
            config.clamp_max_v,
        )?;
        self.set_slew_limit(config.slew_limit_v_per_s)?;
        self.set_prog_to_current(config.prog_v0_v, config.i0_a, config.i_per_v)?;
        self.set_current_to_field(config.b0_t, config.t_per_a);
        self.configure_digital_enable(config.enable_mode, config.digital_enable_channel);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn last_program_voltage(&self) -> f64 {
        self.last_cmd_v
    }

    /// Enables or disables supply output. Disabling immediately commands 0 V
    /// (best-effort) and updates the digital interlock line if configured.
    pub fn set_enabled(&mut self, enabled: bool, now_s: f64) -> ControlResult<()> {
        self.enabled = enabled;
        if !enabled {
            let write_result = self.port.write_output_volts(
                self.ao_channel,
                0.0,
                self.ao_range_index,
                self.clamp_min_v,
                self.clamp_max_v,
            );
            self.last_cmd_v = 0.0;
            self.last_update_s = Some(now_s);
            write_result?;
        }
        if self.enable_mode == EnableMode::DigitalLine {
            self.port
                .write_digital_line(self.digital_enable_channel, enabled)?;
        }
        Ok(())
    }

    /// Clamp, then slew-limit, then write the requested program voltage.
    /// Requires the supply to be enabled.
    pub fn command_program_voltage(&mut self, v_prog: f64, now_s: f64) -> ControlResult<f64> {
        if !self.enabled {
            return Err(ControlError::NotEnabled(
                "supply driver is disabled".to_string(),
            ));
        }

        let target = v_prog.clamp(self.clamp_min_v, self.clamp_max_v);
        let dt = match self.last_update_s {
            Some(last) => (now_s - last).max(0.0),
            None => 0.0,
        };

        let out = if self.slew_limit_v_per_s > 0.0 {
            let max_step = self.slew_limit_v_per_s * dt;
            self.last_cmd_v + (target - self.last_cmd_v).clamp(-max_step, max_step)
        } else {
            target
        };

        self.port.write_output_volts(
            self.ao_channel,
            out,
            self.ao_range_index,
            self.clamp_min_v,
            self.clamp_max_v,
        )?;

        self.last_cmd_v = out;
        self.last_update_s = Some(now_s);
        Ok(out)
    }

    pub fn command_current(&mut self, current_a: f64, now_s: f64) -> ControlResult<f64> {
        let v = self.current_to_program_voltage(current_a);
        self.command_program_voltage(v, now_s)
    }

    pub fn command_field(&mut self, field_t: f64, now_s: f64) -> ControlResult<f64> {
        let current = self.field_to_current(field_t)?;
        self.command_current(current, now_s)
    }

    pub fn prog_voltage_to_current(&self, v: f64) -> f64 {
        self.i0_a + (v - self.prog_v0_v) * self.i_per_v
    }

    pub fn current_to_program_voltage(&self, i: f64) -> f64 {
        self.prog_v0_v + (i - self.i0_a) / self.i_per_v
    }

    pub fn current_to_field(&self, i: f64) -> f64 {
        self.b0_t + i * self.t_per_a
    }

    pub fn field_to_current(&self, b: f64) -> ControlResult<f64> {
        if self.t_per_a.abs() < ControlError::CALIBRATION_EPS {
            return Err(ControlError::Calibration(format!(
                "T/A slope {} below minimum magnitude {}",
                self.t_per_a,
                ControlError::CALIBRATION_EPS
            )));
        }
        Ok((b - self.b0_t) / self.t_per_a)
    }
}
