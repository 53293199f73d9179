//! A simulated Analog I/O Port used only in `--dry-run` sessions.
//!
//! The low-level acquisition driver (the real `/dev/comedi0`-style backend)
//! is explicitly out of scope (`spec.md` §1); this loopback stands in for it
//! so the service binary has something to drive end to end without
//! hardware. It extends the same `RefCell`-recording approach as
//! `magnet_core::io::test_support::MockPort`, adding a first-order magnet
//! response so a dry run produces a plausible ramp instead of a flat line.

use magnet_core::{AnalogIoPort, AnalogReference, ControlError, ControlResult};
use std::cell::RefCell;
use std::time::Instant;

struct SimState {
    /// Field per volt of program voltage at DC (T/V), a stand-in for the
    /// plant the real supply + magnet + Hall probe chain would present.
    field_gain_t_per_v: f64,
    tau_s: f64,
    field_t: f64,
    last_update: Option<Instant>,
    last_prog_v: f64,
    digital_high: bool,
}

pub struct SimulatedPort {
    state: RefCell<SimState>,
}

impl SimulatedPort {
    pub fn new(field_gain_t_per_v: f64, tau_s: f64) -> Self {
        Self {
            state: RefCell::new(SimState {
                field_gain_t_per_v,
                tau_s,
                field_t: 0.0,
                last_update: None,
                last_prog_v: 0.0,
                digital_high: false,
            }),
        }
    }

    fn step(state: &mut SimState) {
        let now = Instant::now();
        let dt = match state.last_update {
            Some(last) => now.duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        state.last_update = Some(now);
        if dt <= 0.0 || state.tau_s <= 0.0 {
            state.field_t = state.last_prog_v * state.field_gain_t_per_v;
            return;
        }
        let target = state.last_prog_v * state.field_gain_t_per_v;
        let alpha = dt / (state.tau_s + dt);
        state.field_t += alpha * (target - state.field_t);
    }
}

impl AnalogIoPort for SimulatedPort {
    fn read_input_volts(
        &self,
        _channel: u32,
        _range_index: u32,
        _aref: AnalogReference,
    ) -> ControlResult<f64> {
        let mut state = self.state.borrow_mut();
        Self::step(&mut state);
        Ok(state.field_t)
    }

    fn write_output_volts(
        &self,
        _channel: u32,
        volts: f64,
        _range_index: u32,
        clamp_min: f64,
        clamp_max: f64,
    ) -> ControlResult<()> {
        if clamp_max <= clamp_min {
            return Err(ControlError::Io("invalid clamp range".to_string()));
        }
        let mut state = self.state.borrow_mut();
        state.last_prog_v = volts.clamp(clamp_min, clamp_max);
        Ok(())
    }

    fn write_digital_line(&self, _channel: u32, high: bool) -> ControlResult<()> {
        self.state.borrow_mut().digital_high = high;
        Ok(())
    }
}
