//! Ties the Hall Conditioner, Field Controller, and Supply Driver to one
//! Analog I/O Port, drives a single tick, and owns session open/close and
//! the error-to-fault-flag boundary (`spec.md` §5 and §7).

use crate::config::SessionConfig;
use crate::logger::{Logger, LoggerError};
use log::{error, warn};
use magnet_core::{
    AnalogIoPort, AnalogReference, ControlResult, ControllerConfig, FieldController,
    FilterConfig, HallConditioner, HallConfig, SampleInputs, SamplePublisher, SupplyConfig,
    SupplyDriver, TickOutput,
};
use std::path::PathBuf;
use std::time::Instant;

/// Owns the per-tick control pipeline for one Analog I/O Port and one
/// logger. The port is borrowed and shared between the Hall read path and
/// the Supply Driver, matching the core's non-owning reference rule
/// (`spec.md` §3, §9).
pub struct Session<'a, P: AnalogIoPort, L: Logger> {
    port: &'a P,
    hall: HallConditioner,
    supply: SupplyDriver<'a, P>,
    controller: FieldController,
    logger: L,
    config: SessionConfig,

    session_start: Option<Instant>,
    last_tick_instant: Option<Instant>,
    monotonic_s: f64,
    fault: bool,
    log_key: &'static str,
}

impl<'a, P: AnalogIoPort, L: Logger> Session<'a, P, L> {
    pub fn new(port: &'a P, logger: L, config: SessionConfig) -> ControlResult<Self> {
        let mut hall = HallConditioner::new();
        hall.apply_config(&config.hall)?;

        let mut supply = SupplyDriver::new(port);
        supply.apply_config(&config.supply)?;

        let mut controller = FieldController::new();
        controller.apply_config(&config.controller);

        Ok(Self {
            port,
            hall,
            supply,
            controller,
            logger,
            config,
            session_start: None,
            last_tick_instant: None,
            monotonic_s: 0.0,
            fault: false,
            log_key: "magnet-fieldd",
        })
    }

    pub fn set_target(&mut self, b_target_t: f64) {
        self.controller.set_target(b_target_t);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if let Err(e) = self.supply.set_enabled(enabled, self.monotonic_s) {
            warn!(target: self.log_key, "set_enabled({enabled}) failed: {e}");
            self.fault = true;
        }
    }

    /// Force-disables the supply without propagating the result — used by
    /// the tick-boundary fault policy and by E-stop, both of which must not
    /// themselves fail loudly (`spec.md` §7).
    pub fn force_disable(&mut self) {
        let _ = self.supply.set_enabled(false, self.monotonic_s);
    }

    /// Applies new PID/ramp/slew gains between ticks. Infallible, matching
    /// `FieldController::apply_config` (`spec.md` §6: "set gains").
    pub fn set_gains(&mut self, config: &ControllerConfig) {
        self.controller.apply_config(config);
        self.config.controller = *config;
    }

    /// Reconfigures Hall calibration and filtering in one step (`spec.md`
    /// §6: "reconfigure calibrations and filters").
    pub fn reconfigure_hall(&mut self, config: &HallConfig) -> ControlResult<()> {
        self.hall.apply_config(config)?;
        self.config.hall = *config;
        Ok(())
    }

    /// Reconfigures the Hall filter alone, leaving calibration untouched.
    pub fn reconfigure_filter(&mut self, filter: FilterConfig) -> ControlResult<()> {
        match filter {
            FilterConfig::None => self.hall.set_filter_mode_none(),
            FilterConfig::MovingAverage { samples } => {
                self.hall.configure_moving_average(samples)
            }
            FilterConfig::LowPass { tau_s } => self.hall.configure_low_pass(tau_s)?,
        }
        self.config.hall.filter = filter;
        Ok(())
    }

    /// Reconfigures the supply's calibration and enable/slew parameters
    /// (`spec.md` §6: "reconfigure calibrations").
    pub fn reconfigure_supply(&mut self, config: &SupplyConfig) -> ControlResult<()> {
        self.supply.apply_config(config)?;
        self.config.supply = *config;
        Ok(())
    }

    pub fn open_session(
        &mut self,
        base_path: PathBuf,
        overwrite: bool,
    ) -> Result<(), LoggerError> {
        self.logger
            .open_session(&base_path, &self.config, overwrite)?;
        self.session_start = Some(Instant::now());
        self.fault = false;
        Ok(())
    }

    pub fn close_session(&mut self) -> Result<(), LoggerError> {
        self.force_disable();
        self.logger.close_session()?;
        self.session_start = None;
        Ok(())
    }

    /// Runs exactly one control tick: acquisition, conditioning, control,
    /// actuation, logging, strictly in that order (`spec.md` §5). Any
    /// hardware-call error is caught here, downgraded to the `fault` flag,
    /// and the supply is force-disabled; the tick still publishes telemetry
    /// so the operator keeps seeing data.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let dt = match self.last_tick_instant {
            Some(last) => now.duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        self.monotonic_s += dt;
        self.last_tick_instant = Some(now);

        let (v_hall, b_meas, v_cmd, tick_output) = match self.run_pipeline(dt) {
            Ok(values) => values,
            Err(e) => {
                error!(target: self.log_key, "tick failed, forcing disable: {e}");
                self.fault = true;
                self.force_disable();
                (
                    0.0,
                    0.0,
                    self.supply.last_program_voltage(),
                    TickOutput::default(),
                )
            }
        };

        let elapsed_s = self
            .session_start
            .map(|start| now.duration_since(start).as_secs_f64())
            .unwrap_or(0.0);

        let sample = SamplePublisher::publish(SampleInputs {
            t_utc: chrono::Utc::now(),
            elapsed_s,
            v_hall,
            b_meas,
            b_ramp: tick_output.b_ramp_t,
            v_cmd,
            error_t: tick_output.error_t,
            p_v: tick_output.p_v,
            i_v: tick_output.i_v,
            d_v: tick_output.d_v,
            enabled: self.supply.is_enabled(),
            saturated: tick_output.saturated,
            fault: self.fault,
        });

        if self.session_start.is_some() {
            if let Err(e) = self.logger.log_sample(&sample) {
                warn!(target: self.log_key, "log_sample failed: {e}");
                self.fault = true;
            }
        }
    }

    fn run_pipeline(&mut self, dt: f64) -> ControlResult<(f64, f64, f64, TickOutput)> {
        let v_hall = self.port.read_input_volts(
            self.config.hall_input.ai_channel,
            self.config.hall_input.ai_range_index,
            AnalogReference::from(self.config.hall_input.aref),
        )?;
        let b_meas = self.hall.voltage_to_field_filtered(v_hall, dt);
        let tick_output = self.controller.update(self.monotonic_s, b_meas);

        let v_cmd = if self.supply.is_enabled() {
            self.supply
                .command_program_voltage(tick_output.output_v, self.monotonic_s)?
        } else {
            self.supply.last_program_voltage()
        };

        Ok((v_hall, b_meas, v_cmd, tick_output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SimulatedPort;
    use magnet_core::Sample;

    #[derive(Default)]
    struct NullLogger {
        opened: bool,
        samples: usize,
    }

    impl Logger for NullLogger {
        fn open_session(
            &mut self,
            _base_path: &std::path::Path,
            _config: &SessionConfig,
            _overwrite: bool,
        ) -> Result<(), LoggerError> {
            self.opened = true;
            Ok(())
        }

        fn log_sample(&mut self, _sample: &Sample) -> Result<(), LoggerError> {
            self.samples += 1;
            Ok(())
        }

        fn close_session(&mut self) -> Result<(), LoggerError> {
            self.opened = false;
            Ok(())
        }
    }

    fn session(port: &SimulatedPort) -> Session<'_, SimulatedPort, NullLogger> {
        Session::new(port, NullLogger::default(), SessionConfig::default()).unwrap()
    }

    #[test]
    fn set_gains_takes_effect_on_next_tick() {
        let port = SimulatedPort::new(1.0, 0.1);
        let mut session = session(&port);
        let mut gains = session.config.controller;
        gains.kp_v_per_t = 9.0;
        session.set_gains(&gains);
        assert_eq!(session.config.controller.kp_v_per_t, 9.0);
    }

    #[test]
    fn reconfigure_hall_rejects_tiny_sensitivity_and_leaves_config_untouched() {
        let port = SimulatedPort::new(1.0, 0.1);
        let mut session = session(&port);
        let mut bad = session.config.hall;
        bad.sensitivity_t_per_v = 1e-16;
        assert!(session.reconfigure_hall(&bad).is_err());
        assert_ne!(session.config.hall.sensitivity_t_per_v, 1e-16);
    }

    #[test]
    fn reconfigure_filter_updates_stored_config() {
        let port = SimulatedPort::new(1.0, 0.1);
        let mut session = session(&port);
        session
            .reconfigure_filter(FilterConfig::MovingAverage { samples: 8 })
            .unwrap();
        assert!(matches!(
            session.config.hall.filter,
            FilterConfig::MovingAverage { samples: 8 }
        ));
    }

    #[test]
    fn reconfigure_supply_updates_stored_config() {
        let port = SimulatedPort::new(1.0, 0.1);
        let mut session = session(&port);
        let mut config = session.config.supply;
        config.slew_limit_v_per_s = 42.0;
        session.reconfigure_supply(&config).unwrap();
        assert_eq!(session.config.supply.slew_limit_v_per_s, 42.0);
    }

    #[test]
    fn start_stop_session_opens_and_closes_logger() {
        let port = SimulatedPort::new(1.0, 0.1);
        let mut session = session(&port);
        session
            .open_session(PathBuf::from("unused"), true)
            .unwrap();
        assert!(session.logger.opened);
        session.close_session().unwrap();
        assert!(!session.logger.opened);
    }
}
