//! Session logger: a `<base>.csv` per-tick telemetry file and a
//! `<base>.meta.txt` INI-style sidecar, implementing the Logger contract
//! (`spec.md` §6). Backed by the `csv` crate and `chrono` for millisecond
//! UTC timestamps, per `SPEC_FULL.md` ambient service 9.

use crate::config::SessionConfig;
use chrono::{SecondsFormat, Utc};
use magnet_core::{FilterConfig, Sample};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("session already open at {0}")]
    AlreadyOpen(String),
    #[error("logger not open")]
    NotOpen,
    #[error("session file {0} already exists (pass overwrite to replace it)")]
    AlreadyExists(String),
    #[error("io error writing session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Logger contract consumed by the tick loop (`spec.md` §6). Kept as a trait
/// so a host process could substitute its own sink without touching the
/// control pipeline, the same boundary the core draws around
/// [`magnet_core::AnalogIoPort`].
pub trait Logger {
    fn open_session(
        &mut self,
        base_path: &Path,
        config: &SessionConfig,
        overwrite: bool,
    ) -> Result<(), LoggerError>;
    fn log_sample(&mut self, sample: &Sample) -> Result<(), LoggerError>;
    fn close_session(&mut self) -> Result<(), LoggerError>;
}

const CSV_HEADER: &[&str] = &[
    "t_utc_iso",
    "elapsed_s",
    "vhall_v",
    "bmeas_t",
    "bset_t",
    "vcmd_v",
    "err_t",
    "p_v",
    "i_v",
    "d_v",
    "enabled",
    "saturated",
    "fault",
];

/// Concrete [`Logger`] writing a CSV row per tick plus an INI metadata
/// sidecar, matching `spec.md` §6's file formats exactly.
#[derive(Default)]
pub struct CsvSessionLogger {
    writer: Option<csv::Writer<File>>,
    base_path: Option<PathBuf>,
}

impl CsvSessionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_metadata(base_path: &Path, config: &SessionConfig) -> Result<(), LoggerError> {
        let meta_path = base_path.with_extension("meta.txt");
        let mut file = File::create(meta_path)?;

        writeln!(
            file,
            "StartUTC: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;

        let filter_name = match config.hall.filter {
            FilterConfig::None => "none".to_string(),
            FilterConfig::MovingAverage { samples } => format!("moving_average({samples})"),
            FilterConfig::LowPass { tau_s } => format!("low_pass(tau_s={tau_s})"),
        };

        writeln!(file, "[HallProbe]")?;
        writeln!(file, "V0_V: {}", config.hall.offset_v)?;
        writeln!(file, "TperV: {}", config.hall.sensitivity_t_per_v)?;
        writeln!(file, "Filter: {filter_name}")?;

        writeln!(file, "[Kepco]")?;
        writeln!(file, "AOChannel: {}", config.supply.ao_channel)?;
        writeln!(file, "ClampMinV: {}", config.supply.clamp_min_v)?;
        writeln!(file, "ClampMaxV: {}", config.supply.clamp_max_v)?;
        writeln!(file, "SlewVps: {}", config.supply.slew_limit_v_per_s)?;

        writeln!(file, "[Calibration]")?;
        writeln!(file, "ProgV0_V: {}", config.supply.prog_v0_v)?;
        writeln!(file, "I0_A: {}", config.supply.i0_a)?;
        writeln!(file, "IperV: {}", config.supply.i_per_v)?;
        writeln!(file, "B0_T: {}", config.supply.b0_t)?;
        writeln!(file, "TperA: {}", config.supply.t_per_a)?;

        writeln!(file, "[Controller]")?;
        writeln!(file, "Kp: {}", config.controller.kp_v_per_t)?;
        writeln!(file, "Ki: {}", config.controller.ki_v_per_t_s)?;
        writeln!(file, "Kd: {}", config.controller.kd_v_s_per_t)?;
        writeln!(file, "Ramp_Tps: {}", config.controller.ramp_rate_t_per_s)?;
        writeln!(file, "DerivTau_s: {}", config.controller.derivative_tau_s)?;
        writeln!(file, "OutMinV: {}", config.controller.output_min_v)?;
        writeln!(file, "OutMaxV: {}", config.controller.output_max_v)?;

        Ok(())
    }
}

fn bool_flag(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

/// Formats a float for a CSV telemetry row: fixed-point with 6 fractional
/// digits for ordinary magnitudes, falling back to scientific notation with
/// 16 significant digits outside that range. Rust's shortest-round-trip
/// `Display` (bare `.to_string()`) drops precision the spec requires
/// (`spec.md` §6: "general format, significant digits >= 16, <= 6
/// fractional on short forms"), so this is used in its place for every
/// float field.
fn format_float_general(x: f64) -> String {
    if !x.is_finite() {
        return x.to_string();
    }
    if x == 0.0 {
        return "0.000000".to_string();
    }
    let exponent = x.abs().log10().floor() as i32;
    if (-4..6).contains(&exponent) {
        format!("{x:.6}")
    } else {
        format!("{x:.15e}")
    }
}

impl Logger for CsvSessionLogger {
    fn open_session(
        &mut self,
        base_path: &Path,
        config: &SessionConfig,
        overwrite: bool,
    ) -> Result<(), LoggerError> {
        if let Some(open) = &self.base_path {
            return Err(LoggerError::AlreadyOpen(open.display().to_string()));
        }

        let csv_path = base_path.with_extension("csv");
        if !overwrite && csv_path.exists() {
            return Err(LoggerError::AlreadyExists(csv_path.display().to_string()));
        }

        Self::write_metadata(base_path, config)?;

        let file = File::create(&csv_path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;

        self.writer = Some(writer);
        self.base_path = Some(base_path.to_path_buf());
        Ok(())
    }

    fn log_sample(&mut self, sample: &Sample) -> Result<(), LoggerError> {
        let writer = self.writer.as_mut().ok_or(LoggerError::NotOpen)?;
        writer.write_record(&[
            sample.t_utc.to_rfc3339_opts(SecondsFormat::Millis, true),
            format_float_general(sample.elapsed_s),
            format_float_general(sample.v_hall),
            format_float_general(sample.b_meas),
            format_float_general(sample.b_ramp),
            format_float_general(sample.v_cmd),
            format_float_general(sample.error_t),
            format_float_general(sample.p_v),
            format_float_general(sample.i_v),
            format_float_general(sample.d_v),
            bool_flag(sample.enabled).to_string(),
            bool_flag(sample.saturated).to_string(),
            bool_flag(sample.fault).to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    fn close_session(&mut self) -> Result<(), LoggerError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        self.base_path = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Sample {
        magnet_core::SamplePublisher::publish(magnet_core::SampleInputs {
            t_utc: Utc.timestamp_opt(0, 0).unwrap(),
            elapsed_s: 0.05,
            v_hall: 1.0,
            b_meas: 0.2,
            b_ramp: 0.25,
            v_cmd: 1.1,
            error_t: 0.05,
            p_v: 0.2,
            i_v: 0.0,
            d_v: 0.0,
            enabled: true,
            saturated: false,
            fault: false,
        })
    }

    #[test]
    fn format_float_general_carries_full_precision() {
        assert_eq!(format_float_general(1.0), "1.000000");
        assert_eq!(format_float_general(0.05), "0.050000");
        assert_eq!(format_float_general(0.0), "0.000000");
        assert_eq!(format_float_general(-2.5), "-2.500000");
        assert_eq!(format_float_general(1.0e20), "1.000000000000000e20");
    }

    #[test]
    fn log_sample_before_open_is_rejected() {
        let mut logger = CsvSessionLogger::new();
        assert!(matches!(
            logger.log_sample(&sample()),
            Err(LoggerError::NotOpen)
        ));
    }

    #[test]
    fn open_log_close_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "magnet-fieldd-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.join("session");

        let mut logger = CsvSessionLogger::new();
        let config = SessionConfig::default();
        logger.open_session(&base, &config, true).unwrap();
        logger.log_sample(&sample()).unwrap();
        logger.close_session().unwrap();

        let csv_contents = std::fs::read_to_string(base.with_extension("csv")).unwrap();
        assert!(csv_contents.contains("t_utc_iso"));
        assert!(csv_contents.lines().count() >= 2);

        let meta_contents = std::fs::read_to_string(base.with_extension("meta.txt")).unwrap();
        assert!(meta_contents.contains("[HallProbe]"));
        assert!(meta_contents.contains("[Kepco]"));
        assert!(meta_contents.contains("[Calibration]"));
        assert!(meta_contents.contains("[Controller]"));
        assert!(meta_contents.contains("StartUTC:"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reopen_without_overwrite_is_rejected() {
        let dir = std::env::temp_dir().join(format!(
            "magnet-fieldd-test-overwrite-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.join("session");
        let config = SessionConfig::default();

        let mut logger = CsvSessionLogger::new();
        logger.open_session(&base, &config, true).unwrap();
        logger.close_session().unwrap();

        let mut second = CsvSessionLogger::new();
        assert!(matches!(
            second.open_session(&base, &config, false),
            Err(LoggerError::AlreadyExists(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
