//! Session configuration: one TOML file bundling the three subsystem
//! configs, loaded and validated at session start (`SPEC_FULL.md` §2,
//! ambient service 7, supplemented feature "config file loading/validation").

use magnet_core::{AnalogReference, ControllerConfig, HallConfig, SupplyConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct TickConfig {
    /// Nominal tick period, in milliseconds (spec.md §5: 50 ms / 20 Hz).
    pub period_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { period_ms: 50 }
    }
}

/// Which analog input channel/range/reference feeds the Hall Conditioner.
/// Not part of `spec.md`'s data model (the core takes raw volts, not a
/// channel address); this is the service binary's own wiring of the shared
/// Analog I/O Port, alongside the supply's `ao_channel` in `SupplyConfig`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct HallInputConfig {
    pub ai_channel: u32,
    pub ai_range_index: u32,
    pub aref: ArefConfig,
}

impl Default for HallInputConfig {
    fn default() -> Self {
        Self {
            ai_channel: 0,
            ai_range_index: 0,
            aref: ArefConfig::Ground,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArefConfig {
    Ground,
    Common,
    Diff,
    Other,
}

impl From<ArefConfig> for AnalogReference {
    fn from(value: ArefConfig) -> Self {
        match value {
            ArefConfig::Ground => AnalogReference::Ground,
            ArefConfig::Common => AnalogReference::Common,
            ArefConfig::Diff => AnalogReference::Diff,
            ArefConfig::Other => AnalogReference::Other,
        }
    }
}

/// Full session configuration, persisted to and loaded from a single TOML
/// file. Mirrors the teacher's per-device `Config` structs (`el3356::Config`,
/// `i550::Config`) bundled into one document in place of the dbus-backed
/// `ConfMan` the teacher uses, which requires the `tfc` framework.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct SessionConfig {
    pub hall: HallConfig,
    #[serde(default)]
    pub hall_input: HallInputConfig,
    pub supply: SupplyConfig,
    pub controller: ControllerConfig,
    #[serde(default)]
    pub tick: TickConfig,
}

/// Errors loading or validating a [`SessionConfig`] from disk, surfaced to
/// the operator synchronously rather than panicking.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl SessionConfig {
    /// Loads a session config from a TOML file, then applies the same
    /// invariant checks the core setters enforce so a malformed file is
    /// rejected at load time rather than on the first tick.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: SessionConfig =
            toml::from_str(&text).map_err(|source| ConfigLoadError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.tick.period_ms == 0 {
            return Err(ConfigLoadError::Invalid(
                "tick.period_ms must be greater than 0".to_string(),
            ));
        }
        if self.supply.clamp_max_v <= self.supply.clamp_min_v {
            return Err(ConfigLoadError::Invalid(
                "supply.clamp_max_v must be greater than supply.clamp_min_v".to_string(),
            ));
        }
        if self.controller.output_max_v <= self.controller.output_min_v {
            return Err(ConfigLoadError::Invalid(
                "controller.output_max_v must be greater than controller.output_min_v"
                    .to_string(),
            ));
        }
        if self.controller.integrator_max_v <= self.controller.integrator_min_v {
            return Err(ConfigLoadError::Invalid(
                "controller.integrator_max_v must be greater than controller.integrator_min_v"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_tick_period_is_rejected() {
        let mut config = SessionConfig::default();
        config.tick.period_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::Invalid(_))
        ));
    }

    #[test]
    fn inverted_output_clamp_is_rejected() {
        let mut config = SessionConfig::default();
        config.controller.output_min_v = 5.0;
        config.controller.output_max_v = -5.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::Invalid(_))
        ));
    }
}
