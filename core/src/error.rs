//! Crate-wide error type for the field controller core.
//!
//! Every fallible setter and operation returns [`ControlResult`]. Setters that
//! reject bad arguments never mutate state (see `spec.md` §7): the caller's
//! old configuration remains in effect until a valid value is supplied.

use thiserror::Error;

/// Error kinds surfaced by the controller core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlError {
    /// A calibration parameter failed its invariant (e.g. a slope too close
    /// to zero to invert safely).
    #[error("calibration error: {0}")]
    Calibration(String),

    /// A clamp, slew, or ramp-rate parameter was invalid (e.g. max <= min).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A command was issued while the supply driver was disabled.
    #[error("not enabled: {0}")]
    NotEnabled(String),

    /// The analog I/O port (or another hardware call) failed.
    #[error("io error: {0}")]
    Io(String),

    /// The logger or device was used before being opened.
    #[error("not open: {0}")]
    NotOpen(String),
}

/// Result alias used throughout the controller core.
pub type ControlResult<T> = Result<T, ControlError>;

impl ControlError {
    /// Epsilon guarding calibration slope invertibility (§9: "these are not
    /// tuning parameters; they guard division").
    pub const CALIBRATION_EPS: f64 = 1e-12;
    /// Epsilon guarding Hall sensitivity validity.
    pub const SENSITIVITY_EPS: f64 = 1e-15;
    /// Epsilon used for the anti-windup saturation boundary test.
    pub const ANTI_WINDUP_EPS: f64 = 1e-12;
}
