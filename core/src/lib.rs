//! Core control algorithms for a closed-loop electromagnet field controller:
//! Hall-probe signal conditioning, setpoint-ramping PID control, and
//! power-supply driving (`spec.md` §4).
//!
//! This crate is I/O-free except for the [`io::AnalogIoPort`] trait boundary;
//! the owning service binary supplies a concrete port, a clock, and a
//! logger.

pub mod controller;
pub mod error;
pub mod hall;
pub mod io;
pub mod supply;
pub mod telemetry;

pub use controller::{ControllerConfig, FieldController, TickOutput};
pub use error::{ControlError, ControlResult};
pub use hall::{FilterConfig, HallConditioner, HallConfig};
pub use io::{AnalogIoPort, AnalogReference};
pub use supply::{EnableMode, SupplyConfig, SupplyDriver};
pub use telemetry::{Sample, SampleInputs, SamplePublisher};
