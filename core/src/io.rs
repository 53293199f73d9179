//! Analog I/O Port contract (`spec.md` §6).
//!
//! The core depends only on this trait; the acquisition driver backing an
//! actual `/dev/comedi0`-style device, or a simulator for tests, implements
//! it. The Supply Driver borrows a port rather than owning one (the port is
//! shared with the Hall read path) — see `spec.md` §3's Lifecycle note.

use crate::error::ControlResult;

/// Analog input reference mode, mirrored 1:1 from the acquisition driver's
/// `AREF` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogReference {
    Ground = 0,
    Common = 1,
    Diff = 2,
    Other = 3,
}

/// A capability for reading/writing volts on channels of an analog I/O
/// device. Implementors are expected to be cheap to call (O(µs)); the core
/// never retries or times out internally (`spec.md` §5).
pub trait AnalogIoPort {
    /// Read an analog input channel as volts.
    fn read_input_volts(
        &self,
        channel: u32,
        range_index: u32,
        aref: AnalogReference,
    ) -> ControlResult<f64>;

    /// Write an analog output channel as volts, with a hardware clamp
    /// mirrored by the caller for defense in depth.
    fn write_output_volts(
        &self,
        channel: u32,
        volts: f64,
        range_index: u32,
        clamp_min: f64,
        clamp_max: f64,
    ) -> ControlResult<()>;

    /// Write a single digital output line, used for the supply's
    /// enable/interlock signal when configured for digital-line mode.
    fn write_digital_line(&self, channel: u32, high: bool) -> ControlResult<()>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::cell::RefCell;

    /// In-memory port used across unit tests: records the last write and
    /// can be told to fail on demand to exercise the fault path.
    #[derive(Default)]
    pub struct MockPort {
        pub last_output_volts: RefCell<Option<f64>>,
        pub last_digital: RefCell<Option<(u32, bool)>>,
        pub next_input_volts: RefCell<f64>,
        pub fail_io: RefCell<bool>,
    }

    impl MockPort {
        pub fn new(initial_input: f64) -> Self {
            Self {
                last_output_volts: RefCell::new(None),
                last_digital: RefCell::new(None),
                next_input_volts: RefCell::new(initial_input),
                fail_io: RefCell::new(false),
            }
        }
    }

    impl AnalogIoPort for MockPort {
        fn read_input_volts(
            &self,
            _channel: u32,
            _range_index: u32,
            _aref: AnalogReference,
        ) -> ControlResult<f64> {
            if *self.fail_io.borrow() {
                return Err(crate::error::ControlError::Io("mock read failure".into()));
            }
            Ok(*self.next_input_volts.borrow())
        }

        fn write_output_volts(
            &self,
            _channel: u32,
            volts: f64,
            _range_index: u32,
            clamp_min: f64,
            clamp_max: f64,
        ) -> ControlResult<()> {
            if *self.fail_io.borrow() {
                return Err(crate::error::ControlError::Io("mock write failure".into()));
            }
            let clamped = volts.clamp(clamp_min, clamp_max);
            *self.last_output_volts.borrow_mut() = Some(clamped);
            Ok(())
        }

        fn write_digital_line(&self, channel: u32, high: bool) -> ControlResult<()> {
            if *self.fail_io.borrow() {
                return Err(crate::error::ControlError::Io("mock digital failure".into()));
            }
            *self.last_digital.borrow_mut() = Some((channel, high));
            Ok(())
        }
    }
}
