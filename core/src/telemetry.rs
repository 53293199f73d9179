//! Sample Publisher: assembles a tick's readings and controller state into
//! an immutable record for the session logger (`spec.md` §4.4).

use chrono::{DateTime, Utc};

/// One tick's worth of telemetry, handed to the logger verbatim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub t_utc: DateTime<Utc>,
    pub elapsed_s: f64,
    pub v_hall: f64,
    pub b_meas: f64,
    pub b_ramp: f64,
    pub v_cmd: f64,
    pub error_t: f64,
    pub p_v: f64,
    pub i_v: f64,
    pub d_v: f64,
    pub enabled: bool,
    pub saturated: bool,
    pub fault: bool,
}

/// Pure assembly of a tick's scalars into a [`Sample`]. Carries no state of
/// its own; `now` and `elapsed_s` are supplied by the caller so the service
/// loop remains the single source of wall-clock and monotonic time.
pub struct SamplePublisher;

impl SamplePublisher {
    /// Fields are named rather than positional on the caller's side via
    /// [`SampleInputs`] to keep tick-assembly call sites legible.
    pub fn publish(inputs: SampleInputs) -> Sample {
        Sample {
            t_utc: inputs.t_utc,
            elapsed_s: inputs.elapsed_s,
            v_hall: inputs.v_hall,
            b_meas: inputs.b_meas,
            b_ramp: inputs.b_ramp,
            v_cmd: inputs.v_cmd,
            error_t: inputs.error_t,
            p_v: inputs.p_v,
            i_v: inputs.i_v,
            d_v: inputs.d_v,
            enabled: inputs.enabled,
            saturated: inputs.saturated,
            fault: inputs.fault,
        }
    }
}

/// Inputs to a single [`SamplePublisher::publish`] call, gathered from the
/// Hall conditioner, field controller, and supply driver at tick boundary.
#[derive(Debug, Clone, Copy)]
pub struct SampleInputs {
    pub t_utc: DateTime<Utc>,
    pub elapsed_s: f64,
    pub v_hall: f64,
    pub b_meas: f64,
    pub b_ramp: f64,
    pub v_cmd: f64,
    pub error_t: f64,
    pub p_v: f64,
    pub i_v: f64,
    pub d_v: f64,
    pub enabled: bool,
    pub saturated: bool,
    pub fault: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn inputs() -> SampleInputs {
        SampleInputs {
            t_utc: Utc.timestamp_opt(0, 0).unwrap(),
            elapsed_s: 1.5,
            v_hall: 2.0,
            b_meas: 0.4,
            b_ramp: 0.5,
            v_cmd: 1.1,
            error_t: 0.1,
            p_v: 0.3,
            i_v: 0.2,
            d_v: 0.0,
            enabled: true,
            saturated: false,
            fault: false,
        }
    }

    #[test]
    fn publish_copies_all_fields_verbatim() {
        let sample = SamplePublisher::publish(inputs());
        assert_eq!(sample.elapsed_s, 1.5);
        assert_eq!(sample.b_meas, 0.4);
        assert_eq!(sample.b_ramp, 0.5);
        assert_eq!(sample.v_cmd, 1.1);
        assert!(sample.enabled);
        assert!(!sample.saturated);
        assert!(!sample.fault);
    }

    #[test]
    fn fault_flag_is_independent_of_enabled() {
        let mut i = inputs();
        i.enabled = false;
        i.fault = true;
        let sample = SamplePublisher::publish(i);
        assert!(sample.fault);
        assert!(!sample.enabled);
    }
}
