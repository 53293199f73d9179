//! Operator surface (`spec.md` §6): the narrow set of commands that may
//! reach the control tick, delivered on a single-writer `mpsc` channel that
//! is drained once per tick before the control pipeline runs
//! (`SPEC_FULL.md` §5). E-stop additionally travels over a `watch` channel
//! so it preempts immediately rather than waiting behind queued commands.

use magnet_core::{ControllerConfig, FilterConfig, HallConfig, SupplyConfig};

/// A single operator-issued command, queued for the next tick boundary.
#[derive(Debug, Clone)]
pub enum OperatorCommand {
    SetTarget(f64),
    SetEnabled(bool),
    SetGains(ControllerConfig),
    ReconfigureCalibration(SupplyConfig),
    ReconfigureHall(HallConfig),
    ReconfigureFilter(FilterConfig),
    StartSession { base_path: String, overwrite: bool },
    StopSession,
}

/// Bounded channel capacity for operator commands. Generous relative to the
/// 20 Hz tick rate; a full queue indicates the operator is issuing commands
/// faster than the control loop can apply them.
pub const OPERATOR_CHANNEL_CAPACITY: usize = 32;

pub fn operator_channel() -> (
    tokio::sync::mpsc::Sender<OperatorCommand>,
    tokio::sync::mpsc::Receiver<OperatorCommand>,
) {
    tokio::sync::mpsc::channel(OPERATOR_CHANNEL_CAPACITY)
}

/// E-stop preemption channel: always available, bypasses all queued state
/// (`spec.md` §7, "E-stop is always available and bypasses all queued
/// state").
pub fn estop_channel() -> (
    tokio::sync::watch::Sender<bool>,
    tokio::sync::watch::Receiver<bool>,
) {
    tokio::sync::watch::channel(false)
}
