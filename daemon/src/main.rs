//! Service entry point for the electromagnet field control daemon.
//!
//! Drives a single periodic tick task the way the teacher's EtherCAT bus
//! loop does (`src/bin/ethercat/main.rs::Bus::run`): a `tokio::time::interval`
//! with `MissedTickBehavior::Skip` so an overrun tick is coalesced rather
//! than queued (`spec.md` §5). Operator commands are drained from a bounded
//! `mpsc` channel once per tick before the control pipeline runs; E-stop
//! additionally arrives over a `watch` channel so it preempts immediately.

mod config;
mod logger;
mod operator;
mod port;
mod session;

use clap::Parser;
use config::SessionConfig;
use log::{info, warn};
use logger::CsvSessionLogger;
use operator::{estop_channel, operator_channel, OperatorCommand};
use port::SimulatedPort;
use session::Session;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "magnet-fieldd", about = "Closed-loop electromagnet field controller service")]
struct Cli {
    /// Path to the session config TOML file.
    #[arg(long, default_value = "magnet-field.toml")]
    config: PathBuf,

    /// Base path for session log files (writes `<base>.csv` / `<base>.meta.txt`).
    #[arg(long, default_value = "session")]
    log_base: PathBuf,

    /// Overwrite an existing session log with the same base path.
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Run against a simulated Analog I/O Port instead of real hardware.
    /// The real acquisition driver is out of scope for this crate
    /// (`spec.md` §1); this flag is the only way to exercise the service
    /// end to end without one.
    #[arg(long, default_value_t = true)]
    dry_run: bool,

    /// Start with the supply enabled and target field set to this value,
    /// in Tesla. Omit to start disabled.
    #[arg(long)]
    initial_target_t: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match SessionConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("failed to load {}: {e}, using defaults", cli.config.display());
            SessionConfig::default()
        }
    };

    if !cli.dry_run {
        return Err("only --dry-run is supported: the acquisition driver backend is out of scope \
                     for this crate and must be supplied by the owning host process"
            .into());
    }

    let port = SimulatedPort::new(config.supply.t_per_a * config.supply.i_per_v, 0.25);
    let mut session = Session::new(&port, CsvSessionLogger::new(), config.clone())?;
    session.open_session(cli.log_base.clone(), cli.overwrite)?;

    if let Some(target) = cli.initial_target_t {
        session.set_target(target);
        session.set_enabled(true);
    }

    // A real deployment hands `_operator_tx` to the operator shell (out of
    // scope here); keeping it alive lets `operator_rx` sit idle rather than
    // observing a disconnected channel.
    let (_operator_tx, mut operator_rx) = operator_channel();
    let (estop_tx, mut estop_rx) = estop_channel();

    let period = Duration::from_millis(config.tick.period_ms);
    let mut tick_interval = tokio::time::interval(period);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!("starting control loop at {:?} period", period);

    let mut ctrl_c = Box::pin(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                drain_operator_commands(&mut operator_rx, &mut session);
                if *estop_rx.borrow_and_update() {
                    session.force_disable();
                }
                session.tick();
            }
            _ = &mut ctrl_c => {
                info!("received shutdown signal, closing session");
                break;
            }
        }
    }

    let _ = estop_tx.send(true);
    session.close_session()?;
    Ok(())
}

fn drain_operator_commands<P: magnet_core::AnalogIoPort, L: logger::Logger>(
    rx: &mut tokio::sync::mpsc::Receiver<OperatorCommand>,
    session: &mut Session<'_, P, L>,
) {
    while let Ok(command) = rx.try_recv() {
        match command {
            OperatorCommand::SetTarget(b) => session.set_target(b),
            OperatorCommand::SetEnabled(enabled) => session.set_enabled(enabled),
            OperatorCommand::SetGains(config) => session.set_gains(&config),
            OperatorCommand::ReconfigureCalibration(config) => {
                if let Err(e) = session.reconfigure_supply(&config) {
                    warn!("reconfigure_supply failed: {e}");
                }
            }
            OperatorCommand::ReconfigureHall(config) => {
                if let Err(e) = session.reconfigure_hall(&config) {
                    warn!("reconfigure_hall failed: {e}");
                }
            }
            OperatorCommand::ReconfigureFilter(filter) => {
                if let Err(e) = session.reconfigure_filter(filter) {
                    warn!("reconfigure_filter failed: {e}");
                }
            }
            OperatorCommand::StartSession {
                base_path,
                overwrite,
            } => {
                if let Err(e) = session.open_session(PathBuf::from(base_path), overwrite) {
                    warn!("open_session failed: {e}");
                }
            }
            OperatorCommand::StopSession => {
                if let Err(e) = session.close_session() {
                    warn!("close_session failed: {e}");
                }
            }
        }
    }
}
