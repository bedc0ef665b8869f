//! calib-sim - run a calibration session against a simulated flight controller
//!
//! Wires the full engine (orchestrator, link actor, inbound pump) to the
//! in-memory autopilot and plays the user: when a position is requested the
//! simulated vehicle is turned and the position confirmed.
//!
//! ```text
//! calib-sim --kind accel
//! calib-sim --kind gyro --silent
//! calib-sim --kind accel --clumsy --json
//! ```

use actor_protocol::{AccelPosition, CalibrationError, CalibrationEvent, CalibrationType};
use actor_runtime::{Actor, CancelFlag, ChannelManager};
use calibration_actors::{CalibrationHandle, EngineConfig, Orchestrator, StateProbe};
use clap::{Parser, ValueEnum};
use core_types::Transport;
use futures::stream::StreamExt;
use link_mavlink::{pump_inbound, LinkActor, SimBehavior, SimulatedFirmware};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Heartbeats needed before the gate opens, plus margin
const SETTLE_MS: u64 = 2500;
/// Time the virtual user takes to turn the vehicle
const TURN_MS: u64 = 400;

#[derive(Error, Debug)]
enum AppError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("Cannot serialize diagnostics: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Accel,
    Compass,
    Gyro,
    Level,
    Baro,
    Airspeed,
}

impl From<KindArg> for CalibrationType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Accel => CalibrationType::Accelerometer,
            KindArg::Compass => CalibrationType::Compass,
            KindArg::Gyro => CalibrationType::Gyroscope,
            KindArg::Level => CalibrationType::LevelHorizon,
            KindArg::Baro => CalibrationType::Barometer,
            KindArg::Airspeed => CalibrationType::Airspeed,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Run a sensor calibration against a simulated flight controller")]
struct Args {
    /// Calibration to run
    #[arg(long, value_enum, default_value = "accel")]
    kind: KindArg,

    /// Engine configuration file (TOML); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Firmware never reports a verdict for gyro, baro or level
    #[arg(long, default_value_t = false)]
    silent: bool,

    /// Firmware denies the calibration start
    #[arg(long, default_value_t = false)]
    deny_start: bool,

    /// Firmware denies the first submission of each position
    #[arg(long, default_value_t = false)]
    deny_first_position: bool,

    /// Vehicle is armed
    #[arg(long, default_value_t = false)]
    armed: bool,

    /// Hold the wrong pose on the first confirmation of each position
    #[arg(long, default_value_t = false)]
    clumsy: bool,

    /// Cancel the session after this many seconds
    #[arg(long)]
    cancel_after: Option<u64>,

    /// Print the session record as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, AppError> {
    let Some(path) = path else {
        info!("Using default configuration");
        return Ok(EngineConfig::default());
    };
    info!("Loading configuration from {:?}", path);
    let text = std::fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(EngineConfig::from_toml_str(&text)?)
}

/// The pose a careless user would pick for `position`
fn wrong_pose(position: AccelPosition) -> AccelPosition {
    match position {
        AccelPosition::Level => AccelPosition::Back,
        AccelPosition::Back => AccelPosition::Level,
        AccelPosition::Left => AccelPosition::Right,
        AccelPosition::Right => AccelPosition::Left,
        AccelPosition::NoseDown => AccelPosition::NoseUp,
        AccelPosition::NoseUp => AccelPosition::NoseDown,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("calib_sim=info,calibration_actors=info,link_mavlink=warn")
            }),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("calib-sim: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the session succeeded
async fn run(args: Args) -> Result<bool, AppError> {
    let config = load_config(args.config.as_ref())?;
    let kind = CalibrationType::from(args.kind);

    let (mut manager, handles) = ChannelManager::new();
    let probe = StateProbe::new();
    let orchestrator = Orchestrator::new(
        config,
        handles.orchestrator_tx.clone(),
        handles.link_tx.clone(),
        handles.event_tx.clone(),
        probe.clone(),
    );
    tokio::spawn(orchestrator.run(handles.orchestrator_rx, handles.event_tx.clone()));

    let sim = SimulatedFirmware::start(SimBehavior {
        silent_single_step: args.silent,
        deny_start: args.deny_start,
        deny_first_position: args.deny_first_position,
    });
    sim.set_armed(args.armed);
    tokio::spawn(LinkActor::new(sim.clone()).run(handles.link_rx, handles.event_tx));

    let pump_cancel = CancelFlag::new();
    tokio::spawn(pump_inbound(
        sim.clone(),
        manager.orchestrator_sender(),
        pump_cancel.clone(),
    ));

    let handle = CalibrationHandle::new(manager.orchestrator_sender(), probe);
    let mut events = manager.take_event_receiver();

    info!("Waiting for a stable link");
    tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;

    info!("Starting {} calibration", kind);
    if !handle.start(kind).await {
        warn!("Start refused");
        // Let the refusal reason arrive
        tokio::time::sleep(Duration::from_millis(50)).await;
        while let Ok(Some(event)) = events.try_next() {
            if let CalibrationEvent::Error { message } = event {
                println!("Refused: {}", message);
            }
        }
        pump_cancel.cancel();
        sim.close().await.map_err(CalibrationError::from)?;
        return Ok(false);
    }

    if let Some(seconds) = args.cancel_after {
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            info!("Cancelling after {} s", seconds);
            canceller.cancel().await;
        });
    }

    let mut fumbled = BTreeSet::new();
    let mut succeeded = false;
    while let Some(event) = events.next().await {
        match event {
            CalibrationEvent::StepRequired(step) => {
                println!("[step] {}: {}", step.step, step.instruction);
                let Some(position) = step.position.filter(|_| step.confirm_accepted) else {
                    continue;
                };
                tokio::time::sleep(Duration::from_millis(TURN_MS)).await;
                let pose = if args.clumsy && fumbled.insert(position) {
                    wrong_pose(position)
                } else {
                    position
                };
                sim.set_pose(pose);
                println!("[user] vehicle turned to {}, confirming", pose);
                handle.confirm_current_position().await;
            }
            CalibrationEvent::ProgressChanged { percent, status, .. } => {
                println!("[{:>3}%] {}", percent, status);
            }
            CalibrationEvent::StatusText { severity, text } => {
                println!("[fc:{:?}] {}", severity, text);
            }
            CalibrationEvent::Error { message } => {
                println!("[error] {}", message);
            }
            CalibrationEvent::StateChanged { .. } => {}
            CalibrationEvent::Completed {
                result,
                summary,
                duration_ms,
            } => {
                println!("[done] {:?} after {} ms: {}", result, duration_ms, summary);
                succeeded = result == actor_protocol::CalibrationResult::Success;
                break;
            }
        }
    }

    if let Some(snapshot) = handle.diagnostics().await {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        } else {
            for entry in snapshot.diagnostics() {
                println!(
                    "  +{:>6} ms {:?}: {}",
                    entry.elapsed_ms, entry.severity, entry.text
                );
            }
        }
    }

    pump_cancel.cancel();
    sim.close().await.map_err(CalibrationError::from)?;
    Ok(succeeded)
}
