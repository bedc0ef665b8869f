//! Simulated flight controller
//!
//! Speaks MAVLink over an in-memory [`Transport`]: streams heartbeats and
//! SCALED_IMU for the current vehicle pose, acknowledges calibration
//! commands and plays the status text an ArduPilot-style firmware would send
//! for each calibration type. The vehicle pose is set from outside, which is
//! how a test or demo plays the user turning the vehicle over.

use crate::decoder::MavlinkDecoder;
use crate::encoder::{statustext, MavlinkEncoder};
use actor_protocol::{AccelPosition, CalibrationType};
use actor_runtime::{actor_debug, actor_warn, CancelFlag};
use core_types::{CommandId, Transport, TransportError, ACCELCAL_POS_SUCCESS};
use futures::stream::StreamExt;
use futures_channel::mpsc;
use mavlink::ardupilotmega::{
    MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavResult, MavSeverity, MavState, MavType,
    COMMAND_ACK_DATA, COMMAND_LONG_DATA, HEARTBEAT_DATA, SCALED_IMU_DATA,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const IMU_PERIOD_MS: u64 = 20;
const HEARTBEAT_EVERY_TICKS: u64 = 50;
const PROMPT_DELAY_MS: u64 = 300;

/// Knobs for exercising unhappy paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimBehavior {
    /// Never report a verdict for gyro, baro or level
    pub silent_single_step: bool,
    /// Deny every calibration start
    pub deny_start: bool,
    /// Deny the first submission of each accelerometer position
    pub deny_first_position: bool,
}

/// One COMMAND_LONG the simulator received
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceivedCommand {
    pub command: CommandId,
    pub params: [f32; 7],
}

struct SimState {
    behavior: SimBehavior,
    pose: AccelPosition,
    armed: bool,
    calibrating: Option<CalibrationType>,
    requested: Option<AccelPosition>,
    denied: Vec<AccelPosition>,
    received: Vec<ReceivedCommand>,
    // Bumped on every start and cancel; stale scripts check it before emitting
    generation: u64,
    inbound: MavlinkDecoder,
}

/// Encodes and queues firmware output
#[derive(Clone)]
struct Emitter {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    encoder: Arc<Mutex<MavlinkEncoder>>,
}

impl Emitter {
    fn emit(&self, message: &MavMessage) {
        let encoded = self.encoder.lock().encode(message);
        match encoded {
            Ok(bytes) => {
                // Receiver closed means the transport was closed
                let _ = self.tx.unbounded_send(bytes);
            }
            Err(e) => actor_warn!("Simulator: encode failed: {}", e),
        }
    }

    fn position_request(&self, code: u32) -> MavMessage {
        self.encoder.lock().command_long(
            MavCmd::MAV_CMD_ACCELCAL_VEHICLE_POS,
            [code as f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }
}

pub struct SimulatedFirmware {
    state: Arc<Mutex<SimState>>,
    emitter: Emitter,
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    cancel: CancelFlag,
    boot: Instant,
}

impl SimulatedFirmware {
    /// Power on: starts the heartbeat and IMU stream
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(behavior: SimBehavior) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded();
        let sim = Arc::new(Self {
            state: Arc::new(Mutex::new(SimState {
                behavior,
                pose: AccelPosition::Level,
                armed: false,
                calibrating: None,
                requested: None,
                denied: Vec::new(),
                received: Vec::new(),
                generation: 0,
                inbound: MavlinkDecoder::new(),
            })),
            emitter: Emitter {
                tx,
                encoder: Arc::new(Mutex::new(MavlinkEncoder::vehicle())),
            },
            outbound: tokio::sync::Mutex::new(rx),
            cancel: CancelFlag::new(),
            boot: Instant::now(),
        });
        sim.spawn_telemetry();
        sim
    }

    /// Turn the vehicle to `pose`
    pub fn set_pose(&self, pose: AccelPosition) {
        self.state.lock().pose = pose;
    }

    pub fn pose(&self) -> AccelPosition {
        self.state.lock().pose
    }

    pub fn set_armed(&self, armed: bool) {
        self.state.lock().armed = armed;
    }

    /// Position the firmware is waiting for, if any
    pub fn requested_position(&self) -> Option<AccelPosition> {
        self.state.lock().requested
    }

    pub fn calibrating(&self) -> Option<CalibrationType> {
        self.state.lock().calibrating
    }

    pub fn received(&self) -> Vec<ReceivedCommand> {
        self.state.lock().received.clone()
    }

    /// Send an arbitrary status line, as firmware would
    pub fn emit_status(&self, severity: MavSeverity, text: &str) {
        self.emitter.emit(&statustext(severity, text));
    }

    fn spawn_telemetry(&self) {
        let state = self.state.clone();
        let emitter = self.emitter.clone();
        let cancel = self.cancel.clone();
        let boot = self.boot;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(IMU_PERIOD_MS));
            let mut ticks = 0u64;
            loop {
                interval.tick().await;
                if cancel.is_cancelled() {
                    break;
                }
                let (pose, armed) = {
                    let state = state.lock();
                    (state.pose, state.armed)
                };
                if ticks % HEARTBEAT_EVERY_TICKS == 0 {
                    emitter.emit(&heartbeat(armed));
                }
                emitter.emit(&scaled_imu(pose, boot.elapsed()));
                ticks += 1;
            }
            actor_debug!("Simulator: telemetry stopped");
        });
    }

    /// Emit `steps` in order, each after its delay, unless a newer start or
    /// cancel has superseded them
    fn play(&self, generation: u64, steps: Vec<(u64, MavMessage)>) {
        let state = self.state.clone();
        let emitter = self.emitter.clone();
        tokio::spawn(async move {
            for (delay_ms, message) in steps {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if state.lock().generation != generation {
                    return;
                }
                emitter.emit(&message);
            }
        });
    }

    fn on_command(&self, state: &mut SimState, cmd: &COMMAND_LONG_DATA) {
        let params = [
            cmd.param1, cmd.param2, cmd.param3, cmd.param4, cmd.param5, cmd.param6, cmd.param7,
        ];
        state.received.push(ReceivedCommand {
            command: CommandId::from_wire_id(cmd.command as u32),
            params,
        });

        match cmd.command {
            MavCmd::MAV_CMD_PREFLIGHT_CALIBRATION => self.on_preflight(state, params),
            MavCmd::MAV_CMD_ACCELCAL_VEHICLE_POS => self.on_position(state, cmd.param1 as u32),
            MavCmd::MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN => {
                self.emitter.emit(&ack(cmd.command, MavResult::MAV_RESULT_ACCEPTED));
            }
            other => {
                self.emitter.emit(&ack(other, MavResult::MAV_RESULT_UNSUPPORTED));
            }
        }
    }

    fn on_preflight(&self, state: &mut SimState, params: [f32; 7]) {
        let command = MavCmd::MAV_CMD_PREFLIGHT_CALIBRATION;

        if params.iter().all(|&p| p == 0.0) {
            state.generation += 1;
            state.calibrating = None;
            state.requested = None;
            self.emitter.emit(&ack(command, MavResult::MAV_RESULT_ACCEPTED));
            return;
        }

        let Some(kind) = CalibrationType::ALL
            .into_iter()
            .find(|k| k.preflight_params() == params)
        else {
            self.emitter.emit(&ack(command, MavResult::MAV_RESULT_UNSUPPORTED));
            return;
        };

        if state.armed || state.behavior.deny_start {
            self.emitter.emit(&ack(command, MavResult::MAV_RESULT_DENIED));
            return;
        }
        if state.calibrating.is_some() {
            self.emitter
                .emit(&ack(command, MavResult::MAV_RESULT_TEMPORARILY_REJECTED));
            return;
        }

        state.generation += 1;
        state.calibrating = Some(kind);
        state.denied.clear();
        self.emitter.emit(&ack(command, MavResult::MAV_RESULT_ACCEPTED));

        let info = |text: &str| statustext(MavSeverity::MAV_SEVERITY_INFO, text);
        let silent = state.behavior.silent_single_step;
        let steps = match kind {
            CalibrationType::Accelerometer => {
                state.requested = Some(AccelPosition::Level);
                self.prompt(AccelPosition::Level)
            }
            CalibrationType::Gyroscope => {
                let mut steps = vec![(200, info("Calibrating gyros"))];
                if !silent {
                    steps.push((1500, info("Gyro calibration successful")));
                }
                steps
            }
            CalibrationType::Barometer => {
                let mut steps = vec![(200, info("Calibrating barometer"))];
                if !silent {
                    steps.push((800, info("Barometer calibration complete")));
                }
                steps
            }
            CalibrationType::LevelHorizon => {
                if silent {
                    Vec::new()
                } else {
                    vec![(1000, info("Level calibration complete"))]
                }
            }
            CalibrationType::Compass => vec![
                (500, info("Mag calibration progress 25%")),
                (500, info("Mag calibration progress 50%")),
                (500, info("Mag calibration progress 75%")),
                (500, info("Mag calibration progress 100%")),
                (300, info("Mag calibration successful")),
            ],
            CalibrationType::Airspeed => vec![
                (300, info("Airspeed calibration started")),
                (2000, info("Airspeed calibration complete")),
            ],
        };
        self.play(state.generation, steps);
    }

    fn on_position(&self, state: &mut SimState, code: u32) {
        let command = MavCmd::MAV_CMD_ACCELCAL_VEHICLE_POS;

        let Some(position) = AccelPosition::from_code(code) else {
            self.emitter.emit(&ack(command, MavResult::MAV_RESULT_FAILED));
            return;
        };
        if state.calibrating != Some(CalibrationType::Accelerometer)
            || state.requested != Some(position)
        {
            self.emitter.emit(&ack(command, MavResult::MAV_RESULT_FAILED));
            return;
        }
        if state.behavior.deny_first_position && !state.denied.contains(&position) {
            state.denied.push(position);
            self.emitter.emit(&ack(command, MavResult::MAV_RESULT_DENIED));
            return;
        }
        if state.pose != position {
            self.emitter.emit(&ack(command, MavResult::MAV_RESULT_FAILED));
            return;
        }

        self.emitter.emit(&ack(command, MavResult::MAV_RESULT_ACCEPTED));

        let next = AccelPosition::from_code(u32::from(position.code()) + 1);
        let steps = match next {
            Some(next) => {
                state.requested = Some(next);
                self.prompt(next)
            }
            None => {
                state.calibrating = None;
                state.requested = None;
                vec![
                    (PROMPT_DELAY_MS, self.emitter.position_request(ACCELCAL_POS_SUCCESS)),
                    (
                        0,
                        statustext(MavSeverity::MAV_SEVERITY_INFO, "Calibration successful"),
                    ),
                ]
            }
        };
        self.play(state.generation, steps);
    }

    /// Text prompt followed by the matching ACCELCAL_VEHICLE_POS request
    fn prompt(&self, position: AccelPosition) -> Vec<(u64, MavMessage)> {
        vec![
            (
                PROMPT_DELAY_MS,
                statustext(MavSeverity::MAV_SEVERITY_INFO, prompt_text(position)),
            ),
            (0, self.emitter.position_request(u32::from(position.code()))),
        ]
    }
}

impl Transport for SimulatedFirmware {
    async fn read_chunk(&self) -> Result<(Vec<u8>, u64), TransportError> {
        let mut outbound = self.outbound.lock().await;
        match outbound.next().await {
            Some(bytes) => {
                let micros = u64::try_from(self.boot.elapsed().as_micros()).unwrap_or(u64::MAX);
                Ok((bytes, micros))
            }
            None => Err(TransportError::NotConnected),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::NotConnected);
        }
        let mut state = self.state.lock();
        state.inbound.feed(data);
        while let Some((_, message)) = state.inbound.next_message() {
            if let MavMessage::COMMAND_LONG(cmd) = message {
                self.on_command(&mut state, &cmd);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.cancel.cancel();
        self.emitter.tx.close_channel();
        Ok(())
    }
}

fn prompt_text(position: AccelPosition) -> &'static str {
    match position {
        AccelPosition::Level => "Place vehicle level and press any key.",
        AccelPosition::Left => "Place vehicle on its LEFT side and press any key.",
        AccelPosition::Right => "Place vehicle on its RIGHT side and press any key.",
        AccelPosition::NoseDown => "Place vehicle nose DOWN and press any key.",
        AccelPosition::NoseUp => "Place vehicle nose UP and press any key.",
        AccelPosition::Back => "Place vehicle on its BACK and press any key.",
    }
}

/// Unit gravity reading in body frame (x forward, y right, z down)
fn pose_gravity(pose: AccelPosition) -> [f32; 3] {
    match pose {
        AccelPosition::Level => [0.0, 0.0, -1.0],
        AccelPosition::Left => [0.0, 1.0, 0.0],
        AccelPosition::Right => [0.0, -1.0, 0.0],
        AccelPosition::NoseDown => [-1.0, 0.0, 0.0],
        AccelPosition::NoseUp => [1.0, 0.0, 0.0],
        AccelPosition::Back => [0.0, 0.0, 1.0],
    }
}

fn heartbeat(armed: bool) -> MavMessage {
    let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
    if armed {
        base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
    }
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_QUADROTOR,
        autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        base_mode,
        system_status: if armed {
            MavState::MAV_STATE_ACTIVE
        } else {
            MavState::MAV_STATE_STANDBY
        },
        mavlink_version: 3,
    })
}

fn scaled_imu(pose: AccelPosition, since_boot: Duration) -> MavMessage {
    let [x, y, z] = pose_gravity(pose).map(|g| (g * 1000.0) as i16);
    MavMessage::SCALED_IMU(SCALED_IMU_DATA {
        time_boot_ms: u32::try_from(since_boot.as_millis()).unwrap_or(u32::MAX),
        xacc: x,
        yacc: y,
        zacc: z,
        xgyro: 0,
        ygyro: 0,
        zgyro: 0,
        xmag: 0,
        ymag: 0,
        zmag: 0,
    })
}

fn ack(command: MavCmd, result: MavResult) -> MavMessage {
    MavMessage::COMMAND_ACK(COMMAND_ACK_DATA { command, result })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use core_types::{AckResult, Frame, OutboundCommand, VehicleEvent};

    /// Read and decode until `predicate` matches, returning everything seen
    async fn read_until<F>(sim: &SimulatedFirmware, mut predicate: F) -> Vec<VehicleEvent>
    where
        F: FnMut(&VehicleEvent) -> bool,
    {
        let mut decoder = MavlinkDecoder::new();
        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(30);
        while Instant::now() < deadline {
            let (bytes, ts) = sim.read_chunk().await.unwrap();
            let mut events = Vec::new();
            decoder.ingest(&Frame::new_rx(bytes, ts), &mut events);
            for event in events {
                let done = predicate(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
        }
        panic!("Condition not met; saw {} events", seen.len());
    }

    async fn send(sim: &SimulatedFirmware, command: OutboundCommand) {
        let bytes = MavlinkEncoder::ground_station()
            .encode_command(&command)
            .unwrap();
        sim.write(&bytes).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_heartbeat_and_imu() {
        let sim = SimulatedFirmware::start(SimBehavior::default());
        sim.set_pose(AccelPosition::Back);

        let seen = read_until(&sim, |e| matches!(e, VehicleEvent::RawImu(_))).await;
        assert!(seen.contains(&VehicleEvent::Heartbeat { armed: false }));
        let Some(VehicleEvent::RawImu(sample)) = seen.last() else {
            panic!("Expected RawImu");
        };
        assert!((sample.accel[2] - 9.80665).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gyro_start_is_acknowledged_and_completes() {
        let sim = SimulatedFirmware::start(SimBehavior::default());
        send(
            &sim,
            OutboundCommand::PreflightCalibration(CalibrationType::Gyroscope.preflight_params()),
        )
        .await;
        assert_eq!(sim.calibrating(), Some(CalibrationType::Gyroscope));

        let seen = read_until(&sim, |e| {
            matches!(e, VehicleEvent::StatusText(line) if line.text.contains("successful"))
        })
        .await;
        assert!(seen.contains(&VehicleEvent::CommandAck {
            command: CommandId::PreflightCalibration,
            result: AckResult::Accepted,
        }));
        assert_eq!(sim.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_vehicle_denies_start() {
        let sim = SimulatedFirmware::start(SimBehavior::default());
        sim.set_armed(true);
        send(
            &sim,
            OutboundCommand::PreflightCalibration(CalibrationType::Barometer.preflight_params()),
        )
        .await;

        let seen = read_until(&sim, |e| matches!(e, VehicleEvent::CommandAck { .. })).await;
        assert_eq!(
            seen.last(),
            Some(&VehicleEvent::CommandAck {
                command: CommandId::PreflightCalibration,
                result: AckResult::Denied,
            })
        );
        assert_eq!(sim.calibrating(), None);
        read_until(&sim, |e| *e == VehicleEvent::Heartbeat { armed: true }).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accel_sequence_requests_positions_in_order() {
        let sim = SimulatedFirmware::start(SimBehavior::default());
        send(
            &sim,
            OutboundCommand::PreflightCalibration(CalibrationType::Accelerometer.preflight_params()),
        )
        .await;
        read_until(&sim, |e| *e == VehicleEvent::PositionRequest { code: 1 }).await;

        // Wrong pose is refused by firmware too
        sim.set_pose(AccelPosition::Back);
        send(&sim, OutboundCommand::AccelPosition { position: 1 }).await;
        read_until(&sim, |e| {
            *e == VehicleEvent::CommandAck {
                command: CommandId::AccelcalVehiclePos,
                result: AckResult::Failed,
            }
        })
        .await;

        sim.set_pose(AccelPosition::Level);
        send(&sim, OutboundCommand::AccelPosition { position: 1 }).await;
        read_until(&sim, |e| *e == VehicleEvent::PositionRequest { code: 2 }).await;
        assert_eq!(sim.requested_position(), Some(AccelPosition::Left));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_silences_script() {
        let sim = SimulatedFirmware::start(SimBehavior::default());
        send(
            &sim,
            OutboundCommand::PreflightCalibration(CalibrationType::Compass.preflight_params()),
        )
        .await;
        send(&sim, OutboundCommand::CancelCalibration).await;
        assert_eq!(sim.calibrating(), None);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let mut decoder = MavlinkDecoder::new();
        let mut events = Vec::new();
        // Drain what was queued during the sleep
        while let Ok(Some(bytes)) = sim.outbound.lock().await.try_next() {
            decoder.ingest(&Frame::new_rx(bytes, 0), &mut events);
        }
        assert!(!events
            .iter()
            .any(|e| matches!(e, VehicleEvent::StatusText(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_ends_stream() {
        let sim = SimulatedFirmware::start(SimBehavior::default());
        sim.close().await.unwrap();
        // Whatever was queued drains, then the stream reports the link down
        loop {
            match sim.read_chunk().await {
                Ok(_) => continue,
                Err(e) => {
                    assert!(matches!(e, TransportError::NotConnected));
                    break;
                }
            }
        }
        assert!(sim.write(&[0xFD]).await.is_err());
    }
}
