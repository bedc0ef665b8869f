use serde::{Deserialize, Serialize};

/// `MAV_CMD_ACCELCAL_VEHICLE_POS` sentinel: firmware finished the accelerometer sequence.
pub const ACCELCAL_POS_SUCCESS: u32 = 16_777_215;

/// `MAV_CMD_ACCELCAL_VEHICLE_POS` sentinel: firmware aborted the accelerometer sequence.
pub const ACCELCAL_POS_FAILED: u32 = 16_777_216;

/// Severity of a firmware status line (MAV_SEVERITY numbering, 0 = most severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Emergency,
            1 => Self::Alert,
            2 => Self::Critical,
            3 => Self::Error,
            4 => Self::Warning,
            5 => Self::Notice,
            6 => Self::Info,
            _ => Self::Debug,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Emergency => 0,
            Self::Alert => 1,
            Self::Critical => 2,
            Self::Error => 3,
            Self::Warning => 4,
            Self::Notice => 5,
            Self::Info => 6,
            Self::Debug => 7,
        }
    }

    /// Error or worse
    pub fn is_error(self) -> bool {
        self <= Self::Error
    }
}

/// One free-text status line sent by firmware (STATUSTEXT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub severity: Severity,
    pub text: String,
}

impl StatusLine {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }
}

/// Identifies which outstanding command an acknowledgement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandId {
    /// MAV_CMD_PREFLIGHT_CALIBRATION (241)
    PreflightCalibration,
    /// MAV_CMD_ACCELCAL_VEHICLE_POS (42429)
    AccelcalVehiclePos,
    /// MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN (246)
    RebootShutdown,
    /// Any command the engine never issues
    Other(u32),
}

impl CommandId {
    pub fn wire_id(self) -> u32 {
        match self {
            Self::PreflightCalibration => 241,
            Self::AccelcalVehiclePos => 42429,
            Self::RebootShutdown => 246,
            Self::Other(id) => id,
        }
    }

    pub fn from_wire_id(id: u32) -> Self {
        match id {
            241 => Self::PreflightCalibration,
            42429 => Self::AccelcalVehiclePos,
            246 => Self::RebootShutdown,
            other => Self::Other(other),
        }
    }
}

/// Result code carried by a command acknowledgement (MAV_RESULT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckResult {
    Accepted,
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
    InProgress,
    Cancelled,
}

impl AckResult {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Accepted,
            1 => Self::TemporarilyRejected,
            2 => Self::Denied,
            3 => Self::Unsupported,
            5 => Self::InProgress,
            6 => Self::Cancelled,
            _ => Self::Failed,
        }
    }

    /// Firmware took the command (possibly still working on it)
    pub fn is_acceptance(self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress)
    }

    /// Human-readable cause, keyed by result code
    pub fn describe(self) -> &'static str {
        match self {
            Self::Accepted => "Command accepted by the flight controller.",
            Self::InProgress => "Command accepted, flight controller is working on it.",
            Self::TemporarilyRejected => {
                "Flight controller is busy and temporarily rejected the command. Wait a moment and retry."
            }
            Self::Denied => {
                "Flight controller denied the command. Make sure the vehicle is disarmed and not already calibrating."
            }
            Self::Unsupported => {
                "Flight controller does not support this calibration. Check the firmware version."
            }
            Self::Failed => {
                "Flight controller reported the command failed. Check the sensor is detected and healthy."
            }
            Self::Cancelled => "Flight controller cancelled the command.",
        }
    }
}

/// One raw IMU reading from telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Specific force in the body frame, m/s² (x forward, y right, z down).
    pub accel: [f64; 3],
    /// Angular rate, rad/s
    pub gyro: [f64; 3],
    pub temperature_c: Option<f64>,
    /// Device timestamp in microseconds
    pub time_us: u64,
}

impl ImuSample {
    pub fn from_accel(accel: [f64; 3], time_us: u64) -> Self {
        Self {
            accel,
            gyro: [0.0; 3],
            temperature_c: None,
            time_us,
        }
    }
}

/// Inbound event stream from the transport collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VehicleEvent {
    /// Link came up (no heartbeat seen yet)
    Connected,
    /// Link went down
    Disconnected,
    /// Vehicle heartbeat with current armed flag
    Heartbeat { armed: bool },
    /// Free-text status line
    StatusText(StatusLine),
    /// Acknowledgement of a previously sent command
    CommandAck { command: CommandId, result: AckResult },
    /// Raw accelerometer/gyro sample
    RawImu(ImuSample),
    /// Firmware-originated accelerometer position request (1-6, or a terminal sentinel)
    PositionRequest { code: u32 },
}

/// Outbound calls the engine makes through the transport collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundCommand {
    /// MAV_CMD_PREFLIGHT_CALIBRATION with its seven parameters
    PreflightCalibration([f32; 7]),
    /// MAV_CMD_ACCELCAL_VEHICLE_POS, position code 1-6
    AccelPosition { position: u8 },
    /// MAV_CMD_PREFLIGHT_CALIBRATION with all parameters zero
    CancelCalibration,
    /// MAV_CMD_PREFLIGHT_REBOOT_SHUTDOWN, reboot autopilot
    Reboot,
}

impl OutboundCommand {
    pub fn command_id(&self) -> CommandId {
        match self {
            Self::PreflightCalibration(_) | Self::CancelCalibration => {
                CommandId::PreflightCalibration
            }
            Self::AccelPosition { .. } => CommandId::AccelcalVehiclePos,
            Self::Reboot => CommandId::RebootShutdown,
        }
    }

    /// The seven COMMAND_LONG parameters
    pub fn params(&self) -> [f32; 7] {
        match self {
            Self::PreflightCalibration(params) => *params,
            Self::AccelPosition { position } => [f32::from(*position), 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            Self::CancelCalibration => [0.0; 7],
            Self::Reboot => [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        }
    }
}
