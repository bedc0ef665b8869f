use crate::calibration::{AccelPosition, CalibrationResult, CalibrationType};
use crate::state::CalibrationState;
use core_types::Severity;
use serde::{Deserialize, Serialize};

/// Commands from the caller (UI or automation) to the calibration engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationCommand {
    /// Begin a new calibration session
    Start { kind: CalibrationType },

    /// User says the vehicle is in the requested orientation
    ConfirmPosition,

    /// Abort the active session
    Cancel,

    /// Reboot the autopilot (only with no active session)
    Reboot,
}

impl CalibrationCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "Start",
            Self::ConfirmPosition => "ConfirmPosition",
            Self::Cancel => "Cancel",
            Self::Reboot => "Reboot",
        }
    }
}

/// "Step required" payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInstruction {
    pub kind: CalibrationType,
    /// Requested orientation, accelerometer only
    pub position: Option<AccelPosition>,
    /// Step identifier shown to the user (position name or calibration label)
    pub step: String,
    /// Literal instruction text
    pub instruction: String,
    /// Whether ConfirmPosition is accepted right now
    pub confirm_accepted: bool,
}

impl StepInstruction {
    pub fn for_position(position: AccelPosition) -> Self {
        Self {
            kind: CalibrationType::Accelerometer,
            position: Some(position),
            step: position.name().to_string(),
            instruction: position.instruction().to_string(),
            confirm_accepted: true,
        }
    }

    pub fn for_start(kind: CalibrationType) -> Self {
        Self {
            kind,
            position: None,
            step: kind.label().to_string(),
            instruction: kind.start_instruction().to_string(),
            confirm_accepted: false,
        }
    }
}

/// Events from the calibration engine to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationEvent {
    /// Orchestration state changed
    StateChanged { state: CalibrationState },

    /// The user has to do something
    StepRequired(StepInstruction),

    /// Progress update
    ProgressChanged {
        percent: u8,
        status: String,
        state: CalibrationState,
    },

    /// Session reached a terminal state (sent exactly once per session)
    Completed {
        result: CalibrationResult,
        summary: String,
        duration_ms: u64,
    },

    /// Firmware text the classifier did not act on
    StatusText { severity: Severity, text: String },

    /// Error occurred
    Error { message: String },
}
