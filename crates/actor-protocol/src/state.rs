// Atomic snapshot encoding
pub const STATE_MASK: u8 = 0x7F; // 0b01111111
pub const LOCK_FLAG: u8 = 0x80; // 0b10000000

/// # Calibration State Machine
///
/// One canonical state machine for every calibration type. Firmware messages
/// drive it; the engine never advances on its own except for the bounded
/// firmware-silence fallback of single-step calibrations.
///
/// ## State Transition Diagram
///
/// ```text
///   ┌──────┐ start  ┌────────────────┐ ack denied ┌──────────┐
///   │ Idle ├───────►│ CommandPending ├───────────►│ Rejected │
///   └──────┘        └───────┬────────┘            └──────────┘
///                           │ ack accepted
///                   ┌───────▼───────────┐ non-accel ┌──────────┐
///                   │ AwaitingDirective ├──────────►│ Sampling │──► Completed
///                   └───────┬───────────┘           └────┬─────┘
///                           │ "place ..."                │ next "place ..."
///                   ┌───────▼───────────┐◄───────────────┘
///                   │ PositionRequested │
///                   └───────┬───────────┘
///                   ┌───────▼──────────────────┐◄──────────────────────┐
///                   │ AwaitingUserConfirmation │◄──────┐               │
///                   └───────┬──────────────────┘       │ local fail    │
///                           │ confirm                  │               │
///                   ┌───────▼──────────────────┐       │     ┌─────────┴──────────────────┐
///                   │ ValidatingPositionLocally├───────┘     │ PositionRejectedByFirmware │
///                   └───────┬──────────────────┘             └─────────▲──────────────────┘
///                           │ local pass                               │ ack denied
///                   ┌───────▼───────────┐                              │
///                   │ PositionSubmitted ├──────────────────────────────┘
///                   └───────┬───────────┘
///                           │ ack accepted
///                       Sampling
///
///   any active state ──► Failed | Cancelled | TimedOut | Completed
/// ```
///
/// ## Invariants
///
/// - Transitions are monotonic within a session. The only revisits are the
///   position sub-cycle (LEVEL → … → BACK) and the
///   rejection ↔ confirmation retry loop.
/// - Terminal states accept no further transitions.
/// - `Completed` is reached only from a firmware completion message, a
///   firmware end-of-sequence position code, or the single-step silence
///   fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CalibrationState {
    /// No session running
    Idle,
    /// Start command sent, waiting for acknowledgement
    CommandPending,
    /// Firmware refused the start command
    Rejected,
    /// Firmware accepted, waiting for its first instruction
    AwaitingDirective,
    /// Firmware asked for a position (transient)
    PositionRequested,
    /// Waiting for the user to confirm the vehicle is in position
    AwaitingUserConfirmation,
    /// Collecting and checking IMU samples before submitting
    ValidatingPositionLocally,
    /// Position-confirm command sent, waiting for acknowledgement
    PositionSubmitted,
    /// Firmware refused the submitted position (transient)
    PositionRejectedByFirmware,
    /// Firmware is collecting data
    Sampling,
    /// Firmware reported success
    Completed,
    /// Firmware reported failure, or an abort ended the session
    Failed,
    /// User cancelled
    Cancelled,
    /// Link or acknowledgement timed out
    TimedOut,
}

impl CalibrationState {
    pub const ALL: [CalibrationState; 14] = [
        Self::Idle,
        Self::CommandPending,
        Self::Rejected,
        Self::AwaitingDirective,
        Self::PositionRequested,
        Self::AwaitingUserConfirmation,
        Self::ValidatingPositionLocally,
        Self::PositionSubmitted,
        Self::PositionRejectedByFirmware,
        Self::Sampling,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::TimedOut,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }

    /// A session exists and can still change
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }

    /// Can the user press "confirm position" right now?
    pub fn accepts_confirmation(&self) -> bool {
        matches!(self, Self::AwaitingUserConfirmation)
    }

    /// User-facing status text
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Idle => "Ready to calibrate",
            Self::CommandPending => "Starting calibration...",
            Self::Rejected => "Calibration rejected by flight controller",
            Self::AwaitingDirective => "Waiting for flight controller...",
            Self::PositionRequested => "New position requested",
            Self::AwaitingUserConfirmation => "Place the vehicle and confirm",
            Self::ValidatingPositionLocally => "Checking vehicle orientation...",
            Self::PositionSubmitted => "Position sent to flight controller...",
            Self::PositionRejectedByFirmware => "Position rejected by flight controller",
            Self::Sampling => "Calibrating, keep the vehicle still...",
            Self::Completed => "Calibration complete",
            Self::Failed => "Calibration failed",
            Self::Cancelled => "Calibration cancelled",
            Self::TimedOut => "Calibration timed out",
        }
    }

    /// Validate if transition to new_state is allowed from current state
    pub fn can_transition_to(&self, new_state: CalibrationState) -> bool {
        use CalibrationState::*;

        if self.is_terminal() {
            return false;
        }

        match (self, new_state) {
            // Session ends: any active state may terminate
            (from, Completed | Failed | Cancelled | TimedOut) => from.is_active(),

            (Idle, CommandPending) => true,

            (CommandPending, AwaitingDirective) => true,
            (CommandPending, Rejected) => true,

            (AwaitingDirective, PositionRequested) => true,
            (AwaitingDirective, Sampling) => true,

            (PositionRequested, AwaitingUserConfirmation) => true,

            (AwaitingUserConfirmation, ValidatingPositionLocally) => true,
            // Firmware moved on to another position
            (AwaitingUserConfirmation, PositionRequested) => true,

            (ValidatingPositionLocally, AwaitingUserConfirmation) => true, // Local check failed
            (ValidatingPositionLocally, PositionSubmitted) => true,
            (ValidatingPositionLocally, PositionRequested) => true,

            (PositionSubmitted, Sampling) => true,
            (PositionSubmitted, PositionRejectedByFirmware) => true,

            (PositionRejectedByFirmware, AwaitingUserConfirmation) => true,

            (Sampling, PositionRequested) => true,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Convert state to u8 value for atomic storage
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::CommandPending => 1,
            Self::Rejected => 2,
            Self::AwaitingDirective => 3,
            Self::PositionRequested => 4,
            Self::AwaitingUserConfirmation => 5,
            Self::ValidatingPositionLocally => 6,
            Self::PositionSubmitted => 7,
            Self::PositionRejectedByFirmware => 8,
            Self::Sampling => 9,
            Self::Completed => 10,
            Self::Failed => 11,
            Self::Cancelled => 12,
            Self::TimedOut => 13,
        }
    }

    /// Convert u8 value back to state (masks out lock bit)
    /// Returns None if value is invalid
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & STATE_MASK {
            0 => Some(Self::Idle),
            1 => Some(Self::CommandPending),
            2 => Some(Self::Rejected),
            3 => Some(Self::AwaitingDirective),
            4 => Some(Self::PositionRequested),
            5 => Some(Self::AwaitingUserConfirmation),
            6 => Some(Self::ValidatingPositionLocally),
            7 => Some(Self::PositionSubmitted),
            8 => Some(Self::PositionRejectedByFirmware),
            9 => Some(Self::Sampling),
            10 => Some(Self::Completed),
            11 => Some(Self::Failed),
            12 => Some(Self::Cancelled),
            13 => Some(Self::TimedOut),
            _ => None,
        }
    }
}
