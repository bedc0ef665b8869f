use serde::{Deserialize, Serialize};

/// Which sensor is being calibrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationType {
    Accelerometer,
    Compass,
    Gyroscope,
    LevelHorizon,
    Barometer,
    Airspeed,
}

impl CalibrationType {
    pub const ALL: [CalibrationType; 6] = [
        Self::Accelerometer,
        Self::Compass,
        Self::Gyroscope,
        Self::LevelHorizon,
        Self::Barometer,
        Self::Airspeed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Accelerometer => "Accelerometer",
            Self::Compass => "Compass",
            Self::Gyroscope => "Gyroscope",
            Self::LevelHorizon => "Level horizon",
            Self::Barometer => "Barometer",
            Self::Airspeed => "Airspeed",
        }
    }

    /// MAV_CMD_PREFLIGHT_CALIBRATION parameter layout for this calibration
    ///
    /// p1 gyro, p2 magnetometer, p3 ground pressure, p4 radio,
    /// p5 accel (1 = full, 2 = board level), p6 airspeed (2), p7 ESC/baro temp.
    pub fn preflight_params(self) -> [f32; 7] {
        let mut params = [0.0; 7];
        let (index, value) = match self {
            Self::Gyroscope => (0, 1.0),
            Self::Compass => (1, 1.0),
            Self::Barometer => (2, 1.0),
            Self::Accelerometer => (4, 1.0),
            Self::LevelHorizon => (4, 2.0),
            Self::Airspeed => (5, 2.0),
        };
        if let Some(slot) = params.get_mut(index) {
            *slot = value;
        }
        params
    }

    /// Multi-position flow driven by firmware position requests
    pub fn uses_positions(self) -> bool {
        matches!(self, Self::Accelerometer)
    }

    /// Calibrations that may be completed by the firmware-silence fallback.
    ///
    /// Deliberately limited to gyro, baro and level: accelerometer and compass
    /// flows never assume success from silence.
    pub fn is_single_step(self) -> bool {
        matches!(self, Self::Gyroscope | Self::Barometer | Self::LevelHorizon)
    }

    /// Instruction shown to the user once firmware accepts the start command
    pub fn start_instruction(self) -> &'static str {
        match self {
            Self::Accelerometer => "Follow the on-screen prompts to place the vehicle in each orientation.",
            Self::Compass => "Rotate the vehicle slowly around all axes until calibration completes.",
            Self::Gyroscope => "Keep the vehicle completely still until calibration completes.",
            Self::LevelHorizon => "Place the vehicle in its level flying attitude and keep it still.",
            Self::Barometer => "Keep the vehicle still and shielded from wind until calibration completes.",
            Self::Airspeed => "Cover the pitot tube from wind and keep the vehicle still.",
        }
    }
}

impl std::fmt::Display for CalibrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal result of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationResult {
    Success,
    Failed,
    Cancelled,
    TimedOut,
    Rejected,
}

/// One of the six accelerometer calibration orientations.
///
/// Numbering matches the firmware convention (ACCELCAL_VEHICLE_POS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccelPosition {
    Level = 1,
    Left = 2,
    Right = 3,
    NoseDown = 4,
    NoseUp = 5,
    Back = 6,
}

impl AccelPosition {
    pub const ALL: [AccelPosition; 6] = [
        Self::Level,
        Self::Left,
        Self::Right,
        Self::NoseDown,
        Self::NoseUp,
        Self::Back,
    ];

    /// Code conventionally one past the last valid position; ends the sequence
    pub const END_OF_SEQUENCE: u32 = 7;

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Level),
            2 => Some(Self::Left),
            3 => Some(Self::Right),
            4 => Some(Self::NoseDown),
            5 => Some(Self::NoseUp),
            6 => Some(Self::Back),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        match self {
            Self::Level => "LEVEL",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::NoseDown => "NOSE_DOWN",
            Self::NoseUp => "NOSE_UP",
            Self::Back => "BACK",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::Level => "Place the vehicle level on a flat surface, then confirm.",
            Self::Left => "Place the vehicle on its LEFT side, then confirm.",
            Self::Right => "Place the vehicle on its RIGHT side, then confirm.",
            Self::NoseDown => "Place the vehicle nose DOWN (vertical), then confirm.",
            Self::NoseUp => "Place the vehicle nose UP (vertical), then confirm.",
            Self::Back => "Place the vehicle on its BACK (upside down), then confirm.",
        }
    }
}

impl std::fmt::Display for AccelPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_position_codes() {
        for (i, pos) in AccelPosition::ALL.iter().enumerate() {
            assert_eq!(pos.code() as usize, i + 1);
            assert_eq!(AccelPosition::from_code(pos.code() as u32), Some(*pos));
        }
        assert_eq!(AccelPosition::from_code(0), None);
        assert_eq!(AccelPosition::from_code(AccelPosition::END_OF_SEQUENCE), None);
        assert_eq!(AccelPosition::NoseDown.name(), "NOSE_DOWN");
    }

    #[test]
    fn test_preflight_params() {
        assert_eq!(
            CalibrationType::Accelerometer.preflight_params(),
            [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]
        );
        assert_eq!(
            CalibrationType::LevelHorizon.preflight_params(),
            [0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0]
        );
        assert_eq!(CalibrationType::Gyroscope.preflight_params()[0], 1.0);
        assert_eq!(CalibrationType::Compass.preflight_params()[1], 1.0);
        assert_eq!(CalibrationType::Barometer.preflight_params()[2], 1.0);
        assert_eq!(CalibrationType::Airspeed.preflight_params()[5], 2.0);
    }

    #[test]
    fn test_single_step_scope() {
        assert!(CalibrationType::Gyroscope.is_single_step());
        assert!(CalibrationType::Barometer.is_single_step());
        assert!(CalibrationType::LevelHorizon.is_single_step());
        assert!(!CalibrationType::Accelerometer.is_single_step());
        assert!(!CalibrationType::Compass.is_single_step());
    }
}
