//! Position physics validator
//!
//! Judges whether an averaged accelerometer reading is plausible for the
//! orientation the firmware asked for, before anything is sent to firmware.
//!
//! Body frame is x forward, y right, z down. At rest the accelerometer
//! measures specific force, which points away from the ground: a level
//! vehicle reads z ≈ -1 g, a vehicle on its back reads z ≈ +1 g.

use crate::config::Tolerances;
use crate::constants::physics::STANDARD_GRAVITY;
use actor_protocol::AccelPosition;
use serde::{Deserialize, Serialize};

const AXIS_NAMES: [&str; 3] = ["X", "Y", "Z"];

/// Expected unit-gravity reading for one position code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedOrientation {
    pub position: AccelPosition,
    pub name: &'static str,
    /// Unit vector in g (one axis ±1, the others 0)
    pub gravity: [f64; 3],
}

const fn orientation(position: AccelPosition, name: &'static str, gravity: [f64; 3]) -> ExpectedOrientation {
    ExpectedOrientation {
        position,
        name,
        gravity,
    }
}

const LEVEL: ExpectedOrientation = orientation(AccelPosition::Level, "LEVEL", [0.0, 0.0, -1.0]);
const LEFT: ExpectedOrientation = orientation(AccelPosition::Left, "LEFT", [0.0, 1.0, 0.0]);
const RIGHT: ExpectedOrientation = orientation(AccelPosition::Right, "RIGHT", [0.0, -1.0, 0.0]);
const NOSE_DOWN: ExpectedOrientation =
    orientation(AccelPosition::NoseDown, "NOSE_DOWN", [-1.0, 0.0, 0.0]);
const NOSE_UP: ExpectedOrientation = orientation(AccelPosition::NoseUp, "NOSE_UP", [1.0, 0.0, 0.0]);
const BACK: ExpectedOrientation = orientation(AccelPosition::Back, "BACK", [0.0, 0.0, 1.0]);

/// Position code → expected reading. Numbering matches ACCELCAL_VEHICLE_POS.
pub const EXPECTED_ORIENTATIONS: [ExpectedOrientation; 6] =
    [LEVEL, LEFT, RIGHT, NOSE_DOWN, NOSE_UP, BACK];

pub fn expected_orientation(position: AccelPosition) -> ExpectedOrientation {
    match position {
        AccelPosition::Level => LEVEL,
        AccelPosition::Left => LEFT,
        AccelPosition::Right => RIGHT,
        AccelPosition::NoseDown => NOSE_DOWN,
        AccelPosition::NoseUp => NOSE_UP,
        AccelPosition::Back => BACK,
    }
}

/// One failed criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationFailure {
    /// The axis that should carry gravity does not
    GravityAxis {
        axis: String,
        measured_g: f64,
        expected_g: f64,
    },
    /// An axis that should read ~0 does not
    CrossAxis { axis: String, measured_g: f64 },
    /// Total magnitude is off (vehicle moving or sensor fault)
    Magnitude { measured_ms2: f64 },
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GravityAxis {
                axis,
                measured_g,
                expected_g,
            } => write!(
                f,
                "{} axis reads {:+.2} g, expected {:+.2} g",
                axis, measured_g, expected_g
            ),
            Self::CrossAxis { axis, measured_g } => {
                write!(f, "{} axis reads {:+.2} g, expected about 0 g", axis, measured_g)
            }
            Self::Magnitude { measured_ms2 } => write!(
                f,
                "gravity magnitude is {:.2} m/s², expected {:.2} m/s²",
                measured_ms2, STANDARD_GRAVITY
            ),
        }
    }
}

/// Outcome of one local validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub position: AccelPosition,
    pub passed: bool,
    /// Averaged reading, m/s²
    pub measured: [f64; 3],
    pub magnitude: f64,
    pub failures: Vec<ValidationFailure>,
    pub explanation: String,
    /// What the user should do differently, on failure
    pub advice: Option<String>,
}

/// Check an averaged accelerometer reading against the requested position.
///
/// Pure function: no state, no I/O.
pub fn validate_position(
    position: AccelPosition,
    accel: [f64; 3],
    tolerances: &Tolerances,
) -> ValidationReport {
    let expected = expected_orientation(position);
    let magnitude = norm(accel);
    let mut failures = Vec::new();

    for ((measured, expected_g), axis) in accel.iter().zip(expected.gravity.iter()).zip(AXIS_NAMES)
    {
        let measured_g = measured / STANDARD_GRAVITY;
        if (measured_g - expected_g).abs() > tolerances.axis {
            if *expected_g == 0.0 {
                failures.push(ValidationFailure::CrossAxis {
                    axis: axis.to_string(),
                    measured_g,
                });
            } else {
                failures.push(ValidationFailure::GravityAxis {
                    axis: axis.to_string(),
                    measured_g,
                    expected_g: *expected_g,
                });
            }
        }
    }

    if (magnitude / STANDARD_GRAVITY - 1.0).abs() > tolerances.magnitude {
        failures.push(ValidationFailure::Magnitude {
            measured_ms2: magnitude,
        });
    }

    let passed = failures.is_empty();
    let explanation = if passed {
        format!(
            "{} check passed: ({:.2}, {:.2}, {:.2}) m/s², |g| = {:.2} m/s²",
            expected.name, accel[0], accel[1], accel[2], magnitude
        )
    } else {
        let reasons: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
        format!("{} check failed: {}", expected.name, reasons.join("; "))
    };
    let advice = if passed {
        None
    } else {
        Some(correction_advice(position, accel, magnitude, &failures, tolerances))
    };

    ValidationReport {
        position,
        passed,
        measured: accel,
        magnitude,
        failures,
        explanation,
        advice,
    }
}

fn correction_advice(
    requested: AccelPosition,
    accel: [f64; 3],
    magnitude: f64,
    failures: &[ValidationFailure],
    tolerances: &Tolerances,
) -> String {
    let only_magnitude = failures
        .iter()
        .all(|f| matches!(f, ValidationFailure::Magnitude { .. }));
    if only_magnitude || magnitude < STANDARD_GRAVITY * 0.5 {
        return "Keep the vehicle completely still while it is being sampled.".to_string();
    }

    match detect_orientation(accel, tolerances) {
        Some(actual) if actual != requested => format!(
            "Vehicle appears to be {} but {} was requested. {}",
            actual.name(),
            requested.name(),
            requested.instruction()
        ),
        _ => format!(
            "Vehicle is tilted about {:.0}° from {}. Square it up against a flat surface.",
            tilt_degrees(requested, accel, magnitude),
            requested.name()
        ),
    }
}

/// The position whose expected reading matches `accel`, if any
pub fn detect_orientation(accel: [f64; 3], tolerances: &Tolerances) -> Option<AccelPosition> {
    EXPECTED_ORIENTATIONS
        .iter()
        .find(|o| validate_axes(o, accel, tolerances))
        .map(|o| o.position)
}

fn validate_axes(expected: &ExpectedOrientation, accel: [f64; 3], tolerances: &Tolerances) -> bool {
    accel
        .iter()
        .zip(expected.gravity.iter())
        .all(|(measured, expected_g)| {
            (measured / STANDARD_GRAVITY - expected_g).abs() <= tolerances.axis
        })
}

/// Angle between the reading and the expected gravity direction
fn tilt_degrees(position: AccelPosition, accel: [f64; 3], magnitude: f64) -> f64 {
    if magnitude <= f64::EPSILON {
        return 90.0;
    }
    let expected = expected_orientation(position).gravity;
    let dot: f64 = accel.iter().zip(expected.iter()).map(|(a, e)| a * e).sum();
    (dot / magnitude).clamp(-1.0, 1.0).acos().to_degrees()
}

fn norm(v: [f64; 3]) -> f64 {
    v.iter().map(|c| c * c).sum::<f64>().sqrt()
}
