//! Centralized configuration constants for the calibration engine
//!
//! These are the defaults behind [`crate::config::EngineConfig`]. Each value
//! is documented with what it bounds and the behaviour it is tuned against.
//!
//! **Before changing any constant:**
//! 1. Read its full documentation comment
//! 2. Understand the firmware/protocol basis for the value
//! 3. Run a full calibration against a real autopilot, not just the simulator
//! 4. Update documentation with your findings

/// Pre-condition gate timing
pub mod gate {
    /// Maximum age of the last heartbeat for a start to be allowed (milliseconds)
    ///
    /// **Value**: 5000ms
    ///
    /// **Rationale**: Autopilots send HEARTBEAT at 1 Hz. Five missed heartbeats
    /// means the link is gone or so lossy that command acknowledgements will
    /// not make it back either.
    pub const HEARTBEAT_TIMEOUT_MS: u64 = 5000;

    /// Time since the first heartbeat before a start is allowed (milliseconds)
    ///
    /// **Value**: 2000ms
    ///
    /// **Rationale**: Right after connect the autopilot may still be booting
    /// its sensor drivers. Two heartbeats of stable link is enough to know the
    /// vehicle is up, without waiting for GPS lock or a parameter download.
    pub const STABILITY_FLOOR_MS: u64 = 2000;
}

/// Command acknowledgement correlation
pub mod ack {
    /// Wait for one COMMAND_ACK before retrying (milliseconds)
    ///
    /// **Value**: 3000ms
    ///
    /// **Rationale**: Accelerometer and compass start acks come back within
    /// ~100ms on a direct USB link and within ~1s over SiK radios. Some
    /// firmware builds only ack a position confirm after sampling has begun.
    pub const TIMEOUT_MS: u64 = 3000;

    /// Total send attempts before the session ends as timed out
    ///
    /// **Value**: 3 attempts
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay of the linear backoff between attempts (milliseconds)
    ///
    /// **Value**: 500ms (500, 1000, 1500, ...)
    pub const BACKOFF_BASE_MS: u64 = 500;
}

/// IMU sample collection for local position validation
pub mod sampling {
    /// Rolling buffer bound (samples)
    ///
    /// **Value**: 50
    pub const WINDOW_CAPACITY: usize = 50;

    /// Samples needed before the window is averaged and validated
    ///
    /// **Value**: 10 (~200ms of RAW_IMU at 50 Hz)
    pub const MIN_SAMPLES: usize = 10;

    /// Minimum samples for a partial window to be evaluated at the ceiling
    ///
    /// **Value**: 3
    pub const MIN_PARTIAL_SAMPLES: usize = 3;

    /// Collection ceiling (milliseconds)
    ///
    /// **Value**: 2000ms
    ///
    /// **Rationale**: Telemetry streams at 10-50 Hz; two seconds covers a slow
    /// 4 Hz stream while keeping the confirm button responsive.
    pub const WINDOW_CEILING_MS: u64 = 2000;

    /// Poll interval of the collection ceiling timer (milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 100;
}

/// Firmware-silence completion fallback (gyro, baro, level only)
pub mod fallback {
    /// Wait for an explicit verdict before assuming success (milliseconds)
    ///
    /// **Value**: 10000ms
    ///
    /// **Rationale**: Gyro and baro calibrations finish in 2-5s. Several
    /// firmware versions send no STATUSTEXT at all on success, only on
    /// failure, so silence past this ceiling is treated as completion.
    pub const SILENCE_CEILING_MS: u64 = 10_000;

    /// Poll interval of the fallback timer (milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 250;
}

/// Heartbeat watchdog while a session is active
pub mod watchdog {
    /// No heartbeat for this long ends the session as timed out (milliseconds)
    ///
    /// **Value**: 5000ms (same bound as the start gate)
    pub const HEARTBEAT_LOSS_MS: u64 = 5000;

    /// Poll interval of the watchdog timer (milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 250;
}

/// Orientation plausibility thresholds
pub mod physics {
    /// Standard gravity (m/s²)
    pub const STANDARD_GRAVITY: f64 = 9.80665;

    /// Per-axis tolerance as a fraction of 1 g
    ///
    /// **Value**: 0.25
    ///
    /// **Rationale**: A vehicle resting on a rough surface or a non-square
    /// frame tilts by up to ~15°, which moves ~0.26 g off-axis at worst.
    /// Anything beyond that is a different face, not a tilted one.
    pub const AXIS_TOLERANCE: f64 = 0.25;

    /// Magnitude tolerance as a fraction of 1 g
    ///
    /// **Value**: 0.15
    ///
    /// **Rationale**: An uncalibrated MEMS accelerometer can read up to ~10%
    /// off in scale. Larger deviations mean the vehicle is moving.
    pub const MAGNITUDE_TOLERANCE: f64 = 0.15;
}
