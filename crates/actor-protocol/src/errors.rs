//! Error Handling Guidelines
//!
//! All error messages should follow this format:
//!
//! 1. **What failed**: Describe the operation that failed
//! 2. **Why it failed**: Provide the root cause if known
//! 3. **What to do**: Suggest user action when possible
//!
//! Examples:
//! - ✅ "Calibration cannot start: vehicle is armed. Disarm the vehicle and retry."
//! - ✅ "Calibration cannot start: heartbeat not yet stable (0.8s of 2.0s). Wait a moment and retry."
//! - ❌ "Precondition failed" (lacks context and action)
//! - ❌ "Error" (too vague)

use thiserror::Error;

/// Why the pre-condition gate refused to let a calibration start
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionFailure {
    #[error("Calibration cannot start: vehicle is not connected. Connect to the flight controller first.")]
    NotConnected,

    #[error("Calibration cannot start: no heartbeat received yet. Wait for the flight controller to report in.")]
    NoHeartbeat,

    #[error("Calibration cannot start: vehicle is armed. Disarm the vehicle and retry.")]
    Armed,

    #[error("Calibration cannot start: last heartbeat was {age_ms} ms ago (limit {limit_ms} ms). Check the telemetry link.")]
    HeartbeatTimedOut { age_ms: u64, limit_ms: u64 },

    #[error("Calibration cannot start: heartbeat not yet stable ({elapsed_ms} ms of {required_ms} ms). Wait a moment and retry.")]
    Unstable { elapsed_ms: u64, required_ms: u64 },
}

/// Outcome of waiting for a command acknowledgement that did not produce a result code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    #[error("No acknowledgement from flight controller after {attempts} attempt(s). Check the telemetry link.")]
    TimedOut { attempts: u32 },

    #[error("Acknowledgement wait cancelled")]
    Cancelled,

    #[error("Acknowledgement wait abandoned: command was superseded")]
    Abandoned,

    #[error("Failed to send command: {0}")]
    SendFailed(String),
}

/// Unified error type for calibration engine operations
#[derive(Error, Debug, Clone)]
pub enum CalibrationError {
    /// Safety gate refused the start
    #[error(transparent)]
    Precondition(#[from] PreconditionFailure),

    /// Start requested while a session is still running
    #[error("A calibration session is already active. Cancel it or wait for it to finish.")]
    SessionActive,

    /// State transition was rejected
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Actor received an unexpected message in current state
    #[error("Unexpected message in state {state}: {message}")]
    UnexpectedMessage { state: String, message: String },

    /// Communication channel closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Acknowledgement handling failed
    #[error(transparent)]
    Ack(#[from] AckError),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for CalibrationError {
    fn from(s: String) -> Self {
        CalibrationError::Other(s)
    }
}

impl From<&str> for CalibrationError {
    fn from(s: &str) -> Self {
        CalibrationError::Other(s.to_string())
    }
}

impl From<core_types::TransportError> for CalibrationError {
    fn from(e: core_types::TransportError) -> Self {
        CalibrationError::Transport(e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalibrationError::InvalidTransition("Idle → Sampling".into());
        assert_eq!(err.to_string(), "Invalid state transition: Idle → Sampling");
    }

    #[test]
    fn test_error_from_string() {
        let err: CalibrationError = "Test error".into();
        match err {
            CalibrationError::Other(msg) => assert_eq!(msg, "Test error"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_precondition_reason_is_specific() {
        let err: CalibrationError = PreconditionFailure::Armed.into();
        assert!(err.to_string().contains("armed"));
        assert!(err.to_string().contains("Disarm"));

        let err = PreconditionFailure::Unstable {
            elapsed_ms: 800,
            required_ms: 2000,
        };
        assert!(err.to_string().contains("800 ms of 2000 ms"));
    }

    #[test]
    fn test_ack_error_display() {
        let err = CalibrationError::from(AckError::TimedOut { attempts: 3 });
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_unexpected_message_error() {
        let err = CalibrationError::UnexpectedMessage {
            state: "Idle".into(),
            message: "ConfirmPosition".into(),
        };
        assert!(err.to_string().contains("Unexpected message in state Idle"));
    }
}
