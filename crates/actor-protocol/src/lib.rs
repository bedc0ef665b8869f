//! # Actor Protocol
//!
//! Type-safe message definitions for the calibration engine.
//!
//! This crate defines the caller-facing protocol of the calibration
//! orchestrator. It has no runtime dependencies (no tokio, no MAVLink),
//! making it fully testable in plain Rust.
//!
//! ## Architecture
//!
//! - **CalibrationCommand**: Messages from caller → Orchestrator
//! - **CalibrationEvent**: Messages from Orchestrator → caller
//! - **CalibrationState**: FSM state machine (pure logic, no side effects)
//! - **CalibrationSession**: session record, diagnostics and per-position attempts
//!
//! ## Message Flow
//!
//! ```text
//! UI → CalibrationCommand → Orchestrator → OutboundCommand → Link
//!                               ↓    ↑
//!              CalibrationEvent → UI    VehicleEvent ← Link
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod calibration;
pub mod errors;
pub mod messages;
pub mod session;
pub mod state;

pub use calibration::{AccelPosition, CalibrationResult, CalibrationType};
pub use errors::{AckError, CalibrationError, PreconditionFailure};
pub use messages::{CalibrationCommand, CalibrationEvent, StepInstruction};
pub use session::{
    CalibrationSession, DiagnosticEntry, LocalValidationOutcome, PositionAttemptRecord,
    SessionSnapshot,
};
pub use state::{CalibrationState, LOCK_FLAG, STATE_MASK};
