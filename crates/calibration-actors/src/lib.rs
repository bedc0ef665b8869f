//! # Calibration Actors
//!
//! Core engine for ground-side sensor calibration.
//!
//! ## Actors
//!
//! - **Orchestrator**: Owns the session, drives the state machine and decides the result
//!
//! ## Components
//!
//! - **PreconditionGate**: Refuses starts on an unsafe or unstable vehicle
//! - **AckCorrelator**: Matches command acknowledgements to waiting commands
//! - **Classifier**: Turns firmware status text into calibration meaning
//! - **Validator**: Checks accelerometer readings against the requested position
//! - **AbortMonitor**: Ends sessions on arming, link loss or heartbeat loss
//! - **CalibrationHandle**: Caller-facing API over the orchestrator mailbox

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod abort_monitor;
pub mod backoff;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod correlator;
pub mod gate;
pub mod handle;
pub mod orchestrator;
pub mod sample_window;
pub mod validator;

pub use abort_monitor::{AbortMonitor, AbortReason};
pub use backoff::BackoffStrategy;
pub use classifier::{classify, classify_text, Classification};
pub use config::{
    EngineConfig, FallbackConfig, GateConfig, RetryPolicy, SamplingConfig, Tolerances,
    WatchdogConfig,
};
pub use correlator::{send_with_retry, AckCorrelator, AckWaiter, PendingCommand};
pub use gate::PreconditionGate;
pub use handle::{CalibrationHandle, StateProbe};
pub use orchestrator::Orchestrator;
pub use sample_window::SampleWindow;
pub use validator::{detect_orientation, validate_position, ValidationFailure, ValidationReport};
