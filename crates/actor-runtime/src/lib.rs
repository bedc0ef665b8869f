//! # Actor Runtime
//!
//! Provides the runtime infrastructure for the calibration actor system.
//!
//! This crate defines:
//! - **Actor trait**: Base trait for all actors with lifecycle methods
//! - **Channel management**: Type-safe message routing between actors
//! - **Supervision**: cancellable timeouts that post a message when they fire
//! - **Cancellation**: cooperative cancel flags for bounded waits
//!
//! ## Architecture
//!
//! The actor runtime follows these principles:
//! - **Zero shared state**: Each actor owns its data
//! - **Message passing**: Actors communicate via typed messages
//! - **Sequential processing**: Messages are handled one at a time
//! - **Failure isolation**: Actor errors don't crash the system
//!
//! ## Example
//!
//! ```ignore
//! use actor_runtime::{Actor, ChannelManager};
//!
//! let (manager, handles) = ChannelManager::new();
//!
//! let orchestrator = Orchestrator::new(config, handles.orchestrator_tx, handles.link_tx.clone(), probe);
//! tokio::spawn(orchestrator.run(handles.orchestrator_rx, handles.event_tx.clone()));
//!
//! manager.send_command(CalibrationCommand::Start { kind: CalibrationType::Gyroscope })?;
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod actor;
pub mod cancellation;
pub mod channels;
pub mod logging;
pub mod supervision;

pub use actor::Actor;
pub use cancellation::{
    create_cancel_future, create_cancel_future_with_interval, race_with_cancellation,
    sleep_with_cancellation, CancelFlag, DEFAULT_CANCEL_POLL_MS,
};
pub use channels::{ActorHandles, ChannelManager, LinkMessage, OrchestratorMessage};
pub use supervision::{spawn_timeout, TimeoutHandle};

// Used by the logging macros
#[doc(hidden)]
pub use tracing;
