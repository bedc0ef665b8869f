//! # Link MAVLink
//!
//! MAVLink plumbing between the calibration engine and a vehicle.
//!
//! - **MavlinkDecoder**: byte stream → [`core_types::VehicleEvent`]
//! - **MavlinkEncoder**: [`core_types::OutboundCommand`] → COMMAND_LONG frames
//! - **LinkActor**: writes engine commands through a [`core_types::Transport`]
//! - **pump_inbound**: reads the same transport and feeds the orchestrator
//! - **SimulatedFirmware**: an in-memory autopilot for tests and demos

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod link_actor;
pub mod sim;

pub use decoder::{translate, DecoderStats, MavlinkDecoder};
pub use encoder::{mav_cmd, statustext, MavlinkEncoder};
pub use error::LinkError;
pub use link_actor::{pump_inbound, LinkActor};
pub use sim::{ReceivedCommand, SimBehavior, SimulatedFirmware};
