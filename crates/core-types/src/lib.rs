//! Vehicle-facing value types shared by every crate in the workspace.
//!
//! Nothing in here knows about calibration sessions or state machines. These
//! are the shapes in which the transport collaborator hands firmware traffic
//! to the engine, and in which the engine asks the transport to send
//! commands back.

use serde::{Deserialize, Serialize};

pub mod transport;
pub mod vehicle;

pub use transport::{Transport, TransportError};
pub use vehicle::{
    AckResult, CommandId, ImuSample, OutboundCommand, Severity, StatusLine, VehicleEvent,
    ACCELCAL_POS_FAILED, ACCELCAL_POS_SUCCESS,
};

/// Represents the direction of data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Rx, // Received from vehicle
    Tx, // Sent to vehicle
}

/// A raw chunk of link data (one or more protocol packets).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    /// The raw bytes comprising this frame.
    pub bytes: Vec<u8>,
    /// Timestamp in microseconds (relative to link start).
    pub timestamp_us: u64,
    /// Direction of the frame.
    pub channel: Channel,
}

impl Frame {
    pub fn new_rx(bytes: Vec<u8>, timestamp_us: u64) -> Self {
        Self {
            bytes,
            timestamp_us,
            channel: Channel::Rx,
        }
    }

    pub fn new_tx(bytes: Vec<u8>, timestamp_us: u64) -> Self {
        Self {
            bytes,
            timestamp_us,
            channel: Channel::Tx,
        }
    }
}
