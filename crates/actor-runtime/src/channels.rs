use actor_protocol::{
    AckError, CalibrationCommand, CalibrationEvent, CalibrationResult, SessionSnapshot,
};
use core_types::{AckResult, OutboundCommand, VehicleEvent};
use futures_channel::{mpsc, oneshot};

/// Message types for each actor in the system
///
/// Everything that may mutate a calibration session arrives here, so the
/// orchestrator mailbox is the single serialization point for the session.
pub enum OrchestratorMessage {
    /// Command from the caller, with an optional reply for the bool result
    Command {
        cmd: CalibrationCommand,
        reply: Option<oneshot::Sender<bool>>,
    },

    /// Inbound event from the link
    Vehicle(VehicleEvent),

    /// Result of an acknowledged command (posted by the retry task)
    AckOutcome {
        session: u64,
        /// Operation sequence number to match against the expected operation
        ticket: u64,
        outcome: Result<AckResult, AckError>,
    },

    /// IMU sample collection window reached its ceiling
    SampleWindowClosed { session: u64, token: u64 },

    /// Single-step calibration saw no firmware verdict within the fallback window
    SilenceWindowElapsed { session: u64 },

    /// No heartbeat within the watchdog window
    HeartbeatLost { session: u64 },

    /// External abort request (e.g. a vehicle monitor outside the engine)
    Abort {
        result: CalibrationResult,
        reason: String,
    },

    /// Diagnostics snapshot request
    Snapshot {
        reply: oneshot::Sender<Option<SessionSnapshot>>,
    },
}

// Manual Debug implementation to skip the reply channels
impl std::fmt::Debug for OrchestratorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command { cmd, reply } => f
                .debug_struct("Command")
                .field("cmd", cmd)
                .field("wants_reply", &reply.is_some())
                .finish(),
            Self::Vehicle(event) => f.debug_tuple("Vehicle").field(event).finish(),
            Self::AckOutcome {
                session,
                ticket,
                outcome,
            } => f
                .debug_struct("AckOutcome")
                .field("session", session)
                .field("ticket", ticket)
                .field("outcome", outcome)
                .finish(),
            Self::SampleWindowClosed { session, token } => f
                .debug_struct("SampleWindowClosed")
                .field("session", session)
                .field("token", token)
                .finish(),
            Self::SilenceWindowElapsed { session } => f
                .debug_struct("SilenceWindowElapsed")
                .field("session", session)
                .finish(),
            Self::HeartbeatLost { session } => f
                .debug_struct("HeartbeatLost")
                .field("session", session)
                .finish(),
            Self::Abort { result, reason } => f
                .debug_struct("Abort")
                .field("result", result)
                .field("reason", reason)
                .finish(),
            Self::Snapshot { .. } => write!(f, "Snapshot"),
        }
    }
}

/// Messages for the link actor (outbound half of the transport)
#[derive(Debug, Clone, PartialEq)]
pub enum LinkMessage {
    /// Encode and write one command
    Send { command: OutboundCommand },
    /// Close the transport
    Close,
}

/// Handles for spawning actors
pub struct ActorHandles {
    pub orchestrator_rx: mpsc::Receiver<OrchestratorMessage>,
    /// Orchestrator's own sender, for timers and retry tasks
    pub orchestrator_tx: mpsc::Sender<OrchestratorMessage>,
    pub link_rx: mpsc::Receiver<LinkMessage>,
    pub link_tx: mpsc::Sender<LinkMessage>,
    pub event_tx: mpsc::Sender<CalibrationEvent>,
}

/// Channel manager for actor communication
///
/// Owns the caller's side of every channel: senders into the actors and the
/// receiver of caller notifications.
pub struct ChannelManager {
    // Bounded channels to prevent memory exhaustion under high load
    orchestrator_tx: mpsc::Sender<OrchestratorMessage>,
    link_tx: mpsc::Sender<LinkMessage>,

    // Event receiver (NOT cloned, replaced with dummy in Clone impl)
    // Note: Clone creates a disconnected receiver - use take_event_receiver() before cloning
    event_rx: mpsc::Receiver<CalibrationEvent>,
}

impl Clone for ChannelManager {
    fn clone(&self) -> Self {
        let (_dummy_tx, dummy_rx) = mpsc::channel(1);
        Self {
            orchestrator_tx: self.orchestrator_tx.clone(),
            link_tx: self.link_tx.clone(),
            event_rx: dummy_rx,
        }
    }
}

impl ChannelManager {
    /// Default capacities:
    /// - orchestrator: 512 - commands plus telemetry (IMU at up to ~50 Hz)
    /// - link: 64 - outbound commands (low frequency)
    /// - event: 1024 - caller notifications
    pub fn new() -> (Self, ActorHandles) {
        Self::with_capacity(512, 64, 1024)
    }

    pub fn with_capacity(
        orchestrator_capacity: usize,
        link_capacity: usize,
        event_capacity: usize,
    ) -> (Self, ActorHandles) {
        let (orchestrator_tx, orchestrator_rx) = mpsc::channel(orchestrator_capacity);
        let (link_tx, link_rx) = mpsc::channel(link_capacity);
        let (event_tx, event_rx) = mpsc::channel(event_capacity);

        let handles = ActorHandles {
            orchestrator_rx,
            orchestrator_tx: orchestrator_tx.clone(),
            link_rx,
            link_tx: link_tx.clone(),
            event_tx,
        };

        let manager = Self {
            orchestrator_tx,
            link_tx,
            event_rx,
        };

        (manager, handles)
    }

    /// Send a caller command without waiting for its result
    pub fn send_command(&self, cmd: CalibrationCommand) -> Result<(), String> {
        self.orchestrator_tx
            .clone()
            .try_send(OrchestratorMessage::Command { cmd, reply: None })
            .map_err(|e| {
                if e.is_full() {
                    "System overloaded: Too many pending commands. Please slow down.".to_string()
                } else {
                    "System error: Calibration engine unavailable. Restart the application."
                        .to_string()
                }
            })
    }

    /// Forward one inbound vehicle event to the orchestrator
    pub fn send_vehicle_event(&self, event: VehicleEvent) -> Result<(), String> {
        self.orchestrator_tx
            .clone()
            .try_send(OrchestratorMessage::Vehicle(event))
            .map_err(|e| {
                if e.is_full() {
                    "Telemetry dropped: calibration engine queue full.".to_string()
                } else {
                    "Calibration engine channel closed".to_string()
                }
            })
    }

    /// Get mutable reference to event receiver
    pub fn event_receiver(&mut self) -> &mut mpsc::Receiver<CalibrationEvent> {
        &mut self.event_rx
    }

    /// Take ownership of event receiver
    ///
    /// The receiver should only be taken once; later calls return a closed one.
    pub fn take_event_receiver(&mut self) -> mpsc::Receiver<CalibrationEvent> {
        let (_new_tx, new_rx) = mpsc::channel(1);
        std::mem::replace(&mut self.event_rx, new_rx)
    }

    pub fn orchestrator_sender(&self) -> mpsc::Sender<OrchestratorMessage> {
        self.orchestrator_tx.clone()
    }

    pub fn link_sender(&self) -> mpsc::Sender<LinkMessage> {
        self.link_tx.clone()
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new().0
    }
}
