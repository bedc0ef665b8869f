use actor_protocol::{
    CalibrationCommand, CalibrationResult, CalibrationState, CalibrationType, SessionSnapshot,
    LOCK_FLAG,
};
use actor_runtime::OrchestratorMessage;
use futures::SinkExt;
use futures_channel::{mpsc, oneshot};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lock-free mirror of the orchestrator state for UI reads
///
/// Encoding: low 7 bits are the state, [`LOCK_FLAG`] is set while a session
/// holds the pre-condition gate.
#[derive(Debug, Clone, Default)]
pub struct StateProbe(Arc<AtomicU8>);

impl StateProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, state: CalibrationState) {
        let mut value = state.to_u8();
        if state.is_active() {
            value |= LOCK_FLAG;
        }
        self.0.store(value, Ordering::Release);
    }

    pub fn state(&self) -> CalibrationState {
        CalibrationState::from_u8(self.0.load(Ordering::Acquire)).unwrap_or(CalibrationState::Idle)
    }

    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Acquire) & LOCK_FLAG != 0
    }
}

/// Caller-facing API of a running orchestrator
///
/// Every call is a message into the orchestrator mailbox; the bool results
/// come back once the orchestrator has applied the command.
#[derive(Clone)]
pub struct CalibrationHandle {
    tx: mpsc::Sender<OrchestratorMessage>,
    probe: StateProbe,
}

impl CalibrationHandle {
    pub fn new(tx: mpsc::Sender<OrchestratorMessage>, probe: StateProbe) -> Self {
        Self { tx, probe }
    }

    /// False if pre-conditions are unmet or a session is active
    pub async fn start(&self, kind: CalibrationType) -> bool {
        self.request(CalibrationCommand::Start { kind }).await
    }

    /// False unless the engine is waiting for the user to confirm a position
    pub async fn confirm_current_position(&self) -> bool {
        self.request(CalibrationCommand::ConfirmPosition).await
    }

    pub async fn cancel(&self) -> bool {
        self.request(CalibrationCommand::Cancel).await
    }

    /// Reboot the autopilot. Refused while a session is active or the vehicle is armed.
    pub async fn reboot(&self) -> bool {
        self.request(CalibrationCommand::Reboot).await
    }

    /// Copy of the current (or last finished) session
    pub async fn diagnostics(&self) -> Option<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        let mut tx = self.tx.clone();
        if tx.send(OrchestratorMessage::Snapshot { reply }).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Abort the active session from outside the engine
    pub fn abort(&self, result: CalibrationResult, reason: impl Into<String>) -> bool {
        self.tx
            .clone()
            .try_send(OrchestratorMessage::Abort {
                result,
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Current state without a round trip through the mailbox
    pub fn state(&self) -> CalibrationState {
        self.probe.state()
    }

    pub fn is_session_active(&self) -> bool {
        self.probe.is_locked()
    }

    async fn request(&self, cmd: CalibrationCommand) -> bool {
        let (reply, rx) = oneshot::channel();
        let mut tx = self.tx.clone();
        if tx
            .send(OrchestratorMessage::Command {
                cmd,
                reply: Some(reply),
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}
