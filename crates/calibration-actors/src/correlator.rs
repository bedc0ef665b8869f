//! Acknowledgement correlator
//!
//! Matches an outstanding command to its asynchronous COMMAND_ACK. One
//! pending entry per command identifier; registering the same identifier
//! again supersedes the previous waiter, which then resolves as
//! [`AckError::Abandoned`].
//!
//! Waiters remove their own entry when dropped, so a caller that gives up
//! (cancellation, session end) never leaves a stale waiter behind.

use crate::config::RetryPolicy;
use actor_protocol::AckError;
use actor_runtime::{actor_debug, actor_warn, race_with_cancellation, sleep_with_cancellation, CancelFlag};
use core_types::{AckResult, CommandId};
use futures_channel::oneshot;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Bookkeeping for one command awaiting acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: CommandId,
    pub submitted_at: Instant,
    pub deadline: Instant,
    /// 1-based send attempt
    pub attempt: u32,
    ticket: u64,
}

struct Slot {
    info: PendingCommand,
    tx: oneshot::Sender<AckResult>,
}

#[derive(Clone, Default)]
pub struct AckCorrelator {
    pending: Arc<Mutex<HashMap<CommandId, Slot>>>,
    next_ticket: Arc<AtomicU64>,
}

impl std::fmt::Debug for AckCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckCorrelator")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl AckCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the acknowledgement of `command`.
    ///
    /// Call before sending so a fast acknowledgement cannot be missed.
    pub fn register(&self, command: CommandId, timeout: Duration, attempt: u32) -> AckWaiter {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let submitted_at = Instant::now();
        let deadline = submitted_at + timeout;
        let (tx, rx) = oneshot::channel();
        let info = PendingCommand {
            command,
            submitted_at,
            deadline,
            attempt,
            ticket,
        };

        if self.pending.lock().insert(command, Slot { info, tx }).is_some() {
            actor_debug!("Correlator: {:?} re-registered, previous waiter abandoned", command);
        }

        AckWaiter {
            correlator: self.clone(),
            command,
            ticket,
            deadline,
            attempt,
            rx,
        }
    }

    /// Deliver an acknowledgement. Returns false if nothing was waiting for it.
    pub fn resolve(&self, command: CommandId, result: AckResult) -> bool {
        let Some(slot) = self.pending.lock().remove(&command) else {
            return false;
        };
        // Receiver may already be gone if the waiter was dropped mid-flight
        slot.tx.send(result).is_ok()
    }

    /// Drop the pending entry for `command`; its waiter resolves as abandoned
    pub fn abandon(&self, command: CommandId) -> bool {
        self.pending.lock().remove(&command).is_some()
    }

    pub fn abandon_all(&self) {
        self.pending.lock().clear();
    }

    pub fn pending(&self, command: CommandId) -> Option<PendingCommand> {
        self.pending.lock().get(&command).map(|slot| slot.info)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn remove_if_current(&self, command: CommandId, ticket: u64) {
        let mut pending = self.pending.lock();
        if pending
            .get(&command)
            .is_some_and(|slot| slot.info.ticket == ticket)
        {
            pending.remove(&command);
        }
    }
}

/// Waits for one registered acknowledgement
pub struct AckWaiter {
    correlator: AckCorrelator,
    command: CommandId,
    ticket: u64,
    deadline: Instant,
    attempt: u32,
    rx: oneshot::Receiver<AckResult>,
}

impl AckWaiter {
    pub fn command(&self) -> CommandId {
        self.command
    }

    /// Wait until the acknowledgement arrives, the deadline passes, or
    /// `cancel` is set.
    pub async fn wait(mut self, cancel: &CancelFlag) -> Result<AckResult, AckError> {
        let deadline = self.deadline;
        let outcome =
            race_with_cancellation(tokio::time::timeout_at(deadline, &mut self.rx), cancel.clone())
                .await;

        match outcome {
            None => Err(AckError::Cancelled),
            Some(Err(_elapsed)) => Err(AckError::TimedOut {
                attempts: self.attempt,
            }),
            Some(Ok(Ok(result))) => Ok(result),
            Some(Ok(Err(_canceled))) => Err(AckError::Abandoned),
        }
    }
}

impl Drop for AckWaiter {
    fn drop(&mut self) {
        self.correlator.remove_if_current(self.command, self.ticket);
    }
}

/// Send a command and wait for its acknowledgement, retrying on timeout.
///
/// `send` is called with the 1-based attempt number. Between attempts the
/// policy's backoff delay is applied. A send error or any acknowledgement
/// (accepted or not) ends the loop immediately; only silence is retried.
pub async fn send_with_retry<F, Fut>(
    correlator: &AckCorrelator,
    command: CommandId,
    policy: &RetryPolicy,
    cancel: &CancelFlag,
    mut send: F,
) -> Result<AckResult, AckError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(AckError::Cancelled);
        }

        let waiter = correlator.register(command, policy.ack_timeout(), attempt);
        send(attempt).await.map_err(AckError::SendFailed)?;

        match waiter.wait(cancel).await {
            Err(AckError::TimedOut { .. }) => {
                actor_warn!(
                    "No acknowledgement for {:?} (attempt {}/{})",
                    command,
                    attempt,
                    max_attempts
                );
                if attempt < max_attempts
                    && !sleep_with_cancellation(policy.delay_after(attempt), cancel.clone()).await
                {
                    return Err(AckError::Cancelled);
                }
            }
            other => return other,
        }
    }

    Err(AckError::TimedOut {
        attempts: max_attempts,
    })
}
