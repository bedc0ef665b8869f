/// Supervision utilities for actor operations
///
/// Provides timeout-based supervision so an actor waiting on the outside
/// world (firmware, telemetry) always gets control back after a bounded time.
use crate::cancellation::CancelFlag;
use futures_channel::mpsc;
use std::time::Duration;

/// Handle to cancel a timeout operation
///
/// When dropped or explicitly cancelled, the timeout task will not send
/// the timeout message, preventing spurious timeouts after operations complete.
pub struct TimeoutHandle {
    cancelled: CancelFlag,
}

impl TimeoutHandle {
    fn new() -> Self {
        Self {
            cancelled: CancelFlag::new(),
        }
    }

    /// Cancel the timeout, preventing it from firing
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }
}

impl Drop for TimeoutHandle {
    fn drop(&mut self) {
        // Auto-cancel when handle is dropped
        self.cancel();
    }
}

impl std::fmt::Debug for TimeoutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Spawn a timeout task that posts `message` to `tx` after `timeout`
///
/// The task sleeps in steps of at most `check_interval` and checks the
/// cancellation flag at every step, so a cancelled timeout exits early.
/// Must be called from within a tokio runtime.
pub fn spawn_timeout<M>(
    tx: mpsc::Sender<M>,
    message: M,
    timeout: Duration,
    check_interval: Duration,
) -> TimeoutHandle
where
    M: Send + 'static,
{
    let handle = TimeoutHandle::new();
    let cancel_flag = handle.cancelled.clone();
    let check_interval = check_interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut tx = tx;

        loop {
            // Check if cancelled (fast exit path)
            if cancel_flag.is_cancelled() {
                return;
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }

            let remaining = deadline - now;
            tokio::time::sleep(remaining.min(check_interval)).await;
        }

        // Final check before sending timeout message
        if !cancel_flag.is_cancelled() {
            if let Err(e) = tx.try_send(message) {
                crate::actor_warn!("Timeout message dropped: {}", e);
            }
        }
    });

    handle
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use futures::stream::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires() {
        let (tx, mut rx) = mpsc::channel(100);

        let start = tokio::time::Instant::now();
        // Keep handle alive so timeout can fire
        let _handle = spawn_timeout(
            tx,
            "test_operation",
            Duration::from_secs(10),
            Duration::from_millis(500),
        );

        let msg = rx.next().await.unwrap();
        assert_eq!(msg, "test_operation");
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancelled_on_drop() {
        let (tx, mut rx) = mpsc::channel::<&'static str>(100);

        {
            let _handle = spawn_timeout(
                tx,
                "test_operation",
                Duration::from_secs(1),
                Duration::from_millis(100),
            );
            // Handle dropped here
        }

        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Task exited without sending; its sender is gone
        assert!(rx.try_next().is_ok_and(|msg| msg.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_cancel() {
        let (tx, mut rx) = mpsc::channel::<u32>(100);
        let handle = spawn_timeout(tx, 7, Duration::from_secs(2), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.cancel();
        assert!(handle.is_cancelled());
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(rx.try_next().is_ok_and(|msg| msg.is_none()));
    }
}
