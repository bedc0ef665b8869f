//! Cancellation utilities for interruptible actor operations
//!
//! Cancellation is cooperative: long waits poll a shared flag at a fixed
//! interval and give up as soon as it is set.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default poll interval for cancellation checks (50ms)
pub const DEFAULT_CANCEL_POLL_MS: u64 = 50;

/// Shared cancellation flag
///
/// Clones share the same flag. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Creates a future that completes when the flag is set
///
/// Polls the flag every 50ms by default for responsive cancellation.
pub async fn create_cancel_future(flag: CancelFlag) {
    create_cancel_future_with_interval(flag, DEFAULT_CANCEL_POLL_MS).await
}

/// Creates a cancel future with custom poll interval
pub async fn create_cancel_future_with_interval(flag: CancelFlag, poll_interval_ms: u64) {
    let interval = Duration::from_millis(poll_interval_ms.max(1));
    loop {
        if flag.is_cancelled() {
            break;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Races a future against cancellation, returns None if cancelled
///
/// # Example
/// ```ignore
/// match race_with_cancellation(ticket.wait(), flag.clone()).await {
///     Some(Ok(result)) => { /* acknowledged */ }
///     Some(Err(e)) => { /* timed out */ }
///     None => { /* cancelled by user */ }
/// }
/// ```
pub async fn race_with_cancellation<T, F>(fut: F, cancel_flag: CancelFlag) -> Option<T>
where
    F: Future<Output = T>,
{
    use futures::future::{select, Either};

    if cancel_flag.is_cancelled() {
        return None;
    }

    let cancel_fut = create_cancel_future(cancel_flag);

    match select(Box::pin(fut), Box::pin(cancel_fut)).await {
        Either::Left((result, _)) => Some(result),
        Either::Right(_) => None,
    }
}

/// Sleep that wakes early on cancellation. Returns false if cancelled.
pub async fn sleep_with_cancellation(duration: Duration, cancel_flag: CancelFlag) -> bool {
    race_with_cancellation(tokio::time::sleep(duration), cancel_flag)
        .await
        .is_some()
}
