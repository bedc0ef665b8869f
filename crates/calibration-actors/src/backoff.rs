use serde::{Deserialize, Serialize};

/// How the delay between command retries grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// base * attempt
    #[default]
    Linear,
    /// base * 2^(attempt - 1)
    Exponential,
}

/// Calculates the retry delay in milliseconds for a given attempt number.
///
/// - Linear: `base_ms * attempt` (500, 1000, 1500, ...)
/// - Exponential: `base_ms * 2^(attempt - 1)` (500, 1000, 2000, ...)
///
/// # Arguments
/// * `strategy` - Growth curve
/// * `base_ms` - Delay after the first failed attempt
/// * `attempt` - The attempt that just failed (1-based)
///
/// # Returns
/// Delay in milliseconds, 0 for attempt 0
pub fn calculate_retry_delay(strategy: BackoffStrategy, base_ms: u64, attempt: u32) -> u64 {
    if attempt == 0 {
        return 0;
    }

    match strategy {
        BackoffStrategy::Linear => base_ms.saturating_mul(u64::from(attempt)),
        BackoffStrategy::Exponential => {
            let shift = attempt.saturating_sub(1).min(30); // Prevent overflow of u64 shift
            base_ms.saturating_mul(1u64 << shift)
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        assert_eq!(calculate_retry_delay(BackoffStrategy::Linear, 500, 1), 500);
        assert_eq!(calculate_retry_delay(BackoffStrategy::Linear, 500, 2), 1000);
        assert_eq!(calculate_retry_delay(BackoffStrategy::Linear, 500, 3), 1500);
    }

    #[test]
    fn test_exponential_backoff() {
        // Attempt 1: 100ms * 2^0 = 100
        assert_eq!(calculate_retry_delay(BackoffStrategy::Exponential, 100, 1), 100);
        assert_eq!(calculate_retry_delay(BackoffStrategy::Exponential, 100, 3), 400);
        // Attempt 10: 100ms * 2^9 = 51200
        assert_eq!(
            calculate_retry_delay(BackoffStrategy::Exponential, 100, 10),
            51200
        );
    }

    #[test]
    fn test_zero_attempt() {
        assert_eq!(calculate_retry_delay(BackoffStrategy::Linear, 500, 0), 0);
        assert_eq!(calculate_retry_delay(BackoffStrategy::Exponential, 500, 0), 0);
    }

    #[test]
    fn test_safety_overflow() {
        // Should not panic on high numbers
        assert!(calculate_retry_delay(BackoffStrategy::Exponential, u64::MAX, 100) > 0);
        assert!(calculate_retry_delay(BackoffStrategy::Linear, u64::MAX, u32::MAX) > 0);
    }
}
