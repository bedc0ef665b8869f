//! Engine configuration
//!
//! Every field defaults to the matching value in [`crate::constants`]. A TOML
//! document only needs the fields it overrides:
//!
//! ```toml
//! [retry]
//! max_attempts = 5
//! backoff = "exponential"
//!
//! [fallback]
//! silence_ceiling_ms = 15000
//! ```

use crate::backoff::{calculate_retry_delay, BackoffStrategy};
use crate::constants;
use actor_protocol::CalibrationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gate: GateConfig,
    pub retry: RetryPolicy,
    pub sampling: SamplingConfig,
    pub fallback: FallbackConfig,
    pub watchdog: WatchdogConfig,
    pub tolerances: Tolerances,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub heartbeat_timeout_ms: u64,
    pub stability_floor_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: constants::gate::HEARTBEAT_TIMEOUT_MS,
            stability_floor_ms: constants::gate::STABILITY_FLOOR_MS,
        }
    }
}

impl GateConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn stability_floor(&self) -> Duration {
        Duration::from_millis(self.stability_floor_ms)
    }
}

/// Acknowledgement wait and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub ack_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ack_timeout_ms: constants::ack::TIMEOUT_MS,
            max_attempts: constants::ack::MAX_ATTEMPTS,
            backoff: BackoffStrategy::Linear,
            backoff_base_ms: constants::ack::BACKOFF_BASE_MS,
        }
    }
}

impl RetryPolicy {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Delay after `attempt` timed out
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_retry_delay(
            self.backoff,
            self.backoff_base_ms,
            attempt,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub window_capacity: usize,
    pub min_samples: usize,
    pub min_partial_samples: usize,
    pub window_ceiling_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            window_capacity: constants::sampling::WINDOW_CAPACITY,
            min_samples: constants::sampling::MIN_SAMPLES,
            min_partial_samples: constants::sampling::MIN_PARTIAL_SAMPLES,
            window_ceiling_ms: constants::sampling::WINDOW_CEILING_MS,
            poll_interval_ms: constants::sampling::POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub silence_ceiling_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            silence_ceiling_ms: constants::fallback::SILENCE_CEILING_MS,
            poll_interval_ms: constants::fallback::POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub heartbeat_loss_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            heartbeat_loss_ms: constants::watchdog::HEARTBEAT_LOSS_MS,
            poll_interval_ms: constants::watchdog::POLL_INTERVAL_MS,
        }
    }
}

/// Fractions of 1 g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub axis: f64,
    pub magnitude: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            axis: constants::physics::AXIS_TOLERANCE,
            magnitude: constants::physics::MAGNITUDE_TOLERANCE,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self, CalibrationError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| CalibrationError::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, CalibrationError> {
        toml::to_string_pretty(self).map_err(|e| CalibrationError::Config(e.to_string()))
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let fail = |msg: &str| Err(CalibrationError::Config(msg.to_string()));

        if self.gate.heartbeat_timeout_ms == 0 {
            return fail("gate.heartbeat_timeout_ms must be greater than 0");
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1");
        }
        if self.retry.ack_timeout_ms == 0 {
            return fail("retry.ack_timeout_ms must be greater than 0");
        }
        if self.sampling.min_samples == 0 {
            return fail("sampling.min_samples must be at least 1");
        }
        if self.sampling.window_capacity < self.sampling.min_samples {
            return fail("sampling.window_capacity must be at least sampling.min_samples");
        }
        if self.sampling.min_partial_samples == 0
            || self.sampling.min_partial_samples > self.sampling.min_samples
        {
            return fail("sampling.min_partial_samples must be between 1 and sampling.min_samples");
        }
        if self.sampling.poll_interval_ms == 0
            || self.fallback.poll_interval_ms == 0
            || self.watchdog.poll_interval_ms == 0
        {
            return fail("poll intervals must be greater than 0");
        }
        if self.watchdog.heartbeat_loss_ms == 0 {
            return fail("watchdog.heartbeat_loss_ms must be greater than 0");
        }
        let valid_fraction = |v: f64| v.is_finite() && v > 0.0 && v < 1.0;
        if !valid_fraction(self.tolerances.axis) || !valid_fraction(self.tolerances.magnitude) {
            return fail("tolerances must be fractions between 0 and 1");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.gate.heartbeat_timeout_ms, 5000);
        assert_eq!(config.gate.stability_floor_ms, 2000);
        assert_eq!(config.fallback.silence_ceiling_ms, 10_000);
        assert_eq!(config.sampling.window_capacity, 50);
        assert_eq!(config.retry.backoff, BackoffStrategy::Linear);
        assert_eq!(config.tolerances.axis, 0.25);
        assert_eq!(config.tolerances.magnitude, 0.15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            [retry]
            max_attempts = 5
            backoff = "exponential"

            [fallback]
            silence_ceiling_ms = 15000
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.fallback.silence_ceiling_ms, 15000);
        // Untouched sections keep their defaults
        assert_eq!(config.retry.ack_timeout_ms, 3000);
        assert_eq!(config.gate, GateConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml_str("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));

        let err = EngineConfig::from_toml_str("[tolerances]\naxis = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("tolerances"));

        let err = EngineConfig::from_toml_str("[retry]\nmax_attempts = \"many\"\n").unwrap_err();
        assert!(matches!(err, CalibrationError::Config(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_retry_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
    }
}
