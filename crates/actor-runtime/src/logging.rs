/// Centralized logging macros for actor system
///
/// These macros provide consistent logging across all actors. They forward
/// to `tracing`, so whichever subscriber the binary installs decides the
/// output format and filtering.
///
/// Log debug-level message
///
/// Use for state transitions and per-message tracing
///
/// # Example
/// ```
/// use actor_runtime::actor_debug;
/// actor_debug!("Orchestrator: {:?} → {:?}", "Idle", "CommandPending");
/// ```
#[macro_export]
macro_rules! actor_debug {
    ($($arg:tt)*) => {
        $crate::tracing::debug!($($arg)*)
    };
}

/// Log info-level message
///
/// Use for important state changes and user-facing events
#[macro_export]
macro_rules! actor_info {
    ($($arg:tt)*) => {
        $crate::tracing::info!($($arg)*)
    };
}

/// Log warning-level message
///
/// Use for recoverable errors and unexpected conditions
#[macro_export]
macro_rules! actor_warn {
    ($($arg:tt)*) => {
        $crate::tracing::warn!($($arg)*)
    };
}

/// Log error-level message
///
/// Use for critical errors that should always be visible
#[macro_export]
macro_rules! actor_error {
    ($($arg:tt)*) => {
        $crate::tracing::error!($($arg)*)
    };
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    #[test]
    fn test_logging_macros_compile() {
        actor_debug!("test debug");
        actor_info!("test info");
        actor_warn!("test warn");
        actor_error!("test error");
    }

    #[test]
    fn test_logging_with_format_args() {
        actor_debug!("Orchestrator: {} → {}", "Sampling", "Completed");
        actor_info!("Position {} accepted", "LEVEL");
        actor_warn!("Retry attempt {}/{}", 1, 3);
        actor_error!("Failed to send command: {}", "link down");
    }
}
