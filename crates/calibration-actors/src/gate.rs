//! Pre-condition gate
//!
//! Decides whether a calibration may start. The threshold is deliberately
//! relaxed: connected, at least one heartbeat, disarmed, heartbeat fresh, and
//! a short stability floor since the first heartbeat. GPS lock, parameter
//! download and subsystem health are not required.

use crate::config::GateConfig;
use actor_protocol::PreconditionFailure;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct PreconditionGate {
    config: GateConfig,
    connected: bool,
    armed: bool,
    heartbeat_count: u64,
    first_heartbeat: Option<Instant>,
    last_heartbeat: Option<Instant>,
    /// Session currently holding the gate
    held_by: Option<u64>,
}

impl PreconditionGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            connected: false,
            armed: false,
            heartbeat_count: 0,
            first_heartbeat: None,
            last_heartbeat: None,
            held_by: None,
        }
    }

    pub fn on_connected(&mut self) {
        self.connected = true;
    }

    /// Link lost: back to the zero-heartbeat state
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.armed = false;
        self.heartbeat_count = 0;
        self.first_heartbeat = None;
        self.last_heartbeat = None;
        self.held_by = None;
    }

    /// A heartbeat proves the link is up even if no Connected event was seen
    pub fn on_heartbeat(&mut self, armed: bool, now: Instant) {
        self.connected = true;
        self.armed = armed;
        self.heartbeat_count = self.heartbeat_count.saturating_add(1);
        if self.first_heartbeat.is_none() {
            self.first_heartbeat = Some(now);
        }
        self.last_heartbeat = Some(now);
    }

    /// First failing condition, in reporting order
    pub fn check(&self, now: Instant) -> Result<(), PreconditionFailure> {
        if !self.connected {
            return Err(PreconditionFailure::NotConnected);
        }
        let (Some(first), Some(last)) = (self.first_heartbeat, self.last_heartbeat) else {
            return Err(PreconditionFailure::NoHeartbeat);
        };
        if self.armed {
            return Err(PreconditionFailure::Armed);
        }

        let age = now.saturating_duration_since(last);
        if age >= self.config.heartbeat_timeout() {
            return Err(PreconditionFailure::HeartbeatTimedOut {
                age_ms: millis(age),
                limit_ms: self.config.heartbeat_timeout_ms,
            });
        }

        let stable_for = now.saturating_duration_since(first);
        if stable_for < self.config.stability_floor() {
            return Err(PreconditionFailure::Unstable {
                elapsed_ms: millis(stable_for),
                required_ms: self.config.stability_floor_ms,
            });
        }

        Ok(())
    }

    pub fn can_start(&self, now: Instant) -> bool {
        self.check(now).is_ok()
    }

    /// Mark the gate as held by an active session
    pub fn hold(&mut self, session: u64) {
        self.held_by = Some(session);
    }

    /// Returns the session that held the gate, if any
    pub fn release(&mut self) -> Option<u64> {
        self.held_by.take()
    }

    pub fn is_held(&self) -> bool {
        self.held_by.is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.heartbeat_count
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate() -> PreconditionGate {
        PreconditionGate::new(GateConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_connected_initially() {
        let gate = gate();
        assert_eq!(
            gate.check(Instant::now()),
            Err(PreconditionFailure::NotConnected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_false_right_after_connect() {
        let mut gate = gate();
        gate.on_connected();
        assert_eq!(
            gate.check(Instant::now()),
            Err(PreconditionFailure::NoHeartbeat)
        );
        assert!(!gate.can_start(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stability_floor() {
        let mut gate = gate();
        gate.on_connected();
        gate.on_heartbeat(false, Instant::now());

        tokio::time::advance(Duration::from_millis(800)).await;
        gate.on_heartbeat(false, Instant::now());
        assert_eq!(
            gate.check(Instant::now()),
            Err(PreconditionFailure::Unstable {
                elapsed_ms: 800,
                required_ms: 2000
            })
        );

        tokio::time::advance(Duration::from_millis(1200)).await;
        gate.on_heartbeat(false, Instant::now());
        assert!(gate.can_start(Instant::now()));
        assert_eq!(gate.heartbeat_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_blocks() {
        let mut gate = gate();
        gate.on_heartbeat(true, Instant::now());
        tokio::time::advance(Duration::from_secs(3)).await;
        gate.on_heartbeat(true, Instant::now());
        assert_eq!(gate.check(Instant::now()), Err(PreconditionFailure::Armed));

        gate.on_heartbeat(false, Instant::now());
        assert!(gate.can_start(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_heartbeat_blocks() {
        let mut gate = gate();
        gate.on_heartbeat(false, Instant::now());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(matches!(
            gate.check(Instant::now()),
            Err(PreconditionFailure::HeartbeatTimedOut {
                age_ms: 6000,
                limit_ms: 5000
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_resets_everything() {
        let mut gate = gate();
        gate.on_heartbeat(false, Instant::now());
        tokio::time::advance(Duration::from_secs(3)).await;
        gate.on_heartbeat(false, Instant::now());
        gate.hold(7);
        assert!(gate.can_start(Instant::now()));

        gate.on_disconnected();
        assert!(!gate.is_held());
        assert_eq!(gate.heartbeat_count(), 0);
        assert_eq!(
            gate.check(Instant::now()),
            Err(PreconditionFailure::NotConnected)
        );

        // Reconnect restarts the stability floor
        gate.on_connected();
        gate.on_heartbeat(false, Instant::now());
        assert!(!gate.can_start(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_release() {
        let mut gate = gate();
        assert_eq!(gate.release(), None);
        gate.hold(3);
        assert!(gate.is_held());
        assert_eq!(gate.release(), Some(3));
        assert!(!gate.is_held());
    }
}
