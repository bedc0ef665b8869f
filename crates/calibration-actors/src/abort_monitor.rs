//! Session abort monitor
//!
//! Watches vehicle events while a session is active and decides when the
//! session must end without firmware having said so: the vehicle was armed,
//! the link dropped, or heartbeats stopped arriving.

use crate::config::WatchdogConfig;
use actor_protocol::CalibrationResult;
use actor_runtime::{actor_debug, spawn_timeout, OrchestratorMessage, TimeoutHandle};
use core_types::VehicleEvent;
use futures_channel::mpsc;

/// Why a session has to be aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReason {
    pub result: CalibrationResult,
    pub reason: String,
}

impl AbortReason {
    fn new(result: CalibrationResult, reason: impl Into<String>) -> Self {
        Self {
            result,
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
pub struct AbortMonitor {
    config: WatchdogConfig,
    // Heartbeat watchdog, restarted on every heartbeat while armed
    watchdog: Option<TimeoutHandle>,
    session: Option<u64>,
}

impl AbortMonitor {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            watchdog: None,
            session: None,
        }
    }

    /// Classify one vehicle event. Pure; does not touch the watchdog.
    pub fn evaluate(event: &VehicleEvent) -> Option<AbortReason> {
        match event {
            VehicleEvent::Heartbeat { armed: true } => Some(AbortReason::new(
                CalibrationResult::Failed,
                "Vehicle was armed during calibration. Calibration aborted; disarm and start again.",
            )),
            VehicleEvent::Disconnected => Some(AbortReason::new(
                CalibrationResult::TimedOut,
                "Link to the flight controller was lost during calibration. Reconnect and start again.",
            )),
            _ => None,
        }
    }

    /// Reason used when the watchdog fires
    pub fn heartbeat_lost_reason(&self) -> AbortReason {
        AbortReason::new(
            CalibrationResult::TimedOut,
            format!(
                "No heartbeat from the flight controller for {} ms. Check the telemetry link and start again.",
                self.config.heartbeat_loss_ms
            ),
        )
    }

    /// Start watching `session`
    pub fn arm(&mut self, tx: &mpsc::Sender<OrchestratorMessage>, session: u64) {
        self.session = Some(session);
        self.restart(tx);
    }

    /// Heartbeat seen: push the watchdog deadline out
    pub fn feed(&mut self, tx: &mpsc::Sender<OrchestratorMessage>) {
        if self.session.is_some() {
            self.restart(tx);
        }
    }

    pub fn disarm(&mut self) {
        if self.watchdog.take().is_some() {
            actor_debug!("AbortMonitor: watchdog disarmed");
        }
        self.session = None;
    }

    pub fn is_watching(&self) -> bool {
        self.watchdog.is_some()
    }

    fn restart(&mut self, tx: &mpsc::Sender<OrchestratorMessage>) {
        let Some(session) = self.session else {
            return;
        };
        // Dropping the previous handle cancels it
        self.watchdog = Some(spawn_timeout(
            tx.clone(),
            OrchestratorMessage::HeartbeatLost { session },
            std::time::Duration::from_millis(self.config.heartbeat_loss_ms),
            std::time::Duration::from_millis(self.config.poll_interval_ms),
        ));
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use futures::stream::StreamExt;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn test_evaluate() {
        let armed = AbortMonitor::evaluate(&VehicleEvent::Heartbeat { armed: true }).unwrap();
        assert_eq!(armed.result, CalibrationResult::Failed);
        assert!(armed.reason.contains("armed"));

        let lost = AbortMonitor::evaluate(&VehicleEvent::Disconnected).unwrap();
        assert_eq!(lost.result, CalibrationResult::TimedOut);

        assert!(AbortMonitor::evaluate(&VehicleEvent::Heartbeat { armed: false }).is_none());
        assert!(AbortMonitor::evaluate(&VehicleEvent::Connected).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_fires_without_heartbeat() {
        let (tx, mut rx) = mpsc::channel(10);
        let mut monitor = AbortMonitor::new(WatchdogConfig::default());
        let start = Instant::now();
        monitor.arm(&tx, 4);
        assert!(monitor.is_watching());

        match rx.next().await.unwrap() {
            OrchestratorMessage::HeartbeatLost { session } => assert_eq!(session, 4),
            other => panic!("Unexpected message: {:?}", other),
        }
        assert!(start.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_feeding_postpones_watchdog() {
        let (tx, mut rx) = mpsc::channel(10);
        let mut monitor = AbortMonitor::new(WatchdogConfig::default());
        monitor.arm(&tx, 1);

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            monitor.feed(&tx);
        }
        assert!(rx.try_next().is_err(), "watchdog fired despite heartbeats");

        let fed_at = Instant::now();
        rx.next().await.unwrap();
        assert!(fed_at.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_stops_watchdog() {
        let (tx, mut rx) = mpsc::channel(10);
        let mut monitor = AbortMonitor::new(WatchdogConfig::default());
        monitor.arm(&tx, 1);
        monitor.disarm();
        assert!(!monitor.is_watching());

        // Feeding after disarm must not restart it
        monitor.feed(&tx);
        assert!(!monitor.is_watching());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_next().is_err());
    }
}
