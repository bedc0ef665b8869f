//! Engine, link actor and inbound pump against the simulated flight controller
//!
//! Everything crosses the wire as MAVLink bytes. The test body plays the
//! user: it turns the simulated vehicle when asked and confirms.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use actor_protocol::{CalibrationEvent, CalibrationResult, CalibrationType, SessionSnapshot};
use actor_runtime::{Actor, CancelFlag, ChannelManager};
use calibration_actors::{CalibrationHandle, EngineConfig, Orchestrator, StateProbe};
use core_types::{AckResult, CommandId, Transport};
use futures::stream::StreamExt;
use futures_channel::mpsc;
use link_mavlink::{pump_inbound, LinkActor, SimBehavior, SimulatedFirmware};
use std::sync::Arc;
use std::time::Duration;

struct Bench {
    handle: CalibrationHandle,
    events: mpsc::Receiver<CalibrationEvent>,
    sim: Arc<SimulatedFirmware>,
    pump_cancel: CancelFlag,
}

impl Bench {
    fn spawn(behavior: SimBehavior) -> Self {
        let (mut manager, handles) = ChannelManager::new();
        let probe = StateProbe::new();

        let orchestrator = Orchestrator::new(
            EngineConfig::default(),
            handles.orchestrator_tx.clone(),
            handles.link_tx.clone(),
            handles.event_tx.clone(),
            probe.clone(),
        );
        tokio::spawn(orchestrator.run(handles.orchestrator_rx, handles.event_tx.clone()));

        let sim = SimulatedFirmware::start(behavior);
        let link = LinkActor::new(sim.clone());
        tokio::spawn(link.run(handles.link_rx, handles.event_tx));

        let pump_cancel = CancelFlag::new();
        tokio::spawn(pump_inbound(
            sim.clone(),
            manager.orchestrator_sender(),
            pump_cancel.clone(),
        ));

        Self {
            handle: CalibrationHandle::new(manager.orchestrator_sender(), probe),
            events: manager.take_event_receiver(),
            sim,
            pump_cancel,
        }
    }

    /// Let heartbeats build up past the stability floor
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(2500)).await;
    }

    /// Play the user until the session completes
    async fn drive(&mut self) -> (CalibrationResult, String) {
        let outcome = tokio::time::timeout(Duration::from_secs(120), async {
            loop {
                match self.events.next().await.expect("Event stream ended") {
                    CalibrationEvent::StepRequired(step) => {
                        if let (Some(position), true) = (step.position, step.confirm_accepted) {
                            self.sim.set_pose(position);
                            assert!(self.handle.confirm_current_position().await);
                        }
                    }
                    CalibrationEvent::Completed {
                        result, summary, ..
                    } => return (result, summary),
                    _ => {}
                }
            }
        })
        .await;
        outcome.expect("Session did not complete")
    }

    async fn snapshot(&self) -> SessionSnapshot {
        self.handle.diagnostics().await.expect("Should have a session")
    }
}

#[tokio::test(start_paused = true)]
async fn test_gyro_calibration_over_mavlink() {
    let mut bench = Bench::spawn(SimBehavior::default());
    bench.settle().await;

    assert!(bench.handle.start(CalibrationType::Gyroscope).await);
    let (result, _) = bench.drive().await;
    assert_eq!(result, CalibrationResult::Success);

    let received = bench.sim.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].command, CommandId::PreflightCalibration);
    assert_eq!(
        received[0].params,
        CalibrationType::Gyroscope.preflight_params()
    );
}

#[tokio::test(start_paused = true)]
async fn test_accelerometer_six_positions_over_mavlink() {
    let mut bench = Bench::spawn(SimBehavior::default());
    bench.settle().await;

    assert!(bench.handle.start(CalibrationType::Accelerometer).await);
    let (result, summary) = bench.drive().await;
    assert_eq!(result, CalibrationResult::Success, "{}", summary);

    let snapshot = bench.snapshot().await;
    assert_eq!(snapshot.positions().count(), 6);
    for record in snapshot.positions() {
        assert_eq!(record.attempts, 1, "{}", record.name);
        assert_eq!(record.last_ack, Some(AckResult::Accepted));
        assert!(record.succeeded_at.is_some());
    }
    // One start plus six positions
    assert_eq!(bench.sim.received().len(), 7);
    assert_eq!(bench.sim.requested_position(), None);
}

#[tokio::test(start_paused = true)]
async fn test_firmware_denials_are_retried_by_the_user() {
    let mut bench = Bench::spawn(SimBehavior {
        deny_first_position: true,
        ..SimBehavior::default()
    });
    bench.settle().await;

    assert!(bench.handle.start(CalibrationType::Accelerometer).await);
    let (result, _) = bench.drive().await;
    assert_eq!(result, CalibrationResult::Success);

    let snapshot = bench.snapshot().await;
    for record in snapshot.positions() {
        assert_eq!(record.attempts, 2, "{}", record.name);
        assert_eq!(record.firmware_rejections, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_armed_vehicle_is_refused_before_anything_is_sent() {
    let bench = Bench::spawn(SimBehavior::default());
    bench.sim.set_armed(true);
    bench.settle().await;

    assert!(!bench.handle.start(CalibrationType::Barometer).await);
    assert!(bench.sim.received().is_empty());
    assert!(!bench.handle.is_session_active());
}

#[tokio::test(start_paused = true)]
async fn test_firmware_denied_start_is_rejected() {
    let mut bench = Bench::spawn(SimBehavior {
        deny_start: true,
        ..SimBehavior::default()
    });
    bench.settle().await;

    assert!(bench.handle.start(CalibrationType::Compass).await);
    let (result, _) = bench.drive().await;
    assert_eq!(result, CalibrationResult::Rejected);
}

#[tokio::test(start_paused = true)]
async fn test_silent_level_calibration_falls_back_to_success() {
    let mut bench = Bench::spawn(SimBehavior {
        silent_single_step: true,
        ..SimBehavior::default()
    });
    bench.settle().await;

    let started = tokio::time::Instant::now();
    assert!(bench.handle.start(CalibrationType::LevelHorizon).await);
    let (result, summary) = bench.drive().await;
    assert_eq!(result, CalibrationResult::Success);
    assert!(summary.contains("assumed complete"));
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_compass_reports_progress() {
    let mut bench = Bench::spawn(SimBehavior::default());
    bench.settle().await;

    assert!(bench.handle.start(CalibrationType::Compass).await);
    let mut best = 0u8;
    let result = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match bench.events.next().await.expect("Event stream ended") {
                CalibrationEvent::ProgressChanged { percent, .. } => best = best.max(percent),
                CalibrationEvent::Completed { result, .. } => return result,
                _ => {}
            }
        }
    })
    .await
    .expect("Session did not complete");

    assert_eq!(result, CalibrationResult::Success);
    assert!(best >= 75, "progress peaked at {}", best);
}

#[tokio::test(start_paused = true)]
async fn test_closing_the_link_times_out_the_session() {
    let mut bench = Bench::spawn(SimBehavior::default());
    bench.settle().await;

    assert!(bench.handle.start(CalibrationType::Accelerometer).await);
    // Wait for the first prompt, then pull the cable
    loop {
        if let CalibrationEvent::StepRequired(step) = bench.events.next().await.unwrap() {
            if step.position.is_some() {
                break;
            }
        }
    }
    bench.sim.close().await.unwrap();

    let (result, _) = bench.drive().await;
    assert_eq!(result, CalibrationResult::TimedOut);
    assert!(!bench.pump_cancel.is_cancelled());
}
