use crate::abort_monitor::AbortMonitor;
use crate::classifier::{classify, Classification};
use crate::config::EngineConfig;
use crate::correlator::{send_with_retry, AckCorrelator};
use crate::gate::PreconditionGate;
use crate::handle::StateProbe;
use crate::sample_window::SampleWindow;
use crate::validator::validate_position;
use actor_protocol::{
    AccelPosition, AckError, CalibrationCommand, CalibrationError, CalibrationEvent,
    CalibrationResult, CalibrationSession, CalibrationState, CalibrationType,
    LocalValidationOutcome, StepInstruction,
};
use actor_runtime::{
    actor_debug, actor_info, actor_warn, spawn_timeout, Actor, CancelFlag, LinkMessage,
    OrchestratorMessage, TimeoutHandle,
};
use core_types::{
    AckResult, CommandId, ImuSample, OutboundCommand, Severity, StatusLine, VehicleEvent,
    ACCELCAL_POS_FAILED, ACCELCAL_POS_SUCCESS,
};
use futures::SinkExt;
use futures_channel::mpsc;
use std::time::Duration;
use tokio::time::Instant;

/// What an outstanding acknowledgement will decide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckPurpose {
    Start,
    Position(AccelPosition),
}

impl AckPurpose {
    fn command_id(self) -> CommandId {
        match self {
            Self::Start => CommandId::PreflightCalibration,
            Self::Position(_) => CommandId::AccelcalVehiclePos,
        }
    }
}

#[derive(Debug, Clone)]
struct ExpectedAck {
    ticket: u64,
    purpose: AckPurpose,
    // Stops the retry task once the acknowledgement is settled
    cancel: CancelFlag,
}

/// Orchestrator owns the calibration session and drives the state machine
///
/// Responsibilities:
/// - Gate session starts on vehicle pre-conditions
/// - Send calibration commands and correlate their acknowledgements
/// - Turn firmware status text into transitions through the classifier
/// - Check each accelerometer position locally before submitting it
/// - Finalize the session exactly once and notify the caller
///
/// ## State Machine
///
/// For the complete transition diagram and invariants, see:
/// `actor-protocol/src/state.rs` - CalibrationState documentation
///
/// Every input (caller command, vehicle event, acknowledgement outcome,
/// timer expiry) arrives through the actor mailbox, so the session has a
/// single writer. Background work (command retries, timers) only ever posts
/// messages back; stale ones are recognised by session id and ticket.
pub struct Orchestrator {
    config: EngineConfig,
    gate: PreconditionGate,
    correlator: AckCorrelator,
    abort_monitor: AbortMonitor,
    window: SampleWindow,

    session: Option<CalibrationSession>,
    session_sequence: u64,

    // Operation sequence tracking for detecting stale acknowledgement outcomes
    operation_sequence: u64,
    expected_ack: Option<ExpectedAck>,

    // Incremented on each confirm, used to validate SampleWindowClosed
    sample_token: u64,
    sample_ceiling: Option<TimeoutHandle>,
    silence_fallback: Option<TimeoutHandle>,

    firmware_progress: Option<u8>,

    self_tx: mpsc::Sender<OrchestratorMessage>,
    link_tx: mpsc::Sender<LinkMessage>,
    event_tx: mpsc::Sender<CalibrationEvent>,
    probe: StateProbe,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        self_tx: mpsc::Sender<OrchestratorMessage>,
        link_tx: mpsc::Sender<LinkMessage>,
        event_tx: mpsc::Sender<CalibrationEvent>,
        probe: StateProbe,
    ) -> Self {
        Self {
            gate: PreconditionGate::new(config.gate.clone()),
            correlator: AckCorrelator::new(),
            abort_monitor: AbortMonitor::new(config.watchdog.clone()),
            window: SampleWindow::new(config.sampling.window_capacity),
            config,
            session: None,
            session_sequence: 0,
            operation_sequence: 0,
            expected_ack: None,
            sample_token: 0,
            sample_ceiling: None,
            silence_fallback: None,
            firmware_progress: None,
            self_tx,
            link_tx,
            event_tx,
            probe,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.session
            .as_ref()
            .map_or(CalibrationState::Idle, |s| s.state)
    }

    /// Current or last finished session
    pub fn session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref()
    }

    pub fn gate(&self) -> &PreconditionGate {
        &self.gate
    }

    pub fn correlator(&self) -> &AckCorrelator {
        &self.correlator
    }

    fn active_session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref().filter(|s| s.is_active())
    }

    fn active_session_mut(&mut self) -> Option<&mut CalibrationSession> {
        self.session.as_mut().filter(|s| s.is_active())
    }

    fn active_id(&self) -> Option<u64> {
        self.active_session().map(|s| s.id)
    }

    fn record(&mut self, severity: Severity, text: impl Into<String>) {
        if let Some(session) = self.active_session_mut() {
            session.record(severity, text);
        }
    }

    /// Notify the caller
    ///
    /// Failures are logged but don't propagate
    fn send_event(&self, event: CalibrationEvent) {
        if let Err(e) = self.event_tx.clone().try_send(event) {
            actor_warn!("UI event dropped: {}", e);
        }
    }

    /// Send a command to the link without waiting for an acknowledgement
    fn send_link(&self, command: OutboundCommand) -> Result<(), CalibrationError> {
        self.link_tx
            .clone()
            .try_send(LinkMessage::Send { command })
            .map_err(|e| {
                if e.is_disconnected() {
                    CalibrationError::ChannelClosed("Link actor has shut down".into())
                } else {
                    CalibrationError::Other("Link channel overloaded".into())
                }
            })
    }

    /// Attempt to transition to a new state
    ///
    /// Returns Ok if transition is valid, Err otherwise. Every transition
    /// appends one diagnostics entry and notifies the caller.
    fn transition(&mut self, new_state: CalibrationState) -> Result<(), CalibrationError> {
        let session = self.session.as_mut().ok_or_else(|| {
            CalibrationError::InvalidTransition(format!("no session → {:?}", new_state))
        })?;

        let old_state = session.state;
        if !old_state.can_transition_to(new_state) {
            return Err(CalibrationError::InvalidTransition(format!(
                "{:?} → {:?}",
                old_state, new_state
            )));
        }

        session.state = new_state;
        session.record(
            Severity::Info,
            format!("State {:?} → {:?}", old_state, new_state),
        );
        self.probe.publish(new_state);

        actor_debug!("State: {:?} → {:?}", old_state, new_state);

        self.send_event(CalibrationEvent::StateChanged { state: new_state });
        self.emit_progress(new_state.status_text().to_string());
        Ok(())
    }

    fn progress_percent(&self) -> u8 {
        let Some(session) = self.session.as_ref() else {
            return 0;
        };
        if session.state == CalibrationState::Completed {
            return 100;
        }
        if let Some(percent) = self.firmware_progress {
            return percent;
        }
        if session.kind.uses_positions() {
            let total = AccelPosition::ALL.len();
            let done = session.satisfied_positions().min(total);
            return u8::try_from(done * 100 / total).unwrap_or(100);
        }
        0
    }

    fn emit_progress(&self, status: String) {
        self.send_event(CalibrationEvent::ProgressChanged {
            percent: self.progress_percent(),
            status,
            state: self.state(),
        });
    }

    /// Send a command through the correlator on a background task
    ///
    /// The task only settles silence: retries, then a timeout or send failure
    /// posted as `AckOutcome` with the ticket stored in `expected_ack`. A real
    /// acknowledgement is applied directly in `handle_ack`, which clears
    /// `expected_ack` and makes the task's own report stale.
    fn dispatch(&mut self, command: OutboundCommand, purpose: AckPurpose) {
        let Some(session) = self.active_id() else {
            return;
        };
        self.release_expected_ack();
        self.operation_sequence = self.operation_sequence.wrapping_add(1);
        let ticket = self.operation_sequence;
        let cancel = CancelFlag::new();
        self.expected_ack = Some(ExpectedAck {
            ticket,
            purpose,
            cancel: cancel.clone(),
        });

        let correlator = self.correlator.clone();
        let policy = self.config.retry.clone();
        let link_tx = self.link_tx.clone();
        let mut self_tx = self.self_tx.clone();
        let command_id = command.command_id();

        tokio::spawn(async move {
            let outcome = send_with_retry(&correlator, command_id, &policy, &cancel, move |attempt| {
                let mut link_tx = link_tx.clone();
                let command = command.clone();
                async move {
                    if attempt > 1 {
                        actor_debug!("Resending {:?} (attempt {})", command, attempt);
                    }
                    link_tx
                        .try_send(LinkMessage::Send { command })
                        .map_err(|e| format!("link unavailable: {}", e))
                }
            })
            .await;

            if self_tx
                .send(OrchestratorMessage::AckOutcome {
                    session,
                    ticket,
                    outcome,
                })
                .await
                .is_err()
            {
                actor_debug!("Orchestrator gone, acknowledgement outcome dropped");
            }
        });
    }

    /// Stop waiting for the outstanding acknowledgement, if any
    fn release_expected_ack(&mut self) -> Option<ExpectedAck> {
        let expected = self.expected_ack.take()?;
        expected.cancel.cancel();
        self.correlator.abandon(expected.purpose.command_id());
        Some(expected)
    }

    /// Forget the outstanding acknowledgement because firmware already moved on
    fn supersede_pending_ack(&mut self) {
        if let Some(expected) = self.release_expected_ack() {
            self.record(
                Severity::Info,
                format!(
                    "{:?} acknowledgement superseded: flight controller already moved on",
                    expected.purpose
                ),
            );
        }
    }

    // ---- caller commands ----

    fn handle_command(&mut self, cmd: CalibrationCommand) -> Result<(), CalibrationError> {
        match cmd {
            CalibrationCommand::Start { kind } => self.handle_start(kind),
            CalibrationCommand::ConfirmPosition => self.handle_confirm(),
            CalibrationCommand::Cancel => self.handle_cancel(),
            CalibrationCommand::Reboot => self.handle_reboot(),
        }
    }

    fn handle_start(&mut self, kind: CalibrationType) -> Result<(), CalibrationError> {
        if let Some(active) = self.active_session() {
            actor_warn!(
                "Start {} refused: session {} is {:?}",
                kind,
                active.id,
                active.state
            );
            return Err(CalibrationError::SessionActive);
        }

        if let Err(reason) = self.gate.check(Instant::now()) {
            actor_info!("Start {} refused: {}", kind, reason);
            return Err(reason.into());
        }

        self.session_sequence = self.session_sequence.wrapping_add(1);
        let id = self.session_sequence;
        let mut session = CalibrationSession::new(id, kind);
        session.record(Severity::Info, format!("{} calibration requested", kind));
        self.session = Some(session);

        self.firmware_progress = None;
        self.window.clear();
        self.gate.hold(id);
        self.abort_monitor.arm(&self.self_tx, id);

        actor_info!("Starting {} calibration (session {})", kind, id);
        self.transition(CalibrationState::CommandPending)?;
        self.dispatch(
            OutboundCommand::PreflightCalibration(kind.preflight_params()),
            AckPurpose::Start,
        );
        Ok(())
    }

    fn handle_confirm(&mut self) -> Result<(), CalibrationError> {
        let state = self.state();
        let refuse = || unexpected(state, "ConfirmPosition");

        let Some(session) = self.active_session_mut() else {
            return Err(refuse());
        };
        if !session.state.accepts_confirmation() {
            return Err(refuse());
        }
        let Some(position) = session.current_position() else {
            return Err(refuse());
        };

        let record = session.position_record_mut(position);
        record.begin_attempt();
        let attempt = record.attempts;
        session.record(
            Severity::Info,
            format!("User confirmed {} (attempt {})", position.name(), attempt),
        );
        let id = session.id;

        self.transition(CalibrationState::ValidatingPositionLocally)?;

        self.window.clear();
        self.sample_token = self.sample_token.wrapping_add(1);
        self.sample_ceiling = Some(spawn_timeout(
            self.self_tx.clone(),
            OrchestratorMessage::SampleWindowClosed {
                session: id,
                token: self.sample_token,
            },
            Duration::from_millis(self.config.sampling.window_ceiling_ms),
            Duration::from_millis(self.config.sampling.poll_interval_ms),
        ));
        Ok(())
    }

    fn handle_cancel(&mut self) -> Result<(), CalibrationError> {
        if self.active_session().is_none() {
            return Err(unexpected(self.state(), "Cancel"));
        }
        // Best effort: the session ends locally even if firmware never hears it
        if let Err(e) = self.send_link(OutboundCommand::CancelCalibration) {
            actor_warn!("Cancel not sent to flight controller: {}", e);
        }
        self.finish(CalibrationResult::Cancelled, "Calibration cancelled by user.")
    }

    fn handle_reboot(&mut self) -> Result<(), CalibrationError> {
        if self.active_session().is_some() {
            return Err(CalibrationError::SessionActive);
        }
        if !self.gate.is_connected() {
            return Err(actor_protocol::PreconditionFailure::NotConnected.into());
        }
        if self.gate.is_armed() {
            return Err(actor_protocol::PreconditionFailure::Armed.into());
        }
        self.send_link(OutboundCommand::Reboot)?;
        actor_info!("Reboot sent to flight controller");
        self.send_event(CalibrationEvent::StatusText {
            severity: Severity::Notice,
            text: "Reboot command sent to flight controller.".into(),
        });
        Ok(())
    }

    // ---- vehicle events ----

    fn handle_vehicle(&mut self, event: VehicleEvent) -> Result<(), CalibrationError> {
        match event {
            VehicleEvent::Connected => {
                self.gate.on_connected();
                Ok(())
            }
            VehicleEvent::Disconnected => {
                if self.active_session().is_some() {
                    if let Some(abort) = AbortMonitor::evaluate(&event) {
                        self.finish(abort.result, abort.reason)?;
                    }
                }
                self.gate.on_disconnected();
                Ok(())
            }
            VehicleEvent::Heartbeat { armed } => {
                self.gate.on_heartbeat(armed, Instant::now());
                if self.active_session().is_some() {
                    if let Some(abort) = AbortMonitor::evaluate(&event) {
                        return self.finish(abort.result, abort.reason);
                    }
                    self.abort_monitor.feed(&self.self_tx);
                }
                Ok(())
            }
            VehicleEvent::StatusText(line) => self.handle_status(line),
            VehicleEvent::CommandAck { command, result } => self.handle_ack(command, result),
            VehicleEvent::RawImu(sample) => self.handle_imu(sample),
            VehicleEvent::PositionRequest { code } => self.handle_position_code(code),
        }
    }

    fn handle_status(&mut self, line: StatusLine) -> Result<(), CalibrationError> {
        let Some(session) = self.active_session() else {
            self.send_event(CalibrationEvent::StatusText {
                severity: line.severity,
                text: line.text,
            });
            return Ok(());
        };
        let kind = session.kind;
        let start_pending = session.state == CalibrationState::CommandPending;

        self.record(line.severity, format!("Flight controller: {}", line.text));

        match classify(&line, kind) {
            // A verdict before the start was even acknowledged belongs to an earlier run
            Classification::Completion if start_pending => {
                actor_warn!("Completion text before start was acknowledged: {}", line.text);
                Ok(())
            }
            Classification::Completion => self.finish(
                CalibrationResult::Success,
                format!("Flight controller reported completion: {}", line.text),
            ),
            Classification::Failure => self.finish(
                CalibrationResult::Failed,
                format!("Flight controller reported failure: {}", line.text),
            ),
            Classification::PositionRequest(position) => self.on_position_requested(position),
            Classification::Sampling { progress } => {
                if let Some(percent) = progress {
                    self.firmware_progress = Some(percent.min(100));
                }
                self.emit_progress(line.text);
                Ok(())
            }
            Classification::Uninterpreted => {
                self.send_event(CalibrationEvent::StatusText {
                    severity: line.severity,
                    text: line.text,
                });
                Ok(())
            }
        }
    }

    fn handle_position_code(&mut self, code: u32) -> Result<(), CalibrationError> {
        let Some(kind) = self.active_session().map(|s| s.kind) else {
            actor_debug!("Position request {} with no active session", code);
            return Ok(());
        };
        if !kind.uses_positions() {
            actor_warn!("Position request {} during {} calibration ignored", code, kind);
            return Ok(());
        }

        if code == ACCELCAL_POS_SUCCESS || code == AccelPosition::END_OF_SEQUENCE {
            return self.finish(
                CalibrationResult::Success,
                "Flight controller reported accelerometer calibration complete.",
            );
        }
        if code == ACCELCAL_POS_FAILED {
            return self.finish(
                CalibrationResult::Failed,
                "Flight controller reported accelerometer calibration failed. Repeat the calibration and hold each position steady.",
            );
        }

        match AccelPosition::from_code(code) {
            Some(position) => self.on_position_requested(position),
            None => {
                actor_warn!("Unknown position code {}", code);
                self.record(
                    Severity::Warning,
                    format!("Ignored unknown position code {}", code),
                );
                Ok(())
            }
        }
    }

    fn on_position_requested(&mut self, position: AccelPosition) -> Result<(), CalibrationError> {
        let Some(session) = self.active_session() else {
            return Ok(());
        };
        let state = session.state;
        let current = session.current_position();

        // Firmware often announces the same position as text and as a command
        if current == Some(position)
            && matches!(
                state,
                CalibrationState::AwaitingUserConfirmation
                    | CalibrationState::ValidatingPositionLocally
                    | CalibrationState::PositionSubmitted
            )
        {
            actor_debug!("Duplicate request for {} in {:?} ignored", position.name(), state);
            return Ok(());
        }

        match state {
            // Firmware moving on implies it took the outstanding command
            CalibrationState::CommandPending => {
                self.supersede_pending_ack();
                self.on_start_accepted()?;
            }
            CalibrationState::PositionSubmitted => {
                self.supersede_pending_ack();
                if let Some(previous) = current {
                    self.on_position_accepted(previous, None)?;
                }
            }
            CalibrationState::ValidatingPositionLocally => {
                self.sample_ceiling = None;
                self.window.clear();
            }
            _ => {}
        }

        let state = self.state();
        if !state.can_transition_to(CalibrationState::PositionRequested) {
            actor_warn!("Request for {} ignored in {:?}", position.name(), state);
            self.record(
                Severity::Warning,
                format!("Ignored request for {} while {:?}", position.name(), state),
            );
            return Ok(());
        }

        self.firmware_progress = None;
        if let Some(session) = self.active_session_mut() {
            session.position = position.code();
            session.position_record_mut(position);
            session.record(
                Severity::Info,
                format!("Flight controller requested {}", position.name()),
            );
        }

        self.transition(CalibrationState::PositionRequested)?;
        self.send_event(CalibrationEvent::StepRequired(StepInstruction::for_position(
            position,
        )));
        self.transition(CalibrationState::AwaitingUserConfirmation)
    }

    fn handle_imu(&mut self, sample: ImuSample) -> Result<(), CalibrationError> {
        if self.state() != CalibrationState::ValidatingPositionLocally {
            return Ok(());
        }
        self.window.push(sample);
        if self.window.len() >= self.config.sampling.min_samples {
            self.evaluate_window()?;
        }
        Ok(())
    }

    /// Average the collected samples and run the local orientation check
    fn evaluate_window(&mut self) -> Result<(), CalibrationError> {
        self.sample_ceiling = None;
        let collected = self.window.len();
        let average = self.window.drain_average();

        let Some(position) = self.active_session().and_then(|s| s.current_position()) else {
            return Ok(());
        };

        let average = match average {
            Some(avg) if collected >= self.config.sampling.min_partial_samples => avg,
            _ => {
                let reason = format!(
                    "Not enough IMU telemetry to check {} ({} of {} samples within {} ms). Make sure raw IMU data is streamed, then confirm again.",
                    position.name(),
                    collected,
                    self.config.sampling.min_samples,
                    self.config.sampling.window_ceiling_ms
                );
                return self.reject_locally(position, reason, None);
            }
        };

        let report = validate_position(position, average, &self.config.tolerances);
        if !report.passed {
            return self.reject_locally(position, report.explanation, report.advice);
        }

        if let Some(session) = self.active_session_mut() {
            session
                .position_record_mut(position)
                .record_local(LocalValidationOutcome::Passed);
            session.record(Severity::Info, report.explanation);
        }
        self.transition(CalibrationState::PositionSubmitted)?;
        self.dispatch(
            OutboundCommand::AccelPosition {
                position: position.code(),
            },
            AckPurpose::Position(position),
        );
        Ok(())
    }

    fn reject_locally(
        &mut self,
        position: AccelPosition,
        reason: String,
        advice: Option<String>,
    ) -> Result<(), CalibrationError> {
        if let Some(session) = self.active_session_mut() {
            session
                .position_record_mut(position)
                .record_local(LocalValidationOutcome::Failed {
                    reason: reason.clone(),
                });
            session.record_reason(Severity::Warning, reason.clone());
        }
        actor_info!("{} rejected locally: {}", position.name(), reason);

        self.transition(CalibrationState::AwaitingUserConfirmation)?;
        let mut step = StepInstruction::for_position(position);
        if let Some(advice) = advice {
            step.instruction = advice;
        }
        self.send_event(CalibrationEvent::StepRequired(step));
        self.emit_progress(reason);
        Ok(())
    }

    // ---- acknowledgements ----

    /// Apply a COMMAND_ACK as soon as it is read
    ///
    /// Status text decoded from the same chunk is queued right behind the
    /// acknowledgement and must already see its effect.
    fn handle_ack(
        &mut self,
        command: CommandId,
        result: AckResult,
    ) -> Result<(), CalibrationError> {
        let expected = self.active_id().and(self.expected_ack.as_ref());
        if !expected.is_some_and(|e| e.purpose.command_id() == command) {
            if !self.correlator.resolve(command, result) {
                actor_debug!("Unsolicited acknowledgement {:?} for {:?}", result, command);
            }
            return Ok(());
        }

        self.correlator.resolve(command, result);
        let Some(expected) = self.release_expected_ack() else {
            return Ok(());
        };
        self.apply_ack(expected.purpose, result)
    }

    /// Report from a retry task: only silence or a failed send matter here
    fn handle_ack_outcome(
        &mut self,
        session: u64,
        ticket: u64,
        outcome: Result<AckResult, AckError>,
    ) -> Result<(), CalibrationError> {
        if self.active_id() != Some(session) {
            actor_debug!("Ignoring acknowledgement outcome of finished session {}", session);
            return Ok(());
        }
        let purpose = match &self.expected_ack {
            Some(expected) if expected.ticket == ticket => expected.purpose,
            _ => {
                actor_debug!("Ignoring stale acknowledgement outcome (ticket {})", ticket);
                return Ok(());
            }
        };
        self.release_expected_ack();

        match outcome {
            Err(AckError::Cancelled | AckError::Abandoned) => Ok(()),
            Err(e @ AckError::TimedOut { .. }) => {
                self.finish(CalibrationResult::TimedOut, e.to_string())
            }
            Err(e @ AckError::SendFailed(_)) => {
                self.finish(CalibrationResult::Failed, e.to_string())
            }
            Ok(result) => self.apply_ack(purpose, result),
        }
    }

    fn apply_ack(
        &mut self,
        purpose: AckPurpose,
        result: AckResult,
    ) -> Result<(), CalibrationError> {
        let state = self.state();
        match purpose {
            AckPurpose::Start => {
                if state != CalibrationState::CommandPending {
                    return Ok(());
                }
                self.record(
                    Severity::Info,
                    format!("Start acknowledged: {:?}", result),
                );
                if result.is_acceptance() {
                    self.on_start_accepted()
                } else {
                    self.finish(
                        CalibrationResult::Rejected,
                        format!(
                            "Flight controller rejected the calibration start ({:?}). {}",
                            result,
                            result.describe()
                        ),
                    )
                }
            }
            AckPurpose::Position(position) => {
                if state != CalibrationState::PositionSubmitted {
                    return Ok(());
                }
                if result.is_acceptance() {
                    self.on_position_accepted(position, Some(result))
                } else {
                    self.on_position_rejected(position, result)
                }
            }
        }
    }

    fn on_start_accepted(&mut self) -> Result<(), CalibrationError> {
        let Some(kind) = self.active_session().map(|s| s.kind) else {
            return Ok(());
        };
        self.record(
            Severity::Info,
            format!("Flight controller accepted {} calibration", kind),
        );
        self.transition(CalibrationState::AwaitingDirective)?;
        self.send_event(CalibrationEvent::StepRequired(StepInstruction::for_start(
            kind,
        )));

        if !kind.uses_positions() {
            self.transition(CalibrationState::Sampling)?;
            if kind.is_single_step() {
                self.arm_silence_fallback();
            }
        }
        Ok(())
    }

    fn on_position_accepted(
        &mut self,
        position: AccelPosition,
        result: Option<AckResult>,
    ) -> Result<(), CalibrationError> {
        if let Some(session) = self.active_session_mut() {
            let record = session.position_record_mut(position);
            match result {
                Some(result) => record.record_ack(result),
                None => record.mark_succeeded(),
            }
            session.record(
                Severity::Info,
                format!("{} accepted by flight controller", position.name()),
            );
        }
        self.transition(CalibrationState::Sampling)
    }

    fn on_position_rejected(
        &mut self,
        position: AccelPosition,
        result: AckResult,
    ) -> Result<(), CalibrationError> {
        let reason = format!(
            "{} rejected by flight controller ({:?}). {}",
            position.name(),
            result,
            result.describe()
        );
        if let Some(session) = self.active_session_mut() {
            session.position_record_mut(position).record_ack(result);
            session.record_reason(Severity::Warning, reason.clone());
        }
        actor_info!("{}", reason);

        self.transition(CalibrationState::PositionRejectedByFirmware)?;
        self.transition(CalibrationState::AwaitingUserConfirmation)?;
        self.send_event(CalibrationEvent::StepRequired(StepInstruction::for_position(
            position,
        )));
        self.emit_progress(reason);
        Ok(())
    }

    // ---- timers and aborts ----

    fn arm_silence_fallback(&mut self) {
        let Some(session) = self.active_id() else {
            return;
        };
        let ceiling = self.config.fallback.silence_ceiling_ms;
        self.record(
            Severity::Info,
            format!("Waiting up to {} ms for a verdict from the flight controller", ceiling),
        );
        self.silence_fallback = Some(spawn_timeout(
            self.self_tx.clone(),
            OrchestratorMessage::SilenceWindowElapsed { session },
            Duration::from_millis(ceiling),
            Duration::from_millis(self.config.fallback.poll_interval_ms),
        ));
    }

    fn handle_silence_elapsed(&mut self, session: u64) -> Result<(), CalibrationError> {
        let Some(active) = self.active_session().filter(|s| s.id == session) else {
            return Ok(());
        };
        let kind = active.kind;
        if !kind.is_single_step() || active.state != CalibrationState::Sampling {
            return Ok(());
        }
        self.silence_fallback = None;

        // Firmware-silence fallback. A deliberate compromise scoped to gyro,
        // baro and level: silence is not success anywhere else.
        self.finish(
            CalibrationResult::Success,
            format!(
                "No verdict from flight controller within {} ms; {} calibration assumed complete.",
                self.config.fallback.silence_ceiling_ms, kind
            ),
        )
    }

    fn handle_sample_window_closed(
        &mut self,
        session: u64,
        token: u64,
    ) -> Result<(), CalibrationError> {
        if self.active_id() != Some(session)
            || token != self.sample_token
            || self.state() != CalibrationState::ValidatingPositionLocally
        {
            actor_debug!("Ignoring stale sample window timeout (token {})", token);
            return Ok(());
        }
        self.evaluate_window()
    }

    fn handle_heartbeat_lost(&mut self, session: u64) -> Result<(), CalibrationError> {
        if self.active_id() != Some(session) {
            return Ok(());
        }
        let abort = self.abort_monitor.heartbeat_lost_reason();
        self.finish(abort.result, abort.reason)
    }

    fn handle_abort(
        &mut self,
        result: CalibrationResult,
        reason: String,
    ) -> Result<(), CalibrationError> {
        if result == CalibrationResult::Success {
            return Err(CalibrationError::Other(
                "An external abort cannot report success".into(),
            ));
        }
        if self.active_session().is_none() {
            actor_debug!("Abort with no active session: {}", reason);
            return Ok(());
        }
        self.finish(result, reason)
    }

    /// Finalize the active session
    ///
    /// Records the reason, stops every timer and waiter belonging to the
    /// session, enters the terminal state, sets the result and releases the
    /// gate. A finished session ignores every later call.
    fn finish(
        &mut self,
        result: CalibrationResult,
        summary: impl Into<String>,
    ) -> Result<(), CalibrationError> {
        let summary = summary.into();
        let Some(session) = self.active_session_mut() else {
            actor_debug!("finish({:?}) with no active session", result);
            return Ok(());
        };

        let severity = match result {
            CalibrationResult::Success | CalibrationResult::Cancelled => Severity::Info,
            _ => Severity::Error,
        };
        session.record_reason(severity, summary.clone());

        let mut result = result;
        let mut terminal = terminal_state(result);
        if !session.state.can_transition_to(terminal) {
            result = CalibrationResult::Failed;
            terminal = CalibrationState::Failed;
        }

        self.release_expected_ack();
        self.correlator.abandon_all();
        self.sample_ceiling = None;
        self.silence_fallback = None;
        self.abort_monitor.disarm();
        self.window.clear();

        self.transition(terminal)?;

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.finalize(result, summary.clone());
        let kind = session.kind;
        let duration_ms = session.duration_ms();
        self.gate.release();

        actor_info!("{} calibration finished: {:?} ({})", kind, result, summary);
        self.send_event(CalibrationEvent::Completed {
            result,
            summary,
            duration_ms,
        });
        Ok(())
    }
}

fn terminal_state(result: CalibrationResult) -> CalibrationState {
    match result {
        CalibrationResult::Success => CalibrationState::Completed,
        CalibrationResult::Failed => CalibrationState::Failed,
        CalibrationResult::Cancelled => CalibrationState::Cancelled,
        CalibrationResult::TimedOut => CalibrationState::TimedOut,
        CalibrationResult::Rejected => CalibrationState::Rejected,
    }
}

fn unexpected(state: CalibrationState, message: &str) -> CalibrationError {
    CalibrationError::UnexpectedMessage {
        state: format!("{:?}", state),
        message: message.to_string(),
    }
}

impl Actor for Orchestrator {
    type Message = OrchestratorMessage;

    fn name(&self) -> &'static str {
        "Orchestrator"
    }

    async fn init(&mut self) -> Result<(), CalibrationError> {
        self.config.validate()?;
        self.probe.publish(self.state());
        Ok(())
    }

    async fn handle(&mut self, msg: OrchestratorMessage) -> Result<(), CalibrationError> {
        match msg {
            OrchestratorMessage::Command { cmd, reply } => {
                let name = cmd.name();
                let outcome = self.handle_command(cmd);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome.is_ok());
                }
                if let Err(e) = &outcome {
                    actor_debug!("{} refused: {}", name, e);
                }
                outcome
            }
            OrchestratorMessage::Vehicle(event) => self.handle_vehicle(event),
            OrchestratorMessage::AckOutcome {
                session,
                ticket,
                outcome,
            } => self.handle_ack_outcome(session, ticket, outcome),
            OrchestratorMessage::SampleWindowClosed { session, token } => {
                self.handle_sample_window_closed(session, token)
            }
            OrchestratorMessage::SilenceWindowElapsed { session } => {
                self.handle_silence_elapsed(session)
            }
            OrchestratorMessage::HeartbeatLost { session } => self.handle_heartbeat_lost(session),
            OrchestratorMessage::Abort { result, reason } => self.handle_abort(result, reason),
            OrchestratorMessage::Snapshot { reply } => {
                let _ = reply.send(self.session.clone());
                Ok(())
            }
        }
    }

    async fn shutdown(&mut self) {
        if self.active_session().is_some() {
            if let Err(e) = self.finish(
                CalibrationResult::Cancelled,
                "Calibration engine shut down.",
            ) {
                actor_warn!("Shutdown finalize failed: {}", e);
            }
        }
        self.release_expected_ack();
        self.correlator.abandon_all();
    }
}
