//! Session data model: one [`CalibrationSession`] per invocation, with its
//! append-only diagnostics log and per-position attempt records.

use crate::calibration::{AccelPosition, CalibrationResult, CalibrationType};
use crate::state::CalibrationState;
use chrono::{DateTime, Utc};
use core_types::{AckResult, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One timestamped line of the session audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since session start
    pub elapsed_ms: u64,
    pub severity: Severity,
    pub text: String,
}

/// Outcome of the local orientation check for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalValidationOutcome {
    Passed,
    Failed { reason: String },
}

/// Attempts at one accelerometer position within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAttemptRecord {
    pub position: AccelPosition,
    /// Canonical name (LEVEL, LEFT, ...)
    pub name: String,
    /// Number of user confirmations for this position
    pub attempts: u32,
    pub local_rejections: u32,
    pub firmware_rejections: u32,
    pub last_local: Option<LocalValidationOutcome>,
    pub last_ack: Option<AckResult>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub succeeded_at: Option<DateTime<Utc>>,
}

impl PositionAttemptRecord {
    pub fn new(position: AccelPosition) -> Self {
        Self {
            position,
            name: position.name().to_string(),
            attempts: 0,
            local_rejections: 0,
            firmware_rejections: 0,
            last_local: None,
            last_ack: None,
            confirmed_at: None,
            succeeded_at: None,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.succeeded_at.is_some()
    }

    /// User confirmed the vehicle is in position
    pub fn begin_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.confirmed_at = Some(Utc::now());
    }

    pub fn record_local(&mut self, outcome: LocalValidationOutcome) {
        if matches!(outcome, LocalValidationOutcome::Failed { .. }) {
            self.local_rejections = self.local_rejections.saturating_add(1);
        }
        self.last_local = Some(outcome);
    }

    pub fn record_ack(&mut self, result: AckResult) {
        if result.is_acceptance() {
            self.mark_succeeded();
        } else {
            self.firmware_rejections = self.firmware_rejections.saturating_add(1);
        }
        self.last_ack = Some(result);
    }

    /// Firmware moved past this position without acknowledging it
    pub fn mark_succeeded(&mut self) {
        if self.succeeded_at.is_none() {
            self.succeeded_at = Some(Utc::now());
        }
    }
}

/// One calibration invocation.
///
/// Owned exclusively by the orchestrator. The result is written exactly once
/// and the diagnostics log is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    pub id: u64,
    pub kind: CalibrationType,
    pub state: CalibrationState,
    /// Current position code (1-6), 0 when no position is active
    pub position: u8,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    diagnostics: Vec<DiagnosticEntry>,
    positions: BTreeMap<AccelPosition, PositionAttemptRecord>,
    /// Latest rejection or failure explanation
    #[serde(default)]
    last_reason: Option<String>,
    result: Option<CalibrationResult>,
    summary: Option<String>,
}

/// Read-only copy handed out for audit and UI display
pub type SessionSnapshot = CalibrationSession;

impl CalibrationSession {
    pub fn new(id: u64, kind: CalibrationType) -> Self {
        Self {
            id,
            kind,
            state: CalibrationState::Idle,
            position: 0,
            started_at: Utc::now(),
            ended_at: None,
            diagnostics: Vec::new(),
            positions: BTreeMap::new(),
            last_reason: None,
            result: None,
            summary: None,
        }
    }

    pub fn result(&self) -> Option<CalibrationResult> {
        self.result
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.result.is_none() && !self.state.is_terminal()
    }

    /// Append a diagnostics entry
    pub fn record(&mut self, severity: Severity, text: impl Into<String>) {
        let now = Utc::now();
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.diagnostics.push(DiagnosticEntry {
            timestamp: now,
            elapsed_ms,
            severity,
            text: text.into(),
        });
    }

    /// Append a diagnostics entry that explains the current state
    pub fn record_reason(&mut self, severity: Severity, text: impl Into<String>) {
        let text = text.into();
        self.record(severity, text.clone());
        self.last_reason = Some(text);
    }

    pub fn diagnostics(&self) -> &[DiagnosticEntry] {
        &self.diagnostics
    }

    /// Set the terminal result. Returns false if a result was already set.
    pub fn finalize(&mut self, result: CalibrationResult, summary: impl Into<String>) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        self.summary = Some(summary.into());
        self.ended_at = Some(Utc::now());
        true
    }

    /// Wall-clock duration so far (or total once finished)
    pub fn duration_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Position records ordered by position code
    pub fn positions(&self) -> impl Iterator<Item = &PositionAttemptRecord> {
        self.positions.values()
    }

    pub fn position_record(&self, position: AccelPosition) -> Option<&PositionAttemptRecord> {
        self.positions.get(&position)
    }

    /// Record for a position, created on first request
    pub fn position_record_mut(&mut self, position: AccelPosition) -> &mut PositionAttemptRecord {
        self.positions
            .entry(position)
            .or_insert_with(|| PositionAttemptRecord::new(position))
    }

    pub fn current_position(&self) -> Option<AccelPosition> {
        AccelPosition::from_code(u32::from(self.position))
    }

    pub fn satisfied_positions(&self) -> usize {
        self.positions.values().filter(|r| r.is_satisfied()).count()
    }

    /// Most recent rejection or failure reason, shown next to the state in the UI
    pub fn last_reason(&self) -> Option<&str> {
        self.last_reason.as_deref()
    }
}
