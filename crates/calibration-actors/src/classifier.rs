//! Status-message classifier
//!
//! Firmware reports calibration progress as human-readable STATUSTEXT lines.
//! Each line is run through a prioritized rule list; the first rule that
//! matches decides the classification:
//!
//! 1. completion (unless negated)
//! 2. failure (unless negated)
//! 3. position request (accelerometer only)
//! 4. sampling
//!
//! Anything else is [`Classification::Uninterpreted`]. Every rule is a pure
//! predicate over the lowercased text, so the priority order is the only
//! thing that decides between overlapping matches.

use actor_protocol::{AccelPosition, CalibrationType};
use actor_runtime::{actor_debug, actor_warn};
use core_types::StatusLine;

/// What a firmware status line means for the running calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    PositionRequest(AccelPosition),
    Completion,
    Failure,
    /// Firmware is collecting data, optionally with a percentage
    Sampling { progress: Option<u8> },
    Uninterpreted,
}

/// Generic completion phrases, matched by containment
const COMPLETION_PHRASES: &[&str] = &[
    "calibration successful",
    "calibration success",
    "calibration complete",
    "calibration completed",
    "calibration done",
    "calibration finished",
    "calibration saved",
    "cal successful",
    "cal complete",
    "successfully calibrated",
];

/// Whole words that count as "done" in the per-type heuristics
const COMPLETION_WORDS: &[&str] = &[
    "complete",
    "completed",
    "done",
    "saved",
    "success",
    "successful",
    "calibrated",
    "ok",
];

/// Phrases that cancel any completion match, generic or per-type
const COMPLETION_NEGATIONS: &[&str] = &[
    "not complete",
    "not completed",
    "not done",
    "not saved",
    "not calibrated",
    "not ok",
];

/// Whole words that mark a failure
const FAILURE_WORDS: &[&str] = &["fail", "failed", "failure", "error", "aborted", "abort"];

/// Phrases that suppress a failure match; checked before the failure words
const FAILURE_NEGATIONS: &[&str] = &[
    "not failed",
    "not fail",
    "didn't fail",
    "did not fail",
    "didnt fail",
    "no error",
    "no errors",
    "without error",
];

const SAMPLING_PHRASES: &[&str] = &["sampling", "reading", "detected", "hold still", "calibrating"];

/// Lowercased text plus its alphanumeric words
struct LineText {
    lower: String,
    words: Vec<String>,
}

impl LineText {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self { lower, words }
    }

    fn contains(&self, phrase: &str) -> bool {
        self.lower.contains(phrase)
    }

    fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.lower.contains(p))
    }

    fn has_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    fn has_any_word(&self, words: &[&str]) -> bool {
        words.iter().any(|w| self.has_word(w))
    }

    fn has_word_prefix(&self, prefix: &str) -> bool {
        self.words.iter().any(|w| w.starts_with(prefix))
    }
}

type RuleFn = fn(&LineText, CalibrationType) -> Option<Classification>;

/// Rules in priority order
const RULES: &[(&str, RuleFn)] = &[
    ("completion", completion_rule),
    ("failure", failure_rule),
    ("position", position_rule),
    ("sampling", sampling_rule),
];

/// Names of the rules in the order they are evaluated
pub fn rule_order() -> Vec<&'static str> {
    RULES.iter().map(|(name, _)| *name).collect()
}

/// Classify one firmware status line.
///
/// Severity is informational only: firmware sends "Calibration FAILED" at
/// both CRITICAL and INFO depending on version, so the text decides.
pub fn classify(line: &StatusLine, kind: CalibrationType) -> Classification {
    classify_text(&line.text, kind)
}

pub fn classify_text(text: &str, kind: CalibrationType) -> Classification {
    let line = LineText::new(text);
    for (name, rule) in RULES {
        if let Some(classification) = rule(&line, kind) {
            actor_debug!("Classifier: {:?} matched rule '{}': {}", classification, name, text);
            return classification;
        }
    }
    Classification::Uninterpreted
}

fn completion_rule(line: &LineText, kind: CalibrationType) -> Option<Classification> {
    if line.contains_any(COMPLETION_NEGATIONS) {
        return None;
    }
    if line.contains_any(COMPLETION_PHRASES) || type_completion_heuristic(line, kind) {
        return Some(Classification::Completion);
    }
    None
}

/// Firmware wording differs per sensor; these catch the type-specific forms
fn type_completion_heuristic(line: &LineText, kind: CalibrationType) -> bool {
    let done = line.has_any_word(COMPLETION_WORDS);
    match kind {
        CalibrationType::LevelHorizon => {
            (line.has_word("level") && line.has_any_word(&["complete", "completed", "done", "saved"]))
                || line.contains("trim ok")
        }
        CalibrationType::Gyroscope => line.has_word_prefix("gyro") && done,
        CalibrationType::Barometer => {
            (line.has_word_prefix("baro") || line.has_word("pressure")) && done
        }
        CalibrationType::Airspeed => line.has_word("airspeed") && done,
        CalibrationType::Compass => {
            (line.has_word_prefix("compass") || line.has_word_prefix("mag")) && done
        }
        CalibrationType::Accelerometer => {
            line.has_word_prefix("accel") && line.has_any_word(&["complete", "completed", "calibrated"])
        }
    }
}

fn failure_rule(line: &LineText, _kind: CalibrationType) -> Option<Classification> {
    if line.contains_any(FAILURE_NEGATIONS) {
        return None;
    }
    if line.has_any_word(FAILURE_WORDS) {
        return Some(Classification::Failure);
    }
    None
}

fn position_rule(line: &LineText, kind: CalibrationType) -> Option<Classification> {
    if !kind.uses_positions() || !line.has_word("place") {
        return None;
    }

    match resolve_position(line) {
        Some(position) => Some(Classification::PositionRequest(position)),
        None => {
            actor_warn!("Classifier: position request without a known orientation: {}", line.lower);
            None
        }
    }
}

/// Most specific orientation first; level last since most prompts mention it
fn resolve_position(line: &LineText) -> Option<AccelPosition> {
    let nose = line.has_word("nose") || line.contains("nosedown") || line.contains("noseup");
    let left = line.has_word("left");
    let right = line.has_word("right");

    if line.contains("nosedown") || (nose && line.has_word("down")) {
        Some(AccelPosition::NoseDown)
    } else if line.contains("noseup") || (nose && line.has_word("up")) {
        Some(AccelPosition::NoseUp)
    } else if left && !right {
        Some(AccelPosition::Left)
    } else if right && !left {
        Some(AccelPosition::Right)
    } else if line.has_word("back") || line.contains("upside down") || line.contains("upside-down")
    {
        Some(AccelPosition::Back)
    } else if line.has_word("level") {
        Some(AccelPosition::Level)
    } else {
        None
    }
}

fn sampling_rule(line: &LineText, _kind: CalibrationType) -> Option<Classification> {
    let progress = parse_progress(&line.lower);
    if line.contains_any(SAMPLING_PHRASES) || progress.is_some() {
        return Some(Classification::Sampling { progress });
    }
    None
}

/// Extract a percentage from "progress 45", "progress: 45" or "45%"
pub fn parse_progress(text: &str) -> Option<u8> {
    let lower = text.to_lowercase();

    if let Some(idx) = lower.find("progress") {
        let rest = lower.get(idx + "progress".len()..).unwrap_or("");
        let rest = rest.trim_start_matches(|c: char| c == ':' || c == '=' || c.is_whitespace());
        if let Some(value) = leading_number(rest) {
            return Some(value);
        }
    }

    let bytes = lower.as_bytes();
    for (idx, c) in lower.char_indices() {
        if c != '%' {
            continue;
        }
        let mut start = idx;
        while start > 0 && bytes.get(start - 1).is_some_and(|b| b.is_ascii_digit()) {
            start -= 1;
        }
        if start < idx {
            if let Some(value) = lower.get(start..idx).and_then(|s| s.parse::<u32>().ok()) {
                return Some(value.min(100) as u8);
            }
        }
    }

    None
}

fn leading_number(text: &str) -> Option<u8> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u32>().ok().map(|v| v.min(100) as u8)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use CalibrationType::*;

    #[test]
    fn test_successful_is_completion() {
        assert_eq!(
            classify_text("Calibration successful", Accelerometer),
            Classification::Completion
        );
        assert_eq!(
            classify_text("CALIBRATION COMPLETE", Compass),
            Classification::Completion
        );
    }

    #[test]
    fn test_nose_down_is_position_4() {
        let result = classify_text("place vehicle nose down", Accelerometer);
        assert_eq!(result, Classification::PositionRequest(AccelPosition::NoseDown));
        assert_eq!(AccelPosition::NoseDown.code(), 4);
        assert_ne!(result, Classification::Completion);
    }

    #[test]
    fn test_all_position_prompts() {
        let cases = [
            ("Place vehicle level and press any key.", AccelPosition::Level),
            ("Place vehicle on its LEFT side and press any key.", AccelPosition::Left),
            ("Place vehicle on its RIGHT side and press any key.", AccelPosition::Right),
            ("Place vehicle nose DOWN and press any key.", AccelPosition::NoseDown),
            ("Place vehicle nose UP and press any key.", AccelPosition::NoseUp),
            ("Place vehicle on its BACK and press any key.", AccelPosition::Back),
            ("Place vehicle upside down", AccelPosition::Back),
        ];
        for (text, expected) in cases {
            assert_eq!(
                classify_text(text, Accelerometer),
                Classification::PositionRequest(expected),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_level_does_not_shadow_specific_positions() {
        // Mentions "level" but asks for nose down
        assert_eq!(
            classify_text("Place vehicle nose down, keep wings level", Accelerometer),
            Classification::PositionRequest(AccelPosition::NoseDown)
        );
    }

    #[test]
    fn test_place_without_orientation_is_not_a_position() {
        assert_eq!(
            classify_text("Place vehicle and wait", Accelerometer),
            Classification::Uninterpreted
        );
        // "replace" is not "place"
        assert_eq!(
            classify_text("Replace battery level", Accelerometer),
            Classification::Uninterpreted
        );
    }

    #[test]
    fn test_positions_only_for_accelerometer() {
        assert_eq!(
            classify_text("Place vehicle level", Compass),
            Classification::Uninterpreted
        );
    }

    #[test]
    fn test_negated_failure_is_not_failure() {
        let result = classify_text("Sensor check failed? No: not failed", Gyroscope);
        assert_ne!(result, Classification::Failure);
        assert_ne!(
            classify_text("Offsets saved, didn't fail", Compass),
            Classification::Failure
        );
        assert_eq!(
            classify_text("Calibration FAILED", Accelerometer),
            Classification::Failure
        );
    }

    #[test]
    fn test_completion_beats_failure() {
        assert_eq!(
            classify_text("Calibration successful, 0 errors", Accelerometer),
            Classification::Completion
        );
    }

    #[test]
    fn test_type_specific_completion() {
        assert_eq!(
            classify_text("Level horizon saved", LevelHorizon),
            Classification::Completion
        );
        assert_eq!(classify_text("Trim OK", LevelHorizon), Classification::Completion);
        assert_eq!(
            classify_text("Gyro calibration done", Gyroscope),
            Classification::Completion
        );
        assert_eq!(
            classify_text("Barometer calibration complete", Barometer),
            Classification::Completion
        );
        assert_eq!(
            classify_text("Airspeed 1 calibrated", Airspeed),
            Classification::Completion
        );
        // Heuristics are scoped to their type
        assert_ne!(classify_text("Gyro done", Compass), Classification::Completion);
    }

    #[test]
    fn test_incomplete_is_not_completion() {
        assert_ne!(
            classify_text("Level calibration incomplete", LevelHorizon),
            Classification::Completion
        );
        assert_ne!(
            classify_text("Gyro not calibrated yet", Gyroscope),
            Classification::Completion
        );
    }

    #[test]
    fn test_negation_applies_to_generic_phrases() {
        // "cal complete" is a generic phrase, "not saved" takes it back
        assert_eq!(
            classify_text("Mag cal complete but offsets not saved", Compass),
            Classification::Uninterpreted
        );
        assert_ne!(
            classify_text("Calibration done? Not done, keep rotating", Compass),
            Classification::Completion
        );
        assert_eq!(
            classify_text("Calibration complete", Compass),
            Classification::Completion
        );
    }

    #[test]
    fn test_sampling() {
        assert_eq!(
            classify_text("Sampling accelerometer", Accelerometer),
            Classification::Sampling { progress: None }
        );
        assert_eq!(
            classify_text("Hold still", Gyroscope),
            Classification::Sampling { progress: None }
        );
        assert_eq!(
            classify_text("Mag cal progress 45", Compass),
            Classification::Sampling { progress: Some(45) }
        );
    }

    #[test]
    fn test_uninterpreted() {
        assert_eq!(
            classify_text("EKF3 IMU0 is using GPS", Gyroscope),
            Classification::Uninterpreted
        );
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("progress 45"), Some(45));
        assert_eq!(parse_progress("Progress: 7"), Some(7));
        assert_eq!(parse_progress("compass 1: 83%"), Some(83));
        assert_eq!(parse_progress("done 250%"), Some(100));
        assert_eq!(parse_progress("no numbers"), None);
        assert_eq!(parse_progress("100 % sure"), None);
    }

    #[test]
    fn test_rule_priority_order() {
        assert_eq!(rule_order(), vec!["completion", "failure", "position", "sampling"]);
    }
}
