//! Feedback transitions
//!
//! Confirm, reject and modify are pure functions of a memory's state here;
//! the learning loop applies them inside a store transaction.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::LearningConfig;
use crate::error::{LoreError, Result};
use crate::memory::types::Memory;

/// Archive reason set when rejection drives confidence to the floor
pub const USER_REJECTED: &str = "user_rejected";

const FLOOR_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackAction {
    Confirm,
    Reject,
    /// Replace the summary with corrected text
    Modify { summary: String },
}

impl FeedbackAction {
    pub fn kind(&self) -> FeedbackKind {
        match self {
            FeedbackAction::Confirm => FeedbackKind::Confirm,
            FeedbackAction::Reject => FeedbackKind::Reject,
            FeedbackAction::Modify { .. } => FeedbackKind::Modify,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Confirm,
    Reject,
    Modify,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Confirm => "confirm",
            FeedbackKind::Reject => "reject",
            FeedbackKind::Modify => "modify",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackKind {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "confirm" => Ok(FeedbackKind::Confirm),
            "reject" => Ok(FeedbackKind::Reject),
            "modify" => Ok(FeedbackKind::Modify),
            other => Err(LoreError::Validation(format!("unknown feedback action: {other}"))),
        }
    }
}

/// Tunables for the transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackParams {
    pub confirmation_boost: f64,
    pub rejection_penalty: f64,
    pub modification_boost: f64,
    pub archival_floor: f64,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self::from(&LearningConfig::default())
    }
}

impl From<&LearningConfig> for FeedbackParams {
    fn from(config: &LearningConfig) -> Self {
        Self {
            confirmation_boost: config.confirmation_boost,
            rejection_penalty: config.rejection_penalty,
            modification_boost: config.modification_boost,
            archival_floor: config.archival_floor,
        }
    }
}

/// What a transition did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub previous_confidence: f64,
    pub new_confidence: f64,
    pub archived: bool,
}

/// Result of applying feedback, reported rather than raised for unknown ids
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    pub memory_id: String,
    pub action: FeedbackKind,
    pub success: bool,
    pub previous_confidence: Option<f64>,
    pub new_confidence: Option<f64>,
    pub archived: bool,
    pub message: Option<String>,
}

impl FeedbackOutcome {
    pub fn applied(memory_id: &str, action: FeedbackKind, transition: Transition) -> Self {
        Self {
            memory_id: memory_id.to_string(),
            action,
            success: true,
            previous_confidence: Some(transition.previous_confidence),
            new_confidence: Some(transition.new_confidence),
            archived: transition.archived,
            message: None,
        }
    }

    pub fn failed(memory_id: &str, action: FeedbackKind, message: impl Into<String>) -> Self {
        Self {
            memory_id: memory_id.to_string(),
            action,
            success: false,
            previous_confidence: None,
            new_confidence: None,
            archived: false,
            message: Some(message.into()),
        }
    }
}

/// Apply `action` to `memory` in place.
///
/// Never raises confidence on reject nor lowers it on confirm; the result
/// stays within [0, 1].
pub fn apply_feedback(
    memory: &mut Memory,
    action: &FeedbackAction,
    params: &FeedbackParams,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let previous = memory.confidence;
    let mut archived = false;

    let next = match action {
        FeedbackAction::Confirm => (previous + params.confirmation_boost).min(1.0).max(previous),
        FeedbackAction::Reject => {
            let next = (previous * (1.0 - params.rejection_penalty)).min(previous);
            if next <= params.archival_floor + FLOOR_TOLERANCE {
                archived = true;
            }
            next
        }
        FeedbackAction::Modify { summary } => {
            let summary = summary.trim();
            if summary.is_empty() {
                return Err(LoreError::Validation(
                    "modified summary must not be empty".to_string(),
                ));
            }
            memory.summary = summary.to_string();
            (previous + params.modification_boost).min(1.0).max(previous)
        }
    };

    memory.confidence = next.clamp(0.0, 1.0);
    memory.last_validated = Some(now);
    if archived {
        memory.archived = true;
        memory.archive_reason = Some(USER_REJECTED.to_string());
    }

    Ok(Transition {
        previous_confidence: previous,
        new_confidence: memory.confidence,
        archived,
    })
}
