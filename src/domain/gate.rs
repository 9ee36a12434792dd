// Gate decisions and validation results
//
// A gate decision is bound to one (work item, gate name) pair and records
// whether the gate is satisfied, plus the outcome of any human sign-off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::work_item::WorkItemId;

/// Outcome of an output validation, produced by agents and quality gates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Confidence score in `[0, 1]`
    pub confidence: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    /// A passing result with the given confidence (clamped to `[0, 1]`)
    pub fn valid(confidence: f64) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            confidence: clamp_confidence(confidence),
            recommendations: Vec::new(),
        }
    }

    /// A failing result carrying the given errors and zero confidence
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
            warnings: Vec::new(),
            confidence: 0.0,
            recommendations: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Result of a human approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalOutcome {
    Granted,
    Denied,
    Pending,
}

/// Decision of a single gate over a single work item
///
/// # Invariants
/// - `confidence` lies in `[0, 1]`
/// - A decision blocks completion while it is invalid, or while it requires
///   human approval that has not been granted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub gate_name: String,
    pub work_item_id: WorkItemId,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: f64,
    pub recommendations: Vec<String>,
    pub requires_human_approval: bool,
    pub approval: Option<ApprovalOutcome>,
    pub decided_at: DateTime<Utc>,
}

impl GateDecision {
    /// Builds a decision from a validation result
    pub fn from_validation(
        gate_name: impl Into<String>,
        work_item_id: impl Into<WorkItemId>,
        validation: ValidationResult,
        requires_human_approval: bool,
    ) -> Self {
        Self {
            gate_name: gate_name.into(),
            work_item_id: work_item_id.into(),
            is_valid: validation.is_valid,
            errors: validation.errors,
            warnings: validation.warnings,
            confidence: clamp_confidence(validation.confidence),
            recommendations: validation.recommendations,
            requires_human_approval,
            approval: requires_human_approval.then_some(ApprovalOutcome::Pending),
            decided_at: Utc::now(),
        }
    }

    /// Decision for a gate that has no registered check.
    ///
    /// Always valid, with a single warning naming the gate.
    pub fn pass_through(gate_name: impl Into<String>, work_item_id: impl Into<WorkItemId>) -> Self {
        let gate_name = gate_name.into();
        let warning = format!("gate '{}' is not configured; passing through", gate_name);
        Self::from_validation(
            gate_name,
            work_item_id,
            ValidationResult::valid(1.0).with_warning(warning),
            false,
        )
    }

    /// True while this decision prevents the work item from completing
    pub fn is_blocking(&self) -> bool {
        if !self.is_valid {
            return true;
        }
        self.requires_human_approval && self.approval != Some(ApprovalOutcome::Granted)
    }

    pub fn is_awaiting_approval(&self) -> bool {
        self.requires_human_approval && self.approval == Some(ApprovalOutcome::Pending)
    }
}
