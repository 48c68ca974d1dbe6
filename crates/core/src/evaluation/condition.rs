use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::condition::{ConditionType, Threshold, TransitionCondition};
use crate::domain::evidence::{ActionEvidence, EvidenceType, OpportunityId};
use crate::domain::playbook::StageId;

/// Evidence already narrowed to one opportunity and one stage.
#[derive(Clone, Debug, Default)]
pub struct EvidenceSet<'a> {
    items: Vec<&'a ActionEvidence>,
}

impl<'a> EvidenceSet<'a> {
    pub fn new(items: impl IntoIterator<Item = &'a ActionEvidence>) -> Self {
        Self { items: items.into_iter().collect() }
    }

    pub fn scoped(
        evidence: &'a [ActionEvidence],
        opportunity_id: &OpportunityId,
        stage_id: &StageId,
    ) -> Self {
        Self::new(evidence.iter().filter(|item| {
            &item.opportunity_id == opportunity_id && &item.stage_id == stage_id
        }))
    }

    pub fn count(&self, evidence_type: &EvidenceType) -> usize {
        self.items.iter().filter(|item| &item.evidence_type == evidence_type).count()
    }

    pub fn contains(&self, evidence_type: &EvidenceType) -> bool {
        self.count(evidence_type) > 0
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Stage-entry reading supplied by a stage-clock collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageClockReading {
    pub entered_at: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

impl StageClockReading {
    pub fn elapsed_minutes(&self) -> i64 {
        (self.observed_at - self.entered_at).num_minutes().max(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionCheck {
    pub satisfied: bool,
    pub warning: Option<String>,
}

impl ConditionCheck {
    fn satisfied(satisfied: bool) -> Self {
        Self { satisfied, warning: None }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self { satisfied: false, warning: Some(message.into()) }
    }
}

const DEFAULT_EVIDENCE_THRESHOLD: f64 = 1.0;

/// Evaluates one condition. Pure: the same inputs always give the same check.
///
/// `time_elapsed` is false without a clock reading and `manual_decision` is
/// always false; a manual decision is recorded as `MANUAL_OVERRIDE` evidence
/// and checked with `evidence_present`.
pub fn check_condition(
    condition: &TransitionCondition,
    evidence: &EvidenceSet<'_>,
    clock: Option<&StageClockReading>,
) -> ConditionCheck {
    match condition.condition_type {
        ConditionType::EvidencePresent => {
            let Some(evidence_type) = &condition.evidence_type else {
                return ConditionCheck::satisfied(false);
            };
            let threshold = match resolve_threshold(condition.threshold.as_ref()) {
                Ok(threshold) => threshold.unwrap_or(DEFAULT_EVIDENCE_THRESHOLD),
                Err(warning) => return ConditionCheck::warn(warning),
            };
            let count = evidence.count(evidence_type) as f64;
            ConditionCheck::satisfied(condition.operator.compare(count, threshold))
        }
        ConditionType::EvidenceAbsent => match &condition.evidence_type {
            Some(evidence_type) => ConditionCheck::satisfied(!evidence.contains(evidence_type)),
            None => ConditionCheck::satisfied(true),
        },
        ConditionType::TimeElapsed => {
            let Some(reading) = clock else {
                return ConditionCheck::satisfied(false);
            };
            match resolve_threshold(condition.threshold.as_ref()) {
                Ok(Some(minutes)) => ConditionCheck::satisfied(
                    condition.operator.compare(reading.elapsed_minutes() as f64, minutes),
                ),
                Ok(None) => ConditionCheck::warn("time_elapsed condition has no threshold"),
                Err(warning) => ConditionCheck::warn(warning),
            }
        }
        ConditionType::ManualDecision => ConditionCheck::satisfied(false),
        ConditionType::Unknown => ConditionCheck::warn("unknown condition type evaluated as false"),
    }
}

fn resolve_threshold(threshold: Option<&Threshold>) -> Result<Option<f64>, String> {
    match threshold {
        None => Ok(None),
        Some(value) => value
            .as_number()
            .map(Some)
            .ok_or_else(|| format!("threshold {value} is not numeric")),
    }
}

/// Condition evaluation with warnings reported through the injected sink.
#[derive(Clone)]
pub struct ConditionEvaluator {
    sink: Arc<dyn AuditSink>,
}

impl ConditionEvaluator {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn evaluate(
        &self,
        condition: &TransitionCondition,
        evidence: &EvidenceSet<'_>,
        clock: Option<&StageClockReading>,
        audit: &AuditContext,
    ) -> bool {
        let check = check_condition(condition, evidence, clock);
        if let Some(warning) = check.warning {
            self.sink.emit(
                AuditEvent::from_context(
                    audit,
                    None,
                    "evaluation.condition_warning",
                    AuditCategory::Evaluation,
                    AuditOutcome::Warning,
                )
                .with_metadata("condition", condition.to_string())
                .with_metadata("warning", warning),
            );
        }
        check.satisfied
    }
}
