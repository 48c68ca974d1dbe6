use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditContext, AuditSink, TracingAuditSink};
use crate::domain::evidence::{ActionEvidence, EvidenceType};
use crate::domain::playbook::{ActionId, NextStage, Playbook, PlaybookStage, StageId};
use crate::evaluation::condition::{ConditionEvaluator, EvidenceSet, StageClockReading};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed,
    MissingEvidence,
    Waiting,
    StageNotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvaluationResult {
    pub stage_id: StageId,
    pub outcome: StageOutcome,
    pub can_advance: bool,
    pub next_stage: Option<NextStage>,
    pub reason: String,
    pub required_evidence: BTreeSet<EvidenceType>,
    pub missing_evidence: BTreeSet<EvidenceType>,
    pub blocking_actions: Vec<ActionId>,
}

impl StageEvaluationResult {
    fn stage_not_found(playbook: &Playbook, stage_id: &StageId) -> Self {
        Self {
            stage_id: stage_id.clone(),
            outcome: StageOutcome::StageNotFound,
            can_advance: false,
            next_stage: None,
            reason: format!("stage `{stage_id}` not found in playbook {}", playbook.version_ref()),
            required_evidence: BTreeSet::new(),
            missing_evidence: BTreeSet::new(),
            blocking_actions: Vec::new(),
        }
    }
}

pub struct StageEvaluator {
    conditions: ConditionEvaluator,
}

impl StageEvaluator {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { conditions: ConditionEvaluator::new(sink) }
    }

    pub fn evaluate_stage(
        &self,
        playbook: &Playbook,
        stage_id: &StageId,
        evidence: &[ActionEvidence],
    ) -> StageEvaluationResult {
        self.evaluate_stage_at(playbook, stage_id, evidence, None)
    }

    pub fn evaluate_stage_at(
        &self,
        playbook: &Playbook,
        stage_id: &StageId,
        evidence: &[ActionEvidence],
        clock: Option<&StageClockReading>,
    ) -> StageEvaluationResult {
        let audit = AuditContext::new(
            evidence.first().map(|item| item.opportunity_id.clone()),
            "evaluation",
            "stage-evaluator",
        );
        self.evaluate_with_context(playbook, stage_id, evidence, clock, &audit)
    }

    /// Decides one stage's outcome. Success is checked before failure, so a
    /// stage satisfying both always resolves to its success transition.
    ///
    /// The evidence is scoped to the opportunity named by its first record;
    /// callers must not mix opportunities in one call.
    pub fn evaluate_with_context(
        &self,
        playbook: &Playbook,
        stage_id: &StageId,
        evidence: &[ActionEvidence],
        clock: Option<&StageClockReading>,
        audit: &AuditContext,
    ) -> StageEvaluationResult {
        let Some(stage) = playbook.stage(stage_id) else {
            return StageEvaluationResult::stage_not_found(playbook, stage_id);
        };

        let scoped = match evidence.first() {
            Some(first) => EvidenceSet::scoped(evidence, &first.opportunity_id, stage_id),
            None => EvidenceSet::default(),
        };

        let required_evidence = required_evidence(stage);
        let missing_evidence: BTreeSet<EvidenceType> = required_evidence
            .iter()
            .filter(|evidence_type| !scoped.contains(evidence_type))
            .cloned()
            .collect();
        let blocking_actions = stage
            .must_do
            .iter()
            .filter(|action| missing_evidence.contains(&action.evidence_required))
            .map(|action| action.action_id.clone())
            .collect();

        let (outcome, next_stage, reason) =
            if self.conditions.evaluate(&stage.on_success.condition, &scoped, clock, audit) {
                (
                    StageOutcome::Succeeded,
                    Some(stage.on_success.next_stage.clone()),
                    format!("success condition satisfied: {}", stage.on_success.condition),
                )
            } else if self.conditions.evaluate(&stage.on_failure.condition, &scoped, clock, audit) {
                (
                    StageOutcome::Failed,
                    Some(stage.on_failure.next_stage.clone()),
                    format!("failure condition satisfied: {}", stage.on_failure.condition),
                )
            } else if !missing_evidence.is_empty() {
                let missing =
                    missing_evidence.iter().map(|item| item.0.as_str()).collect::<Vec<_>>();
                (
                    StageOutcome::MissingEvidence,
                    None,
                    format!("missing required evidence: {}", missing.join(", ")),
                )
            } else {
                (
                    StageOutcome::Waiting,
                    None,
                    "waiting for success or failure condition".to_owned(),
                )
            };

        StageEvaluationResult {
            stage_id: stage_id.clone(),
            can_advance: next_stage.is_some(),
            outcome,
            next_stage,
            reason,
            required_evidence,
            missing_evidence,
            blocking_actions,
        }
    }
}

impl Default for StageEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

fn required_evidence(stage: &PlaybookStage) -> BTreeSet<EvidenceType> {
    stage.must_do.iter().map(|action| action.evidence_required.clone()).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use crate::audit::{InMemoryAuditSink, NoopAuditSink};
    use crate::domain::condition::{ConditionType, TransitionCondition};
    use crate::domain::evidence::{ActionEvidence, EvidenceType};
    use crate::domain::playbook::{
        ActionId, MustDoAction, NextStage, Playbook, PlaybookStage, StageId, StageTransition,
    };
    use crate::evaluation::condition::StageClockReading;
    use crate::evaluation::stage::{StageEvaluator, StageOutcome};

    fn qualify_playbook() -> Playbook {
        Playbook::new("sales-v1", 1).with_stage(
            PlaybookStage::new(
                "qualify",
                StageTransition::new(
                    TransitionCondition::evidence_present("CONTACT_MADE"),
                    NextStage::stage("proposal"),
                ),
                StageTransition::new(
                    TransitionCondition::evidence_present("DISQUALIFIED"),
                    NextStage::Terminal,
                ),
            )
            .with_action(MustDoAction::new("make_contact", "CONTACT_MADE"))
            .with_action(MustDoAction::new("log_budget", "BUDGET_CONFIRMED")),
        )
    }

    fn evidence(stage: &str, evidence_type: &str) -> ActionEvidence {
        ActionEvidence::new(
            "opp-1",
            stage,
            evidence_type,
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        )
    }

    fn evaluator() -> StageEvaluator {
        StageEvaluator::new(Arc::new(NoopAuditSink))
    }

    fn qualify() -> StageId {
        StageId("qualify".to_owned())
    }

    #[test]
    fn unknown_stage_returns_not_found_result() {
        let result =
            evaluator().evaluate_stage(&qualify_playbook(), &StageId("nope".to_owned()), &[]);

        assert_eq!(result.outcome, StageOutcome::StageNotFound);
        assert!(!result.can_advance);
        assert!(result.required_evidence.is_empty());
        assert!(result.missing_evidence.is_empty());
        assert!(result.blocking_actions.is_empty());
        assert!(result.reason.contains("nope"));
    }

    #[test]
    fn success_condition_advances_to_next_stage() {
        let result = evaluator().evaluate_stage(
            &qualify_playbook(),
            &qualify(),
            &[evidence("qualify", "CONTACT_MADE")],
        );

        assert!(result.can_advance);
        assert_eq!(result.outcome, StageOutcome::Succeeded);
        assert_eq!(result.next_stage, Some(NextStage::stage("proposal")));
        assert!(result.reason.contains("CONTACT_MADE"));
        assert_eq!(
            result.missing_evidence.into_iter().collect::<Vec<_>>(),
            vec![EvidenceType("BUDGET_CONFIRMED".to_owned())]
        );
        assert_eq!(result.blocking_actions, vec![ActionId("log_budget".to_owned())]);
    }

    #[test]
    fn success_wins_when_both_conditions_hold() {
        let result = evaluator().evaluate_stage(
            &qualify_playbook(),
            &qualify(),
            &[evidence("qualify", "DISQUALIFIED"), evidence("qualify", "CONTACT_MADE")],
        );

        assert_eq!(result.outcome, StageOutcome::Succeeded);
        assert_eq!(result.next_stage, Some(NextStage::stage("proposal")));
    }

    #[test]
    fn failure_condition_routes_to_failure_stage() {
        let result = evaluator().evaluate_stage(
            &qualify_playbook(),
            &qualify(),
            &[evidence("qualify", "DISQUALIFIED")],
        );

        assert!(result.can_advance);
        assert_eq!(result.outcome, StageOutcome::Failed);
        assert_eq!(result.next_stage, Some(NextStage::Terminal));
    }

    #[test]
    fn missing_evidence_blocks_and_names_actions() {
        let result = evaluator().evaluate_stage(&qualify_playbook(), &qualify(), &[]);

        assert!(!result.can_advance);
        assert_eq!(result.outcome, StageOutcome::MissingEvidence);
        assert_eq!(result.next_stage, None);
        assert_eq!(result.reason, "missing required evidence: BUDGET_CONFIRMED, CONTACT_MADE");
        assert_eq!(
            result.blocking_actions,
            vec![ActionId("make_contact".to_owned()), ActionId("log_budget".to_owned())]
        );
        assert!(result.missing_evidence.is_subset(&result.required_evidence));
    }

    #[test]
    fn evidence_from_other_stages_does_not_count() {
        let result = evaluator().evaluate_stage(
            &qualify_playbook(),
            &qualify(),
            &[evidence("qualify", "NOTE"), evidence("proposal", "CONTACT_MADE")],
        );

        assert_eq!(result.outcome, StageOutcome::MissingEvidence);
        assert!(result.missing_evidence.contains(&EvidenceType("CONTACT_MADE".to_owned())));
    }

    #[test]
    fn evidence_is_scoped_by_the_requested_stage_key() {
        let mut playbook = qualify_playbook();
        let mut stage = playbook.stages.remove(&qualify()).expect("qualify stage");
        stage.stage_id = StageId("qualify-legacy".to_owned());
        playbook.stages.insert(qualify(), stage);

        let result = evaluator().evaluate_stage(
            &playbook,
            &qualify(),
            &[evidence("qualify", "CONTACT_MADE")],
        );

        assert_eq!(result.outcome, StageOutcome::Succeeded);
        assert_eq!(result.stage_id, qualify());
        assert_eq!(result.next_stage, Some(NextStage::stage("proposal")));
    }

    #[test]
    fn waits_when_evidence_complete_but_no_condition_holds() {
        let playbook = Playbook::new("sales-v1", 1).with_stage(
            PlaybookStage::new(
                "negotiate",
                StageTransition::new(TransitionCondition::manual_decision(), NextStage::Terminal),
                StageTransition::new(TransitionCondition::time_elapsed(60.0), NextStage::Terminal),
            )
            .with_action(MustDoAction::new("send_terms", "TERMS_SENT")),
        );

        let result = evaluator().evaluate_stage(
            &playbook,
            &StageId("negotiate".to_owned()),
            &[evidence("negotiate", "TERMS_SENT")],
        );

        assert_eq!(result.outcome, StageOutcome::Waiting);
        assert_eq!(result.reason, "waiting for success or failure condition");
        assert!(result.missing_evidence.is_empty());
        assert!(result.blocking_actions.is_empty());
    }

    #[test]
    fn clock_reading_enables_time_elapsed_failure() {
        let playbook = Playbook::new("sales-v1", 1).with_stage(PlaybookStage::new(
            "negotiate",
            StageTransition::new(TransitionCondition::manual_override(), NextStage::Terminal),
            StageTransition::new(
                TransitionCondition::time_elapsed(60.0),
                NextStage::stage("nurture"),
            ),
        ));
        let entered_at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let reading =
            StageClockReading { entered_at, observed_at: entered_at + Duration::minutes(90) };

        let result = evaluator().evaluate_stage_at(
            &playbook,
            &StageId("negotiate".to_owned()),
            &[],
            Some(&reading),
        );

        assert_eq!(result.outcome, StageOutcome::Failed);
        assert_eq!(result.next_stage, Some(NextStage::stage("nurture")));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let playbook = qualify_playbook();
        let evidence = vec![evidence("qualify", "BUDGET_CONFIRMED")];
        let evaluator = evaluator();

        let first = evaluator.evaluate_stage(&playbook, &qualify(), &evidence);
        let second = evaluator.evaluate_stage(&playbook, &qualify(), &evidence);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).expect("serialize first"),
            serde_json::to_string(&second).expect("serialize second")
        );
    }

    #[test]
    fn unknown_condition_type_warns_through_injected_sink() {
        let sink = InMemoryAuditSink::default();
        let evaluator = StageEvaluator::new(Arc::new(sink.clone()));
        let playbook = Playbook::new("sales-v1", 1).with_stage(PlaybookStage::new(
            "qualify",
            StageTransition::new(
                TransitionCondition::new(ConditionType::Unknown),
                NextStage::Terminal,
            ),
            StageTransition::new(TransitionCondition::manual_decision(), NextStage::Terminal),
        ));

        let result = evaluator.evaluate_stage(
            &playbook,
            &qualify(),
            &[evidence("qualify", "CONTACT_MADE")],
        );

        assert_eq!(result.outcome, StageOutcome::Waiting);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].opportunity_id.as_ref().map(|id| id.0.as_str()), Some("opp-1"));
    }
}
