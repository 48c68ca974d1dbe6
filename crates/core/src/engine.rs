use std::sync::Arc;

use crate::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
    TracingAuditSink,
};
use crate::config::{AuditMode, EngineConfig};
use crate::domain::evidence::ActionEvidence;
use crate::domain::playbook::{
    Playbook, PlaybookId, PlaybookRef, PlaybookVersionRef, ScopeKey, StageId,
};
use crate::errors::GovernanceError;
use crate::evaluation::condition::StageClockReading;
use crate::evaluation::stage::{StageEvaluationResult, StageEvaluator};
use crate::governance::{
    PinRecord, PinningManager, PlaybookRegistry, PromotionManager, PromotionRecord,
    RollbackManager, RollbackRecord, VersionSummary,
};

/// Explicitly wired registry, governance managers and stage evaluator sharing one sink.
pub struct PlaybookEngine {
    registry: Arc<PlaybookRegistry>,
    promotion: PromotionManager,
    pinning: PinningManager,
    rollback: RollbackManager,
    evaluator: StageEvaluator,
    sink: Arc<dyn AuditSink>,
    actor: String,
}

impl PlaybookEngine {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        let registry = Arc::new(PlaybookRegistry::new(sink.clone()));
        Self::with_registry(registry, sink)
    }

    pub fn with_registry(registry: Arc<PlaybookRegistry>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            promotion: PromotionManager::new(registry.clone(), sink.clone()),
            pinning: PinningManager::new(registry.clone(), sink.clone()),
            rollback: RollbackManager::new(registry.clone(), sink.clone()),
            evaluator: StageEvaluator::new(sink.clone()),
            registry,
            sink,
            actor: "playbook-engine".to_owned(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let sink: Arc<dyn AuditSink> = match config.engine.audit {
            AuditMode::Tracing => Arc::new(TracingAuditSink),
            AuditMode::Disabled => Arc::new(NoopAuditSink),
        };
        Self::new(sink).with_actor(config.engine.actor.clone())
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn registry(&self) -> &Arc<PlaybookRegistry> {
        &self.registry
    }

    pub fn promotion(&self) -> &PromotionManager {
        &self.promotion
    }

    pub fn pinning(&self) -> &PinningManager {
        &self.pinning
    }

    pub fn rollback_manager(&self) -> &RollbackManager {
        &self.rollback
    }

    pub fn evaluator(&self) -> &StageEvaluator {
        &self.evaluator
    }

    fn context(&self) -> AuditContext {
        AuditContext::system(self.actor.clone())
    }

    pub fn evaluate_stage(
        &self,
        playbook_ref: &PlaybookRef,
        stage_id: &StageId,
        evidence: &[ActionEvidence],
    ) -> Result<StageEvaluationResult, GovernanceError> {
        let audit = AuditContext::new(
            evidence.first().map(|item| item.opportunity_id.clone()),
            "evaluation",
            self.actor.clone(),
        );
        self.evaluate_stage_with_audit(playbook_ref, stage_id, evidence, None, &audit)
    }

    /// Resolves the playbook (respecting pins), evaluates the stage and records the decision.
    pub fn evaluate_stage_with_audit(
        &self,
        playbook_ref: &PlaybookRef,
        stage_id: &StageId,
        evidence: &[ActionEvidence],
        clock: Option<&StageClockReading>,
        audit: &AuditContext,
    ) -> Result<StageEvaluationResult, GovernanceError> {
        let playbook = self.resolve(&playbook_ref.playbook_id, playbook_ref.scope_key.as_ref())?;
        let result =
            self.evaluator.evaluate_with_context(&playbook, stage_id, evidence, clock, audit);

        let mut event = AuditEvent::from_context(
            audit,
            Some(playbook.playbook_id.clone()),
            "evaluation.stage_evaluated",
            AuditCategory::Evaluation,
            AuditOutcome::Success,
        )
        .with_metadata("version", playbook.version.to_string())
        .with_metadata("stage_id", stage_id.to_string())
        .with_metadata("outcome", format!("{:?}", result.outcome))
        .with_metadata("can_advance", result.can_advance.to_string());
        if let Some(next_stage) = &result.next_stage {
            event = event.with_metadata("next_stage", next_stage.to_string());
        }
        self.sink.emit(event);

        Ok(result)
    }

    pub fn register(&self, playbook: Playbook) -> Result<PlaybookVersionRef, GovernanceError> {
        self.registry.register_with_context(playbook, &self.context())
    }

    pub fn fork_draft(
        &self,
        playbook_id: &PlaybookId,
        from_version: u32,
    ) -> Result<PlaybookVersionRef, GovernanceError> {
        self.registry.fork_draft_with_context(playbook_id, from_version, &self.context())
    }

    pub fn resolve(
        &self,
        playbook_id: &PlaybookId,
        scope_key: Option<&ScopeKey>,
    ) -> Result<Arc<Playbook>, GovernanceError> {
        self.registry.resolve(playbook_id, scope_key)
    }

    pub fn list_versions(
        &self,
        playbook_id: &PlaybookId,
    ) -> Result<Vec<VersionSummary>, GovernanceError> {
        self.registry.list_versions(playbook_id)
    }

    pub fn promote(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<PromotionRecord, GovernanceError> {
        self.promotion.promote_with_context(playbook_id, version, &self.context())
    }

    pub fn retire(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<PlaybookVersionRef, GovernanceError> {
        self.promotion.retire_with_context(playbook_id, version, &self.context())
    }

    pub fn pin(
        &self,
        scope_key: &ScopeKey,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<PinRecord, GovernanceError> {
        self.pinning.pin_with_context(scope_key, playbook_id, version, &self.context())
    }

    pub fn unpin(
        &self,
        scope_key: &ScopeKey,
        playbook_id: &PlaybookId,
    ) -> Result<Option<PinRecord>, GovernanceError> {
        self.pinning.unpin_with_context(scope_key, playbook_id, &self.context())
    }

    pub fn rollback(
        &self,
        playbook_id: &PlaybookId,
        target_version: u32,
    ) -> Result<RollbackRecord, GovernanceError> {
        self.rollback.rollback_with_context(playbook_id, target_version, &self.context())
    }
}

impl Default for PlaybookEngine {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::audit::InMemoryAuditSink;
    use crate::config::{AuditMode, EngineConfig};
    use crate::domain::condition::TransitionCondition;
    use crate::domain::evidence::ActionEvidence;
    use crate::domain::playbook::{
        MustDoAction, NextStage, Playbook, PlaybookId, PlaybookRef, PlaybookStage, ScopeKey,
        StageId, StageTransition,
    };
    use crate::errors::GovernanceError;
    use crate::evaluation::stage::StageOutcome;

    use super::PlaybookEngine;

    fn playbook(version: u32, next: &str) -> Playbook {
        Playbook::new("sales-v1", version)
            .with_stage(
                PlaybookStage::new(
                    "qualify",
                    StageTransition::new(
                        TransitionCondition::evidence_present("CONTACT_MADE"),
                        NextStage::stage(next),
                    ),
                    StageTransition::new(
                        TransitionCondition::evidence_present("DISQUALIFIED"),
                        NextStage::Terminal,
                    ),
                )
                .with_action(MustDoAction::new("make_contact", "CONTACT_MADE")),
            )
            .with_stage(PlaybookStage::new(
                next,
                StageTransition::new(TransitionCondition::manual_override(), NextStage::Terminal),
                StageTransition::new(TransitionCondition::manual_decision(), NextStage::Terminal),
            ))
    }

    fn contact_made() -> Vec<ActionEvidence> {
        vec![ActionEvidence::new(
            "opp-1",
            "qualify",
            "CONTACT_MADE",
            Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap(),
        )]
    }

    #[test]
    fn evaluate_stage_uses_pinned_version_for_scoped_refs() {
        let sink = InMemoryAuditSink::default();
        let engine = PlaybookEngine::new(Arc::new(sink.clone())).with_actor("revops");
        let sales = PlaybookId("sales-v1".to_owned());
        engine.register(playbook(1, "proposal")).expect("v1");
        engine.promote(&sales, 1).expect("promote v1");
        engine.pin(&ScopeKey("opp-1".to_owned()), &sales, 1).expect("pin");
        engine.register(playbook(2, "discovery")).expect("v2");
        engine.promote(&sales, 2).expect("promote v2");

        let qualify = StageId("qualify".to_owned());
        let pinned = engine
            .evaluate_stage(&PlaybookRef::scoped("sales-v1", "opp-1"), &qualify, &contact_made())
            .expect("pinned evaluation");
        let floating = engine
            .evaluate_stage(&PlaybookRef::floating("sales-v1"), &qualify, &contact_made())
            .expect("floating evaluation");

        assert_eq!(pinned.next_stage, Some(NextStage::stage("proposal")));
        assert_eq!(floating.next_stage, Some(NextStage::stage("discovery")));

        let evaluations: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|event| event.event_type == "evaluation.stage_evaluated")
            .collect();
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations[0].metadata.get("version").map(String::as_str), Some("1"));
        assert_eq!(evaluations[0].actor, "revops");
    }

    #[test]
    fn evaluate_unknown_playbook_is_not_found() {
        let engine = PlaybookEngine::new(Arc::new(InMemoryAuditSink::default()));
        let error = engine
            .evaluate_stage(
                &PlaybookRef::floating("missing"),
                &StageId("qualify".to_owned()),
                &[],
            )
            .expect_err("unknown playbook");
        assert!(matches!(error, GovernanceError::NotFound(_)));
    }

    #[test]
    fn unknown_stage_is_a_result_not_an_error() {
        let engine = PlaybookEngine::new(Arc::new(InMemoryAuditSink::default()));
        engine.register(playbook(1, "proposal")).expect("v1");
        engine.promote(&PlaybookId("sales-v1".to_owned()), 1).expect("promote");

        let result = engine
            .evaluate_stage(
                &PlaybookRef::floating("sales-v1"),
                &StageId("closing".to_owned()),
                &contact_made(),
            )
            .expect("stage lookup failures are routine results");
        assert_eq!(result.outcome, StageOutcome::StageNotFound);
    }

    #[test]
    fn from_config_respects_actor_and_audit_mode() {
        let mut config = EngineConfig::default();
        config.engine.actor = "ops-bot".to_owned();
        config.engine.audit = AuditMode::Disabled;

        let engine = PlaybookEngine::from_config(&config);
        engine.register(playbook(1, "proposal")).expect("register");
        assert_eq!(engine.actor, "ops-bot");
        assert_eq!(engine.registry().playbook_ids(), vec![PlaybookId("sales-v1".to_owned())]);
    }
}
