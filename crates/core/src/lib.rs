pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod evaluation;
pub mod governance;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    NoopAuditSink, TracingAuditSink,
};
pub use catalog::CatalogError;
pub use domain::condition::{ComparisonOperator, ConditionType, Threshold, TransitionCondition};
pub use domain::evidence::{ActionEvidence, EvidenceType, OpportunityId};
pub use domain::playbook::{
    ActionId, MustDoAction, NextStage, Playbook, PlaybookId, PlaybookRef, PlaybookStage,
    PlaybookStatus, PlaybookVersionRef, ScopeKey, StageId, StageTransition,
};
pub use engine::PlaybookEngine;
pub use errors::{ApplicationError, GovernanceError, InterfaceError};
pub use evaluation::{
    ConditionEvaluator, EvidenceSet, StageClockReading, StageEvaluationResult, StageEvaluator,
    StageOutcome,
};
pub use governance::{
    PinRecord, PinningManager, PlaybookRegistry, PromotionManager, PromotionRecord,
    RollbackManager, RollbackRecord, VersionSummary,
};
