pub mod condition;
pub mod stage;

pub use condition::{
    check_condition, ConditionCheck, ConditionEvaluator, EvidenceSet, StageClockReading,
};
pub use stage::{StageEvaluationResult, StageEvaluator, StageOutcome};
