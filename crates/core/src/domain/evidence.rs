use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::playbook::StageId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvidenceType(pub String);

impl EvidenceType {
    pub const MANUAL_OVERRIDE: &'static str = "MANUAL_OVERRIDE";

    /// The only evidence type that can satisfy a manual decision.
    pub fn manual_override() -> Self {
        Self(Self::MANUAL_OVERRIDE.to_owned())
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable record that an action happened for one opportunity in one stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvidence {
    pub opportunity_id: OpportunityId,
    pub stage_id: StageId,
    pub evidence_type: EvidenceType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ActionEvidence {
    pub fn new(
        opportunity_id: impl Into<String>,
        stage_id: impl Into<String>,
        evidence_type: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            opportunity_id: OpportunityId(opportunity_id.into()),
            stage_id: StageId(stage_id.into()),
            evidence_type: EvidenceType(evidence_type.into()),
            timestamp,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
