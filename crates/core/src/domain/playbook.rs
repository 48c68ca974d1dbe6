use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::condition::TransitionCondition;
use crate::domain::evidence::EvidenceType;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaybookId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

/// Tenant or opportunity key a playbook version can be pinned to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeKey(pub String);

macro_rules! display_newtype {
    ($($name:ident),+) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_newtype!(PlaybookId, StageId, ActionId, ScopeKey);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    #[default]
    Draft,
    Promoted,
    Retired,
}

impl fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Draft => "DRAFT",
            Self::Promoted => "PROMOTED",
            Self::Retired => "RETIRED",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MustDoAction {
    pub action_id: ActionId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub evidence_required: EvidenceType,
}

impl MustDoAction {
    pub fn new(action_id: impl Into<String>, evidence_required: impl Into<String>) -> Self {
        Self {
            action_id: ActionId(action_id.into()),
            description: String::new(),
            evidence_required: EvidenceType(evidence_required.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStage {
    Stage(StageId),
    Terminal,
}

impl NextStage {
    pub fn stage(stage_id: impl Into<String>) -> Self {
        Self::Stage(StageId(stage_id.into()))
    }
}

impl fmt::Display for NextStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage_id) => write!(f, "{stage_id}"),
            Self::Terminal => f.write_str("<terminal>"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub condition: TransitionCondition,
    pub next_stage: NextStage,
}

impl StageTransition {
    pub fn new(condition: TransitionCondition, next_stage: NextStage) -> Self {
        Self { condition, next_stage }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybookStage {
    pub stage_id: StageId,
    #[serde(default)]
    pub must_do: Vec<MustDoAction>,
    pub on_success: StageTransition,
    pub on_failure: StageTransition,
}

impl PlaybookStage {
    pub fn new(
        stage_id: impl Into<String>,
        on_success: StageTransition,
        on_failure: StageTransition,
    ) -> Self {
        Self { stage_id: StageId(stage_id.into()), must_do: Vec::new(), on_success, on_failure }
    }

    pub fn with_action(mut self, action: MustDoAction) -> Self {
        self.must_do.push(action);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaybookVersionRef {
    pub playbook_id: PlaybookId,
    pub version: u32,
}

impl fmt::Display for PlaybookVersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.playbook_id, self.version)
    }
}

/// How a caller names the playbook it wants evaluated: floating, or through a pinned scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookRef {
    pub playbook_id: PlaybookId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_key: Option<ScopeKey>,
}

impl PlaybookRef {
    pub fn floating(playbook_id: impl Into<String>) -> Self {
        Self { playbook_id: PlaybookId(playbook_id.into()), scope_key: None }
    }

    pub fn scoped(playbook_id: impl Into<String>, scope_key: impl Into<String>) -> Self {
        Self {
            playbook_id: PlaybookId(playbook_id.into()),
            scope_key: Some(ScopeKey(scope_key.into())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub playbook_id: PlaybookId,
    pub version: u32,
    #[serde(default)]
    pub status: PlaybookStatus,
    #[serde(default)]
    pub stages: BTreeMap<StageId, PlaybookStage>,
}

impl Playbook {
    pub fn new(playbook_id: impl Into<String>, version: u32) -> Self {
        Self {
            playbook_id: PlaybookId(playbook_id.into()),
            version,
            status: PlaybookStatus::Draft,
            stages: BTreeMap::new(),
        }
    }

    pub fn with_stage(mut self, stage: PlaybookStage) -> Self {
        self.stages.insert(stage.stage_id.clone(), stage);
        self
    }

    pub fn stage(&self, stage_id: &StageId) -> Option<&PlaybookStage> {
        self.stages.get(stage_id)
    }

    pub fn version_ref(&self) -> PlaybookVersionRef {
        PlaybookVersionRef { playbook_id: self.playbook_id.clone(), version: self.version }
    }

    pub(crate) fn with_status(&self, status: PlaybookStatus) -> Self {
        Self { status, ..self.clone() }
    }

    pub(crate) fn as_version(&self, version: u32) -> Self {
        Self { version, status: PlaybookStatus::Draft, ..self.clone() }
    }
}
