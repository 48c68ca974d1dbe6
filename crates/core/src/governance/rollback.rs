use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditSink};
use crate::domain::playbook::{PlaybookId, PlaybookStatus};
use crate::errors::GovernanceError;
use crate::governance::record_outcome;
use crate::governance::registry::PlaybookRegistry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub playbook_id: PlaybookId,
    pub from_version: Option<u32>,
    pub to_version: u32,
}

/// Moves the current pointer to an earlier promoted version. Pins are untouched.
pub struct RollbackManager {
    registry: Arc<PlaybookRegistry>,
    sink: Arc<dyn AuditSink>,
}

impl RollbackManager {
    pub fn new(registry: Arc<PlaybookRegistry>, sink: Arc<dyn AuditSink>) -> Self {
        Self { registry, sink }
    }

    pub fn rollback(
        &self,
        playbook_id: &PlaybookId,
        target_version: u32,
    ) -> Result<RollbackRecord, GovernanceError> {
        let audit = AuditContext::system("rollback-manager");
        self.rollback_with_context(playbook_id, target_version, &audit)
    }

    pub fn rollback_with_context(
        &self,
        playbook_id: &PlaybookId,
        target_version: u32,
        audit: &AuditContext,
    ) -> Result<RollbackRecord, GovernanceError> {
        let result = self.registry.update_lineage(playbook_id, |lineage| {
            let target = lineage.version(playbook_id, target_version)?;
            match target.status {
                PlaybookStatus::Promoted => {}
                PlaybookStatus::Retired => {
                    return Err(GovernanceError::RetiredVersion(target.version_ref()));
                }
                PlaybookStatus::Draft => {
                    return Err(GovernanceError::InvalidTransition {
                        version: target.version_ref(),
                        from: PlaybookStatus::Draft,
                        to: PlaybookStatus::Promoted,
                    });
                }
            }

            let record = RollbackRecord {
                playbook_id: playbook_id.clone(),
                from_version: lineage.current,
                to_version: target_version,
            };
            lineage.current = Some(target_version);
            Ok(record)
        });

        let from = result
            .as_ref()
            .ok()
            .and_then(|record| record.from_version)
            .map(|version| version.to_string())
            .unwrap_or_else(|| "none".to_owned());
        record_outcome(
            self.sink.as_ref(),
            audit,
            playbook_id,
            AuditCategory::Rollback,
            "rolled_back",
            &result,
            &[("from_version", from), ("to_version", target_version.to_string())],
        );
        result
    }
}
