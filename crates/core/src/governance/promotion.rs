use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditSink};
use crate::domain::playbook::{PlaybookId, PlaybookStatus, PlaybookVersionRef};
use crate::errors::GovernanceError;
use crate::governance::registry::PlaybookRegistry;
use crate::governance::{record_outcome, validation};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub version: PlaybookVersionRef,
    pub previous_current: Option<u32>,
}

/// Lifecycle gate: DRAFT -> PROMOTED -> RETIRED.
pub struct PromotionManager {
    registry: Arc<PlaybookRegistry>,
    sink: Arc<dyn AuditSink>,
}

impl PromotionManager {
    pub fn new(registry: Arc<PlaybookRegistry>, sink: Arc<dyn AuditSink>) -> Self {
        Self { registry, sink }
    }

    pub fn promote(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<PromotionRecord, GovernanceError> {
        self.promote_with_context(playbook_id, version, &AuditContext::system("promotion-manager"))
    }

    /// Freezes a validated DRAFT and moves the current pointer to it under one lock.
    pub fn promote_with_context(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
        audit: &AuditContext,
    ) -> Result<PromotionRecord, GovernanceError> {
        let result = self.registry.update_lineage(playbook_id, |lineage| {
            let playbook = lineage.version(playbook_id, version)?;
            if playbook.status != PlaybookStatus::Draft {
                return Err(GovernanceError::InvalidTransition {
                    version: playbook.version_ref(),
                    from: playbook.status,
                    to: PlaybookStatus::Promoted,
                });
            }
            validation::ensure_valid(playbook)?;

            let record = PromotionRecord {
                version: playbook.version_ref(),
                previous_current: lineage.current,
            };
            lineage.replace_status(version, PlaybookStatus::Promoted);
            lineage.current = Some(version);
            Ok(record)
        });

        let previous = result
            .as_ref()
            .ok()
            .and_then(|record| record.previous_current)
            .map(|previous| previous.to_string())
            .unwrap_or_else(|| "none".to_owned());
        record_outcome(
            self.sink.as_ref(),
            audit,
            playbook_id,
            AuditCategory::Promotion,
            "promoted",
            &result,
            &[("version", version.to_string()), ("previous_current", previous)],
        );
        result
    }

    pub fn retire(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<PlaybookVersionRef, GovernanceError> {
        self.retire_with_context(playbook_id, version, &AuditContext::system("promotion-manager"))
    }

    /// Retires a PROMOTED version that neither the current pointer nor any pin references.
    pub fn retire_with_context(
        &self,
        playbook_id: &PlaybookId,
        version: u32,
        audit: &AuditContext,
    ) -> Result<PlaybookVersionRef, GovernanceError> {
        let result = self.registry.update_lineage(playbook_id, |lineage| {
            let playbook = lineage.version(playbook_id, version)?;
            let version_ref = playbook.version_ref();
            if playbook.status != PlaybookStatus::Promoted {
                return Err(GovernanceError::InvalidTransition {
                    version: version_ref,
                    from: playbook.status,
                    to: PlaybookStatus::Retired,
                });
            }

            let pinned_scopes = lineage.pinned_scopes(version);
            let is_current = lineage.current == Some(version);
            if is_current || !pinned_scopes.is_empty() {
                return Err(GovernanceError::ReferencedVersion {
                    version: version_ref,
                    is_current,
                    pinned_scopes,
                });
            }

            lineage.replace_status(version, PlaybookStatus::Retired);
            Ok(version_ref)
        });

        record_outcome(
            self.sink.as_ref(),
            audit,
            playbook_id,
            AuditCategory::Promotion,
            "retired",
            &result,
            &[("version", version.to_string())],
        );
        result
    }
}
