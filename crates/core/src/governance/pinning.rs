use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditSink};
use crate::domain::playbook::{PlaybookId, PlaybookStatus, PlaybookVersionRef, ScopeKey};
use crate::errors::GovernanceError;
use crate::governance::record_outcome;
use crate::governance::registry::PlaybookRegistry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub scope_key: ScopeKey,
    pub version: PlaybookVersionRef,
}

/// Binds scopes to fixed playbook versions so later promotions and rollbacks
/// do not affect in-flight work.
pub struct PinningManager {
    registry: Arc<PlaybookRegistry>,
    sink: Arc<dyn AuditSink>,
}

impl PinningManager {
    pub fn new(registry: Arc<PlaybookRegistry>, sink: Arc<dyn AuditSink>) -> Self {
        Self { registry, sink }
    }

    pub fn pin(
        &self,
        scope_key: &ScopeKey,
        playbook_id: &PlaybookId,
        version: u32,
    ) -> Result<PinRecord, GovernanceError> {
        let audit = AuditContext::system("pinning-manager");
        self.pin_with_context(scope_key, playbook_id, version, &audit)
    }

    pub fn pin_with_context(
        &self,
        scope_key: &ScopeKey,
        playbook_id: &PlaybookId,
        version: u32,
        audit: &AuditContext,
    ) -> Result<PinRecord, GovernanceError> {
        let result = self.registry.update_lineage(playbook_id, |lineage| {
            let playbook = lineage.version(playbook_id, version)?;
            if playbook.status == PlaybookStatus::Retired {
                return Err(GovernanceError::RetiredVersion(playbook.version_ref()));
            }

            match lineage.pins.get(scope_key) {
                Some(existing) if *existing != version => {
                    return Err(GovernanceError::Validation {
                        playbook_id: playbook_id.clone(),
                        issues: vec![format!(
                            "scope `{scope_key}` is already pinned to version {existing}; unpin it first"
                        )],
                    });
                }
                _ => {}
            }

            let record =
                PinRecord { scope_key: scope_key.clone(), version: playbook.version_ref() };
            lineage.pins.insert(scope_key.clone(), version);
            Ok(record)
        });

        record_outcome(
            self.sink.as_ref(),
            audit,
            playbook_id,
            AuditCategory::Pinning,
            "pinned",
            &result,
            &[("scope_key", scope_key.to_string()), ("version", version.to_string())],
        );
        result
    }

    pub fn unpin(
        &self,
        scope_key: &ScopeKey,
        playbook_id: &PlaybookId,
    ) -> Result<Option<PinRecord>, GovernanceError> {
        self.unpin_with_context(scope_key, playbook_id, &AuditContext::system("pinning-manager"))
    }

    /// Releases the scope's pin; `None` when the scope had no pin.
    pub fn unpin_with_context(
        &self,
        scope_key: &ScopeKey,
        playbook_id: &PlaybookId,
        audit: &AuditContext,
    ) -> Result<Option<PinRecord>, GovernanceError> {
        let result = self.registry.update_lineage(playbook_id, |lineage| {
            Ok(lineage.pins.remove(scope_key).map(|version| PinRecord {
                scope_key: scope_key.clone(),
                version: PlaybookVersionRef { playbook_id: playbook_id.clone(), version },
            }))
        });

        let released = match &result {
            Ok(Some(record)) => record.version.version.to_string(),
            _ => "none".to_owned(),
        };
        record_outcome(
            self.sink.as_ref(),
            audit,
            playbook_id,
            AuditCategory::Pinning,
            "unpinned",
            &result,
            &[("scope_key", scope_key.to_string()), ("released_version", released)],
        );
        result
    }

    pub fn pinned_version(&self, scope_key: &ScopeKey, playbook_id: &PlaybookId) -> Option<u32> {
        self.registry.pins_for(playbook_id).ok()?.get(scope_key).copied()
    }
}
