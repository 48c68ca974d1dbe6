pub mod pinning;
pub mod promotion;
pub mod registry;
pub mod rollback;
pub mod validation;

pub use pinning::{PinRecord, PinningManager};
pub use promotion::{PromotionManager, PromotionRecord};
pub use registry::{LineageSnapshot, PlaybookRegistry, RegistrySnapshot, VersionSummary};
pub use rollback::{RollbackManager, RollbackRecord};
pub use validation::{ensure_valid, validate_playbook};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::playbook::PlaybookId;
use crate::errors::GovernanceError;

/// Emits `governance.<action>` on success or `governance.<action>_rejected` with the error.
pub(crate) fn record_outcome<T>(
    sink: &dyn AuditSink,
    audit: &AuditContext,
    playbook_id: &PlaybookId,
    category: AuditCategory,
    action: &str,
    result: &Result<T, GovernanceError>,
    metadata: &[(&str, String)],
) {
    let event = match result {
        Ok(_) => AuditEvent::from_context(
            audit,
            Some(playbook_id.clone()),
            format!("governance.{action}"),
            category,
            AuditOutcome::Success,
        ),
        Err(error) => AuditEvent::from_context(
            audit,
            Some(playbook_id.clone()),
            format!("governance.{action}_rejected"),
            category,
            AuditOutcome::Rejected,
        )
        .with_metadata("error", error.to_string())
        .with_metadata("error_class", error.error_class()),
    };

    let event = metadata
        .iter()
        .fold(event, |event, (key, value)| event.with_metadata(*key, value.clone()));
    sink.emit(event);
}
