use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::evidence::OpportunityId;
use crate::domain::playbook::PlaybookId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Evaluation,
    Registry,
    Promotion,
    Pinning,
    Rollback,
    System,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub opportunity_id: Option<OpportunityId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        opportunity_id: Option<OpportunityId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { opportunity_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    /// Context for calls that arrive without a caller-supplied correlation id.
    pub fn system(actor: impl Into<String>) -> Self {
        Self::new(None, "system", actor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub playbook_id: Option<PlaybookId>,
    pub opportunity_id: Option<OpportunityId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        playbook_id: Option<PlaybookId>,
        opportunity_id: Option<OpportunityId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            playbook_id,
            opportunity_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn from_context(
        context: &AuditContext,
        playbook_id: Option<PlaybookId>,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self::new(
            playbook_id,
            context.opportunity_id.clone(),
            context.correlation_id.clone(),
            event_type,
            category,
            context.actor.clone(),
            outcome,
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Forwards audit events to the process `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let playbook_id = event.playbook_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let opportunity_id =
            event.opportunity_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                event_name = %event.event_type,
                event_id = %event.event_id,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                playbook_id,
                opportunity_id,
                actor = %event.actor,
                metadata = %metadata,
                "playbook engine event"
            ),
            AuditOutcome::Rejected => tracing::info!(
                event_name = %event.event_type,
                event_id = %event.event_id,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                playbook_id,
                opportunity_id,
                actor = %event.actor,
                metadata = %metadata,
                "playbook engine request rejected"
            ),
            AuditOutcome::Warning => tracing::warn!(
                event_name = %event.event_type,
                event_id = %event.event_id,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                playbook_id,
                opportunity_id,
                actor = %event.actor,
                metadata = %metadata,
                "playbook engine warning"
            ),
        }
    }
}
