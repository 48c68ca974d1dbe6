use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::domain::playbook::{PlaybookId, PlaybookStatus, PlaybookVersionRef, ScopeKey};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("playbook version {0} is already registered")]
    DuplicateVersion(PlaybookVersionRef),
    #[error("invalid transition for {version}: {from} -> {to}")]
    InvalidTransition { version: PlaybookVersionRef, from: PlaybookStatus, to: PlaybookStatus },
    #[error("playbook {playbook_id} failed validation: {}", issues.join("; "))]
    Validation { playbook_id: PlaybookId, issues: Vec<String> },
    #[error(
        "playbook version {version} is still referenced (current pointer: {is_current}, pinned scopes: {pinned_scopes:?})"
    )]
    ReferencedVersion { version: PlaybookVersionRef, is_current: bool, pinned_scopes: Vec<ScopeKey> },
    #[error("playbook version {0} is retired")]
    RetiredVersion(PlaybookVersionRef),
}

impl GovernanceError {
    pub fn playbook_not_found(playbook_id: &PlaybookId) -> Self {
        Self::NotFound(format!("playbook `{playbook_id}`"))
    }

    pub fn version_not_found(version: &PlaybookVersionRef) -> Self {
        Self::NotFound(format!("playbook version `{version}`"))
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::DuplicateVersion(_) => "duplicate_version",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation { .. } => "validation",
            Self::ReferencedVersion { .. } => "referenced_version",
            Self::RetiredVersion(_) => "retired_version",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Governance(#[from] GovernanceError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested playbook, version, or stage does not exist.",
            Self::Conflict { .. } => {
                "The playbook change conflicts with its current lifecycle state."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Governance(error) => {
                let message = error.to_string();
                match error {
                    GovernanceError::NotFound(_) => Self::NotFound { message, correlation_id },
                    GovernanceError::Validation { .. } => {
                        Self::BadRequest { message, correlation_id }
                    }
                    GovernanceError::DuplicateVersion(_)
                    | GovernanceError::InvalidTransition { .. }
                    | GovernanceError::ReferencedVersion { .. }
                    | GovernanceError::RetiredVersion(_) => {
                        Self::Conflict { message, correlation_id }
                    }
                }
            }
            ApplicationError::Catalog(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Configuration(error) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
        }
    }
}
