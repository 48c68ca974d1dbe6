use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::evidence::ActionEvidence;
use crate::domain::playbook::{Playbook, PlaybookVersionRef};
use crate::errors::GovernanceError;
use crate::governance::registry::PlaybookRegistry;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse JSON `{path}`: {source}")]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("could not parse TOML `{path}`: {source}")]
    ParseToml { path: PathBuf, source: toml::de::Error },
    #[error("unsupported definition format for `{0}` (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DefinitionFormat {
    Json,
    Toml,
}

fn definition_format(path: &Path) -> Option<DefinitionFormat> {
    match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => Some(DefinitionFormat::Json),
        Some("toml") => Some(DefinitionFormat::Toml),
        _ => None,
    }
}

fn read(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path)
        .map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })
}

/// Reads one already-authored playbook definition.
pub fn load_definition(path: &Path) -> Result<Playbook, CatalogError> {
    let format =
        definition_format(path).ok_or_else(|| CatalogError::UnsupportedFormat(path.to_path_buf()))?;
    let raw = read(path)?;
    match format {
        DefinitionFormat::Json => serde_json::from_str(&raw)
            .map_err(|source| CatalogError::ParseJson { path: path.to_path_buf(), source }),
        DefinitionFormat::Toml => toml::from_str(&raw)
            .map_err(|source| CatalogError::ParseToml { path: path.to_path_buf(), source }),
    }
}

/// Reads every `.json`/`.toml` definition in a directory, in file-name order.
pub fn load_catalog(dir: &Path) -> Result<Vec<Playbook>, CatalogError> {
    let entries =
        fs::read_dir(dir).map_err(|source| CatalogError::Read { path: dir.to_path_buf(), source })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CatalogError::Read { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        if path.is_file() && definition_format(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|path| load_definition(path)).collect()
}

/// Reads a JSON array of evidence records.
pub fn load_evidence(path: &Path) -> Result<Vec<ActionEvidence>, CatalogError> {
    let raw = read(path)?;
    serde_json::from_str(&raw)
        .map_err(|source| CatalogError::ParseJson { path: path.to_path_buf(), source })
}

/// Registers definitions as drafts in `(playbook_id, version)` order.
pub fn register_all(
    registry: &PlaybookRegistry,
    mut playbooks: Vec<Playbook>,
) -> Result<Vec<PlaybookVersionRef>, GovernanceError> {
    playbooks.sort_by(|left, right| left.version_ref().cmp(&right.version_ref()));
    playbooks.into_iter().map(|playbook| registry.register(playbook)).collect()
}
