use std::path::Path;

use playbook_core::catalog::{load_definition, load_evidence};
use playbook_core::config::{EngineConfig, LoadOptions};
use playbook_core::errors::ApplicationError;
use playbook_core::{PlaybookEngine, PlaybookRef, PlaybookStatus, StageEvaluationResult, StageId};

use crate::commands::CommandResult;

pub fn run(playbook_path: &Path, stage: &str, evidence_path: &Path) -> CommandResult {
    match evaluate(playbook_path, stage, evidence_path) {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure(
                "evaluate",
                "serialization",
                format!("failed to serialize evaluation result: {error}"),
                5,
            ),
        },
        Err(error) => CommandResult::from_error("evaluate", error),
    }
}

/// Registers the definition as a draft, promotes it, and evaluates the stage
/// through the floating pointer.
fn evaluate(
    playbook_path: &Path,
    stage: &str,
    evidence_path: &Path,
) -> Result<StageEvaluationResult, ApplicationError> {
    let config = EngineConfig::load(LoadOptions::default())?;
    let mut playbook = load_definition(playbook_path)?;
    let evidence = load_evidence(evidence_path)?;

    // Definition files carry authoring state only; lifecycle is owned by the registry.
    playbook.status = PlaybookStatus::Draft;
    let playbook_id = playbook.playbook_id.clone();
    let version = playbook.version;

    let engine = PlaybookEngine::from_config(&config);
    engine.register(playbook)?;
    engine.promote(&playbook_id, version)?;

    let playbook_ref = PlaybookRef { playbook_id, scope_key: None };
    Ok(engine.evaluate_stage(&playbook_ref, &StageId(stage.to_owned()), &evidence)?)
}
