use std::path::Path;

use playbook_core::catalog::load_definition;
use playbook_core::errors::ApplicationError;
use playbook_core::governance::ensure_valid;

use crate::commands::CommandResult;

pub fn run(file: &Path) -> CommandResult {
    let outcome = (|| -> Result<String, ApplicationError> {
        let playbook = load_definition(file)?;
        ensure_valid(&playbook)?;
        Ok(format!(
            "{} passed static validation ({} stage(s))",
            playbook.version_ref(),
            playbook.stages.len()
        ))
    })();

    match outcome {
        Ok(message) => {
            tracing::info!(
                event_name = "cli.validate.passed",
                file = %file.display(),
                "definition is valid"
            );
            CommandResult::success("validate", message)
        }
        Err(error) => {
            tracing::warn!(
                event_name = "cli.validate.failed",
                file = %file.display(),
                error = %error,
                "definition is invalid"
            );
            CommandResult::from_error("validate", error)
        }
    }
}
