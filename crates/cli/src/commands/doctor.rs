use std::path::Path;

use playbook_core::catalog::load_catalog;
use playbook_core::config::{EngineConfig, LoadOptions};
use playbook_core::governance::validate_playbook;
use playbook_core::Playbook;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            match config.catalog.path.as_deref() {
                Some(path) => {
                    let (readability, definitions) = check_catalog(path);
                    checks.push(readability);
                    checks.push(definitions);
                }
                None => {
                    checks.push(skipped("catalog_readability", "catalog.path is not configured"));
                    checks.push(skipped("catalog_definitions", "catalog.path is not configured"));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped(
                "catalog_readability",
                "skipped because configuration did not load",
            ));
            checks.push(skipped(
                "catalog_definitions",
                "skipped because configuration did not load",
            ));
        }
    }

    // Skipped checks do not fail the report; an unconfigured catalog is a valid setup.
    let any_fail = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog(path: &Path) -> (DoctorCheck, DoctorCheck) {
    let playbooks = match load_catalog(path) {
        Ok(playbooks) => playbooks,
        Err(error) => {
            return (
                DoctorCheck {
                    name: "catalog_readability",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                },
                skipped("catalog_definitions", "skipped because the catalog could not be read"),
            );
        }
    };

    let readability = DoctorCheck {
        name: "catalog_readability",
        status: CheckStatus::Pass,
        details: format!("loaded {} definition(s) from `{}`", playbooks.len(), path.display()),
    };

    (readability, check_definitions(&playbooks))
}

fn check_definitions(playbooks: &[Playbook]) -> DoctorCheck {
    let failures: Vec<String> = playbooks
        .iter()
        .flat_map(|playbook| {
            let version = playbook.version_ref();
            validate_playbook(playbook).into_iter().map(move |issue| format!("{version}: {issue}"))
        })
        .collect();

    if failures.is_empty() {
        DoctorCheck {
            name: "catalog_definitions",
            status: CheckStatus::Pass,
            details: format!("{} definition(s) passed static validation", playbooks.len()),
        }
    } else {
        DoctorCheck {
            name: "catalog_definitions",
            status: CheckStatus::Fail,
            details: failures.join("; "),
        }
    }
}

fn skipped(name: &'static str, details: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: details.to_string() }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
