use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use playbook_cli::commands::{config, doctor, evaluate, validate};
use serde_json::Value;
use tempfile::TempDir;

const SALES_TOML: &str = r#"
playbook_id = "sales-v1"
version = 1

[stages.qualify]
stage_id = "qualify"
must_do = [{ action_id = "make_contact", evidence_required = "CONTACT_MADE" }]

[stages.qualify.on_success]
next_stage = { stage = "proposal" }
condition = { condition_type = "evidence_present", evidence_type = "CONTACT_MADE", threshold = 1, operator = "gte" }

[stages.qualify.on_failure]
next_stage = "terminal"
condition = { condition_type = "evidence_present", evidence_type = "DISQUALIFIED" }

[stages.proposal]
stage_id = "proposal"

[stages.proposal.on_success]
next_stage = "terminal"
condition = { condition_type = "evidence_present", evidence_type = "PROPOSAL_SENT" }

[stages.proposal.on_failure]
next_stage = "terminal"
condition = { condition_type = "manual_decision" }
"#;

const DANGLING_TOML: &str = r#"
playbook_id = "broken"
version = 1

[stages.qualify]
stage_id = "qualify"

[stages.qualify.on_success]
next_stage = { stage = "nowhere" }
condition = { condition_type = "evidence_present", evidence_type = "CONTACT_MADE" }

[stages.qualify.on_failure]
next_stage = "terminal"
condition = { condition_type = "manual_decision" }
"#;

const CONTACT_EVIDENCE: &str = r#"[
    {
        "opportunity_id": "opp-42",
        "stage_id": "qualify",
        "evidence_type": "CONTACT_MADE",
        "timestamp": "2026-05-11T14:05:00Z"
    }
]"#;

#[test]
fn validate_accepts_a_well_formed_definition() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let path = write(dir.path(), "sales.toml", SALES_TOML);

        let result = validate::run(&path);
        assert_eq!(result.exit_code, 0, "expected valid definition");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "validate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or("").contains("sales-v1@v1"));
    });
}

#[test]
fn validate_reports_dangling_next_stage() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let path = write(dir.path(), "broken.toml", DANGLING_TOML);

        let result = validate::run(&path);
        assert_eq!(result.exit_code, 4, "expected governance failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "validation");
        assert!(payload["message"].as_str().unwrap_or("").contains("nowhere"));
    });
}

#[test]
fn validate_rejects_unreadable_file() {
    with_env(&[], || {
        let result = validate::run(Path::new("/nonexistent/sales.toml"));
        assert_eq!(result.exit_code, 3, "expected catalog failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "catalog");
    });
}

#[test]
fn evaluate_prints_advancing_result() {
    with_env(&[("PLAYBOOK_ENGINE_AUDIT", "disabled")], || {
        let dir = TempDir::new().expect("tempdir");
        let playbook = write(dir.path(), "sales.toml", SALES_TOML);
        let evidence = write(dir.path(), "evidence.json", CONTACT_EVIDENCE);

        let result = evaluate::run(&playbook, "qualify", &evidence);
        assert_eq!(result.exit_code, 0, "expected evaluation success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["can_advance"], true);
        assert_eq!(payload["outcome"], "succeeded");
        assert_eq!(payload["next_stage"]["stage"], "proposal");
    });
}

#[test]
fn evaluate_without_evidence_reports_blocking_actions() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let playbook = write(dir.path(), "sales.toml", SALES_TOML);
        let evidence = write(dir.path(), "evidence.json", "[]");

        let result = evaluate::run(&playbook, "qualify", &evidence);
        assert_eq!(result.exit_code, 0, "missing evidence is not an error");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["can_advance"], false);
        assert_eq!(payload["missing_evidence"], serde_json::json!(["CONTACT_MADE"]));
        assert_eq!(payload["blocking_actions"], serde_json::json!(["make_contact"]));
    });
}

#[test]
fn evaluate_refuses_invalid_definition() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let playbook = write(dir.path(), "broken.toml", DANGLING_TOML);
        let evidence = write(dir.path(), "evidence.json", "[]");

        let result = evaluate::run(&playbook, "qualify", &evidence);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "evaluate");
        assert_eq!(payload["error_class"], "validation");
    });
}

#[test]
fn evaluate_reports_config_failure() {
    with_env(&[("PLAYBOOK_ENGINE_AUDIT", "loud")], || {
        let dir = TempDir::new().expect("tempdir");
        let playbook = write(dir.path(), "sales.toml", SALES_TOML);
        let evidence = write(dir.path(), "evidence.json", "[]");

        let result = evaluate::run(&playbook, "qualify", &evidence);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_valid_catalog() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "sales.toml", SALES_TOML);
    let catalog = dir.path().display().to_string();

    with_env(&[("PLAYBOOK_CATALOG_PATH", &catalog)], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected doctor pass");

        let payload: Value = serde_json::from_str(&result.output).expect("doctor json");
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"][1]["name"], "catalog_readability");
        assert_eq!(payload["checks"][2]["status"], "pass");
    });
}

#[test]
fn doctor_fails_on_invalid_catalog_definition() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "sales.toml", SALES_TOML);
    write(dir.path(), "broken.toml", DANGLING_TOML);
    let catalog = dir.path().display().to_string();

    with_env(&[("PLAYBOOK_CATALOG_PATH", &catalog)], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] catalog_definitions: broken@v1"));
    });
}

#[test]
fn doctor_skips_catalog_checks_without_catalog() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0);

        let payload: Value = serde_json::from_str(&result.output).expect("doctor json");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("PLAYBOOK_LOG_LEVEL", "debug"), ("PLAYBOOK_ENGINE_ACTOR", "ops-bot")], || {
        let output = config::run();
        assert!(output.contains("- engine.actor = ops-bot (source: env (PLAYBOOK_ENGINE_ACTOR))"));
        assert!(output.contains("- logging.level = debug (source: env (PLAYBOOK_LOG_LEVEL))"));
        assert!(output.contains("- catalog.path = <unset> (source: default)"));
    });
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("fixture should be writable");
    path
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PLAYBOOK_ENGINE_ACTOR",
        "PLAYBOOK_ENGINE_AUDIT",
        "PLAYBOOK_CATALOG_PATH",
        "PLAYBOOK_LOGGING_LEVEL",
        "PLAYBOOK_LOGGING_FORMAT",
        "PLAYBOOK_LOG_LEVEL",
        "PLAYBOOK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
