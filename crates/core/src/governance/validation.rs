use std::collections::{BTreeSet, HashSet};

use crate::domain::playbook::{NextStage, Playbook, StageId, StageTransition};
use crate::errors::GovernanceError;

/// Static checks run before promotion. Returns every issue found, in stage order.
pub fn validate_playbook(playbook: &Playbook) -> Vec<String> {
    let mut issues = Vec::new();

    if playbook.stages.is_empty() {
        issues.push("playbook has no stages".to_owned());
        return issues;
    }

    for (key, stage) in &playbook.stages {
        if key != &stage.stage_id {
            issues.push(format!("stage key `{key}` does not match stage_id `{}`", stage.stage_id));
        }

        let mut seen_actions = HashSet::new();
        for action in &stage.must_do {
            if !seen_actions.insert(&action.action_id) {
                issues.push(format!(
                    "stage `{key}` declares action `{}` more than once",
                    action.action_id
                ));
            }
        }

        let transitions = [("on_success", &stage.on_success), ("on_failure", &stage.on_failure)];
        for (label, transition) in transitions {
            check_transition(playbook, key, label, transition, &mut issues);
        }
    }

    let terminating = stages_reaching_terminal(playbook);
    for key in playbook.stages.keys() {
        if !terminating.contains(key) {
            issues.push(format!("stage `{key}` cannot reach a terminal stage"));
        }
    }

    issues
}

pub fn ensure_valid(playbook: &Playbook) -> Result<(), GovernanceError> {
    let issues = validate_playbook(playbook);
    if issues.is_empty() {
        return Ok(());
    }
    Err(GovernanceError::Validation { playbook_id: playbook.playbook_id.clone(), issues })
}

fn check_transition(
    playbook: &Playbook,
    key: &StageId,
    label: &str,
    transition: &StageTransition,
    issues: &mut Vec<String>,
) {
    if let NextStage::Stage(next) = &transition.next_stage {
        if !playbook.stages.contains_key(next) {
            issues.push(format!("stage `{key}` {label} references unknown stage `{next}`"));
        }
    }

    let condition = &transition.condition;
    if condition.condition_type.requires_evidence_type() && condition.evidence_type.is_none() {
        issues.push(format!(
            "stage `{key}` {label} condition {} has no evidence_type",
            condition.condition_type.as_str()
        ));
    }
}

/// Fixed point over the transition graph: a stage terminates if either exit
/// is terminal or leads to a stage that terminates.
fn stages_reaching_terminal(playbook: &Playbook) -> BTreeSet<StageId> {
    let mut terminating = BTreeSet::new();
    loop {
        let before = terminating.len();
        for (key, stage) in &playbook.stages {
            if terminating.contains(key) {
                continue;
            }
            let exits = [&stage.on_success.next_stage, &stage.on_failure.next_stage];
            let reaches = exits.iter().any(|next| match next {
                NextStage::Terminal => true,
                NextStage::Stage(target) => terminating.contains(target),
            });
            if reaches {
                terminating.insert(key.clone());
            }
        }
        if terminating.len() == before {
            return terminating;
        }
    }
}
