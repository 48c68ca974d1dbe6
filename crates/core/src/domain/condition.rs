use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::evidence::EvidenceType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    EvidencePresent,
    EvidenceAbsent,
    TimeElapsed,
    ManualDecision,
    #[serde(other)]
    Unknown,
}

impl ConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EvidencePresent => "evidence_present",
            Self::EvidenceAbsent => "evidence_absent",
            Self::TimeElapsed => "time_elapsed",
            Self::ManualDecision => "manual_decision",
            Self::Unknown => "unknown",
        }
    }

    pub fn requires_evidence_type(self) -> bool {
        matches!(self, Self::EvidencePresent | Self::EvidenceAbsent)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    #[default]
    Gte,
    Lte,
    Eq,
}

impl ComparisonOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Eq => "eq",
        }
    }

    pub fn compare(self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::Gte => actual >= threshold,
            Self::Lte => actual <= threshold,
            Self::Eq => actual == threshold,
        }
    }
}

/// Numeric or textual threshold; text is parsed as a number when compared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Number(f64),
    Text(String),
}

impl Threshold {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => value.is_finite().then_some(*value),
            Self::Text(raw) => raw.trim().parse::<f64>().ok().filter(|value| value.is_finite()),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(raw) => write!(f, "{raw:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionCondition {
    #[serde(alias = "type")]
    pub condition_type: ConditionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_type: Option<EvidenceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
    #[serde(default)]
    pub operator: ComparisonOperator,
}

impl TransitionCondition {
    pub fn new(condition_type: ConditionType) -> Self {
        Self {
            condition_type,
            evidence_type: None,
            threshold: None,
            operator: ComparisonOperator::default(),
        }
    }

    pub fn evidence_present(evidence_type: impl Into<String>) -> Self {
        Self::new(ConditionType::EvidencePresent).with_evidence_type(evidence_type)
    }

    pub fn evidence_absent(evidence_type: impl Into<String>) -> Self {
        Self::new(ConditionType::EvidenceAbsent).with_evidence_type(evidence_type)
    }

    pub fn time_elapsed(minutes: f64) -> Self {
        Self::new(ConditionType::TimeElapsed).with_threshold(Threshold::Number(minutes))
    }

    pub fn manual_decision() -> Self {
        Self::new(ConditionType::ManualDecision)
    }

    /// A manual decision expressed as recorded override evidence.
    pub fn manual_override() -> Self {
        Self::evidence_present(EvidenceType::MANUAL_OVERRIDE)
    }

    pub fn with_evidence_type(mut self, evidence_type: impl Into<String>) -> Self {
        self.evidence_type = Some(EvidenceType(evidence_type.into()));
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_operator(mut self, operator: ComparisonOperator) -> Self {
        self.operator = operator;
        self
    }
}

impl fmt::Display for TransitionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.condition_type.as_str())?;
        let mut wrote = false;
        if let Some(evidence_type) = &self.evidence_type {
            write!(f, "{evidence_type}")?;
            wrote = true;
        }
        if let Some(threshold) = &self.threshold {
            if wrote {
                f.write_str(" ")?;
            }
            write!(f, "{} {threshold}", self.operator.as_str())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparisonOperator, ConditionType, Threshold, TransitionCondition};

    #[test]
    fn unknown_condition_type_deserializes_to_unknown() {
        let condition: TransitionCondition =
            serde_json::from_str(r#"{"condition_type":"crm_score_above","threshold":10}"#)
                .expect("unknown condition types must still parse");

        assert_eq!(condition.condition_type, ConditionType::Unknown);
        assert_eq!(condition.operator, ComparisonOperator::Gte);
    }

    #[test]
    fn threshold_accepts_numeric_strings() {
        let condition: TransitionCondition = serde_json::from_str(
            r#"{"type":"evidence_present","evidence_type":"DEMO_HELD","threshold":"2","operator":"eq"}"#,
        )
        .expect("string threshold");

        assert_eq!(condition.threshold.as_ref().and_then(Threshold::as_number), Some(2.0));
        assert_eq!(condition.operator, ComparisonOperator::Eq);
        assert_eq!(Threshold::Text("soon".to_owned()).as_number(), None);
    }

    #[test]
    fn display_names_type_evidence_and_threshold() {
        let condition = TransitionCondition::evidence_present("CONTACT_MADE")
            .with_threshold(Threshold::Number(1.0));
        assert_eq!(condition.to_string(), "evidence_present(CONTACT_MADE gte 1)");
        assert_eq!(TransitionCondition::manual_decision().to_string(), "manual_decision()");
    }

    #[test]
    fn operators_compare_counts() {
        assert!(ComparisonOperator::Gte.compare(2.0, 1.0));
        assert!(!ComparisonOperator::Lte.compare(2.0, 1.0));
        assert!(ComparisonOperator::Eq.compare(0.0, 0.0));
    }
}
