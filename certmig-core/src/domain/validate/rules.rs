// certmig-core/src/domain/validate/rules.rs

use crate::domain::error::DomainError;
use crate::domain::validate::report::Severity;
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_error() -> Severity {
    Severity::Error
}

fn default_warning() -> Severity {
    Severity::Warning
}

/// Business rule: a predicate evaluated per row of one dataset.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BusinessRule {
    #[validate(length(min = 1))]
    pub name: String,
    pub store: String,
    pub table: String,
    /// Closed boolean expression over column names and literals.
    #[validate(length(min = 1))]
    pub condition: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_warning")]
    pub severity: Severity,
}

/// Completeness rule: fields that must exist and hold values.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompletenessRule {
    #[validate(length(min = 1))]
    pub name: String,
    pub store: String,
    pub table: String,
    #[validate(length(min = 1))]
    pub required_fields: Vec<String>,
    #[serde(default = "default_error")]
    pub severity: Severity,
}

/// Data-quality rules are currently table-agnostic (duplicate and
/// negative id scans run everywhere); the entry carries a name so the
/// report can say which configuration asked for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Validation rule file, grouped by family.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ValidationRuleSet {
    #[serde(default)]
    #[validate(nested)]
    pub business_rules: Vec<BusinessRule>,
    #[serde(default)]
    #[validate(nested)]
    pub completeness_rules: Vec<CompletenessRule>,
    #[serde(default)]
    pub data_quality_rules: Vec<DataQualityRule>,
}

impl ValidationRuleSet {
    pub fn from_yaml(content: &str) -> Result<Self, DomainError> {
        let set: ValidationRuleSet = serde_yaml::from_str(content)
            .map_err(|e| DomainError::Rule(format!("Unreadable validation rules: {}", e)))?;
        set.validate()
            .map_err(|e| DomainError::Rule(format!("Invalid validation rules: {}", e)))?;
        Ok(set)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_rule_file_parsing() -> Result<()> {
        let yaml = r#"
business_rules:
  - name: student_age_range
    store: ids
    table: students
    condition: "age >= 5 AND age <= 22"
    severity: WARNING
completeness_rules:
  - name: student_core_fields
    store: ids
    table: students
    required_fields: [id, first_name, last_name]
data_quality_rules:
  - name: baseline
"#;
        let set = ValidationRuleSet::from_yaml(yaml)?;
        assert_eq!(set.business_rules.len(), 1);
        assert_eq!(set.business_rules[0].severity, Severity::Warning);
        assert_eq!(set.completeness_rules[0].severity, Severity::Error);
        assert_eq!(set.completeness_rules[0].required_fields.len(), 3);
        Ok(())
    }

    #[test]
    fn test_empty_file_is_valid() -> Result<()> {
        let set = ValidationRuleSet::from_yaml("{}")?;
        assert!(set.business_rules.is_empty());
        Ok(())
    }
}
