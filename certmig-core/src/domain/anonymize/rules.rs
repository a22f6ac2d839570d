// certmig-core/src/domain/anonymize/rules.rs

use crate::domain::error::DomainError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Synthetic replacement value resolved through the consistency map.
    #[serde(alias = "faker")]
    Synthetic,
    /// Salted one-way hash, truncated to 16 hex chars.
    Hash,
    /// `TOKEN_########` drawn from a per-rule counter.
    #[serde(alias = "tokenize")]
    Token,
    /// Replace with null. Never allowed on FK columns.
    #[serde(alias = "nullify")]
    Null,
    #[serde(alias = "preserve")]
    Passthrough,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Synthetic => "synthetic",
            Self::Hash => "hash",
            Self::Token => "token",
            Self::Null => "null",
            Self::Passthrough => "passthrough",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(format!("Unknown hash algorithm: {}", s)),
        }
    }
}

/// Shape of a synthetic value. Names mirror the rule-file vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticKind {
    Email,
    FirstName,
    LastName,
    Name,
    PhoneNumber,
    StreetAddress,
    City,
    Zipcode,
    DateOfBirth,
    UserName,
    Ipv4,
    Url,
}

impl SyntheticKind {
    /// Whether this kind belongs to the `*name*` leak-sentinel family.
    pub fn is_name_family(&self) -> bool {
        matches!(
            self,
            Self::FirstName | Self::LastName | Self::Name | Self::UserName
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyntheticArgs {
    pub minimum_age: Option<u32>,
    pub maximum_age: Option<u32>,
}

/// One ordered anonymization rule. The first rule whose pattern matches
/// a column name (case-insensitively) governs that column.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnonymizationRule {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub field_pattern: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub faker_type: Option<SyntheticKind>,
    #[serde(default)]
    pub faker_args: SyntheticArgs,
    #[serde(default)]
    pub hash_algorithm: Option<HashAlgorithm>,
}

/// Rule file layout: `rules: [...]`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RuleSet {
    #[validate(nested)]
    pub rules: Vec<AnonymizationRule>,
}

impl RuleSet {
    pub fn from_yaml(content: &str) -> Result<Self, DomainError> {
        let set: RuleSet = serde_yaml::from_str(content)
            .map_err(|e| DomainError::Rule(format!("Unreadable rule file: {}", e)))?;
        set.validate()
            .map_err(|e| DomainError::Rule(format!("Invalid rule set: {}", e)))?;
        Ok(set)
    }
}

struct CompiledRule {
    rule: AnonymizationRule,
    pattern: Regex,
}

/// Compiled rule list. Regexes compile once at phase start; a malformed
/// pattern is a blocking configuration error (silence = fail).
pub struct RuleBinder {
    compiled: Vec<CompiledRule>,
}

impl RuleBinder {
    pub fn new(set: &RuleSet) -> Result<Self, DomainError> {
        let mut compiled = Vec::with_capacity(set.rules.len());

        for rule in &set.rules {
            let pattern = RegexBuilder::new(&rule.field_pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    DomainError::Rule(format!(
                        "Rule '{}' has an invalid pattern '{}': {}",
                        rule.name, rule.field_pattern, e
                    ))
                })?;

            if rule.strategy == Strategy::Synthetic && rule.faker_type.is_none() {
                return Err(DomainError::Rule(format!(
                    "Rule '{}' uses the synthetic strategy without a faker_type",
                    rule.name
                )));
            }

            compiled.push(CompiledRule {
                rule: rule.clone(),
                pattern,
            });
        }

        Ok(Self { compiled })
    }

    /// First matching rule wins; unmatched columns pass through.
    pub fn match_column(&self, column: &str) -> Option<&AnonymizationRule> {
        self.compiled
            .iter()
            .find(|c| c.pattern.is_match(column))
            .map(|c| &c.rule)
    }

    pub fn rules(&self) -> impl Iterator<Item = &AnonymizationRule> {
        self.compiled.iter().map(|c| &c.rule)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn email_rule_yaml() -> &'static str {
        r#"
rules:
  - name: email_rule
    field_pattern: "email"
    strategy: synthetic
    faker_type: email
  - name: id_hash
    field_pattern: "_id$"
    strategy: hash
  - name: everything_else
    field_pattern: "^notes$"
    strategy: nullify
"#
    }

    #[test]
    fn test_rule_parsing_with_aliases() -> Result<()> {
        let set = RuleSet::from_yaml(email_rule_yaml())?;
        assert_eq!(set.rules.len(), 3);
        assert_eq!(set.rules[0].strategy, Strategy::Synthetic);
        // Legacy spelling maps onto the canonical strategy
        assert_eq!(set.rules[2].strategy, Strategy::Null);
        Ok(())
    }

    #[test]
    fn test_first_match_wins_case_insensitive() -> Result<()> {
        let set = RuleSet::from_yaml(email_rule_yaml())?;
        let binder = RuleBinder::new(&set)?;

        // "Contact_Email" matches the email rule despite the case
        let rule = binder.match_column("Contact_Email").unwrap();
        assert_eq!(rule.name, "email_rule");

        // "parent_id" only matches the hash rule
        let rule = binder.match_column("parent_id").unwrap();
        assert_eq!(rule.name, "id_hash");

        // unmatched column -> implicit passthrough
        assert!(binder.match_column("created_at").is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let set = RuleSet {
            rules: vec![AnonymizationRule {
                name: "broken".into(),
                field_pattern: "[unclosed".into(),
                strategy: Strategy::Hash,
                faker_type: None,
                faker_args: SyntheticArgs::default(),
                hash_algorithm: None,
            }],
        };
        assert!(RuleBinder::new(&set).is_err());
    }

    #[test]
    fn test_synthetic_requires_kind() {
        let set = RuleSet {
            rules: vec![AnonymizationRule {
                name: "nameless".into(),
                field_pattern: "name".into(),
                strategy: Strategy::Synthetic,
                faker_type: None,
                faker_args: SyntheticArgs::default(),
                hash_algorithm: None,
            }],
        };
        assert!(RuleBinder::new(&set).is_err());
    }
}
