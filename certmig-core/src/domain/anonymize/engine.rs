// certmig-core/src/domain/anonymize/engine.rs

use crate::domain::anonymize::consistency::ConsistencyMap;
use crate::domain::anonymize::rules::{
    AnonymizationRule, HashAlgorithm, RuleBinder, Strategy, SyntheticKind,
};
use crate::domain::anonymize::synthetic::{SyntheticProvider, EMAIL_SUFFIX};
use crate::domain::catalog::{ColumnSpec, LogicalType};
use crate::domain::error::DomainError;
use crate::domain::value::{CellValue, Dataset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;

/// Hash output keeps the first 16 hex chars, enough to stay join-stable
/// while remaining readable in reports.
const HASH_PREFIX_LEN: usize = 16;

/// How many non-null output values the leak scan samples per column.
const LEAK_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakFinding {
    pub column: String,
    pub rule: String,
    pub sample: String,
    pub reason: String,
}

/// Result of transforming one staged table.
#[derive(Debug)]
pub struct TransformOutcome {
    pub dataset: Dataset,
    pub anonymized_fields: Vec<String>,
    pub fields_by_rule: BTreeMap<String, Vec<String>>,
    pub leaks: Vec<LeakFinding>,
}

pub struct AnonymizationEngine<'a> {
    binder: &'a RuleBinder,
    map: &'a ConsistencyMap,
    salt: String,
}

impl<'a> AnonymizationEngine<'a> {
    pub fn new(binder: &'a RuleBinder, map: &'a ConsistencyMap, salt: impl Into<String>) -> Self {
        Self {
            binder,
            map,
            salt: salt.into(),
        }
    }

    /// Applies the governing rule of each column to every cell and runs
    /// the leak scan over the transformed output. The input dataset is
    /// left untouched; leak findings never mutate the output either.
    pub fn transform_dataset(&self, input: &Dataset) -> Result<TransformOutcome, DomainError> {
        let bindings: Vec<Option<&AnonymizationRule>> = input
            .columns
            .iter()
            .map(|c| self.bind_column(&c.name))
            .collect::<Result<_, _>>()?;

        let columns: Vec<ColumnSpec> = input
            .columns
            .iter()
            .zip(&bindings)
            .map(|(col, rule)| ColumnSpec {
                name: col.name.clone(),
                logical_type: output_type(col.logical_type, *rule),
                nullable: col.nullable || matches!(rule.map(|r| r.strategy), Some(Strategy::Null)),
            })
            .collect();

        let mut dataset = Dataset::new(columns);
        dataset.rows.reserve(input.rows.len());

        for row in &input.rows {
            let mut out = Vec::with_capacity(row.len());
            for (cell, rule) in row.iter().zip(&bindings) {
                out.push(match rule {
                    Some(rule) => self.transform_cell(rule, cell)?,
                    None => cell.clone(),
                });
            }
            dataset.rows.push(out);
        }

        let mut anonymized_fields = Vec::new();
        let mut fields_by_rule: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (col, rule) in input.columns.iter().zip(&bindings) {
            if let Some(rule) = rule {
                anonymized_fields.push(col.name.clone());
                fields_by_rule
                    .entry(rule.name.clone())
                    .or_default()
                    .push(col.name.clone());
            }
        }

        let leaks = self.leak_scan(&dataset);

        Ok(TransformOutcome {
            dataset,
            anonymized_fields,
            fields_by_rule,
            leaks,
        })
    }

    /// Governing rule of a column or property key, if any.
    pub fn rule_for(&self, column: &str) -> Option<&'a AnonymizationRule> {
        self.binder.match_column(column)
    }

    /// Column-to-rule binding, refusing the one combination the FK
    /// invariant forbids: a null strategy on a key column.
    fn bind_column(&self, column: &str) -> Result<Option<&'a AnonymizationRule>, DomainError> {
        let rule = self.binder.match_column(column);
        if let Some(rule) = rule {
            if rule.strategy == Strategy::Null && is_key_column(column) {
                return Err(DomainError::NullOnForeignKey {
                    column: column.to_string(),
                    rule: rule.name.clone(),
                });
            }
        }
        Ok(rule)
    }

    /// Null in, null out — for every strategy, so nullability semantics
    /// survive the transform.
    pub fn transform_cell(
        &self,
        rule: &AnonymizationRule,
        value: &CellValue,
    ) -> Result<CellValue, DomainError> {
        if value.is_null() {
            return Ok(CellValue::Null);
        }

        Ok(match rule.strategy {
            Strategy::Passthrough => value.clone(),
            Strategy::Null => CellValue::Null,
            Strategy::Hash => CellValue::Text(self.hash(rule, &value.stringify())),
            Strategy::Token => CellValue::Text(self.map.token_for(&rule.name, &value.stringify())),
            Strategy::Synthetic => {
                let kind = rule.faker_type.ok_or_else(|| {
                    DomainError::Rule(format!("Rule '{}' lacks a faker_type", rule.name))
                })?;
                let args = rule.faker_args;
                let generated = self.map.resolve_with(&rule.name, &value.stringify(), || {
                    SyntheticProvider::generate(kind, &args)
                });
                CellValue::Text(generated)
            }
        })
    }

    /// Transforms one scalar inside a graph node/edge property document.
    pub fn transform_json(
        &self,
        rule: &AnonymizationRule,
        value: &serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let cell = match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Boolean(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(CellValue::Integer)
                .or_else(|| n.as_f64().map(CellValue::Float))
                .unwrap_or(CellValue::Null),
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        };
        Ok(self.transform_cell(rule, &cell)?.to_json())
    }

    fn hash(&self, rule: &AnonymizationRule, input: &str) -> String {
        let salted = format!("{}{}", input, self.salt);
        let digest = match rule.hash_algorithm.unwrap_or_default() {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(salted.as_bytes())),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(salted.as_bytes())),
        };
        digest[..HASH_PREFIX_LEN].to_string()
    }

    /// Samples transformed columns for values that still look like
    /// original data. Findings are reported, never fixed in place.
    pub fn leak_scan(&self, output: &Dataset) -> Vec<LeakFinding> {
        let mut findings = Vec::new();

        for (idx, col) in output.columns.iter().enumerate() {
            let Some(rule) = self.binder.match_column(&col.name) else {
                continue;
            };
            if rule.strategy == Strategy::Passthrough {
                continue;
            }

            for value in output.column_values(idx).take(LEAK_SAMPLE_SIZE) {
                let text = value.stringify();
                if let Some(reason) = sentinel_check(rule, &text) {
                    findings.push(LeakFinding {
                        column: col.name.clone(),
                        rule: rule.name.clone(),
                        sample: text,
                        reason,
                    });
                    break; // one finding per column is enough to flag it
                }
            }
        }

        findings
    }
}

/// Family sentinels: synthetic emails must resolve to the provider's
/// domain suffix; synthetic names must not be suspiciously short.
pub fn sentinel_check(rule: &AnonymizationRule, value: &str) -> Option<String> {
    match (rule.strategy, rule.faker_type) {
        (Strategy::Synthetic, Some(SyntheticKind::Email)) => {
            if value.contains('@') && !value.ends_with(EMAIL_SUFFIX) {
                return Some(format!("email outside synthetic domain ({})", EMAIL_SUFFIX));
            }
            None
        }
        (Strategy::Synthetic, Some(kind)) if kind.is_name_family() => {
            if value.len() < 3 {
                return Some("suspiciously short name".to_string());
            }
            None
        }
        _ => None,
    }
}

/// Key columns keep joins alive; the null strategy is refused on them.
fn is_key_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    lower == "id" || lower.ends_with("_id")
}

/// Transforming strategies rewrite the column as text; null and
/// passthrough keep the source type.
fn output_type(original: LogicalType, rule: Option<&AnonymizationRule>) -> LogicalType {
    match rule.map(|r| r.strategy) {
        Some(Strategy::Synthetic) | Some(Strategy::Hash) | Some(Strategy::Token) => {
            LogicalType::Text
        }
        _ => original,
    }
}
