// certmig-core/src/domain/validate/checks.rs

use crate::domain::catalog::{LogicalType, TableSchema};
use crate::domain::graph::SchemaAnalysis;
use crate::domain::validate::predicate::Predicate;
use crate::domain::validate::report::{FamilyResult, Finding, Severity};
use crate::domain::validate::rules::{BusinessRule, CompletenessRule};
use crate::domain::value::{CellValue, Dataset};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

const ORPHAN_SAMPLE_SIZE: usize = 5;

/// Datasets are keyed `store_table`, the staging file stem.
pub type Datasets = BTreeMap<String, Dataset>;

fn split_dataset_name(name: &str) -> Option<(&str, &str)> {
    name.split_once('_')
}

fn schema_for<'a>(
    analysis: Option<&'a SchemaAnalysis>,
    dataset_name: &str,
) -> Option<&'a TableSchema> {
    let (store, table) = split_dataset_name(dataset_name)?;
    analysis?
        .tables
        .iter()
        .find(|t| t.store() == store && t.table_name() == table)
}

/// Family 1 — schema. Always surveys nulls (warning only); with the
/// schema manifest present it also enforces declared nullability
/// (error) and flags type drift (warning — transformed columns are
/// rewritten as text by design).
pub fn validate_schema(datasets: &Datasets, analysis: Option<&SchemaAnalysis>) -> FamilyResult {
    let mut results = FamilyResult::default();

    for (name, dataset) in datasets {
        let declared = schema_for(analysis, name);

        for (idx, column) in dataset.columns.iter().enumerate() {
            let null_count = dataset.len() - dataset.column_values(idx).count();
            let declared_column =
                declared.and_then(|t| t.columns.iter().find(|c| c.name == column.name));

            if null_count > 0 {
                if declared_column.is_some_and(|c| !c.nullable) {
                    results.fail(
                        Finding::new(
                            "schema_validation",
                            Severity::Error,
                            format!("Non-nullable column has {} NULL values", null_count),
                        )
                        .table(name.clone())
                        .column(column.name.clone()),
                    );
                    continue;
                }
                results.warn(
                    Finding::new(
                        "schema_validation",
                        Severity::Warning,
                        format!("Column has {} NULL values", null_count),
                    )
                    .table(name.clone())
                    .column(column.name.clone()),
                );
            } else if let Some(decl) = declared_column {
                if decl.logical_type != column.logical_type
                    && column.logical_type != LogicalType::Text
                {
                    results.warn(
                        Finding::new(
                            "schema_validation",
                            Severity::Warning,
                            format!(
                                "Type drift: declared {:?}, staged {:?}",
                                decl.logical_type, column.logical_type
                            ),
                        )
                        .table(name.clone())
                        .column(column.name.clone()),
                    );
                } else {
                    results.pass();
                }
            } else {
                results.pass();
            }
        }
    }

    info!(
        passed = results.checks_passed,
        run = results.checks_run,
        "schema validation done"
    );
    results
}

/// Family 2 — referential integrity. Explicit FKs from the schema
/// manifest win; without them the `*_id` naming heuristic with naive
/// pluralization is the fallback. Unresolvable targets count as passed
/// (unverifiable).
pub fn validate_referential_integrity(
    datasets: &Datasets,
    analysis: Option<&SchemaAnalysis>,
) -> FamilyResult {
    let mut results = FamilyResult::default();

    // Primary-key sets of every dataset exposing an `id` column
    let mut available_pks: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for (name, dataset) in datasets {
        if let Some(idx) = dataset.column_index("id") {
            available_pks.insert(
                name.as_str(),
                dataset.column_values(idx).map(CellValue::stringify).collect(),
            );
        }
    }

    for (name, dataset) in datasets {
        let declared = schema_for(analysis, name);
        let store = split_dataset_name(name).map(|(s, _)| s).unwrap_or(name);

        for (idx, column) in dataset.columns.iter().enumerate() {
            if !column.name.ends_with("_id") || column.name == "id" {
                continue;
            }

            // Explicit FK metadata overrides the naming heuristic
            let explicit_target = declared.and_then(|t| {
                t.foreign_keys
                    .iter()
                    .find(|fk| fk.from_columns == vec![column.name.clone()])
                    .map(|fk| {
                        let target = fk.to_table.rsplit('.').next().unwrap_or(&fk.to_table);
                        format!("{}_{}", store, target)
                    })
            });

            let referenced = match explicit_target {
                Some(target) => available_pks.get_key_value(target.as_str()).map(|(k, v)| (*k, v)),
                None => {
                    // student_id -> students
                    let guess = column.name.replace("_id", "s");
                    available_pks
                        .iter()
                        .find(|(name, _)| name.contains(&guess))
                        .map(|(k, v)| (*k, v))
                }
            };

            let Some((referenced_name, pks)) = referenced else {
                // Cannot resolve the target: unverifiable, count as pass
                results.pass();
                continue;
            };

            let mut orphaned: Vec<&CellValue> = dataset
                .column_values(idx)
                .filter(|v| !pks.contains(&v.stringify()))
                .collect();
            orphaned.sort_by_key(|v| v.stringify());
            orphaned.dedup_by_key(|v| v.stringify());

            if orphaned.is_empty() {
                results.pass();
            } else {
                let mut finding = Finding::new(
                    "referential_integrity",
                    Severity::Error,
                    format!(
                        "{} orphaned FK values (not in {})",
                        orphaned.len(),
                        referenced_name
                    ),
                )
                .table(name.clone())
                .column(column.name.clone());
                finding.referenced_table = Some(referenced_name.to_string());
                finding.sample_orphaned = Some(
                    orphaned
                        .iter()
                        .take(ORPHAN_SAMPLE_SIZE)
                        .map(|v| v.to_json())
                        .collect(),
                );
                results.fail(finding);
            }
        }
    }

    info!(
        passed = results.checks_passed,
        failed = results.checks_failed,
        "referential integrity done"
    );
    results
}

/// Family 3 — business rules. Each predicate is compiled by the closed
/// expression parser and evaluated per row; the failing-row count is
/// routed by declared severity.
pub fn validate_business_rules(datasets: &Datasets, rules: &[BusinessRule]) -> FamilyResult {
    let mut results = FamilyResult::default();

    for rule in rules {
        let dataset_name = format!("{}_{}", rule.store, rule.table);
        let Some(dataset) = datasets.get(&dataset_name) else {
            continue;
        };

        let predicate = match Predicate::parse(&rule.condition) {
            Ok(p) => p,
            Err(e) => {
                results.fail(
                    Finding::new(
                        "business_rule",
                        Severity::Error,
                        format!("Rule evaluation failed: {}", e),
                    )
                    .rule(rule.name.clone())
                    .table(dataset_name.clone()),
                );
                continue;
            }
        };

        let mut failing = 0usize;
        let mut eval_error = None;
        for row in &dataset.rows {
            match predicate.evaluate(dataset, row) {
                Ok(true) => {}
                Ok(false) => failing += 1,
                Err(e) => {
                    eval_error = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = eval_error {
            results.fail(
                Finding::new(
                    "business_rule",
                    Severity::Error,
                    format!("Rule evaluation failed: {}", e),
                )
                .rule(rule.name.clone())
                .table(dataset_name.clone()),
            );
            continue;
        }

        if failing > 0 {
            let description = rule.description.as_deref().unwrap_or(&rule.condition);
            results.report(
                rule.severity,
                Finding::new(
                    "business_rule",
                    rule.severity,
                    format!("{} records failed rule: {}", failing, description),
                )
                .rule(rule.name.clone())
                .table(dataset_name.clone()),
            );
        } else {
            results.pass();
        }
    }

    info!(
        passed = results.checks_passed,
        failed = results.checks_failed,
        "business rules done"
    );
    results
}

/// Family 4 — completeness. A missing required field is always an
/// error; nulls in a present required field follow the rule severity.
pub fn validate_completeness(datasets: &Datasets, rules: &[CompletenessRule]) -> FamilyResult {
    let mut results = FamilyResult::default();

    for rule in rules {
        let dataset_name = format!("{}_{}", rule.store, rule.table);
        let Some(dataset) = datasets.get(&dataset_name) else {
            continue;
        };

        for field in &rule.required_fields {
            let Some(idx) = dataset.column_index(field) else {
                results.fail(
                    Finding::new(
                        "completeness",
                        Severity::Error,
                        format!("Required field '{}' is missing", field),
                    )
                    .rule(rule.name.clone())
                    .table(dataset_name.clone())
                    .column(field.clone()),
                );
                continue;
            };

            let null_count = dataset.len() - dataset.column_values(idx).count();
            if null_count > 0 {
                results.report(
                    rule.severity,
                    Finding::new(
                        "completeness",
                        rule.severity,
                        format!("Required field '{}' has {} NULL values", field, null_count),
                    )
                    .rule(rule.name.clone())
                    .table(dataset_name.clone())
                    .column(field.clone()),
                );
            } else {
                results.pass();
            }
        }
    }

    info!(
        passed = results.checks_passed,
        failed = results.checks_failed,
        "completeness done"
    );
    results
}

/// Family 5 — data quality. Every dataset with an `id` column is
/// checked for duplicate and negative identifiers; both are errors.
pub fn validate_data_quality(datasets: &Datasets) -> FamilyResult {
    let mut results = FamilyResult::default();

    for (name, dataset) in datasets {
        let Some(idx) = dataset.column_index("id") else {
            continue;
        };

        // Duplicates
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut duplicates = 0usize;
        for value in dataset.column_values(idx) {
            if !seen.insert(value.stringify()) {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            results.fail(
                Finding::new(
                    "data_quality",
                    Severity::Error,
                    format!("Found {} duplicate ID values", duplicates),
                )
                .table(name.clone()),
            );
        } else {
            results.pass();
        }

        // Negative identifiers
        let negatives = dataset
            .column_values(idx)
            .filter(|v| v.as_i64().is_some_and(|i| i < 0))
            .count();
        if negatives > 0 {
            results.fail(
                Finding::new(
                    "data_quality",
                    Severity::Error,
                    format!("Found {} negative ID values", negatives),
                )
                .table(name.clone()),
            );
        } else {
            results.pass();
        }
    }

    info!(
        passed = results.checks_passed,
        failed = results.checks_failed,
        "data quality done"
    );
    results
}
