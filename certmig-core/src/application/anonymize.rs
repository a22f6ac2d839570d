// certmig-core/src/application/anonymize.rs

use crate::application::{CancelFlag, ANONYMIZATION_REPORT_FILE};
use crate::domain::anonymize::engine::{sentinel_check, AnonymizationEngine, LeakFinding};
use crate::domain::anonymize::rules::Strategy;
use crate::domain::anonymize::{ConsistencyMap, RuleBinder, RuleSet};
use crate::domain::error::DomainError;
use crate::domain::value::{CellValue, Dataset};
use crate::error::MigrationError;
use crate::infrastructure::config;
use crate::infrastructure::fs;
use crate::infrastructure::staging;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnonymization {
    pub file: String,
    pub records: usize,
    pub columns: usize,
    pub anonymized_fields: Vec<String>,
    pub fields_by_rule: BTreeMap<String, Vec<String>>,
    pub pii_leaks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub leak_findings: Vec<LeakFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizationReport {
    pub run_timestamp: String,
    pub input_dir: String,
    pub output_dir: String,
    pub files_processed: Vec<FileAnonymization>,
    pub total_records: usize,
    pub total_fields_anonymized: usize,
    pub pii_leaks_detected: Vec<String>,
    pub pii_leak_check: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

/// Runs the anonymization phase over a staging directory.
///
/// The salt is resolved first — its absence is fatal before any file is
/// touched. An existing consistency map is loaded so values stay stable
/// across runs; the updated map is persisted atomically at the end.
pub fn run(
    input_dir: &Path,
    output_dir: &Path,
    rules_file: &Path,
    consistency_map_path: &Path,
    cancel: &CancelFlag,
) -> Result<AnonymizationReport, MigrationError> {
    let started = std::time::Instant::now();

    let salt = config::anonymization_salt()?;

    let rules_content = std::fs::read_to_string(rules_file).map_err(|e| {
        MigrationError::Domain(DomainError::Rule(format!(
            "Cannot read rules file {}: {}",
            rules_file.display(),
            e
        )))
    })?;
    let rule_set = RuleSet::from_yaml(&rules_content)?;
    let binder = RuleBinder::new(&rule_set)?;
    info!(rules = rule_set.rules.len(), "anonymization rules loaded");

    let map = if consistency_map_path.exists() {
        info!(path = %consistency_map_path.display(), "loading consistency map");
        ConsistencyMap::from_mappings(fs::read_json(consistency_map_path)?)
    } else {
        ConsistencyMap::new()
    };

    let engine = AnonymizationEngine::new(&binder, &map, salt);

    let mut report = AnonymizationReport {
        run_timestamp: chrono::Utc::now().to_rfc3339(),
        input_dir: input_dir.to_string_lossy().to_string(),
        output_dir: output_dir.to_string_lossy().to_string(),
        files_processed: Vec::new(),
        total_records: 0,
        total_fields_anonymized: 0,
        pii_leaks_detected: Vec::new(),
        pii_leak_check: "PASSED".to_string(),
        success: true,
        errors: Vec::new(),
        duration_seconds: 0.0,
    };

    let staged = staging::list_staged(input_dir);
    info!(files = staged.len(), "staged files found");

    for path in staged {
        cancel.checkpoint()?;
        let name = staging::dataset_name(&path);

        let result = if name.ends_with("_nodes") || name.ends_with("_edges") {
            anonymize_graph_file(&engine, &path, output_dir)
        } else {
            anonymize_table_file(&engine, &path, output_dir)
        };

        match result {
            Ok(file_result) => {
                report.total_records += file_result.records;
                report.total_fields_anonymized += file_result.anonymized_fields.len();
                if !file_result.pii_leaks.is_empty() {
                    report
                        .pii_leaks_detected
                        .extend(file_result.pii_leaks.iter().cloned());
                }
                report.files_processed.push(file_result);
            }
            Err(e) => {
                error!(file = %name, error = %e, "anonymization failed");
                report.errors.push(format!("{}: {}", name, e));
                report.success = false;
                report.files_processed.push(FileAnonymization {
                    file: format!("{}.{}", name, staging::STAGING_EXT),
                    records: 0,
                    columns: 0,
                    anonymized_fields: Vec::new(),
                    fields_by_rule: BTreeMap::new(),
                    pii_leaks: Vec::new(),
                    leak_findings: Vec::new(),
                    error: Some(e.to_string()),
                    success: false,
                });
                // Rule misconfiguration poisons every file equally
                if matches!(e.kind(), crate::error::ErrorKind::Configuration) {
                    return Err(e);
                }
            }
        }
    }

    // Persist the map before judging leaks: mappings already handed out
    // must survive even a failed run.
    if let Some(parent) = consistency_map_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fs::write_json(consistency_map_path, &map.to_mappings())?;
    info!(entries = map.len(), "consistency map persisted");

    if report.pii_leaks_detected.is_empty() {
        report.pii_leak_check = "PASSED".to_string();
    } else {
        report.pii_leak_check = "FAILED".to_string();
        report.success = false;
        error!(fields = ?report.pii_leaks_detected, "PII LEAK DETECTED");
    }

    report.duration_seconds = started.elapsed().as_secs_f64();

    std::fs::create_dir_all(output_dir)?;
    fs::write_json(output_dir.join(ANONYMIZATION_REPORT_FILE), &report)?;

    Ok(report)
}

fn anonymize_table_file(
    engine: &AnonymizationEngine<'_>,
    path: &Path,
    output_dir: &Path,
) -> Result<FileAnonymization, MigrationError> {
    let dataset = staging::read_dataset(path)?;
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();

    info!(
        file = %file_name,
        records = dataset.len(),
        columns = dataset.columns.len(),
        "anonymizing"
    );

    let outcome = engine.transform_dataset(&dataset)?;
    staging::write_dataset(output_dir, &file_name, &outcome.dataset)?;

    Ok(FileAnonymization {
        file: file_name,
        records: outcome.dataset.len(),
        columns: outcome.dataset.columns.len(),
        anonymized_fields: outcome.anonymized_fields,
        fields_by_rule: outcome.fields_by_rule,
        pii_leaks: outcome
            .leaks
            .iter()
            .map(|l| l.column.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect(),
        leak_findings: outcome.leaks,
        error: None,
        success: true,
    })
}

/// Graph staging files keep their shape; the rules govern property
/// *keys* inside the JSON document, so node and edge PII follows the
/// same ordered rule list as relational columns.
fn anonymize_graph_file(
    engine: &AnonymizationEngine<'_>,
    path: &Path,
    output_dir: &Path,
) -> Result<FileAnonymization, MigrationError> {
    let dataset = staging::read_dataset(path)?;
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();

    let Some(props_idx) = dataset.column_index("properties") else {
        return Err(MigrationError::InternalError(format!(
            "Graph staging file '{}' lacks a properties column",
            file_name
        )));
    };

    let mut anonymized_keys: std::collections::BTreeSet<String> = Default::default();
    let mut fields_by_rule: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut leak_samples: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let mut out = Dataset::new(dataset.columns.clone());
    for row in &dataset.rows {
        let mut cells = row.clone();
        let raw = cells[props_idx].stringify();
        let parsed: serde_json::Value =
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);

        if let serde_json::Value::Object(props) = parsed {
            let mut transformed = serde_json::Map::new();
            for (key, value) in props {
                match engine.rule_for(&key) {
                    Some(rule) => {
                        let new_value = engine.transform_json(rule, &value)?;
                        if anonymized_keys.insert(key.clone()) {
                            fields_by_rule
                                .entry(rule.name.clone())
                                .or_default()
                                .push(key.clone());
                        }
                        if let serde_json::Value::String(s) = &new_value {
                            let samples = leak_samples.entry(key.clone()).or_default();
                            if samples.len() < 10 {
                                samples.push(s.clone());
                            }
                        }
                        transformed.insert(key, new_value);
                    }
                    None => {
                        transformed.insert(key, value);
                    }
                }
            }
            cells[props_idx] =
                CellValue::Text(serde_json::Value::Object(transformed).to_string());
        }
        out.rows.push(cells);
    }

    // Sentinel pass over the sampled transformed values
    let mut leaks: Vec<LeakFinding> = Vec::new();
    for (key, samples) in &leak_samples {
        let Some(rule) = engine.rule_for(key) else {
            continue;
        };
        if rule.strategy == Strategy::Passthrough {
            continue;
        }
        for sample in samples {
            if let Some(reason) = sentinel_check(rule, sample) {
                leaks.push(LeakFinding {
                    column: key.clone(),
                    rule: rule.name.clone(),
                    sample: sample.clone(),
                    reason,
                });
                break;
            }
        }
    }

    staging::write_dataset(output_dir, &file_name, &out)?;

    Ok(FileAnonymization {
        file: file_name,
        records: out.len(),
        columns: out.columns.len(),
        anonymized_fields: anonymized_keys.into_iter().collect(),
        fields_by_rule,
        pii_leaks: leaks
            .iter()
            .map(|l| l.column.clone())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect(),
        leak_findings: leaks,
        error: None,
        success: true,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::catalog::{ColumnSpec, LogicalType};
    use crate::infrastructure::config::ENV_TEST_LOCK as ENV_LOCK;
    use anyhow::Result;
    use tempfile::tempdir;

    fn write_rules(dir: &Path) -> Result<std::path::PathBuf> {
        let path = dir.join("anonymization-rules.yaml");
        std::fs::write(
            &path,
            r#"
rules:
  - name: email_rule
    field_pattern: "email"
    strategy: synthetic
    faker_type: email
  - name: name_rule
    field_pattern: "first_name|last_name|^name$"
    strategy: synthetic
    faker_type: first_name
"#,
        )?;
        Ok(path)
    }

    fn staged_students(dir: &Path) -> Result<()> {
        let mut ds = Dataset::new(vec![
            ColumnSpec {
                name: "id".into(),
                logical_type: LogicalType::Integer,
                nullable: false,
            },
            ColumnSpec {
                name: "contact_email".into(),
                logical_type: LogicalType::Text,
                nullable: true,
            },
        ]);
        ds.rows.push(vec![
            CellValue::Integer(1),
            CellValue::Text("a@x.com".into()),
        ]);
        ds.rows.push(vec![
            CellValue::Integer(2),
            CellValue::Text("a@x.com".into()),
        ]);
        ds.rows.push(vec![CellValue::Integer(3), CellValue::Null]);
        staging::write_dataset(dir, "ids_students.parquet", &ds)?;
        Ok(())
    }

    #[test]
    fn test_phase_requires_salt() -> Result<()> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        std::env::remove_var(config::SALT_VAR);
        let dir = tempdir()?;
        let rules = write_rules(dir.path())?;

        let err = run(
            dir.path(),
            &dir.path().join("out"),
            &rules,
            &dir.path().join("map.json"),
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        Ok(())
    }

    #[test]
    fn test_phase_end_to_end_with_map_persistence() -> Result<()> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        std::env::set_var(config::SALT_VAR, "unit-test-salt");
        let dir = tempdir()?;
        let input = dir.path().join("staging");
        let output = dir.path().join("anonymized");
        std::fs::create_dir_all(&input)?;
        staged_students(&input)?;
        let rules = write_rules(dir.path())?;
        let map_path = dir.path().join("map.json");

        let report = run(&input, &output, &rules, &map_path, &CancelFlag::new())?;
        assert!(report.success);
        assert_eq!(report.pii_leak_check, "PASSED");
        assert_eq!(report.total_records, 3);
        assert!(map_path.exists());
        assert!(output.join(ANONYMIZATION_REPORT_FILE).exists());

        // Same original in rows 1 and 2 -> same synthetic output; null
        // stays null
        let out = staging::read_dataset(&output.join("ids_students.parquet"))?;
        assert_eq!(out.rows[0][1], out.rows[1][1]);
        assert!(out.rows[2][1].is_null());
        let email = out.rows[0][1].stringify();
        assert!(email.ends_with(".example.org"));

        // Second run reuses the persisted map
        let output2 = dir.path().join("anonymized-2");
        let report2 = run(&input, &output2, &rules, &map_path, &CancelFlag::new())?;
        assert!(report2.success);
        let out2 = staging::read_dataset(&output2.join("ids_students.parquet"))?;
        assert_eq!(out.rows[0][1], out2.rows[0][1]);
        Ok(())
    }

    #[test]
    fn test_graph_properties_are_governed_by_rules() -> Result<()> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        std::env::set_var(config::SALT_VAR, "unit-test-salt");
        let dir = tempdir()?;
        let input = dir.path().join("staging");
        let output = dir.path().join("anonymized");
        std::fs::create_dir_all(&input)?;
        let rules = write_rules(dir.path())?;

        let mut props = serde_json::Map::new();
        props.insert("id".into(), serde_json::Value::from("student-1"));
        props.insert("email".into(), serde_json::Value::from("kid@real.com"));
        let nodes = vec![crate::ports::GraphNode {
            internal_id: 5,
            labels: vec!["Student".into()],
            properties: props,
        }];
        staging::write_dataset(
            &input,
            &staging::nodes_file_name("sp"),
            &staging::nodes_to_dataset(&nodes),
        )?;

        let report = run(
            &input,
            &output,
            &rules,
            &dir.path().join("map.json"),
            &CancelFlag::new(),
        )?;
        assert!(report.success, "errors: {:?}", report.errors);

        let out = staging::read_dataset(&output.join(staging::nodes_file_name("sp")))?;
        let restored = staging::nodes_from_dataset(&out)?;
        let email = restored[0]
            .properties
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(!email.contains("real.com"));
        assert!(email.ends_with(".example.org"));
        // Ungoverned key untouched
        assert_eq!(
            restored[0].properties.get("id"),
            Some(&serde_json::Value::from("student-1"))
        );
        Ok(())
    }
}
