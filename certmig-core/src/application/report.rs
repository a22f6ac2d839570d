// certmig-core/src/application/report.rs

use crate::application::anonymize::AnonymizationReport;
use crate::application::extract::CombinedExtraction;
use crate::application::load::CombinedLoad;
use crate::application::rollback::RollbackManifest;
use crate::application::{
    ANONYMIZATION_REPORT_FILE, EXTRACTION_MANIFEST_FILE, LOAD_MANIFEST_FILE,
    ROLLBACK_MANIFEST_FILE, VALIDATION_REPORT_FILE,
};
use crate::domain::validate::{OverallStatus, ValidationReport};
use crate::error::MigrationError;
use crate::infrastructure::fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Aggregate of every phase manifest found in a run directory, keyed by
/// the run id. Emitted as both `{run_id}.json` and `{run_id}.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: String,
    pub district_id: String,
    pub generated_at: String,
    pub overall_success: bool,
    pub overall_status: String,
    pub records_extracted: usize,
    pub fields_anonymized: usize,
    pub pii_leak_check: String,
    pub validation_status: String,
    pub validation_warnings: usize,
    pub records_loaded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<CombinedExtraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymization: Option<AnonymizationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<CombinedLoad>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackManifest>,
}

/// Failure-to-next-action mapping surfaced in the report.
fn suggested_action(phase: &str) -> &'static str {
    match phase {
        "load" => "rollback",
        "rollback" => "manual",
        _ => "retry",
    }
}

fn read_first<T: serde::de::DeserializeOwned>(run_dir: &Path, names: &[&str]) -> Option<T> {
    for name in names {
        let path = run_dir.join(name);
        if path.exists() {
            if let Ok(value) = fs::read_json::<_, T>(&path) {
                return Some(value);
            }
        }
    }
    None
}

/// Collects whatever manifests a run left behind and derives the
/// headline metrics. Missing phases simply stay absent.
pub fn build(run_dir: &Path, run_id: &str, district_id: &str) -> FinalReport {
    let extraction: Option<CombinedExtraction> = read_first(
        run_dir,
        &[
            EXTRACTION_MANIFEST_FILE,
            "staging/extraction-manifest.json",
        ],
    );
    let anonymization: Option<AnonymizationReport> = read_first(
        run_dir,
        &[
            ANONYMIZATION_REPORT_FILE,
            "anonymized/anonymization-report.json",
        ],
    );
    let validation: Option<ValidationReport> = read_first(
        run_dir,
        &[VALIDATION_REPORT_FILE, "anonymized/validation-report.json"],
    );
    let load: Option<CombinedLoad> = read_first(run_dir, &[LOAD_MANIFEST_FILE]);
    let rollback: Option<RollbackManifest> = read_first(run_dir, &[ROLLBACK_MANIFEST_FILE]);

    // First failed phase in pipeline order
    let mut failed_phase = None;
    let mut error = None;
    if let Some(m) = &extraction {
        if !m.success && failed_phase.is_none() {
            failed_phase = Some("extraction".to_string());
            error = m
                .stores
                .iter()
                .flat_map(|s| s.errors.iter())
                .next()
                .cloned();
        }
    }
    if let Some(m) = &anonymization {
        if !m.success && failed_phase.is_none() {
            failed_phase = Some("anonymization".to_string());
            error = m.errors.first().cloned().or_else(|| {
                (!m.pii_leaks_detected.is_empty())
                    .then(|| format!("PII leak in: {}", m.pii_leaks_detected.join(", ")))
            });
        }
    }
    if let Some(m) = &validation {
        if !m.success && failed_phase.is_none() {
            failed_phase = Some("validation".to_string());
            error = m.errors.first().map(|f| f.message.clone());
        }
    }
    if let Some(m) = &load {
        if !m.success && failed_phase.is_none() {
            failed_phase = Some("load".to_string());
            error = m
                .stores
                .iter()
                .flat_map(|s| s.errors.iter())
                .next()
                .cloned();
        }
    }
    if let Some(m) = &rollback {
        if !m.success && failed_phase.is_none() {
            failed_phase = Some("rollback".to_string());
        }
    }

    let overall_success = failed_phase.is_none()
        && extraction.as_ref().is_some_and(|m| m.success)
        && validation
            .as_ref()
            .map(|v| v.overall_status != OverallStatus::Failed)
            .unwrap_or(true);

    FinalReport {
        run_id: run_id.to_string(),
        district_id: district_id.to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        overall_success,
        overall_status: if overall_success {
            "SUCCESS".to_string()
        } else {
            "FAILED".to_string()
        },
        records_extracted: extraction.as_ref().map(|m| m.total_records).unwrap_or(0),
        fields_anonymized: anonymization
            .as_ref()
            .map(|m| m.total_fields_anonymized)
            .unwrap_or(0),
        pii_leak_check: anonymization
            .as_ref()
            .map(|m| m.pii_leak_check.clone())
            .unwrap_or_else(|| "NOT_RUN".to_string()),
        validation_status: validation
            .as_ref()
            .map(|v| {
                match v.overall_status {
                    OverallStatus::Passed => "PASSED",
                    OverallStatus::PassedWithWarnings => "PASSED_WITH_WARNINGS",
                    OverallStatus::Failed => "FAILED",
                }
                .to_string()
            })
            .unwrap_or_else(|| "NOT_RUN".to_string()),
        validation_warnings: validation.as_ref().map(|v| v.total_warnings).unwrap_or(0),
        records_loaded: load.as_ref().map(|m| m.total_rows_loaded).unwrap_or(0),
        suggested_action: failed_phase
            .as_deref()
            .map(|p| suggested_action(p).to_string()),
        failed_phase,
        error,
        extraction,
        anonymization,
        validation,
        load,
        rollback,
    }
}

const MARKDOWN_TEMPLATE: &str = r#"# Migration Report: {{ district_id }}

**Run ID:** {{ run_id }}
**Status:** {% if overall_success %}✅{% else %}⛔{% endif %} {{ overall_status }}
**Generated:** {{ generated_at }}

## Executive Summary

{% if overall_success -%}
Successfully migrated district "{{ district_id }}" from PROD to CERT.
{%- else -%}
Migration FAILED for district "{{ district_id }}".
{%- endif %}

- **Records Extracted:** {{ records_extracted }}
- **PII Fields Anonymized:** {{ fields_anonymized }}
- **PII Leak Check:** {{ pii_leak_check }}
- **Validation Status:** {{ validation_status }} ({{ validation_warnings }} warnings)
- **Records Loaded to CERT:** {{ records_loaded }}

{% if overall_success -%}
CERT environment is ready for testing.
{%- else -%}
**Failed Phase:** {{ failed_phase }}
**Error:** {{ error }}
**Suggested Action:** {{ suggested_action }}
{%- endif %}

## Phase Breakdown
{% if extraction %}
### Extraction

- Stores: {{ extraction.stores | length }}
- Total records: {{ extraction.total_records }}
{% for store in extraction.stores %}
- {{ store.store }}: {{ store.tables_extracted | length }} tables, {{ store.total_records }} records ({{ store.duration_seconds | round(2) }}s)
{%- endfor %}
{% endif %}
{%- if anonymization %}
### Anonymization

- Files processed: {{ anonymization.files_processed | length }}
- Records processed: {{ anonymization.total_records }}
- Fields anonymized: {{ anonymization.total_fields_anonymized }}
- PII leak check: {{ anonymization.pii_leak_check }}
{% endif %}
{%- if validation %}
### Validation

- Status: {{ validation.overall_status }}
- Checks run: {{ validation.total_checks }}
- Passed: {{ validation.total_passed }}
- Failed: {{ validation.total_failed }}
- Warnings: {{ validation.total_warnings }}
{% endif %}
{%- if load %}
### Loading

- Stores: {{ load.stores | length }}
- Total rows: {{ load.total_rows_loaded }}
{% endif %}
{%- if rollback %}
### Rollback

- Status: {{ rollback.status }}
- Rows deleted: {{ rollback.total_rows_deleted }}
{% endif %}
"#;

/// Renders and writes `{run_id}.json` and `{run_id}.md`.
pub fn write(report: &FinalReport, output_dir: &Path) -> Result<(), MigrationError> {
    std::fs::create_dir_all(output_dir)?;

    fs::write_json(output_dir.join(format!("{}.json", report.run_id)), report)?;

    let env = minijinja::Environment::new();
    let context = serde_json::to_value(report)
        .map_err(crate::infrastructure::error::InfrastructureError::from)?;
    let markdown = env
        .render_str(MARKDOWN_TEMPLATE, context)
        .map_err(crate::infrastructure::error::InfrastructureError::from)?;
    fs::atomic_write(output_dir.join(format!("{}.md", report.run_id)), markdown)?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_report_over_empty_run_dir() {
        let dir = tempdir().unwrap();
        let report = build(dir.path(), "mig-20250101-000000-123", "district-001");

        // Nothing extracted means nothing to certify
        assert!(!report.overall_success);
        assert_eq!(report.validation_status, "NOT_RUN");
        assert_eq!(report.records_extracted, 0);
    }

    #[test]
    fn test_report_render_and_write() -> Result<()> {
        let dir = tempdir()?;

        // Minimal successful run: one extraction manifest
        let extraction = CombinedExtraction::from_stores(vec![]);
        fs::write_json(dir.path().join(EXTRACTION_MANIFEST_FILE), &extraction)?;

        let report = build(dir.path(), "mig-20250101-000000-123", "district-001");
        write(&report, dir.path())?;

        let md_path = dir.path().join("mig-20250101-000000-123.md");
        assert!(md_path.exists());
        let markdown = std::fs::read_to_string(md_path)?;
        assert!(markdown.contains("# Migration Report: district-001"));
        assert!(markdown.contains("**Run ID:** mig-20250101-000000-123"));

        assert!(dir.path().join("mig-20250101-000000-123.json").exists());
        Ok(())
    }

    #[test]
    fn test_failed_phase_detection_and_action() -> Result<()> {
        let dir = tempdir()?;

        let mut load = CombinedLoad::from_stores(vec![]);
        load.success = false;
        fs::write_json(dir.path().join(LOAD_MANIFEST_FILE), &load)?;

        let report = build(dir.path(), "mig-x", "district-001");
        assert_eq!(report.failed_phase.as_deref(), Some("load"));
        assert_eq!(report.suggested_action.as_deref(), Some("rollback"));
        assert!(!report.overall_success);
        Ok(())
    }
}
