// certmig-core/src/application/validate.rs

use crate::application::analyze;
use crate::domain::error::DomainError;
use crate::domain::graph::SchemaAnalysis;
use crate::domain::validate::checks;
use crate::domain::validate::{Datasets, ValidationReport, ValidationRuleSet};
use crate::error::MigrationError;
use crate::infrastructure::fs;
use crate::infrastructure::staging;
use std::path::Path;
use tracing::{info, warn};

/// Runs the five check families over an anonymized dataset directory
/// and writes the validation report.
///
/// The schema manifest is optional: with it, type/nullability
/// enforcement and explicit-FK resolution engage; without it the
/// schema family degrades to the null survey and RI falls back to the
/// naming heuristic.
pub fn run(
    data_dir: &Path,
    schema_file: Option<&Path>,
    rules_file: Option<&Path>,
    output_report: &Path,
) -> Result<ValidationReport, MigrationError> {
    let started = std::time::Instant::now();

    let staged = staging::list_staged(data_dir);
    if staged.is_empty() {
        return Err(MigrationError::Domain(DomainError::Schema(format!(
            "No staged files found in {}",
            data_dir.display()
        ))));
    }

    let mut datasets = Datasets::new();
    for path in staged {
        let name = staging::dataset_name(&path);
        let dataset = staging::read_dataset(&path)?;
        info!(
            dataset = %name,
            records = dataset.len(),
            columns = dataset.columns.len(),
            "loaded"
        );
        datasets.insert(name, dataset);
    }

    let analysis: Option<SchemaAnalysis> = match schema_file {
        Some(path) if path.exists() => Some(analyze::load_analysis(path)?),
        Some(path) => {
            warn!(path = %path.display(), "schema manifest absent, degrading checks");
            None
        }
        None => None,
    };

    let rules = match rules_file {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                MigrationError::Domain(DomainError::Rule(format!(
                    "Cannot read validation rules {}: {}",
                    path.display(),
                    e
                )))
            })?;
            ValidationRuleSet::from_yaml(&content)?
        }
        None => ValidationRuleSet::default(),
    };

    let families = vec![
        (
            "schema_validation",
            checks::validate_schema(&datasets, analysis.as_ref()),
        ),
        (
            "referential_integrity",
            checks::validate_referential_integrity(&datasets, analysis.as_ref()),
        ),
        (
            "business_rules",
            checks::validate_business_rules(&datasets, &rules.business_rules),
        ),
        (
            "completeness",
            checks::validate_completeness(&datasets, &rules.completeness_rules),
        ),
        ("data_quality", checks::validate_data_quality(&datasets)),
    ];

    let report = ValidationReport::aggregate(
        &data_dir.to_string_lossy(),
        families,
        started.elapsed().as_secs_f64(),
    );

    if let Some(parent) = output_report.parent() {
        std::fs::create_dir_all(parent)?;
    }
    fs::write_json(output_report, &report)?;

    info!(
        status = ?report.overall_status,
        passed = report.total_passed,
        failed = report.total_failed,
        warnings = report.total_warnings,
        "validation complete"
    );
    Ok(report)
}
