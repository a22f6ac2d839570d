// certmig-core/src/application/coordinator.rs

use crate::application::extract::CombinedExtraction;
use crate::application::load::CombinedLoad;
use crate::application::{
    analyze, anonymize, extract, load, report, validate, CancelFlag, CONSISTENCY_MAP_FILE,
    EXTRACTION_MANIFEST_FILE, LOAD_MANIFEST_FILE, SCHEMA_ANALYSIS_FILE, VALIDATION_REPORT_FILE,
};
use crate::domain::tenant::TenantFilter;
use crate::domain::validate::OverallStatus;
use crate::error::MigrationError;
use crate::infrastructure::fs;
use crate::ports::{GraphStore, RelationalStore, WriteStrategy, DEFAULT_TRAVERSAL_DEPTH};
use futures::StreamExt;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Store handles for one run. Loading targets may be empty when the run
/// stops at validation.
#[derive(Default)]
pub struct MigrationStores {
    pub sources: Vec<Arc<dyn RelationalStore>>,
    pub targets: Vec<Arc<dyn RelationalStore>>,
    pub graph_source: Option<Arc<dyn GraphStore>>,
    pub graph_target: Option<Arc<dyn GraphStore>>,
}

pub struct RunOptions {
    pub district_id: String,
    /// Root under which the run directory `runs/{run_id}` is created.
    pub run_root: PathBuf,
    pub rules_file: PathBuf,
    pub validation_rules_file: Option<PathBuf>,
    pub strategy: WriteStrategy,
    /// Stop after validation, regardless of its outcome.
    pub validation_only: bool,
    /// Reuse an existing staging directory instead of extracting.
    pub skip_extraction: bool,
    pub skip_load: bool,
    pub graph_traversal_depth: u32,
}

impl RunOptions {
    pub fn new(district_id: impl Into<String>, run_root: impl Into<PathBuf>, rules_file: impl Into<PathBuf>) -> Self {
        Self {
            district_id: district_id.into(),
            run_root: run_root.into(),
            rules_file: rules_file.into(),
            validation_rules_file: None,
            strategy: WriteStrategy::Insert,
            validation_only: false,
            skip_extraction: false,
            skip_load: false,
            graph_traversal_depth: DEFAULT_TRAVERSAL_DEPTH,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `mig-YYYYMMDD-HHMMSS-NNN`.
pub fn generate_run_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("mig-{}-{:03}", stamp, suffix)
}

/// Sequences the phases: extract → anonymize → validate → load →
/// report. Every phase consumes the previous phase's manifest; a FAILED
/// validation stops the pipeline unless validation-only mode asked for
/// exactly that.
pub async fn run_migration(
    stores: &MigrationStores,
    opts: &RunOptions,
    cancel: &CancelFlag,
) -> Result<RunSummary, MigrationError> {
    let run_id = generate_run_id();
    let run_dir = opts.run_root.join("runs").join(&run_id);
    let staging_dir = run_dir.join("staging");
    let anonymized_dir = run_dir.join("anonymized");
    std::fs::create_dir_all(&staging_dir)?;

    info!(%run_id, district = %opts.district_id, "migration run starting");
    let filter = TenantFilter::district(opts.district_id.clone());

    let mut summary = RunSummary {
        run_id: run_id.clone(),
        run_dir: run_dir.clone(),
        success: true,
        failed_phase: None,
        error: None,
    };

    // --- 1. SCHEMA ANALYSIS ---
    let source_refs: Vec<&dyn RelationalStore> =
        stores.sources.iter().map(|s| s.as_ref()).collect();
    let analysis = match analyze::analyze_stores(&source_refs).await {
        Ok(a) => {
            analyze::save_analysis(&run_dir, &a, true)?;
            a
        }
        Err(e) => return fail(summary, "analyze", e, &run_dir, &opts.district_id),
    };
    info!(
        tables = analysis.total_tables,
        cycles = analysis.circular_dependencies.len(),
        "dependency analysis complete"
    );

    // --- 2. EXTRACTION (per-store fan-out) ---
    if !opts.skip_extraction {
        let extract_futures = stores.sources.iter().cloned().map(|store| {
            let analysis = analysis.clone();
            let filter = filter.clone();
            let staging_dir = staging_dir.clone();
            let cancel = cancel.clone();
            async move {
                extract::extract_relational(store.as_ref(), &analysis, &filter, &staging_dir, &cancel)
                    .await
            }
        });

        let mut manifests = Vec::new();
        let mut stream = futures::stream::iter(extract_futures).buffer_unordered(4);
        while let Some(result) = stream.next().await {
            match result {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => return fail(summary, "extraction", e, &run_dir, &opts.district_id),
            }
        }

        if let Some(graph) = &stores.graph_source {
            match extract::extract_graph(
                graph.as_ref(),
                &filter,
                opts.graph_traversal_depth,
                &staging_dir,
                cancel,
            )
            .await
            {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => return fail(summary, "extraction", e, &run_dir, &opts.district_id),
            }
        }

        manifests.sort_by(|a, b| a.store.cmp(&b.store));
        let combined = CombinedExtraction::from_stores(manifests);
        fs::write_json(run_dir.join(EXTRACTION_MANIFEST_FILE), &combined)?;

        if !combined.success {
            summary.success = false;
            summary.failed_phase = Some("extraction".to_string());
            finish(&summary, &run_dir, &opts.district_id)?;
            return Ok(summary);
        }
        info!(records = combined.total_records, "extraction complete");
    }

    // --- 3. ANONYMIZATION ---
    let anonymization = match anonymize::run(
        &staging_dir,
        &anonymized_dir,
        &opts.rules_file,
        &run_dir.join(CONSISTENCY_MAP_FILE),
        cancel,
    ) {
        Ok(r) => r,
        Err(e) => return fail(summary, "anonymization", e, &run_dir, &opts.district_id),
    };
    if !anonymization.success {
        // A PII leak prevents the validator from running
        summary.success = false;
        summary.failed_phase = Some("anonymization".to_string());
        summary.error = Some(format!("pii_leak_check: {}", anonymization.pii_leak_check));
        finish(&summary, &run_dir, &opts.district_id)?;
        return Ok(summary);
    }

    // --- 4. VALIDATION ---
    let validation = match validate::run(
        &anonymized_dir,
        Some(&run_dir.join(SCHEMA_ANALYSIS_FILE)),
        opts.validation_rules_file.as_deref(),
        &run_dir.join(VALIDATION_REPORT_FILE),
    ) {
        Ok(r) => r,
        Err(e) => return fail(summary, "validation", e, &run_dir, &opts.district_id),
    };

    if opts.validation_only {
        summary.success = validation.overall_status != OverallStatus::Failed;
        if !summary.success {
            summary.failed_phase = Some("validation".to_string());
        }
        finish(&summary, &run_dir, &opts.district_id)?;
        return Ok(summary);
    }

    if validation.overall_status == OverallStatus::Failed {
        // Validation failure prevents loading
        summary.success = false;
        summary.failed_phase = Some("validation".to_string());
        finish(&summary, &run_dir, &opts.district_id)?;
        return Ok(summary);
    }

    // --- 5. LOADING ---
    if !opts.skip_load {
        let mut manifests = Vec::new();
        for target in &stores.targets {
            let order = analysis.order_for_store(target.store_id());
            match load::load_relational(
                target.as_ref(),
                &anonymized_dir,
                &order,
                opts.strategy,
                cancel,
            )
            .await
            {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => return fail(summary, "load", e, &run_dir, &opts.district_id),
            }
        }
        if let Some(graph) = &stores.graph_target {
            match load::load_graph(graph.as_ref(), &anonymized_dir, cancel).await {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => return fail(summary, "load", e, &run_dir, &opts.district_id),
            }
        }

        let combined = CombinedLoad::from_stores(manifests);
        fs::write_json(run_dir.join(LOAD_MANIFEST_FILE), &combined)?;

        if !combined.success {
            summary.success = false;
            summary.failed_phase = Some("load".to_string());
            finish(&summary, &run_dir, &opts.district_id)?;
            return Ok(summary);
        }
        info!(rows = combined.total_rows_loaded, "load complete");
    }

    // --- 6. FINAL REPORT ---
    finish(&summary, &run_dir, &opts.district_id)?;
    info!(%run_id, "migration run complete");
    Ok(summary)
}

/// Fatal phase error: record it, still render the aggregate report, and
/// surface the phase in the summary. Cancellation propagates instead.
fn fail(
    mut summary: RunSummary,
    phase: &str,
    e: MigrationError,
    run_dir: &Path,
    district_id: &str,
) -> Result<RunSummary, MigrationError> {
    if matches!(e.kind(), crate::error::ErrorKind::Cancelled) {
        return Err(e);
    }
    error!(phase, error = %e, "phase failed");
    summary.success = false;
    summary.failed_phase = Some(phase.to_string());
    summary.error = Some(e.to_string());
    finish(&summary, run_dir, district_id)?;
    Ok(summary)
}

fn finish(summary: &RunSummary, run_dir: &Path, district_id: &str) -> Result<(), MigrationError> {
    let final_report = report::build(run_dir, &summary.run_id, district_id);
    report::write(&final_report, run_dir)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::DuckDbStore;
    use crate::infrastructure::config::{ENV_TEST_LOCK, SALT_VAR};
    use anyhow::Result;
    use tempfile::tempdir;

    fn seed_source() -> Result<Arc<DuckDbStore>> {
        let store = DuckDbStore::open_in_memory("ids")?;
        store.raw_batch(
            "CREATE TABLE schools (id INTEGER PRIMARY KEY, district_id VARCHAR, name VARCHAR);
             CREATE TABLE students (
                 id INTEGER PRIMARY KEY,
                 school_id INTEGER,
                 first_name VARCHAR,
                 contact_email VARCHAR,
                 FOREIGN KEY (school_id) REFERENCES schools(id)
             );
             INSERT INTO schools VALUES (1, 'district-001', 'North High');
             INSERT INTO students VALUES (10, 1, 'Avery', 'avery@real.com');
             INSERT INTO students VALUES (11, 1, 'Blake', 'blake@real.com');",
        )?;
        Ok(Arc::new(store))
    }

    fn empty_target() -> Result<Arc<DuckDbStore>> {
        let store = DuckDbStore::open_in_memory("ids")?;
        store.raw_batch(
            "CREATE TABLE schools (id INTEGER PRIMARY KEY, district_id VARCHAR, name VARCHAR);
             CREATE TABLE students (
                 id INTEGER PRIMARY KEY,
                 school_id INTEGER,
                 first_name VARCHAR,
                 contact_email VARCHAR,
                 FOREIGN KEY (school_id) REFERENCES schools(id)
             );",
        )?;
        Ok(Arc::new(store))
    }

    fn write_rules(dir: &std::path::Path) -> Result<PathBuf> {
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
    field_pattern: "first_name"
    strategy: synthetic
    faker_type: first_name
"#,
        )?;
        Ok(path)
    }

    #[tokio::test]
    async fn test_full_pipeline_end_to_end() -> Result<()> {
        let _guard = ENV_TEST_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        std::env::set_var(SALT_VAR, "coordinator-test-salt");

        let dir = tempdir()?;
        let source: Arc<dyn crate::ports::RelationalStore> = seed_source()?;
        let target = empty_target()?;
        let target_dyn: Arc<dyn crate::ports::RelationalStore> = target.clone();

        let stores = MigrationStores {
            sources: vec![source],
            targets: vec![target_dyn],
            graph_source: None,
            graph_target: None,
        };
        let mut opts = RunOptions::new("district-001", dir.path(), write_rules(dir.path())?);
        opts.strategy = WriteStrategy::Insert;

        let summary = run_migration(&stores, &opts, &CancelFlag::new()).await?;
        assert!(summary.success, "failed: {:?}", summary);
        assert!(summary.run_id.starts_with("mig-"));

        // Run directory holds every manifest plus the rendered report
        assert!(summary.run_dir.join(SCHEMA_ANALYSIS_FILE).exists());
        assert!(summary.run_dir.join(EXTRACTION_MANIFEST_FILE).exists());
        assert!(summary.run_dir.join(VALIDATION_REPORT_FILE).exists());
        assert!(summary.run_dir.join(LOAD_MANIFEST_FILE).exists());
        assert!(summary
            .run_dir
            .join(format!("{}.md", summary.run_id))
            .exists());

        // Loaded data reached the target, anonymized
        let filter = TenantFilter::district("district-001");
        let students = {
            let path = vec![crate::domain::tenant::JoinHop {
                parent: "ids.main.schools".into(),
                parent_table: "schools".into(),
                fk_column: "school_id".into(),
                parent_key: "id".into(),
            }];
            target
                .read_filtered("students", &filter, Some(&path))
                .await?
        };
        assert_eq!(students.len(), 2);
        let email_idx = students.column_index("contact_email").unwrap();
        for row in &students.rows {
            let email = row[email_idx].stringify();
            assert!(!email.contains("real.com"), "leaked: {}", email);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_only_stops_before_load() -> Result<()> {
        let _guard = ENV_TEST_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        std::env::set_var(SALT_VAR, "coordinator-test-salt");

        let dir = tempdir()?;
        let source: Arc<dyn crate::ports::RelationalStore> = seed_source()?;
        let target = empty_target()?;
        let target_dyn: Arc<dyn crate::ports::RelationalStore> = target.clone();

        let stores = MigrationStores {
            sources: vec![source],
            targets: vec![target_dyn],
            graph_source: None,
            graph_target: None,
        };
        let mut opts = RunOptions::new("district-001", dir.path(), write_rules(dir.path())?);
        opts.validation_only = true;

        let summary = run_migration(&stores, &opts, &CancelFlag::new()).await?;
        assert!(summary.success);
        assert!(!summary.run_dir.join(LOAD_MANIFEST_FILE).exists());

        // Target untouched
        let filter = TenantFilter::district("district-001");
        let schools = target.read_filtered("schools", &filter, None).await?;
        assert_eq!(schools.len(), 0);
        Ok(())
    }
}
