// certmig-core/src/application/extract.rs

use crate::application::CancelFlag;
use crate::domain::error::DomainError;
use crate::domain::graph::SchemaAnalysis;
use crate::domain::tenant::{describe_join, resolve_join_path, TenantFilter};
use crate::error::{ErrorKind, MigrationError};
use crate::infrastructure::staging;
use crate::ports::{GraphStore, RelationalStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Label of the tenant root node in the graph store.
pub const TENANT_ROOT_LABEL: &str = "District";

pub const SKIP_NO_TENANT_PATH: &str = "no_tenant_path";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableExtraction {
    pub table: String,
    pub store: String,
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExtraction {
    pub store: String,
    pub nodes: usize,
    pub edges: usize,
    pub files: BTreeMap<String, String>,
    pub success: bool,
}

/// Per-store extraction manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionManifest {
    pub run_timestamp: String,
    pub store: String,
    pub filter: TenantFilter,
    pub tables_extracted: Vec<TableExtraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphExtraction>,
    pub total_records: usize,
    pub success: bool,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

impl ExtractionManifest {
    fn new(store: &str, filter: &TenantFilter) -> Self {
        Self {
            run_timestamp: chrono::Utc::now().to_rfc3339(),
            store: store.to_string(),
            filter: filter.clone(),
            tables_extracted: Vec::new(),
            graph: None,
            total_records: 0,
            success: true,
            errors: Vec::new(),
            duration_seconds: 0.0,
        }
    }
}

/// Extracts one relational store in topological order. A per-table data
/// error is recorded and extraction continues; connection loss and
/// cancellation abort the phase. Tables without any tenant path are
/// skipped with a reason, not failed — lookup tables legitimately lack
/// the discriminator.
pub async fn extract_relational(
    store: &dyn RelationalStore,
    analysis: &SchemaAnalysis,
    filter: &TenantFilter,
    output_dir: &Path,
    cancel: &CancelFlag,
) -> Result<ExtractionManifest, MigrationError> {
    let started = std::time::Instant::now();
    let store_id = store.store_id();
    let mut manifest = ExtractionManifest::new(store_id, filter);

    let order = analysis.order_for_store(store_id);
    info!(store = store_id, tables = order.len(), "extraction starting");

    for entry in &order {
        cancel.checkpoint()?;

        let qualified = format!("{}.{}", store_id, entry);
        let table = entry.rsplit('.').next().unwrap_or(entry);
        let schema = analysis.table(&qualified);

        // Indirect filtering: walk parent FKs when the discriminator is
        // absent from this table.
        let join_path = match schema {
            Some(ts) if !ts.has_column(&filter.key) => {
                match resolve_join_path(&analysis.tables, ts, &filter.key) {
                    Some(path) => Some(path),
                    None => {
                        warn!(store = store_id, table, "skipped: no tenant path");
                        manifest.tables_extracted.push(TableExtraction {
                            table: table.to_string(),
                            store: store_id.to_string(),
                            records: 0,
                            file: None,
                            join_strategy: None,
                            skipped: Some(SKIP_NO_TENANT_PATH.to_string()),
                            error: None,
                            success: true,
                        });
                        continue;
                    }
                }
            }
            _ => None,
        };

        let read = store
            .read_filtered(table, filter, join_path.as_deref())
            .await;

        match read {
            Ok(dataset) => {
                let file_name = staging::staged_file_name(store_id, table);
                let path = staging::write_dataset(output_dir, &file_name, &dataset)?;
                info!(store = store_id, table, records = dataset.len(), "extracted");
                manifest.total_records += dataset.len();
                manifest.tables_extracted.push(TableExtraction {
                    table: table.to_string(),
                    store: store_id.to_string(),
                    records: dataset.len(),
                    file: Some(path.to_string_lossy().to_string()),
                    join_strategy: join_path.as_deref().map(describe_join),
                    skipped: None,
                    error: None,
                    success: true,
                });
            }
            Err(e) => match e.kind() {
                // Connection loss is fatal to the phase
                ErrorKind::Connection | ErrorKind::Cancelled => return Err(e),
                _ => {
                    warn!(store = store_id, table, error = %e, "table extraction failed");
                    manifest.errors.push(format!("{}: {}", table, e));
                    manifest.success = false;
                    manifest.tables_extracted.push(TableExtraction {
                        table: table.to_string(),
                        store: store_id.to_string(),
                        records: 0,
                        file: None,
                        join_strategy: None,
                        skipped: None,
                        error: Some(e.to_string()),
                        success: false,
                    });
                }
            },
        }
    }

    manifest.duration_seconds = started.elapsed().as_secs_f64();
    Ok(manifest)
}

/// Extracts the graph store: bounded-depth neighborhood from the tenant
/// root, staged as a nodes file and an edges file.
pub async fn extract_graph(
    store: &dyn GraphStore,
    filter: &TenantFilter,
    max_depth: u32,
    output_dir: &Path,
    cancel: &CancelFlag,
) -> Result<ExtractionManifest, MigrationError> {
    let started = std::time::Instant::now();
    let store_id = store.store_id();
    let mut manifest = ExtractionManifest::new(store_id, filter);

    cancel.checkpoint()?;

    let (nodes, edges) = store
        .extract_neighborhood(TENANT_ROOT_LABEL, &filter.value, max_depth)
        .await?;

    let nodes_path = staging::write_dataset(
        output_dir,
        &staging::nodes_file_name(store_id),
        &staging::nodes_to_dataset(&nodes),
    )?;
    let edges_path = staging::write_dataset(
        output_dir,
        &staging::edges_file_name(store_id),
        &staging::edges_to_dataset(&edges),
    )?;

    let mut files = BTreeMap::new();
    files.insert("nodes".to_string(), nodes_path.to_string_lossy().to_string());
    files.insert("edges".to_string(), edges_path.to_string_lossy().to_string());

    manifest.total_records = nodes.len() + edges.len();
    manifest.graph = Some(GraphExtraction {
        store: store_id.to_string(),
        nodes: nodes.len(),
        edges: edges.len(),
        files,
        success: true,
    });
    manifest.duration_seconds = started.elapsed().as_secs_f64();
    Ok(manifest)
}

/// The combined manifest the coordinator writes after fanning out the
/// per-store extractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedExtraction {
    pub run_timestamp: String,
    pub stores: Vec<ExtractionManifest>,
    pub total_records: usize,
    pub success: bool,
}

impl CombinedExtraction {
    pub fn from_stores(stores: Vec<ExtractionManifest>) -> Self {
        Self {
            run_timestamp: chrono::Utc::now().to_rfc3339(),
            total_records: stores.iter().map(|m| m.total_records).sum(),
            success: stores.iter().all(|m| m.success),
            stores,
        }
    }
}

/// Fatal when the request names a store the topology does not know.
pub fn unknown_store_error(store: &str) -> MigrationError {
    MigrationError::Domain(DomainError::Schema(format!("Unknown store: {}", store)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::application::analyze::analyze_stores;
    use crate::infrastructure::adapters::DuckDbStore;
    use anyhow::Result;
    use tempfile::tempdir;

    async fn seeded() -> Result<DuckDbStore> {
        let store = DuckDbStore::open_in_memory("ids")?;
        store.raw_batch(
                "CREATE TABLE districts (id VARCHAR PRIMARY KEY, district_id VARCHAR, name VARCHAR);
                 CREATE TABLE schools (
                     id INTEGER PRIMARY KEY,
                     district_id VARCHAR,
                     name VARCHAR
                 );
                 CREATE TABLE students (
                     id INTEGER PRIMARY KEY,
                     school_id INTEGER,
                     first_name VARCHAR,
                     contact_email VARCHAR,
                     FOREIGN KEY (school_id) REFERENCES schools(id)
                 );
                 CREATE TABLE grade_scales (id INTEGER PRIMARY KEY, label VARCHAR);
                 INSERT INTO districts VALUES ('district-001', 'district-001', 'Northside');
                 INSERT INTO schools VALUES (1, 'district-001', 'North High');
                 INSERT INTO schools VALUES (2, 'district-002', 'South High');
                 INSERT INTO students VALUES (10, 1, 'Avery', 'a@x.com');
                 INSERT INTO students VALUES (11, 2, 'Carmen', 'c@y.com');
                 INSERT INTO grade_scales VALUES (1, 'A-F');",
        )?;
        Ok(store)
    }

    #[tokio::test]
    async fn test_extract_relational_with_indirect_filtering() -> Result<()> {
        let store = seeded().await?;
        let analysis = analyze_stores(&[&store]).await?;
        let dir = tempdir()?;
        let filter = TenantFilter::district("district-001");
        let cancel = CancelFlag::new();

        let manifest =
            extract_relational(&store, &analysis, &filter, dir.path(), &cancel).await?;

        assert!(manifest.success);

        // schools filtered directly, students through the FK chain
        let students = manifest
            .tables_extracted
            .iter()
            .find(|t| t.table == "students")
            .expect("students entry");
        assert_eq!(students.records, 1);
        assert_eq!(students.join_strategy.as_deref(), Some("schools.school_id"));

        // lookup table without a tenant path is skipped, not failed
        let scales = manifest
            .tables_extracted
            .iter()
            .find(|t| t.table == "grade_scales")
            .expect("grade_scales entry");
        assert!(scales.success);
        assert_eq!(scales.skipped.as_deref(), Some(SKIP_NO_TENANT_PATH));

        // staged files exist for extracted tables only
        assert!(dir.path().join("ids_students.parquet").exists());
        assert!(!dir.path().join("ids_grade_scales.parquet").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_observes_cancellation() -> Result<()> {
        let store = seeded().await?;
        let analysis = analyze_stores(&[&store]).await?;
        let dir = tempdir()?;
        let filter = TenantFilter::district("district-001");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = extract_relational(&store, &analysis, &filter, dir.path(), &cancel).await;
        assert!(matches!(
            result,
            Err(MigrationError::Domain(DomainError::Cancelled))
        ));
        Ok(())
    }
}
