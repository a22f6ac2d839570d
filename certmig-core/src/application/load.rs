// certmig-core/src/application/load.rs

use crate::application::CancelFlag;
use crate::error::MigrationError;
use crate::infrastructure::staging;
use crate::ports::{GraphStore, RelationalStore, WriteStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableLoad {
    pub table: String,
    pub store: String,
    pub rows_loaded: usize,
    pub strategy: WriteStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphLoad {
    pub store: String,
    pub nodes_loaded: usize,
    pub edges_loaded: usize,
    pub success: bool,
}

/// Per-store load manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadManifest {
    pub run_timestamp: String,
    pub store: String,
    pub strategy: WriteStrategy,
    pub tables_loaded: Vec<TableLoad>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphLoad>,
    pub total_rows_loaded: usize,
    pub success: bool,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

impl LoadManifest {
    fn new(store: &str, strategy: WriteStrategy) -> Self {
        Self {
            run_timestamp: chrono::Utc::now().to_rfc3339(),
            store: store.to_string(),
            strategy,
            tables_loaded: Vec::new(),
            graph: None,
            total_rows_loaded: 0,
            success: true,
            errors: Vec::new(),
            duration_seconds: 0.0,
        }
    }
}

/// Loads one relational store under a single transaction, tables in
/// forward dependency order. Any failure rolls the whole store back and
/// the manifest names the offending table. Missing or empty staged
/// files are skipped.
pub async fn load_relational(
    store: &dyn RelationalStore,
    input_dir: &Path,
    loading_order: &[String],
    strategy: WriteStrategy,
    cancel: &CancelFlag,
) -> Result<LoadManifest, MigrationError> {
    let started = std::time::Instant::now();
    let store_id = store.store_id().to_string();
    let mut manifest = LoadManifest::new(&store_id, strategy);

    let order: Vec<String> = if loading_order.is_empty() {
        // Fallback: every staged file of this store, name order
        let prefix = format!("{}_", store_id);
        staging::list_staged(input_dir)
            .iter()
            .map(|p| staging::dataset_name(p))
            .filter_map(|name| name.strip_prefix(&prefix).map(|t| t.to_string()))
            .collect()
    } else {
        loading_order.to_vec()
    };

    info!(store = %store_id, tables = order.len(), %strategy, "load starting");
    store.begin().await?;

    for entry in &order {
        if cancel.is_cancelled() {
            // Cancel observed mid-transaction: explicit rollback
            store.rollback().await?;
            return Err(MigrationError::Domain(
                crate::domain::error::DomainError::Cancelled,
            ));
        }

        let table = entry.rsplit('.').next().unwrap_or(entry);
        let path = input_dir.join(staging::staged_file_name(&store_id, table));
        if !path.exists() {
            info!(store = %store_id, table, "skipped (file not found)");
            continue;
        }

        let dataset = match staging::read_dataset(&path) {
            Ok(ds) => ds,
            Err(e) => {
                store.rollback().await?;
                manifest.success = false;
                manifest.errors.push(format!("{}: {}", table, e));
                manifest.duration_seconds = started.elapsed().as_secs_f64();
                return Ok(manifest);
            }
        };
        if dataset.is_empty() {
            info!(store = %store_id, table, "skipped (no data)");
            continue;
        }

        match store.write_bulk(table, &dataset, strategy).await {
            Ok(rows) => {
                info!(store = %store_id, table, rows, "loaded");
                manifest.total_rows_loaded += rows;
                manifest.tables_loaded.push(TableLoad {
                    table: table.to_string(),
                    store: store_id.clone(),
                    rows_loaded: rows,
                    strategy,
                    error: None,
                    success: true,
                });
            }
            Err(e) => {
                error!(store = %store_id, table, error = %e, "load failed, rolling back");
                store.rollback().await?;
                manifest.tables_loaded.push(TableLoad {
                    table: table.to_string(),
                    store: store_id.clone(),
                    rows_loaded: 0,
                    strategy,
                    error: Some(e.to_string()),
                    success: false,
                });
                manifest.errors.push(format!("{}: {}", table, e));
                manifest.success = false;
                manifest.duration_seconds = started.elapsed().as_secs_f64();
                return Ok(manifest);
            }
        }
    }

    store.commit().await?;
    manifest.duration_seconds = started.elapsed().as_secs_f64();
    info!(store = %store_id, rows = manifest.total_rows_loaded, "load committed");
    Ok(manifest)
}

/// Loads the graph store: nodes merged on `id`, then edges merged on
/// `(start, type, end)`. No transactional guarantee spans the two; a
/// failure reports the counts loaded so far.
pub async fn load_graph(
    store: &dyn GraphStore,
    input_dir: &Path,
    cancel: &CancelFlag,
) -> Result<LoadManifest, MigrationError> {
    let started = std::time::Instant::now();
    let store_id = store.store_id().to_string();
    let mut manifest = LoadManifest::new(&store_id, WriteStrategy::Merge);

    cancel.checkpoint()?;

    let nodes_path = input_dir.join(staging::nodes_file_name(&store_id));
    let edges_path = input_dir.join(staging::edges_file_name(&store_id));
    if !nodes_path.exists() || !edges_path.exists() {
        manifest.success = false;
        manifest
            .errors
            .push(format!("Graph data files not found in {}", input_dir.display()));
        return Ok(manifest);
    }

    let nodes = staging::nodes_from_dataset(&staging::read_dataset(&nodes_path)?)?;
    let edges = staging::edges_from_dataset(&staging::read_dataset(&edges_path)?)?;

    let mut graph_result = GraphLoad {
        store: store_id.clone(),
        nodes_loaded: 0,
        edges_loaded: 0,
        success: true,
    };

    match store.load_nodes(&nodes).await {
        Ok(count) => graph_result.nodes_loaded = count,
        Err(e) => {
            graph_result.success = false;
            manifest.errors.push(e.to_string());
        }
    }
    if graph_result.success {
        cancel.checkpoint()?;
        match store.load_edges(&edges).await {
            Ok(count) => graph_result.edges_loaded = count,
            Err(e) => {
                graph_result.success = false;
                manifest.errors.push(e.to_string());
            }
        }
    }

    manifest.total_rows_loaded = graph_result.nodes_loaded + graph_result.edges_loaded;
    manifest.success = graph_result.success;
    manifest.graph = Some(graph_result);
    manifest.duration_seconds = started.elapsed().as_secs_f64();
    Ok(manifest)
}

/// Combined manifest across stores, written by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedLoad {
    pub run_timestamp: String,
    pub stores: Vec<LoadManifest>,
    pub total_rows_loaded: usize,
    pub success: bool,
}

impl CombinedLoad {
    pub fn from_stores(stores: Vec<LoadManifest>) -> Self {
        Self {
            run_timestamp: chrono::Utc::now().to_rfc3339(),
            total_rows_loaded: stores.iter().map(|m| m.total_rows_loaded).sum(),
            success: stores.iter().all(|m| m.success),
            stores,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::domain::catalog::{ColumnSpec, LogicalType};
    use crate::domain::tenant::TenantFilter;
    use crate::domain::value::{CellValue, Dataset};
    use crate::infrastructure::adapters::DuckDbStore;
    use anyhow::Result;
    use tempfile::tempdir;

    fn target_store() -> Result<DuckDbStore> {
        let store = DuckDbStore::open_in_memory("ids")?;
        store.raw_batch(
            "CREATE TABLE schools (id INTEGER PRIMARY KEY, district_id VARCHAR, name VARCHAR);
             CREATE TABLE students (
                 id INTEGER PRIMARY KEY,
                 school_id INTEGER,
                 first_name VARCHAR,
                 FOREIGN KEY (school_id) REFERENCES schools(id)
             );",
        )?;
        Ok(store)
    }

    fn stage_schools(dir: &Path, rows: Vec<Vec<CellValue>>) {
        let mut ds = Dataset::new(vec![
            ColumnSpec {
                name: "id".into(),
                logical_type: LogicalType::Integer,
                nullable: false,
            },
            ColumnSpec {
                name: "district_id".into(),
                logical_type: LogicalType::Text,
                nullable: true,
            },
            ColumnSpec {
                name: "name".into(),
                logical_type: LogicalType::Text,
                nullable: true,
            },
        ]);
        ds.rows = rows;
        staging::write_dataset(dir, "ids_schools.parquet", &ds).unwrap();
    }

    fn stage_students(dir: &Path, rows: Vec<Vec<CellValue>>) {
        let mut ds = Dataset::new(vec![
            ColumnSpec {
                name: "id".into(),
                logical_type: LogicalType::Integer,
                nullable: false,
            },
            ColumnSpec {
                name: "school_id".into(),
                logical_type: LogicalType::Integer,
                nullable: true,
            },
            ColumnSpec {
                name: "first_name".into(),
                logical_type: LogicalType::Text,
                nullable: true,
            },
        ]);
        ds.rows = rows;
        staging::write_dataset(dir, "ids_students.parquet", &ds).unwrap();
    }

    #[tokio::test]
    async fn test_load_in_dependency_order() -> Result<()> {
        let store = target_store()?;
        let dir = tempdir()?;

        stage_schools(
            dir.path(),
            vec![vec![
                CellValue::Integer(1),
                CellValue::Text("district-001".into()),
                CellValue::Text("North High".into()),
            ]],
        );
        stage_students(
            dir.path(),
            vec![vec![
                CellValue::Integer(10),
                CellValue::Integer(1),
                CellValue::Text("Avery".into()),
            ]],
        );

        let order = vec!["main.schools".to_string(), "main.students".to_string()];
        let manifest = load_relational(
            &store,
            dir.path(),
            &order,
            WriteStrategy::Insert,
            &CancelFlag::new(),
        )
        .await?;

        assert!(manifest.success);
        assert_eq!(manifest.total_rows_loaded, 2);
        assert_eq!(manifest.tables_loaded.len(), 2);

        let filter = TenantFilter::district("district-001");
        let loaded = store.read_filtered("schools", &filter, None).await?;
        assert_eq!(loaded.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_integrity_failure_rolls_back_whole_store() -> Result<()> {
        let store = target_store()?;
        let dir = tempdir()?;

        stage_schools(
            dir.path(),
            vec![vec![
                CellValue::Integer(1),
                CellValue::Text("district-001".into()),
                CellValue::Text("North High".into()),
            ]],
        );
        // student points at a school that does not exist -> FK violation
        stage_students(
            dir.path(),
            vec![vec![
                CellValue::Integer(10),
                CellValue::Integer(999),
                CellValue::Text("Avery".into()),
            ]],
        );

        let order = vec!["main.schools".to_string(), "main.students".to_string()];
        let manifest = load_relational(
            &store,
            dir.path(),
            &order,
            WriteStrategy::Insert,
            &CancelFlag::new(),
        )
        .await?;

        assert!(!manifest.success);
        let failed = manifest
            .tables_loaded
            .iter()
            .find(|t| !t.success)
            .expect("failed table entry");
        assert_eq!(failed.table, "students");

        // The whole store rolled back: zero rows visible anywhere
        let filter = TenantFilter::district("district-001");
        let schools = store.read_filtered("schools", &filter, None).await?;
        assert_eq!(schools.len(), 0, "schools insert must have rolled back");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_and_empty_files_are_skipped() -> Result<()> {
        let store = target_store()?;
        let dir = tempdir()?;

        stage_schools(dir.path(), vec![]); // staged but empty

        let order = vec![
            "main.schools".to_string(),
            "main.students".to_string(), // not staged at all
        ];
        let manifest = load_relational(
            &store,
            dir.path(),
            &order,
            WriteStrategy::Insert,
            &CancelFlag::new(),
        )
        .await?;

        assert!(manifest.success);
        assert_eq!(manifest.total_rows_loaded, 0);
        assert!(manifest.tables_loaded.is_empty());
        Ok(())
    }
}
