// certmig-core/src/application/rollback.rs

use crate::application::extract::TENANT_ROOT_LABEL;
use crate::application::CancelFlag;
use crate::domain::graph::SchemaAnalysis;
use crate::domain::tenant::{resolve_join_path, TenantFilter};
use crate::error::MigrationError;
use crate::ports::{GraphStore, RelationalStore};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub const STATUS_ROLLED_BACK: &str = "ROLLED_BACK";
pub const STATUS_MANUAL: &str = "NEEDS_MANUAL_INTERVENTION";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRollback {
    pub table: String,
    pub rows_deleted: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRollback {
    pub store: String,
    pub tables: Vec<TableRollback>,
    pub rows_deleted: usize,
    pub success: bool,
}

/// Aggregate manifest across stores. A failed store leaves partial
/// state behind and surfaces the distinct manual-intervention status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackManifest {
    pub run_timestamp: String,
    pub filter: TenantFilter,
    pub stores: Vec<StoreRollback>,
    pub total_rows_deleted: usize,
    pub status: String,
    pub success: bool,
    pub duration_seconds: f64,
}

impl RollbackManifest {
    pub fn from_stores(filter: &TenantFilter, stores: Vec<StoreRollback>, duration: f64) -> Self {
        let success = stores.iter().all(|s| s.success);
        Self {
            run_timestamp: chrono::Utc::now().to_rfc3339(),
            filter: filter.clone(),
            total_rows_deleted: stores.iter().map(|s| s.rows_deleted).sum(),
            status: if success {
                STATUS_ROLLED_BACK.to_string()
            } else {
                STATUS_MANUAL.to_string()
            },
            success,
            stores,
            duration_seconds: duration,
        }
    }
}

/// Deletes the tenant's rows from one relational store, tables in
/// *reverse* extraction order under a single transaction. Idempotent:
/// re-running on a clean target succeeds with zero rows deleted.
pub async fn rollback_relational(
    store: &dyn RelationalStore,
    analysis: &SchemaAnalysis,
    filter: &TenantFilter,
    cancel: &CancelFlag,
) -> Result<StoreRollback, MigrationError> {
    let store_id = store.store_id().to_string();
    let mut result = StoreRollback {
        store: store_id.clone(),
        tables: Vec::new(),
        rows_deleted: 0,
        success: true,
    };

    let mut order = analysis.order_for_store(&store_id);
    order.reverse();
    info!(store = %store_id, tables = order.len(), "rollback starting");

    store.begin().await?;

    for entry in &order {
        if cancel.is_cancelled() {
            store.rollback().await?;
            return Err(MigrationError::Domain(
                crate::domain::error::DomainError::Cancelled,
            ));
        }

        let qualified = format!("{}.{}", store_id, entry);
        let table = entry.rsplit('.').next().unwrap_or(entry);

        let join_path = analysis.table(&qualified).and_then(|ts| {
            if ts.has_column(&filter.key) {
                None
            } else {
                resolve_join_path(&analysis.tables, ts, &filter.key)
            }
        });

        match store
            .delete_by_tenant(table, filter, join_path.as_deref())
            .await
        {
            Ok(deleted) => {
                result.rows_deleted += deleted;
                result.tables.push(TableRollback {
                    table: table.to_string(),
                    rows_deleted: deleted,
                    success: true,
                    error: None,
                });
            }
            Err(e) => {
                error!(store = %store_id, table, error = %e, "rollback delete failed");
                store.rollback().await?;
                result.tables.push(TableRollback {
                    table: table.to_string(),
                    rows_deleted: 0,
                    success: false,
                    error: Some(e.to_string()),
                });
                result.success = false;
                return Ok(result);
            }
        }
    }

    store.commit().await?;
    info!(store = %store_id, rows = result.rows_deleted, "rollback committed");
    Ok(result)
}

/// Deletes the tenant's graph neighborhood: the root plus everything
/// reachable in bounded depth, with incident edges.
pub async fn rollback_graph(
    store: &dyn GraphStore,
    filter: &TenantFilter,
    max_depth: u32,
    cancel: &CancelFlag,
) -> Result<StoreRollback, MigrationError> {
    cancel.checkpoint()?;
    let store_id = store.store_id().to_string();

    match store
        .delete_by_tenant(TENANT_ROOT_LABEL, &filter.value, max_depth)
        .await
    {
        Ok(deleted) => Ok(StoreRollback {
            store: store_id,
            tables: Vec::new(),
            rows_deleted: deleted,
            success: true,
        }),
        Err(e) => {
            error!(store = %store_id, error = %e, "graph rollback failed");
            Ok(StoreRollback {
                store: store_id,
                tables: vec![TableRollback {
                    table: "(graph)".to_string(),
                    rows_deleted: 0,
                    success: false,
                    error: Some(e.to_string()),
                }],
                rows_deleted: 0,
                success: false,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::application::analyze::analyze_stores;
    use crate::infrastructure::adapters::DuckDbStore;
    use anyhow::Result;

    async fn loaded_store() -> Result<DuckDbStore> {
        let store = DuckDbStore::open_in_memory("ids")?;
        store.raw_batch(
            "CREATE TABLE schools (id INTEGER PRIMARY KEY, district_id VARCHAR, name VARCHAR);
             CREATE TABLE students (
                 id INTEGER PRIMARY KEY,
                 school_id INTEGER,
                 first_name VARCHAR,
                 FOREIGN KEY (school_id) REFERENCES schools(id)
             );
             INSERT INTO schools VALUES (1, 'district-001', 'North High');
             INSERT INTO schools VALUES (2, 'district-002', 'South High');
             INSERT INTO students VALUES (10, 1, 'Avery');
             INSERT INTO students VALUES (11, 2, 'Carmen');",
        )?;
        Ok(store)
    }

    #[tokio::test]
    async fn test_rollback_deletes_in_reverse_order_and_is_idempotent() -> Result<()> {
        let store = loaded_store().await?;
        let analysis = analyze_stores(&[&store]).await?;
        let filter = TenantFilter::district("district-001");
        let cancel = CancelFlag::new();

        let first = rollback_relational(&store, &analysis, &filter, &cancel).await?;
        assert!(first.success);
        // one student (school 1) + one school
        assert_eq!(first.rows_deleted, 2);
        // children deleted before parents
        assert_eq!(first.tables[0].table, "students");
        assert_eq!(first.tables[1].table, "schools");

        // Other tenant untouched
        let other = TenantFilter::district("district-002");
        let remaining = store.read_filtered("schools", &other, None).await?;
        assert_eq!(remaining.len(), 1);

        // Second run: same end state, zero rows affected
        let second = rollback_relational(&store, &analysis, &filter, &cancel).await?;
        assert!(second.success);
        assert_eq!(second.rows_deleted, 0);
        Ok(())
    }

    #[test]
    fn test_manifest_status_on_partial_failure() {
        let filter = TenantFilter::district("district-001");
        let stores = vec![
            StoreRollback {
                store: "ids".into(),
                tables: vec![],
                rows_deleted: 5,
                success: true,
            },
            StoreRollback {
                store: "adb".into(),
                tables: vec![],
                rows_deleted: 0,
                success: false,
            },
        ];

        let manifest = RollbackManifest::from_stores(&filter, stores, 0.5);
        assert!(!manifest.success);
        assert_eq!(manifest.status, STATUS_MANUAL);
        assert_eq!(manifest.total_rows_deleted, 5);
    }
}
