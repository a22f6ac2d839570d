// certmig-core/src/ports/store.rs

// The application layer only knows these capability sets. The two
// backends differ too much for one trait: the relational side speaks
// tables, filters and transactions; the graph side speaks root-plus-depth
// traversal in place of join paths.

use crate::domain::catalog::TableSchema;
use crate::domain::tenant::{JoinHop, TenantFilter};
use crate::domain::value::Dataset;
use crate::error::MigrationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Bounded traversal depth for the graph neighborhood. A policy
/// parameter; configuration may override it per run.
pub const DEFAULT_TRAVERSAL_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Plain INSERT; any integrity violation aborts the phase.
    Insert,
    /// `ON CONFLICT (id) DO UPDATE SET col = EXCLUDED.col`.
    Upsert,
    /// Baseline semantics equal upsert; the name is reserved for
    /// table-specific merge predicates.
    Merge,
}

impl FromStr for WriteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "upsert" => Ok(Self::Upsert),
            "merge" => Ok(Self::Merge),
            _ => Err(format!("Unknown loading strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for WriteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::Merge => "merge",
        };
        write!(f, "{}", s)
    }
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Catalog metadata for the configured schema. Only declared FK
    /// constraints are reported; convention-only `*_id` columns are not.
    async fn introspect(&self) -> Result<Vec<TableSchema>, MigrationError>;

    /// Filtered read. With the filter column present an equality
    /// predicate applies directly; otherwise the join path is required
    /// and its absence is a `FilterUnresolvable` error.
    async fn read_filtered(
        &self,
        table: &str,
        filter: &TenantFilter,
        join_path: Option<&[JoinHop]>,
    ) -> Result<Dataset, MigrationError>;

    /// Applies rows under the currently open transaction.
    async fn write_bulk(
        &self,
        table: &str,
        rows: &Dataset,
        strategy: WriteStrategy,
    ) -> Result<usize, MigrationError>;

    /// Deletes the tenant's rows, directly or along the join path.
    /// Idempotent: a clean table deletes zero rows.
    async fn delete_by_tenant(
        &self,
        table: &str,
        filter: &TenantFilter,
        join_path: Option<&[JoinHop]>,
    ) -> Result<usize, MigrationError>;

    // Single transaction per store per phase.
    async fn begin(&self) -> Result<(), MigrationError>;
    async fn commit(&self) -> Result<(), MigrationError>;
    async fn rollback(&self) -> Result<(), MigrationError>;

    fn store_id(&self) -> &str;
}

/// One exported graph node. The store-internal id travels along so
/// edges can be reconstructed after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub internal_id: i64,
    pub labels: Vec<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub start_internal_id: i64,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub end_internal_id: i64,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Distinct nodes reachable from the root within `max_depth`, plus
    /// every edge on a traversed path. Labels and properties verbatim.
    async fn extract_neighborhood(
        &self,
        root_label: &str,
        root_key: &str,
        max_depth: u32,
    ) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), MigrationError>;

    /// Merge on the stable `id` property; properties replaced, not
    /// merged, so stale values never survive a reload.
    async fn load_nodes(&self, nodes: &[GraphNode]) -> Result<usize, MigrationError>;

    /// Merge on `(start, type, end)`; properties replaced.
    async fn load_edges(&self, edges: &[GraphEdge]) -> Result<usize, MigrationError>;

    /// Detaches and deletes everything reachable from the tenant root.
    async fn delete_by_tenant(
        &self,
        root_label: &str,
        root_key: &str,
        max_depth: u32,
    ) -> Result<usize, MigrationError>;

    /// Edges are not foreign keys: the graph contributes no tables to
    /// the dependency analysis.
    async fn introspect(&self) -> Result<Vec<TableSchema>, MigrationError> {
        Ok(Vec::new())
    }

    fn store_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(WriteStrategy::from_str("insert"), Ok(WriteStrategy::Insert));
        assert_eq!(WriteStrategy::from_str("UPSERT"), Ok(WriteStrategy::Upsert));
        assert_eq!(WriteStrategy::from_str("merge"), Ok(WriteStrategy::Merge));
        assert!(WriteStrategy::from_str("replace").is_err());
        assert_eq!(WriteStrategy::Upsert.to_string(), "upsert");
    }
}
