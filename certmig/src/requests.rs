// certmig/src/requests.rs

// JSON request schemas of the scripted stages. Every stage reads one
// request document on stdin and writes its result document on stdout;
// exit code 0 on success, 1 on any failure.

use certmig_core::domain::catalog::{
    qualified_name, ColumnSpec, ForeignKey, LogicalType, StoreRole, TableSchema,
};
use certmig_core::domain::district::{DistrictProfile, SelectionCriteria};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub store: String,
    #[serde(default)]
    pub environment: Option<String>,
}

impl StoreConfig {
    /// Stage direction, overridable by an explicit `environment`.
    pub fn role(&self, default: StoreRole) -> StoreRole {
        match self.environment.as_deref() {
            Some("prod") => StoreRole::Source,
            Some("cert") => StoreRole::Target,
            _ => default,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FilterConfig {
    pub district_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub source_config: StoreConfig,
    pub filter: FilterConfig,
    #[serde(default)]
    pub extraction_order: Option<Vec<String>>,
    pub output_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct AnonymizeRequest {
    pub input_dir: String,
    pub output_dir: String,
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
    #[serde(default)]
    pub consistency_map: Option<String>,
}

fn default_rules_file() -> String {
    "config/anonymization-rules.yaml".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub data_dir: String,
    #[serde(default)]
    pub schema_file: Option<String>,
    #[serde(default)]
    pub validation_rules: Option<String>,
    #[serde(default)]
    pub output_report: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub input_dir: String,
    pub target_config: StoreConfig,
    #[serde(default)]
    pub loading_order: Option<Vec<String>>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_strategy() -> String {
    "insert".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub target_config: StoreConfig,
    pub filter: FilterConfig,
    #[serde(default)]
    pub schema_file: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub run_id: String,
    pub district_id: String,
    pub output_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct RankRequest {
    #[serde(default)]
    pub districts: Vec<DistrictProfile>,
    #[serde(default)]
    pub selection_criteria: Option<SelectionCriteria>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    15
}

/// The failure envelope every stage prints before exiting 1.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_type: String,
}

impl ErrorResponse {
    pub fn from_error(e: &certmig_core::MigrationError) -> Self {
        Self {
            success: false,
            error: e.to_string(),
            error_type: e.kind().as_str().to_string(),
        }
    }
}

// --- Catalog document (analyze stage input) ---

/// Offline catalog document, the analyze stage's stdin shape when the
/// caller already holds the per-store introspection output.
#[derive(Debug, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub data_stores: BTreeMap<String, CatalogStore>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogStore {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tables: Vec<CatalogTable>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogTable {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<CatalogColumn>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<CatalogForeignKey>,
}

fn default_schema() -> String {
    "public".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CatalogForeignKey {
    pub column_name: String,
    #[serde(default)]
    pub foreign_table_schema: Option<String>,
    pub foreign_table_name: String,
    #[serde(default)]
    pub foreign_column_name: Option<String>,
}

impl CatalogDocument {
    /// Flattens the document into the analyzer's table list. Graph
    /// stores contribute nothing: edges are not foreign keys.
    pub fn into_tables(self) -> Vec<TableSchema> {
        let mut tables = Vec::new();

        for (store, catalog) in self.data_stores {
            match catalog.kind.as_str() {
                "postgresql" | "relational" => {}
                _ => continue,
            }

            for table in catalog.tables {
                let foreign_keys = table
                    .foreign_keys
                    .into_iter()
                    .map(|fk| ForeignKey {
                        from_columns: vec![fk.column_name],
                        to_table: qualified_name(
                            &store,
                            fk.foreign_table_schema.as_deref().unwrap_or(&table.schema),
                            &fk.foreign_table_name,
                        ),
                        to_columns: vec![fk.foreign_column_name.unwrap_or_else(|| "id".into())],
                    })
                    .collect();

                tables.push(TableSchema {
                    qualified_name: qualified_name(&store, &table.schema, &table.name),
                    columns: table
                        .columns
                        .iter()
                        .map(|c| ColumnSpec {
                            name: c.name.clone(),
                            logical_type: c
                                .data_type
                                .as_deref()
                                .map(LogicalType::from_engine)
                                .unwrap_or(LogicalType::Text),
                            nullable: c.nullable,
                        })
                        .collect(),
                    primary_key: table.primary_key.clone(),
                    foreign_keys,
                });
            }
        }

        tables
    }
}
