// certmig-core/src/domain/catalog.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Relational,
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    Source,
    Target,
}

impl StoreRole {
    /// Environment variable prefix segment (`PROD` / `CERT`).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Source => "PROD",
            Self::Target => "CERT",
        }
    }
}

/// One database instance taking part in the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub id: String,
    pub kind: StoreKind,
    pub endpoint: String,
    pub role: StoreRole,
}

/// Logical column types that must round-trip through the staging format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
    Date,
    Binary,
}

impl LogicalType {
    /// DDL spelling used when materializing a staging table.
    pub fn ddl(&self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE",
            Self::Boolean => "BOOLEAN",
            Self::Text => "VARCHAR",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Binary => "BLOB",
        }
    }

    /// Best-effort mapping from an engine type name (`BIGINT`,
    /// `DECIMAL(18,3)`, `VARCHAR`, ...). Unknown names degrade to text.
    pub fn from_engine(name: &str) -> Self {
        let upper = name.to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" => Self::Integer,
            "FLOAT" | "REAL" | "DOUBLE" | "DECIMAL" | "NUMERIC" => Self::Float,
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "TIMESTAMP WITH TIME ZONE" => {
                Self::Timestamp
            }
            "DATE" => Self::Date,
            "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => Self::Binary,
            _ => Self::Text,
        }
    }
}

impl FromStr for LogicalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "boolean" => Ok(Self::Boolean),
            "text" => Ok(Self::Text),
            "timestamp" => Ok(Self::Timestamp),
            "date" => Ok(Self::Date),
            "binary" => Ok(Self::Binary),
            _ => Err(format!("Unknown logical type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
}

/// Declared foreign key. Convention-only `*_id` columns never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

/// Catalog metadata for one table, immutable within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// `store.schema.table`
    pub qualified_name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Bare table name (last segment of the qualified name).
    pub fn table_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    /// Store id (first segment of the qualified name).
    pub fn store(&self) -> &str {
        self.qualified_name
            .split('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

/// Builds `store.schema.table`.
pub fn qualified_name(store: &str, schema: &str, table: &str) -> String {
    format!("{}.{}.{}", store, schema, table)
}

/// Splits a qualified name into `(store, rest)` where rest is `schema.table`.
pub fn split_store(qualified: &str) -> Option<(&str, &str)> {
    qualified.split_once('.')
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::Graph => write!(f, "graph"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_type_from_engine() {
        assert_eq!(LogicalType::from_engine("BIGINT"), LogicalType::Integer);
        assert_eq!(LogicalType::from_engine("DECIMAL(18,3)"), LogicalType::Float);
        assert_eq!(LogicalType::from_engine("VARCHAR"), LogicalType::Text);
        assert_eq!(LogicalType::from_engine("timestamp"), LogicalType::Timestamp);
        assert_eq!(LogicalType::from_engine("SOMETHING_NEW"), LogicalType::Text);
    }

    #[test]
    fn test_qualified_name_parts() {
        let schema = TableSchema {
            qualified_name: qualified_name("ids", "public", "students"),
            columns: vec![],
            primary_key: vec!["id".into()],
            foreign_keys: vec![],
        };
        assert_eq!(schema.store(), "ids");
        assert_eq!(schema.table_name(), "students");
        assert_eq!(split_store(&schema.qualified_name), Some(("ids", "public.students")));
    }
}
