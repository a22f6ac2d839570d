// certmig-core/src/infrastructure/staging/mod.rs

// Columnar staging: one Parquet file per table, ZSTD block compression,
// written and read through a scratch engine connection. Every phase of
// a run agrees on this layout.

use duckdb::Connection;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::domain::catalog::{ColumnSpec, LogicalType};
use crate::domain::value::{CellValue, Dataset};
use crate::error::MigrationError;
use crate::infrastructure::engine::{cell_from_engine, quote_ident};
use crate::ports::store::{GraphEdge, GraphNode};

pub const STAGING_EXT: &str = "parquet";

/// `{store}_{table}.parquet`; a qualified table name contributes only
/// its last segment.
pub fn staged_file_name(store: &str, table: &str) -> String {
    let bare = table.rsplit('.').next().unwrap_or(table);
    format!("{}_{}.{}", store, bare, STAGING_EXT)
}

/// Graph staging pair.
pub fn nodes_file_name(store: &str) -> String {
    format!("{}_nodes.{}", store, STAGING_EXT)
}

pub fn edges_file_name(store: &str) -> String {
    format!("{}_edges.{}", store, STAGING_EXT)
}

fn scratch() -> Result<Connection, MigrationError> {
    Ok(Connection::open_in_memory()?)
}

fn sql_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "''")
}

/// Materializes the dataset as a Parquet file via a staging table and
/// `COPY`. Returns the file path.
pub fn write_dataset(
    dir: &Path,
    file_name: &str,
    dataset: &Dataset,
) -> Result<PathBuf, MigrationError> {
    if dataset.columns.is_empty() {
        return Err(MigrationError::InternalError(format!(
            "Refusing to stage '{}' without columns",
            file_name
        )));
    }

    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let conn = scratch()?;

    let ddl_columns = dataset
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.logical_type.ddl()))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!("CREATE TABLE staging_out ({})", ddl_columns))?;

    {
        let placeholders = vec!["?"; dataset.columns.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "INSERT INTO staging_out VALUES ({})",
            placeholders
        ))?;
        for row in &dataset.rows {
            stmt.execute(duckdb::params_from_iter(row.iter()))?;
        }
    }

    conn.execute_batch(&format!(
        "COPY (SELECT * FROM staging_out) TO '{}' (FORMAT PARQUET, COMPRESSION ZSTD)",
        sql_path(&path)
    ))?;

    Ok(path)
}

/// Loads a staged Parquet file back into a dataset, logical types
/// recovered from the file's schema.
pub fn read_dataset(path: &Path) -> Result<Dataset, MigrationError> {
    let conn = scratch()?;
    let source = format!("read_parquet('{}')", sql_path(path));

    let mut columns: Vec<ColumnSpec> = Vec::new();
    {
        let mut stmt = conn.prepare(&format!("DESCRIBE SELECT * FROM {}", source))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (name, engine_type) = row?;
            columns.push(ColumnSpec {
                name,
                logical_type: LogicalType::from_engine(&engine_type),
                nullable: true,
            });
        }
    }

    let width = columns.len();
    let mut dataset = Dataset::new(columns);

    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", source))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            cells.push(cell_from_engine(row.get::<_, duckdb::types::Value>(idx)?));
        }
        dataset.rows.push(cells);
    }

    Ok(dataset)
}

/// Staged files of a directory, sorted by name for deterministic phase
/// iteration.
pub fn list_staged(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == STAGING_EXT)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

// --- Graph staging bridges ---

fn graph_node_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            name: "internal_id".into(),
            logical_type: LogicalType::Integer,
            nullable: false,
        },
        ColumnSpec {
            name: "labels".into(),
            logical_type: LogicalType::Text,
            nullable: false,
        },
        ColumnSpec {
            name: "properties".into(),
            logical_type: LogicalType::Text,
            nullable: false,
        },
    ]
}

fn graph_edge_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            name: "start_internal_id".into(),
            logical_type: LogicalType::Integer,
            nullable: false,
        },
        ColumnSpec {
            name: "type".into(),
            logical_type: LogicalType::Text,
            nullable: false,
        },
        ColumnSpec {
            name: "end_internal_id".into(),
            logical_type: LogicalType::Integer,
            nullable: false,
        },
        ColumnSpec {
            name: "properties".into(),
            logical_type: LogicalType::Text,
            nullable: false,
        },
    ]
}

pub fn nodes_to_dataset(nodes: &[GraphNode]) -> Dataset {
    let mut ds = Dataset::new(graph_node_columns());
    for node in nodes {
        ds.rows.push(vec![
            CellValue::Integer(node.internal_id),
            CellValue::Text(serde_json::Value::from(node.labels.clone()).to_string()),
            CellValue::Text(serde_json::Value::Object(node.properties.clone()).to_string()),
        ]);
    }
    ds
}

pub fn edges_to_dataset(edges: &[GraphEdge]) -> Dataset {
    let mut ds = Dataset::new(graph_edge_columns());
    for edge in edges {
        ds.rows.push(vec![
            CellValue::Integer(edge.start_internal_id),
            CellValue::Text(edge.edge_type.clone()),
            CellValue::Integer(edge.end_internal_id),
            CellValue::Text(serde_json::Value::Object(edge.properties.clone()).to_string()),
        ]);
    }
    ds
}

pub fn nodes_from_dataset(dataset: &Dataset) -> Result<Vec<GraphNode>, MigrationError> {
    let id_idx = column_or_err(dataset, "internal_id")?;
    let labels_idx = column_or_err(dataset, "labels")?;
    let props_idx = column_or_err(dataset, "properties")?;

    let mut nodes = Vec::with_capacity(dataset.len());
    for row in &dataset.rows {
        let labels: Vec<String> =
            serde_json::from_str(&row[labels_idx].stringify()).unwrap_or_default();
        let properties = parse_properties(&row[props_idx])?;
        nodes.push(GraphNode {
            internal_id: row[id_idx].as_i64().unwrap_or_default(),
            labels,
            properties,
        });
    }
    Ok(nodes)
}

pub fn edges_from_dataset(dataset: &Dataset) -> Result<Vec<GraphEdge>, MigrationError> {
    let start_idx = column_or_err(dataset, "start_internal_id")?;
    let type_idx = column_or_err(dataset, "type")?;
    let end_idx = column_or_err(dataset, "end_internal_id")?;
    let props_idx = column_or_err(dataset, "properties")?;

    let mut edges = Vec::with_capacity(dataset.len());
    for row in &dataset.rows {
        edges.push(GraphEdge {
            start_internal_id: row[start_idx].as_i64().unwrap_or_default(),
            edge_type: row[type_idx].stringify(),
            end_internal_id: row[end_idx].as_i64().unwrap_or_default(),
            properties: parse_properties(&row[props_idx])?,
        });
    }
    Ok(edges)
}

fn column_or_err(dataset: &Dataset, name: &str) -> Result<usize, MigrationError> {
    dataset.column_index(name).ok_or_else(|| {
        MigrationError::InternalError(format!("Graph staging file lacks column '{}'", name))
    })
}

fn parse_properties(
    cell: &CellValue,
) -> Result<serde_json::Map<String, serde_json::Value>, MigrationError> {
    if cell.is_null() {
        return Ok(Default::default());
    }
    match serde_json::from_str::<serde_json::Value>(&cell.stringify()) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Ok(Default::default()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn sample_dataset() -> Dataset {
        let mut ds = Dataset::new(vec![
            ColumnSpec {
                name: "id".into(),
                logical_type: LogicalType::Integer,
                nullable: false,
            },
            ColumnSpec {
                name: "name".into(),
                logical_type: LogicalType::Text,
                nullable: true,
            },
            ColumnSpec {
                name: "enrolled".into(),
                logical_type: LogicalType::Boolean,
                nullable: true,
            },
            ColumnSpec {
                name: "gpa".into(),
                logical_type: LogicalType::Float,
                nullable: true,
            },
            ColumnSpec {
                name: "birth_date".into(),
                logical_type: LogicalType::Date,
                nullable: true,
            },
        ]);
        ds.rows.push(vec![
            CellValue::Integer(1),
            CellValue::Text("Avery".into()),
            CellValue::Boolean(true),
            CellValue::Float(3.5),
            CellValue::Date(12_000),
        ]);
        ds.rows.push(vec![
            CellValue::Integer(2),
            CellValue::Null,
            CellValue::Boolean(false),
            CellValue::Null,
            CellValue::Null,
        ]);
        ds
    }

    #[test]
    fn test_parquet_round_trip_preserves_types_and_nulls() -> Result<()> {
        let dir = tempdir()?;
        let ds = sample_dataset();

        let path = write_dataset(dir.path(), &staged_file_name("ids", "students"), &ds)?;
        assert!(path.ends_with("ids_students.parquet"));

        let restored = read_dataset(&path)?;
        assert_eq!(restored.column_names(), ds.column_names());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.rows[0], ds.rows[0]);
        assert_eq!(restored.rows[1], ds.rows[1]);

        let types: Vec<LogicalType> =
            restored.columns.iter().map(|c| c.logical_type).collect();
        assert_eq!(
            types,
            vec![
                LogicalType::Integer,
                LogicalType::Text,
                LogicalType::Boolean,
                LogicalType::Float,
                LogicalType::Date,
            ]
        );
        Ok(())
    }

    #[test]
    fn test_list_staged_sorted() -> Result<()> {
        let dir = tempdir()?;
        let ds = sample_dataset();
        write_dataset(dir.path(), "ids_b.parquet", &ds)?;
        write_dataset(dir.path(), "ids_a.parquet", &ds)?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let staged = list_staged(dir.path());
        assert_eq!(staged.len(), 2);
        assert_eq!(dataset_name(&staged[0]), "ids_a");
        assert_eq!(dataset_name(&staged[1]), "ids_b");
        Ok(())
    }

    #[test]
    fn test_graph_staging_round_trip() -> Result<()> {
        let mut props = serde_json::Map::new();
        props.insert("id".into(), serde_json::Value::from("district-001"));
        props.insert("name".into(), serde_json::Value::from("Northside"));

        let nodes = vec![GraphNode {
            internal_id: 7,
            labels: vec!["District".into()],
            properties: props.clone(),
        }];
        let edges = vec![GraphEdge {
            start_internal_id: 7,
            edge_type: "HAS_SCHOOL".into(),
            end_internal_id: 9,
            properties: Default::default(),
        }];

        let dir = tempdir()?;
        let nodes_path = write_dataset(dir.path(), &nodes_file_name("sp"), &nodes_to_dataset(&nodes))?;
        let edges_path = write_dataset(dir.path(), &edges_file_name("sp"), &edges_to_dataset(&edges))?;

        let restored_nodes = nodes_from_dataset(&read_dataset(&nodes_path)?)?;
        assert_eq!(restored_nodes.len(), 1);
        assert_eq!(restored_nodes[0].internal_id, 7);
        assert_eq!(restored_nodes[0].labels, vec!["District"]);
        assert_eq!(
            restored_nodes[0].properties.get("name"),
            Some(&serde_json::Value::from("Northside"))
        );

        let restored_edges = edges_from_dataset(&read_dataset(&edges_path)?)?;
        assert_eq!(restored_edges[0].edge_type, "HAS_SCHOOL");
        assert_eq!(restored_edges[0].end_internal_id, 9);
        Ok(())
    }
}
