// certmig-core/src/domain/tenant.rs

use crate::domain::catalog::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tenant scope of one migration run. A row belongs to the tenant iff
/// the filter column equals the value directly, or the row reaches a
/// directly-matching row through a declared FK chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantFilter {
    pub key: String,
    pub value: String,
}

impl TenantFilter {
    pub fn district(value: impl Into<String>) -> Self {
        Self {
            key: "district_id".to_string(),
            value: value.into(),
        }
    }
}

/// One join step: `child.fk_column = parent.parent_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinHop {
    /// Qualified name of the parent table.
    pub parent: String,
    /// Bare parent table name, usable in SQL.
    pub parent_table: String,
    /// FK column on the child side of this hop.
    pub fk_column: String,
    /// Referenced column on the parent side.
    pub parent_key: String,
}

/// Walks parent FKs breadth-first from `start` until a table carrying
/// the filter column is found. Returns the ordered hop list, or None
/// when no declared chain reaches the column (the table is then skipped
/// with reason `no_tenant_path`, not failed — lookup tables may
/// legitimately lack a tenant discriminator).
///
/// Only single-column FKs take part in path resolution; composite keys
/// do not appear in tenant chains in practice.
pub fn resolve_join_path(
    tables: &[TableSchema],
    start: &TableSchema,
    filter_key: &str,
) -> Option<Vec<JoinHop>> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    visited.insert(start.qualified_name.clone());

    let mut queue: Vec<(Vec<JoinHop>, &TableSchema)> = vec![(Vec::new(), start)];

    while !queue.is_empty() {
        let mut next: Vec<(Vec<JoinHop>, &TableSchema)> = Vec::new();

        for (path, current) in queue {
            // Deterministic exploration: FKs in from-column order.
            let mut fks = current.foreign_keys.clone();
            fks.sort_by(|a, b| a.from_columns.cmp(&b.from_columns));

            for fk in fks {
                if fk.from_columns.len() != 1 || fk.to_columns.len() != 1 {
                    continue;
                }
                if !visited.insert(fk.to_table.clone()) {
                    continue;
                }
                let Some(parent) = tables.iter().find(|t| t.qualified_name == fk.to_table)
                else {
                    continue;
                };

                let mut hop_path = path.clone();
                hop_path.push(JoinHop {
                    parent: parent.qualified_name.clone(),
                    parent_table: parent.table_name().to_string(),
                    fk_column: fk.from_columns[0].clone(),
                    parent_key: fk.to_columns[0].clone(),
                });

                if parent.has_column(filter_key) {
                    return Some(hop_path);
                }
                next.push((hop_path, parent));
            }
        }

        queue = next;
    }

    None
}

/// Human-readable join strategy for the extraction manifest,
/// e.g. `schools.school_id -> districts.district_id`.
pub fn describe_join(path: &[JoinHop]) -> String {
    path.iter()
        .map(|hop| format!("{}.{}", hop.parent_table, hop.fk_column))
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::catalog::{ColumnSpec, ForeignKey, LogicalType};

    fn column(name: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.into(),
            logical_type: LogicalType::Integer,
            nullable: true,
        }
    }

    fn table(name: &str, cols: Vec<&str>, fks: Vec<(&str, &str)>) -> TableSchema {
        TableSchema {
            qualified_name: format!("ids.main.{}", name),
            columns: cols.into_iter().map(column).collect(),
            primary_key: vec!["id".into()],
            foreign_keys: fks
                .into_iter()
                .map(|(col, target)| ForeignKey {
                    from_columns: vec![col.into()],
                    to_table: format!("ids.main.{}", target),
                    to_columns: vec!["id".into()],
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_hop_path() {
        let tables = vec![
            table("schools", vec!["id", "district_id"], vec![]),
            table("students", vec!["id", "school_id"], vec![("school_id", "schools")]),
        ];

        let path = resolve_join_path(&tables, &tables[1], "district_id").unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].parent_table, "schools");
        assert_eq!(path[0].fk_column, "school_id");
        assert_eq!(describe_join(&path), "schools.school_id");
    }

    #[test]
    fn test_two_hop_path() {
        let tables = vec![
            table("schools", vec!["id", "district_id"], vec![]),
            table("students", vec!["id", "school_id"], vec![("school_id", "schools")]),
            table("grades", vec!["id", "student_id"], vec![("student_id", "students")]),
        ];

        let path = resolve_join_path(&tables, &tables[2], "district_id").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].parent_table, "students");
        assert_eq!(path[1].parent_table, "schools");
    }

    #[test]
    fn test_no_path_for_lookup_table() {
        let tables = vec![table("grade_scales", vec!["id", "label"], vec![])];
        assert!(resolve_join_path(&tables, &tables[0], "district_id").is_none());
    }

    #[test]
    fn test_cycle_does_not_loop() {
        let tables = vec![
            table("x", vec!["id", "y_id"], vec![("y_id", "y")]),
            table("y", vec!["id", "x_id"], vec![("x_id", "x")]),
        ];
        assert!(resolve_join_path(&tables, &tables[0], "district_id").is_none());
    }
}
