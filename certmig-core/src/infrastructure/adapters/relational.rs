// certmig-core/src/infrastructure/adapters/relational.rs

use async_trait::async_trait;
use duckdb::{params, Connection};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

// Imports Hexagonaux
use crate::domain::catalog::{qualified_name, ColumnSpec, ForeignKey, LogicalType, TableSchema};
use crate::domain::error::DomainError;
use crate::domain::tenant::{JoinHop, TenantFilter};
use crate::domain::value::{CellValue, Dataset};
use crate::error::MigrationError;
use crate::infrastructure::config::RelationalEndpoint;
use crate::infrastructure::engine::{cell_from_engine, quote_ident};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::store::{RelationalStore, WriteStrategy};

/// Relational adapter over the embedded SQL engine. One connection per
/// adapter; the loader keeps a single transaction open from `begin` to
/// `commit`/`rollback` across calls.
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
    store_id: String,
    schema: String,
}

impl DuckDbStore {
    /// Opens the store named by an endpoint. The embedded engine treats
    /// the endpoint's database as a file path.
    pub fn open(endpoint: &RelationalEndpoint) -> Result<Self, InfrastructureError> {
        Self::open_at(&endpoint.store, &endpoint.database)
    }

    pub fn open_at(
        store_id: &str,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, InfrastructureError> {
        let conn = Connection::open(db_path.as_ref()).map_err(|e| {
            InfrastructureError::Connection {
                store: store_id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            store_id: store_id.to_string(),
            schema: "main".to_string(),
        })
    }

    pub fn open_in_memory(store_id: &str) -> Result<Self, InfrastructureError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            InfrastructureError::Connection {
                store: store_id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            store_id: store_id.to_string(),
            schema: "main".to_string(),
        })
    }

    /// Overrides the catalog schema to introspect. The embedded
    /// engine's default is `main`; server-side catalogs typically use
    /// `public`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Raw multi-statement execution. Used for seeding and for test
    /// fixtures; pipeline phases never go through here.
    pub fn raw_batch(&self, sql: &str) -> Result<(), MigrationError> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, MigrationError> {
        self.conn.lock().map_err(|_| {
            MigrationError::Infrastructure(InfrastructureError::Io(std::io::Error::other(
                "Engine Mutex Poisoned",
            )))
        })
    }

    fn table_ref(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    /// Ordered column specs of one table, from the catalog.
    fn table_columns(
        &self,
        conn: &Connection,
        table: &str,
    ) -> Result<Vec<ColumnSpec>, MigrationError> {
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type, is_nullable
             FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ?
             ORDER BY ordinal_position",
        )?;

        let rows = stmt.query_map(params![self.schema, table], |row| {
            Ok(ColumnSpec {
                name: row.get::<_, String>(0)?,
                logical_type: LogicalType::from_engine(&row.get::<_, String>(1)?),
                nullable: row.get::<_, String>(2)? == "YES",
            })
        })?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        if columns.is_empty() {
            return Err(MigrationError::Domain(DomainError::Schema(format!(
                "Unknown table '{}' in store '{}'",
                table, self.store_id
            ))));
        }
        Ok(columns)
    }

    fn has_filter_column(
        &self,
        conn: &Connection,
        table: &str,
        column: &str,
    ) -> Result<bool, MigrationError> {
        let mut stmt = conn.prepare(
            "SELECT count(*) FROM information_schema.columns
             WHERE table_schema = ? AND table_name = ? AND column_name = ?",
        )?;
        let count: i64 =
            stmt.query_row(params![self.schema, table, column], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Collects rows of a `SELECT t.*` query into a dataset shaped by
    /// the table's own column specs.
    fn collect_rows(
        &self,
        conn: &Connection,
        sql: &str,
        filter_value: &str,
        columns: Vec<ColumnSpec>,
    ) -> Result<Dataset, MigrationError> {
        let width = columns.len();
        let mut dataset = Dataset::new(columns);

        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![filter_value])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(cell_from_engine(row.get::<_, duckdb::types::Value>(idx)?));
            }
            dataset.rows.push(cells);
        }

        Ok(dataset)
    }

    /// `DELETE ... WHERE fk IN (SELECT ...)` nested along the join path,
    /// innermost subquery carrying the tenant predicate.
    fn delete_sql_via_path(&self, table: &str, filter_key: &str, path: &[JoinHop]) -> String {
        let mut inner = String::new();
        for (idx, hop) in path.iter().enumerate().rev() {
            let parent_ref = self.table_ref(&hop.parent_table);
            if idx == path.len() - 1 {
                inner = format!(
                    "SELECT {} FROM {} WHERE {} = ?",
                    quote_ident(&hop.parent_key),
                    parent_ref,
                    quote_ident(filter_key)
                );
            } else {
                let child_fk = quote_ident(&path[idx + 1].fk_column);
                inner = format!(
                    "SELECT {} FROM {} WHERE {} IN ({})",
                    quote_ident(&hop.parent_key),
                    parent_ref,
                    child_fk,
                    inner
                );
            }
        }
        format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.table_ref(table),
            quote_ident(&path[0].fk_column),
            inner
        )
    }
}

// Constraint metadata arrives as text; these shapes cover the engine's
// rendering of PK and FK clauses.
fn pk_regex() -> Result<Regex, MigrationError> {
    Regex::new(r"(?i)PRIMARY KEY\s*\(([^)]+)\)")
        .map_err(|e| MigrationError::InternalError(e.to_string()))
}

fn fk_regex() -> Result<Regex, MigrationError> {
    Regex::new(r#"(?i)FOREIGN KEY\s*\(([^)]+)\)\s*REFERENCES\s+([\w"\.]+)\s*\(([^)]+)\)"#)
        .map_err(|e| MigrationError::InternalError(e.to_string()))
}

fn split_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[async_trait]
impl RelationalStore for DuckDbStore {
    async fn introspect(&self) -> Result<Vec<TableSchema>, MigrationError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = ? AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )?;
        let names = stmt
            .query_map(params![self.schema], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        // Constraint text per table, one pass
        let mut constraints: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT table_name, constraint_type, constraint_text
             FROM duckdb_constraints()
             WHERE schema_name = ?
             ORDER BY table_name, constraint_type",
        )?;
        let rows = stmt.query_map(params![self.schema], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (table, ctype, ctext) = row?;
            constraints.entry(table).or_default().push((ctype, ctext));
        }

        let pk_re = pk_regex()?;
        let fk_re = fk_regex()?;
        let mut tables = Vec::with_capacity(names.len());

        for name in names {
            let columns = self.table_columns(&conn, &name)?;
            let mut primary_key = Vec::new();
            let mut foreign_keys = Vec::new();

            for (ctype, ctext) in constraints.get(&name).map(Vec::as_slice).unwrap_or(&[]) {
                match ctype.as_str() {
                    "PRIMARY KEY" => {
                        if let Some(caps) = pk_re.captures(ctext) {
                            primary_key = split_columns(&caps[1]);
                        }
                    }
                    "FOREIGN KEY" => {
                        if let Some(caps) = fk_re.captures(ctext) {
                            let target = caps[2].trim_matches('"');
                            // Unqualified targets live in the same schema
                            let target_table =
                                target.rsplit('.').next().unwrap_or(target).trim_matches('"');
                            foreign_keys.push(ForeignKey {
                                from_columns: split_columns(&caps[1]),
                                to_table: qualified_name(
                                    &self.store_id,
                                    &self.schema,
                                    target_table,
                                ),
                                to_columns: split_columns(&caps[3]),
                            });
                        }
                    }
                    _ => {}
                }
            }

            tables.push(TableSchema {
                qualified_name: qualified_name(&self.store_id, &self.schema, &name),
                columns,
                primary_key,
                foreign_keys,
            });
        }

        Ok(tables)
    }

    async fn read_filtered(
        &self,
        table: &str,
        filter: &TenantFilter,
        join_path: Option<&[JoinHop]>,
    ) -> Result<Dataset, MigrationError> {
        let conn = self.lock()?;
        let columns = self.table_columns(&conn, table)?;

        let sql = if self.has_filter_column(&conn, table, &filter.key)? {
            format!(
                "SELECT t.* FROM {} AS t WHERE t.{} = ?",
                self.table_ref(table),
                quote_ident(&filter.key)
            )
        } else {
            let path = join_path.filter(|p| !p.is_empty()).ok_or_else(|| {
                MigrationError::Domain(DomainError::FilterUnresolvable {
                    table: table.to_string(),
                })
            })?;

            let mut sql = format!("SELECT t.* FROM {} AS t", self.table_ref(table));
            let mut prev_alias = "t".to_string();
            for (idx, hop) in path.iter().enumerate() {
                let alias = format!("j{}", idx + 1);
                sql.push_str(&format!(
                    " INNER JOIN {} AS {} ON {}.{} = {}.{}",
                    self.table_ref(&hop.parent_table),
                    alias,
                    prev_alias,
                    quote_ident(&hop.fk_column),
                    alias,
                    quote_ident(&hop.parent_key)
                ));
                prev_alias = alias;
            }
            sql.push_str(&format!(
                " WHERE {}.{} = ?",
                prev_alias,
                quote_ident(&filter.key)
            ));
            sql
        };

        tracing::debug!(store = %self.store_id, table, %sql, "filtered read");
        self.collect_rows(&conn, &sql, &filter.value, columns)
    }

    async fn write_bulk(
        &self,
        table: &str,
        rows: &Dataset,
        strategy: WriteStrategy,
    ) -> Result<usize, MigrationError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let conn = self.lock()?;

        let column_list = rows
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; rows.columns.len()].join(", ");

        let sql = match strategy {
            WriteStrategy::Insert => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table_ref(table),
                column_list,
                placeholders
            ),
            // Merge keeps upsert semantics until table-specific merge
            // predicates exist.
            WriteStrategy::Upsert | WriteStrategy::Merge => {
                let update_set = rows
                    .columns
                    .iter()
                    .filter(|c| c.name != "id")
                    .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(&c.name)))
                    .collect::<Vec<_>>()
                    .join(", ");
                if update_set.is_empty() || rows.column_index("id").is_none() {
                    format!(
                        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
                        self.table_ref(table),
                        column_list,
                        placeholders
                    )
                } else {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (id) DO UPDATE SET {}",
                        self.table_ref(table),
                        column_list,
                        placeholders,
                        update_set
                    )
                }
            }
        };

        let mut stmt = conn.prepare(&sql)?;
        let mut written = 0usize;
        for row in &rows.rows {
            stmt.execute(duckdb::params_from_iter(row.iter()))?;
            written += 1;
        }

        Ok(written)
    }

    async fn delete_by_tenant(
        &self,
        table: &str,
        filter: &TenantFilter,
        join_path: Option<&[JoinHop]>,
    ) -> Result<usize, MigrationError> {
        let conn = self.lock()?;

        if self.has_filter_column(&conn, table, &filter.key)? {
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?",
                self.table_ref(table),
                quote_ident(&filter.key)
            );
            let deleted = conn.execute(&sql, params![filter.value])?;
            return Ok(deleted);
        }

        match join_path.filter(|p| !p.is_empty()) {
            Some(path) => {
                let sql = self.delete_sql_via_path(table, &filter.key, path);
                let deleted = conn.execute(&sql, params![filter.value])?;
                Ok(deleted)
            }
            None => {
                // No tenant path: nothing of this tenant was ever loaded
                tracing::warn!(store = %self.store_id, table, "no tenant path, delete skipped");
                Ok(0)
            }
        }
    }

    async fn begin(&self) -> Result<(), MigrationError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), MigrationError> {
        let conn = self.lock()?;
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), MigrationError> {
        let conn = self.lock()?;
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn store_id(&self) -> &str {
        &self.store_id
    }
}
