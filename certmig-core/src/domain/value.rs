// certmig-core/src/domain/value.rs

use crate::domain::catalog::{ColumnSpec, LogicalType};
use chrono::{DateTime, Duration, NaiveDate};

/// Store-agnostic cell value. This is the interchange type between the
/// adapters, the staging layer, the anonymization engine and the
/// validator. Timestamps are UTC microseconds since epoch, dates are
/// days since epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(i64),
    Date(i32),
    Binary(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            CellValue::Null => None,
            CellValue::Boolean(_) => Some(LogicalType::Boolean),
            CellValue::Integer(_) => Some(LogicalType::Integer),
            CellValue::Float(_) => Some(LogicalType::Float),
            CellValue::Text(_) => Some(LogicalType::Text),
            CellValue::Timestamp(_) => Some(LogicalType::Timestamp),
            CellValue::Date(_) => Some(LogicalType::Date),
            CellValue::Binary(_) => Some(LogicalType::Binary),
        }
    }

    /// Canonical textual form, used as consistency-map key material and
    /// as hashing input. Must be stable across runs.
    pub fn stringify(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Timestamp(us) => DateTime::from_timestamp_micros(*us)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| us.to_string()),
            CellValue::Date(days) => epoch_date(*days)
                .map(|d| d.to_string())
                .unwrap_or_else(|| days.to_string()),
            CellValue::Binary(bytes) => hex::encode(bytes),
        }
    }

    /// JSON rendering for manifests and reports.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Boolean(b) => serde_json::Value::Bool(*b),
            CellValue::Integer(i) => serde_json::Value::from(*i),
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            other => serde_json::Value::String(other.stringify()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

pub fn epoch_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(Duration::days(days as i64))
}

pub fn date_to_epoch_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(date);
    (date - epoch).num_days() as i32
}

/// A materialized table slice: ordered columns plus rows of cells.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Iterator over the non-null values of one column.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &CellValue> {
        self.rows
            .iter()
            .filter_map(move |row| row.get(idx))
            .filter(|v| !v.is_null())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_stability() {
        assert_eq!(CellValue::Integer(42).stringify(), "42");
        assert_eq!(CellValue::Text("abc".into()).stringify(), "abc");
        assert_eq!(CellValue::Boolean(true).stringify(), "true");
        // Epoch day 0 is the epoch itself
        assert_eq!(CellValue::Date(0).stringify(), "1970-01-01");
        assert_eq!(CellValue::Binary(vec![0xde, 0xad]).stringify(), "dead");
    }

    #[test]
    fn test_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2001, 9, 9).unwrap();
        let days = date_to_epoch_days(date);
        assert_eq!(epoch_date(days), Some(date));
    }

    #[test]
    fn test_dataset_column_access() {
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
        ]);
        ds.rows.push(vec![CellValue::Integer(1), CellValue::Text("a".into())]);
        ds.rows.push(vec![CellValue::Integer(2), CellValue::Null]);

        assert_eq!(ds.column_index("name"), Some(1));
        assert_eq!(ds.column_values(1).count(), 1);
        assert_eq!(ds.len(), 2);
    }
}
