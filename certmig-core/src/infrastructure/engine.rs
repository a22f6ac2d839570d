// certmig-core/src/infrastructure/engine.rs

// Bridge between the engine's dynamic value type and the domain's
// CellValue. Both the relational adapter and the staging layer read and
// write rows through these conversions.

use crate::domain::value::CellValue;
use duckdb::types::{TimeUnit, ToSqlOutput, Value};
use duckdb::ToSql;

/// Engine value -> domain value. Sub-word integers widen to i64,
/// timestamps normalize to microseconds. Exotic engine types degrade to
/// their textual form rather than failing the row.
pub fn cell_from_engine(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Boolean(b) => CellValue::Boolean(b),
        Value::TinyInt(i) => CellValue::Integer(i as i64),
        Value::SmallInt(i) => CellValue::Integer(i as i64),
        Value::Int(i) => CellValue::Integer(i as i64),
        Value::BigInt(i) => CellValue::Integer(i),
        Value::HugeInt(i) => CellValue::Integer(i as i64),
        Value::UTinyInt(i) => CellValue::Integer(i as i64),
        Value::USmallInt(i) => CellValue::Integer(i as i64),
        Value::UInt(i) => CellValue::Integer(i as i64),
        Value::UBigInt(i) => CellValue::Integer(i as i64),
        Value::Float(f) => CellValue::Float(f as f64),
        Value::Double(f) => CellValue::Float(f),
        Value::Text(s) => CellValue::Text(s),
        Value::Blob(bytes) => CellValue::Binary(bytes),
        Value::Date32(days) => CellValue::Date(days),
        Value::Timestamp(unit, raw) => CellValue::Timestamp(to_micros(unit, raw)),
        other => CellValue::Text(format!("{:?}", other)),
    }
}

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw * 1_000_000,
        TimeUnit::Millisecond => raw * 1_000,
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

/// Domain value -> engine value, for bound parameters.
pub fn cell_to_engine(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Boolean(b) => Value::Boolean(*b),
        CellValue::Integer(i) => Value::BigInt(*i),
        CellValue::Float(f) => Value::Double(*f),
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Timestamp(us) => Value::Timestamp(TimeUnit::Microsecond, *us),
        CellValue::Date(days) => Value::Date32(*days),
        CellValue::Binary(bytes) => Value::Blob(bytes.clone()),
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(cell_to_engine(self)))
    }
}

/// Double-quoted SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_scalars() {
        let cells = vec![
            CellValue::Null,
            CellValue::Boolean(true),
            CellValue::Integer(-42),
            CellValue::Float(2.5),
            CellValue::Text("hello".into()),
            CellValue::Timestamp(1_700_000_000_000_000),
            CellValue::Date(19_000),
            CellValue::Binary(vec![1, 2, 3]),
        ];
        for cell in cells {
            assert_eq!(cell_from_engine(cell_to_engine(&cell)), cell);
        }
    }

    #[test]
    fn test_timestamp_normalization() {
        assert_eq!(
            cell_from_engine(Value::Timestamp(TimeUnit::Millisecond, 1_000)),
            CellValue::Timestamp(1_000_000)
        );
        assert_eq!(
            cell_from_engine(Value::Timestamp(TimeUnit::Second, 2)),
            CellValue::Timestamp(2_000_000)
        );
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("students"), "\"students\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
