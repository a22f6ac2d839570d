// certmig-core/src/domain/validate/predicate.rs

use crate::domain::error::DomainError;
use crate::domain::value::{CellValue, Dataset};
use sqlparser::ast::{BinaryOperator, Expr, SetExpr, Statement, UnaryOperator, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// A compiled business-rule predicate.
///
/// The language is deliberately closed: column references, literals,
/// the comparison operators and AND/OR/NOT. The expression is parsed
/// with a real SQL parser and then interpreted over a whitelisted AST
/// subset — anything else (functions, subqueries, casts) is refused at
/// parse time, never evaluated.
pub struct Predicate {
    expr: Expr,
    source: String,
}

impl Predicate {
    pub fn parse(condition: &str) -> Result<Self, DomainError> {
        let dialect = GenericDialect {};
        let wrapped = format!("SELECT 1 WHERE {}", condition);
        let statements = Parser::parse_sql(&dialect, &wrapped)
            .map_err(|e| DomainError::Predicate(format!("'{}': {}", condition, e)))?;

        // A condition that smuggles in extra statements is a refusal,
        // not a partial evaluation.
        if statements.len() != 1 {
            return Err(DomainError::Predicate(format!(
                "'{}' contains more than one statement",
                condition
            )));
        }

        let expr = statements
            .into_iter()
            .find_map(|stmt| match stmt {
                Statement::Query(query) => match *query.body {
                    SetExpr::Select(select) => select.selection,
                    _ => None,
                },
                _ => None,
            })
            .ok_or_else(|| {
                DomainError::Predicate(format!("'{}' is not a boolean expression", condition))
            })?;

        let predicate = Self {
            expr,
            source: condition.to_string(),
        };
        // Surface a refusal at compile time rather than on row one
        predicate.check_allowed(&predicate.expr)?;
        Ok(predicate)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the row satisfies the predicate. Comparisons against
    /// null are false, SQL-style, so rows with missing operands fail
    /// the rule and show up in the count.
    pub fn evaluate(&self, dataset: &Dataset, row: &[CellValue]) -> Result<bool, DomainError> {
        self.eval_bool(&self.expr, dataset, row)
    }

    fn check_allowed(&self, expr: &Expr) -> Result<(), DomainError> {
        match expr {
            Expr::Identifier(_) | Expr::Value(_) => Ok(()),
            Expr::Nested(inner) => self.check_allowed(inner),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not | UnaryOperator::Minus => self.check_allowed(expr),
                other => Err(self.refuse(&format!("operator {:?}", other))),
            },
            Expr::BinaryOp { left, op, right } => {
                match op {
                    BinaryOperator::And
                    | BinaryOperator::Or
                    | BinaryOperator::Eq
                    | BinaryOperator::NotEq
                    | BinaryOperator::Lt
                    | BinaryOperator::LtEq
                    | BinaryOperator::Gt
                    | BinaryOperator::GtEq => {}
                    other => return Err(self.refuse(&format!("operator {:?}", other))),
                }
                self.check_allowed(left)?;
                self.check_allowed(right)
            }
            other => Err(self.refuse(&format!("construct {:?}", other))),
        }
    }

    fn refuse(&self, what: &str) -> DomainError {
        DomainError::Predicate(format!("'{}' uses forbidden {}", self.source, what))
    }

    fn eval_bool(
        &self,
        expr: &Expr,
        dataset: &Dataset,
        row: &[CellValue],
    ) -> Result<bool, DomainError> {
        match expr {
            Expr::Nested(inner) => self.eval_bool(inner, dataset, row),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(!self.eval_bool(expr, dataset, row)?),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And => Ok(self.eval_bool(left, dataset, row)?
                    && self.eval_bool(right, dataset, row)?),
                BinaryOperator::Or => Ok(self.eval_bool(left, dataset, row)?
                    || self.eval_bool(right, dataset, row)?),
                cmp => {
                    let lhs = self.eval_scalar(left, dataset, row)?;
                    let rhs = self.eval_scalar(right, dataset, row)?;
                    Ok(compare(&lhs, cmp, &rhs))
                }
            },
            other => Err(self.refuse(&format!("construct {:?}", other))),
        }
    }

    fn eval_scalar(
        &self,
        expr: &Expr,
        dataset: &Dataset,
        row: &[CellValue],
    ) -> Result<CellValue, DomainError> {
        match expr {
            Expr::Nested(inner) => self.eval_scalar(inner, dataset, row),
            Expr::Identifier(ident) => {
                let idx = dataset.column_index(&ident.value).ok_or_else(|| {
                    DomainError::Predicate(format!(
                        "'{}' references unknown column '{}'",
                        self.source, ident.value
                    ))
                })?;
                Ok(row.get(idx).cloned().unwrap_or(CellValue::Null))
            }
            Expr::Value(value) => literal(&value.value).ok_or_else(|| {
                self.refuse(&format!("literal {:?}", value.value))
            }),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match self.eval_scalar(expr, dataset, row)? {
                CellValue::Integer(i) => Ok(CellValue::Integer(-i)),
                CellValue::Float(f) => Ok(CellValue::Float(-f)),
                other => Err(self.refuse(&format!("negation of {:?}", other))),
            },
            other => Err(self.refuse(&format!("construct {:?}", other))),
        }
    }
}

fn literal(value: &Value) -> Option<CellValue> {
    match value {
        Value::Number(n, _) => n
            .parse::<i64>()
            .map(CellValue::Integer)
            .ok()
            .or_else(|| n.parse::<f64>().map(CellValue::Float).ok()),
        Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
            Some(CellValue::Text(s.clone()))
        }
        Value::Boolean(b) => Some(CellValue::Boolean(*b)),
        Value::Null => Some(CellValue::Null),
        _ => None,
    }
}

fn compare(lhs: &CellValue, op: &BinaryOperator, rhs: &CellValue) -> bool {
    if lhs.is_null() || rhs.is_null() {
        return false;
    }

    // Numeric comparison when both sides coerce, text otherwise
    let ordering = match (lhs.as_f64(), rhs.as_f64()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (lhs, rhs) {
            (CellValue::Text(l), CellValue::Text(r)) => Some(l.cmp(r)),
            (CellValue::Boolean(l), CellValue::Boolean(r)) => Some(l.cmp(r)),
            _ => None,
        },
    };

    let Some(ordering) = ordering else {
        return false;
    };

    match op {
        BinaryOperator::Eq => ordering.is_eq(),
        BinaryOperator::NotEq => !ordering.is_eq(),
        BinaryOperator::Lt => ordering.is_lt(),
        BinaryOperator::LtEq => ordering.is_le(),
        BinaryOperator::Gt => ordering.is_gt(),
        BinaryOperator::GtEq => ordering.is_ge(),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::catalog::{ColumnSpec, LogicalType};
    use anyhow::Result;

    fn students() -> Dataset {
        let mut ds = Dataset::new(vec![
            ColumnSpec {
                name: "age".into(),
                logical_type: LogicalType::Integer,
                nullable: true,
            },
            ColumnSpec {
                name: "status".into(),
                logical_type: LogicalType::Text,
                nullable: true,
            },
        ]);
        ds.rows = vec![
            vec![CellValue::Integer(10), CellValue::Text("active".into())],
            vec![CellValue::Integer(30), CellValue::Text("active".into())],
            vec![CellValue::Null, CellValue::Text("inactive".into())],
        ];
        ds
    }

    #[test]
    fn test_range_predicate() -> Result<()> {
        let ds = students();
        let p = Predicate::parse("age >= 5 AND age <= 22")?;

        assert!(p.evaluate(&ds, &ds.rows[0])?);
        assert!(!p.evaluate(&ds, &ds.rows[1])?);
        // Null operand -> comparison false -> row fails the rule
        assert!(!p.evaluate(&ds, &ds.rows[2])?);
        Ok(())
    }

    #[test]
    fn test_boolean_connectives() -> Result<()> {
        let ds = students();
        let p = Predicate::parse("status = 'active' OR (NOT age > 20)")?;
        assert!(p.evaluate(&ds, &ds.rows[0])?);
        assert!(p.evaluate(&ds, &ds.rows[1])?);
        assert!(!p.evaluate(&ds, &ds.rows[2])?);

        let p = Predicate::parse("status != 'active' AND age = -1")?;
        assert!(!p.evaluate(&ds, &ds.rows[0])?);
        Ok(())
    }

    #[test]
    fn test_function_calls_are_refused() {
        assert!(Predicate::parse("length(status) > 3").is_err());
        assert!(Predicate::parse("age IN (SELECT age FROM other)").is_err());
        assert!(Predicate::parse("age >= 5; DROP TABLE students").is_err());
    }

    #[test]
    fn test_unknown_column_is_an_error() -> Result<()> {
        let ds = students();
        let p = Predicate::parse("grade_level >= 1")?;
        assert!(p.evaluate(&ds, &ds.rows[0]).is_err());
        Ok(())
    }
}
