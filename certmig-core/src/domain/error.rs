// certmig-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Schema Error: {0}")]
    #[diagnostic(code(certmig::domain::schema))]
    Schema(String),

    #[error("No tenant path for table '{table}'")]
    #[diagnostic(
        code(certmig::domain::filter),
        help("The table has no filter column and no FK chain reaches one.")
    )]
    FilterUnresolvable { table: String },

    #[error("Anonymization rule error: {0}")]
    #[diagnostic(code(certmig::domain::rule))]
    Rule(String),

    #[error("Rule '{rule}' nullifies FK column '{column}'")]
    #[diagnostic(
        code(certmig::domain::rule_fk_null),
        help("FK columns must keep a deterministic strategy (hash, token, synthetic or passthrough).")
    )]
    NullOnForeignKey { column: String, rule: String },

    #[error("Predicate rejected: {0}")]
    #[diagnostic(
        code(certmig::domain::predicate),
        help("Business-rule predicates allow only column refs, literals, comparisons and AND/OR/NOT.")
    )]
    Predicate(String),

    #[error("PII leak detected in {} field(s): {}", fields.len(), fields.join(", "))]
    #[diagnostic(code(certmig::domain::pii_leak))]
    PiiLeak { fields: Vec<String> },

    #[error("Validation failed with {errors} error(s)")]
    #[diagnostic(code(certmig::domain::validation))]
    ValidationFailed { errors: usize },

    #[error("Run cancelled")]
    #[diagnostic(code(certmig::domain::cancelled))]
    Cancelled,
}
