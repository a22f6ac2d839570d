// certmig-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

/// Error taxonomy of the pipeline. Serialized as the `error_type` field
/// of every stage's JSON error document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Schema,
    Filter,
    Data,
    PiiLeak,
    ValidationFailure,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Connection => "connection",
            Self::Schema => "schema",
            Self::Filter => "filter",
            Self::Data => "data",
            Self::PiiLeak => "pii_leak",
            Self::ValidationFailure => "validation_failure",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum MigrationError {
    // --- ERREURS DU DOMAINE (Graph, Rules, Validation) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- ERREURS D'INFRASTRUCTURE (IO, Engines, Config) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- ERREURS GÉNÉRIQUES / APPLICATIVES ---
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::Domain(e) => match e {
                DomainError::Schema(_) => ErrorKind::Schema,
                DomainError::FilterUnresolvable { .. } => ErrorKind::Filter,
                DomainError::Rule(_)
                | DomainError::NullOnForeignKey { .. }
                | DomainError::Predicate(_) => ErrorKind::Configuration,
                DomainError::PiiLeak { .. } => ErrorKind::PiiLeak,
                DomainError::ValidationFailed { .. } => ErrorKind::ValidationFailure,
                DomainError::Cancelled => ErrorKind::Cancelled,
            },
            MigrationError::Infrastructure(e) => match e {
                InfrastructureError::MissingCredential(_)
                | InfrastructureError::Config(_)
                | InfrastructureError::Yaml(_) => ErrorKind::Configuration,
                InfrastructureError::Connection { .. } => ErrorKind::Connection,
                InfrastructureError::Database(_) => ErrorKind::Data,
                InfrastructureError::Io(_)
                | InfrastructureError::Json(_)
                | InfrastructureError::Template(_) => ErrorKind::Internal,
            },
            MigrationError::InternalError(_) => ErrorKind::Internal,
        }
    }
}

// Manual implementation to avoid duplicate enum variant but keep ergonomics
impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        MigrationError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for MigrationError {
    fn from(err: duckdb::Error) -> Self {
        MigrationError::Infrastructure(err.into())
    }
}

impl From<neo4rs::Error> for MigrationError {
    fn from(err: neo4rs::Error) -> Self {
        MigrationError::Infrastructure(err.into())
    }
}
