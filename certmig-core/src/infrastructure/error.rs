// certmig-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("Relational Engine Error: {0}")]
    #[diagnostic(
        code(certmig::infra::database::relational),
        help("An error occurred inside the SQL engine.")
    )]
    Relational(#[from] duckdb::Error),

    #[error("Graph Engine Error: {0}")]
    #[diagnostic(
        code(certmig::infra::database::graph),
        help("An error occurred inside the Bolt driver.")
    )]
    Graph(#[from] neo4rs::Error),
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- DATABASE (Abstracted) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    #[error("Cannot reach store '{store}': {reason}")]
    #[diagnostic(code(certmig::infra::connection))]
    Connection { store: String, reason: String },

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(certmig::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(certmig::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(certmig::infra::json))]
    Json(#[from] serde_json::Error),

    #[error("Missing credential: {0} is not set")]
    #[diagnostic(
        code(certmig::infra::credential),
        help("Store credentials follow {{ROLE}}_{{STORE}}_{{HOST|PORT|DATABASE|USER|PASSWORD}}.")
    )]
    MissingCredential(String),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(certmig::infra::config))]
    Config(String),

    // --- TEMPLATING ---
    #[error("Template Rendering Error: {0}")]
    #[diagnostic(code(certmig::infra::template))]
    Template(#[from] minijinja::Error),
}

// Manual shortcuts so `?` works directly on engine calls
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::Relational(err))
    }
}

impl From<neo4rs::Error> for InfrastructureError {
    fn from(err: neo4rs::Error) -> Self {
        InfrastructureError::Database(DatabaseError::Graph(err))
    }
}
