// certmig-core/src/infrastructure/config/mod.rs

// Credentials and run topology come from the process environment, read
// once at phase start and immutable afterwards.

use crate::domain::catalog::StoreRole;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::DEFAULT_TRAVERSAL_DEPTH;
use serde::{Deserialize, Serialize};
use std::env;

pub const SALT_VAR: &str = "ANONYMIZATION_SALT";

/// Connection parameters of one relational store, resolved from
/// `{ROLE}_{STORE}_{HOST|PORT|DATABASE|USER|PASSWORD}`. The embedded
/// engine interprets `DATABASE` as the database file path; host, port
/// and user ride along as descriptor metadata for engines that dial out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalEndpoint {
    pub store: String,
    pub role: StoreRole,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl RelationalEndpoint {
    pub fn from_env(role: StoreRole, store: &str) -> Result<Self, InfrastructureError> {
        let prefix = format!("{}_{}", role.env_prefix(), store.to_uppercase());
        let lower = store.to_lowercase();

        let password = env::var(format!("{}_PASSWORD", prefix)).map_err(|_| {
            InfrastructureError::MissingCredential(format!("{}_PASSWORD", prefix))
        })?;

        let port = match env::var(format!("{}_PORT", prefix)) {
            Ok(raw) => raw.parse::<u16>().map_err(|_| {
                InfrastructureError::Config(format!("{}_PORT is not a port number", prefix))
            })?,
            Err(_) => 5432,
        };

        Ok(Self {
            host: env::var(format!("{}_HOST", prefix)).unwrap_or_else(|_| {
                format!("{}-{}-rds.amazonaws.com", role.env_prefix().to_lowercase(), lower)
            }),
            port,
            database: env::var(format!("{}_DATABASE", prefix))
                .unwrap_or_else(|_| format!("{}_db", lower)),
            user: env::var(format!("{}_USER", prefix)).unwrap_or_else(|_| match role {
                StoreRole::Source => "readonly_user".to_string(),
                StoreRole::Target => "admin_user".to_string(),
            }),
            password,
            store: lower,
            role,
        })
    }
}

/// Bolt connection parameters, from `NEO4J_{PROD|CERT}_{URI|USER|PASSWORD}`.
#[derive(Debug, Clone)]
pub struct GraphEndpoint {
    pub role: StoreRole,
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl GraphEndpoint {
    pub fn from_env(role: StoreRole) -> Result<Self, InfrastructureError> {
        let prefix = format!("NEO4J_{}", role.env_prefix());

        let password = env::var(format!("{}_PASSWORD", prefix)).map_err(|_| {
            InfrastructureError::MissingCredential(format!("{}_PASSWORD", prefix))
        })?;

        Ok(Self {
            uri: env::var(format!("{}_URI", prefix)).unwrap_or_else(|_| match role {
                StoreRole::Source => "bolt://prod-graph-db.amazonaws.com:7687".to_string(),
                StoreRole::Target => "bolt://cert-graph-db.amazonaws.com:7687".to_string(),
            }),
            user: env::var(format!("{}_USER", prefix)).unwrap_or_else(|_| match role {
                StoreRole::Source => "readonly".to_string(),
                StoreRole::Target => "admin".to_string(),
            }),
            password,
            role,
        })
    }
}

/// The process-wide anonymization secret. Absence is a fatal
/// configuration error at phase start, checked before any file is read.
pub fn anonymization_salt() -> Result<String, InfrastructureError> {
    env::var(SALT_VAR)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| InfrastructureError::MissingCredential(SALT_VAR.to_string()))
}

/// Which stores take part in a run. Defaults mirror the production
/// topology: four relational stores and one property graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreTopology {
    pub relational: Vec<String>,
    pub graph: Vec<String>,
    /// Bounded traversal depth for the graph extraction.
    pub graph_traversal_depth: u32,
}

impl Default for StoreTopology {
    fn default() -> Self {
        Self {
            relational: vec!["ids".into(), "hcp1".into(), "hcp2".into(), "adb".into()],
            graph: vec!["sp".into()],
            graph_traversal_depth: DEFAULT_TRAVERSAL_DEPTH,
        }
    }
}

impl StoreTopology {
    pub fn is_graph(&self, store: &str) -> bool {
        self.graph.iter().any(|s| s == store)
    }

    /// Reverse store order for rollback: graph first, then the
    /// relational stores back to front.
    pub fn rollback_order(&self) -> Vec<String> {
        self.graph
            .iter()
            .rev()
            .chain(self.relational.iter().rev())
            .cloned()
            .collect()
    }
}

/// Serializes tests that mutate process-wide environment variables.
#[cfg(test)]
pub(crate) static ENV_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep each one self-contained
    // with unique variable names.

    #[test]
    fn test_relational_endpoint_requires_password() {
        env::remove_var("PROD_ZZZ_PASSWORD");
        let err = RelationalEndpoint::from_env(StoreRole::Source, "zzz").unwrap_err();
        assert!(matches!(err, InfrastructureError::MissingCredential(_)));
    }

    #[test]
    fn test_relational_endpoint_defaults() {
        env::set_var("PROD_QQQ_PASSWORD", "s3cret");
        let ep = RelationalEndpoint::from_env(StoreRole::Source, "qqq").unwrap();
        assert_eq!(ep.host, "prod-qqq-rds.amazonaws.com");
        assert_eq!(ep.port, 5432);
        assert_eq!(ep.database, "qqq_db");
        assert_eq!(ep.user, "readonly_user");
        env::remove_var("PROD_QQQ_PASSWORD");
    }

    #[test]
    fn test_topology_rollback_order() {
        let topo = StoreTopology::default();
        assert_eq!(topo.rollback_order(), vec!["sp", "adb", "hcp2", "hcp1", "ids"]);
        assert!(topo.is_graph("sp"));
        assert!(!topo.is_graph("ids"));
    }
}
