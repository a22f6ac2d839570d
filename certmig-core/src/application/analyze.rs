// certmig-core/src/application/analyze.rs

use crate::application::SCHEMA_ANALYSIS_FILE;
use crate::domain::graph::{dependency, GraphSolver, SchemaAnalysis};
use crate::error::MigrationError;
use crate::infrastructure::fs;
use crate::ports::RelationalStore;
use std::path::Path;
use tracing::info;

/// Unions every store's catalog into the global dependency analysis.
/// The graph store contributes nothing here: edges are not foreign keys.
pub async fn analyze_stores(
    stores: &[&dyn RelationalStore],
) -> Result<SchemaAnalysis, MigrationError> {
    let mut tables = Vec::new();
    for store in stores {
        let mut introspected = store.introspect().await?;
        info!(store = store.store_id(), tables = introspected.len(), "introspected");
        tables.append(&mut introspected);
    }
    Ok(GraphSolver::analyze(&tables))
}

/// Persists `schema-analysis.json` plus the optional GraphViz rendering.
pub fn save_analysis(
    dir: &Path,
    analysis: &SchemaAnalysis,
    with_dot: bool,
) -> Result<(), MigrationError> {
    std::fs::create_dir_all(dir)?;
    fs::write_json(dir.join(SCHEMA_ANALYSIS_FILE), analysis)?;
    if with_dot {
        fs::atomic_write(
            dir.join("dependencies.dot"),
            dependency::to_dot(&analysis.dependency_graph),
        )?;
    }
    Ok(())
}

pub fn load_analysis(path: &Path) -> Result<SchemaAnalysis, MigrationError> {
    Ok(fs::read_json(path)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::DuckDbStore;
    use anyhow::Result;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_analyze_and_persist_round_trip() -> Result<()> {
        let store = DuckDbStore::open_in_memory("ids")?;
        {
            // Seed through the adapter's own engine handle
            let tables = store.introspect().await?;
            assert!(tables.is_empty());
        }

        let dir = tempdir()?;
        let analysis = analyze_stores(&[&store]).await?;
        save_analysis(dir.path(), &analysis, true)?;

        assert!(dir.path().join(SCHEMA_ANALYSIS_FILE).exists());
        assert!(dir.path().join("dependencies.dot").exists());

        let restored = load_analysis(&dir.path().join(SCHEMA_ANALYSIS_FILE))?;
        assert_eq!(restored.total_tables, analysis.total_tables);
        Ok(())
    }
}
