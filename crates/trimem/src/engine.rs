//! Engine construction from the CLI configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use trimem_core::gateway::HttpGateway;
use trimem_sdk::{MemoryEngine, StoreSet};

use crate::config::Config;

/// Open the SQLite stores under the data dir and connect the HTTP gateway.
pub fn build_engine(config: &Config) -> Result<MemoryEngine> {
    let data_dir = &config.storage.data_dir;
    debug!(data_dir = %data_dir.display(), "Opening stores");

    let stores = StoreSet::sqlite_at(data_dir)
        .with_context(|| format!("Failed to open stores in {}", data_dir.display()))?;
    let gateway = HttpGateway::new(config.gateway.clone()).context("Failed to create gateway")?;

    MemoryEngine::new(config.engine.clone(), stores, Arc::new(gateway))
        .context("Failed to initialize memory engine")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trimem_sdk::engine::{EPISODES_DB, FACTS_DB, GRAPH_DB};

    #[test]
    fn test_build_engine_creates_stores() {
        let temp = tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = temp.path().join("memory");

        build_engine(&config).unwrap();

        for name in [FACTS_DB, EPISODES_DB, GRAPH_DB] {
            assert!(config.storage.data_dir.join(name).exists(), "{name} missing");
        }
    }

    #[test]
    fn test_build_engine_rejects_bad_config() {
        let temp = tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = temp.path().to_path_buf();
        config.engine.confidence_threshold = 1.5;

        assert!(build_engine(&config).is_err());
    }
}
