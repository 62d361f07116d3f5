//! Application state for CLI commands.

use std::path::PathBuf;

use anyhow::Context;
use gensx_infra::config::{apply_env_overrides, load_config, resolve_data_dir};
use gensx_infra::sqlite::checkpoint::SqliteCheckpointStore;
use gensx_infra::sqlite::pool::{DatabasePool, configured_database_url};
use gensx_types::config::GensxConfig;

/// Shared state: data directory, resolved configuration and the local
/// checkpoint store.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: GensxConfig,
    pub db_pool: DatabasePool,
    pub checkpoints: SqliteCheckpointStore,
}

impl AppState {
    /// Resolve the data directory, load configuration and open the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let mut config = load_config(&data_dir).await;
        apply_env_overrides(&mut config).context("Invalid GENSX_* environment variable")?;

        let db_url = configured_database_url(&config.storage, &data_dir);
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("Failed to open checkpoint database at {db_url}"))?;
        let checkpoints = SqliteCheckpointStore::new(db_pool.clone());

        Ok(Self {
            data_dir,
            config,
            db_pool,
            checkpoints,
        })
    }
}
