//! Checkpoint sink selection.

use std::path::Path;

use gensx_core::checkpoint::{BoxCheckpointSink, NoopSink};
use gensx_types::config::{GensxConfig, SinkKind};
use gensx_types::error::SinkError;

use crate::http::HttpCheckpointSink;
use crate::sqlite::checkpoint::SqliteCheckpointStore;
use crate::sqlite::pool::{DatabasePool, configured_database_url};

/// Build the sink named by `[checkpoints] sink`.
///
/// Disabled checkpointing always yields a [`NoopSink`]. The SQLite sink
/// creates `data_dir` and runs migrations; the API sink needs an API key,
/// org and project.
pub async fn build_sink(config: &GensxConfig, data_dir: &Path) -> Result<BoxCheckpointSink, SinkError> {
    if !config.checkpoints.enabled {
        tracing::debug!("checkpoints disabled, snapshots are discarded");
        return Ok(BoxCheckpointSink::new(NoopSink));
    }

    match config.checkpoints.sink {
        SinkKind::None => Ok(BoxCheckpointSink::new(NoopSink)),
        SinkKind::Api => {
            let sink = HttpCheckpointSink::from_config(&config.api)?;
            tracing::debug!(base_url = %config.api.base_url, "checkpoints go to the hosted API");
            Ok(BoxCheckpointSink::new(sink))
        }
        SinkKind::Sqlite => {
            tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
                SinkError::Storage(format!("failed to create {}: {e}", data_dir.display()))
            })?;
            let url = configured_database_url(&config.storage, data_dir);
            let pool = DatabasePool::new(&url)
                .await
                .map_err(|e| SinkError::Storage(e.to_string()))?;
            Ok(BoxCheckpointSink::new(SqliteCheckpointStore::new(pool)))
        }
    }
}
