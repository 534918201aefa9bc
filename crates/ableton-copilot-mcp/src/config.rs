//! Server configuration and context wiring.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use ableton_copilot_kernel::perf::DEFAULT_SLOW_THRESHOLD;
use ableton_copilot_kernel::{AppContext, LiveBridge, SqliteRepository};

/// File name of the history database inside the data directory.
pub const DB_FILE_NAME: &str = "operation_history.db";

/// Directory name under the platform data dir.
pub const APP_DIR_NAME: &str = "ableton-copilot-mcp";

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub slow_threshold: Duration,
    /// Mark PENDING rows from a previous run as FAILED at startup.
    pub reconcile_pending: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".into(),
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            reconcile_pending: false,
        }
    }
}

/// `$XDG_DATA_HOME/ableton-copilot-mcp` or the platform equivalent; falls
/// back to the working directory when no home is known.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

impl ServerConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Open (creating if needed) the history database and build the
    /// application context around `live`.
    pub async fn build_context(&self, live: Arc<dyn LiveBridge>) -> Result<AppContext> {
        ensure_dir(&self.data_dir)?;
        let db_path = self.db_path();
        let repo = SqliteRepository::open(&db_path)
            .with_context(|| format!("failed to open history database at {}", db_path.display()))?;
        tracing::info!(path = %db_path.display(), "history database opened");

        let ctx = AppContext::new(live, Arc::new(repo), self.slow_threshold);
        if self.reconcile_pending {
            let settled = ctx.ledger.reconcile_pending().await?;
            tracing::info!(settled, "startup sweep of pending history rows done");
        }
        Ok(ctx)
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create data directory {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ableton_copilot_kernel::MemoryLive;
    use serde_json::json;

    #[test]
    fn test_paths() {
        let config = ServerConfig {
            data_dir: PathBuf::from("/var/lib/copilot"),
            ..Default::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/copilot/operation_history.db"));
        assert_eq!(config.log_dir(), PathBuf::from("/var/lib/copilot/logs"));
        assert_eq!(config.slow_threshold, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_build_context_creates_database_and_sweeps() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ServerConfig {
            data_dir: tmp.path().join("nested"),
            ..Default::default()
        };

        let ctx = config.build_context(Arc::new(MemoryLive::new())).await.unwrap();
        let id = ctx.ledger.begin("add_notes_to_clip", &json!({})).await.unwrap();
        drop(ctx);
        assert!(config.db_path().exists());

        config.reconcile_pending = true;
        let ctx = config.build_context(Arc::new(MemoryLive::new())).await.unwrap();
        let row = ctx.ledger.history(id).await.unwrap().unwrap();
        assert_eq!(row.status, ableton_copilot_types::OperationStatus::Failed);
    }
}
