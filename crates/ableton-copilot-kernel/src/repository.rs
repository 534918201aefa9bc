//! Repository port over the history store.
//!
//! The ledger, rollback engine and history tools only see
//! [`HistoryRepository`]. [`SqliteRepository`] is the production adapter.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use ableton_copilot_types::{HistoryId, OperationHistory, OperationStatus, Snapshot, SnapshotKind};

use crate::db::HistoryDb;
use crate::error::{KernelError, KernelResult};

/// Shared handle to the SQLite history database.
pub type DbHandle = Arc<Mutex<HistoryDb>>;

/// Fields for a new history row. Status is always PENDING.
#[derive(Debug, Clone)]
pub struct NewHistory {
    pub tool_name: String,
    pub input_params: Option<String>,
}

/// Partial update of a history row.
#[derive(Debug, Clone, Default)]
pub struct HistoryUpdate {
    pub status: Option<OperationStatus>,
    pub execution_result: Option<String>,
    /// Only apply when the row currently has this status.
    pub expect_status: Option<OperationStatus>,
}

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub history_id: HistoryId,
    pub kind: SnapshotKind,
    pub data: Option<String>,
}

/// Persistence contract consumed by the kernel.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn create_history(&self, record: NewHistory) -> KernelResult<HistoryId>;

    /// Apply `update`. A missing row is logged and reported as `Ok(false)`.
    async fn update_history(&self, id: HistoryId, update: HistoryUpdate) -> KernelResult<bool>;

    async fn get_history_by_id(&self, id: HistoryId) -> KernelResult<Option<OperationHistory>>;

    /// Newest first, `skip = (page - 1) * page_size`. Both must be at least 1.
    async fn get_history_page(&self, page: u32, page_size: u32) -> KernelResult<Vec<OperationHistory>>;

    async fn count_histories(&self) -> KernelResult<u64>;

    async fn pending_history_ids(&self) -> KernelResult<Vec<HistoryId>>;

    async fn create_snapshot(&self, record: NewSnapshot) -> KernelResult<i64>;

    /// Earliest snapshot linked to the history row, if any.
    async fn get_snapshot_by_history_id(&self, id: HistoryId) -> KernelResult<Option<Snapshot>>;
}

pub(crate) fn check_page(page: u32, page_size: u32) -> KernelResult<(i64, i64)> {
    if page < 1 {
        return Err(KernelError::invalid_argument(format!("page must be >= 1, got {page}")));
    }
    if page_size < 1 {
        return Err(KernelError::invalid_argument(format!(
            "page_size must be >= 1, got {page_size}"
        )));
    }
    let limit = i64::from(page_size);
    let offset = (i64::from(page) - 1) * limit;
    Ok((limit, offset))
}

/// [`HistoryRepository`] backed by SQLite.
#[derive(Clone)]
pub struct SqliteRepository {
    db: DbHandle,
}

impl SqliteRepository {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> KernelResult<Self> {
        Ok(Self::new(Arc::new(Mutex::new(HistoryDb::open(path)?))))
    }

    /// Create an in-memory repository (for testing).
    pub fn in_memory() -> KernelResult<Self> {
        Ok(Self::new(Arc::new(Mutex::new(HistoryDb::in_memory()?))))
    }

    fn lock(&self) -> KernelResult<MutexGuard<'_, HistoryDb>> {
        self.db
            .lock()
            .map_err(|_| KernelError::Persistence("failed to acquire history db lock".into()))
    }
}

#[async_trait]
impl HistoryRepository for SqliteRepository {
    async fn create_history(&self, record: NewHistory) -> KernelResult<HistoryId> {
        let db = self.lock()?;
        let id = db.insert_history(&record.tool_name, record.input_params.as_deref())?;
        Ok(HistoryId(id))
    }

    async fn update_history(&self, id: HistoryId, update: HistoryUpdate) -> KernelResult<bool> {
        let db = self.lock()?;
        let changed = db.update_history(
            id.get(),
            update.status,
            update.execution_result.as_deref(),
            update.expect_status,
        )?;
        if changed > 0 {
            return Ok(true);
        }
        if db.get_history(id.get())?.is_none() {
            tracing::warn!(history_id = %id, "update skipped: no operation history with this id");
        }
        Ok(false)
    }

    async fn get_history_by_id(&self, id: HistoryId) -> KernelResult<Option<OperationHistory>> {
        Ok(self.lock()?.get_history(id.get())?)
    }

    async fn get_history_page(&self, page: u32, page_size: u32) -> KernelResult<Vec<OperationHistory>> {
        let (limit, offset) = check_page(page, page_size)?;
        Ok(self.lock()?.list_histories(limit, offset)?)
    }

    async fn count_histories(&self) -> KernelResult<u64> {
        let count = self.lock()?.count_histories()?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn pending_history_ids(&self) -> KernelResult<Vec<HistoryId>> {
        let ids = self.lock()?.pending_history_ids()?;
        Ok(ids.into_iter().map(HistoryId).collect())
    }

    async fn create_snapshot(&self, record: NewSnapshot) -> KernelResult<i64> {
        let db = self.lock()?;
        Ok(db.insert_snapshot(record.history_id.get(), record.kind, record.data.as_deref())?)
    }

    async fn get_snapshot_by_history_id(&self, id: HistoryId) -> KernelResult<Option<Snapshot>> {
        Ok(self.lock()?.snapshot_for_history(id.get())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_history(name: &str) -> NewHistory {
        NewHistory {
            tool_name: name.to_string(),
            input_params: None,
        }
    }

    #[tokio::test]
    async fn test_page_two_skips_first_page() {
        let repo = SqliteRepository::in_memory().unwrap();
        for i in 0..25 {
            repo.create_history(new_history(&format!("t{i}"))).await.unwrap();
        }
        let page = repo.get_history_page(2, 10).await.unwrap();
        assert_eq!(page.len(), 10);
        // Ranked 11..=20 newest first: t14 down to t5.
        assert_eq!(page.first().unwrap().tool_name, "t14");
        assert_eq!(page.last().unwrap().tool_name, "t5");
    }

    #[tokio::test]
    async fn test_page_below_one_is_invalid() {
        let repo = SqliteRepository::in_memory().unwrap();
        let err = repo.get_history_page(0, 10).await.unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
        let err = repo.get_history_page(1, 0).await.unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_an_error() {
        let repo = SqliteRepository::in_memory().unwrap();
        let changed = repo
            .update_history(
                HistoryId(12345),
                HistoryUpdate {
                    status: Some(OperationStatus::Success),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_port() {
        let repo = SqliteRepository::in_memory().unwrap();
        let hid = repo.create_history(new_history("remove_notes")).await.unwrap();
        repo.create_snapshot(NewSnapshot {
            history_id: hid,
            kind: SnapshotKind::Note,
            data: Some("{\"clip_id\":\"1\",\"notes\":[]}".into()),
        })
        .await
        .unwrap();

        let snap = repo.get_snapshot_by_history_id(hid).await.unwrap().unwrap();
        assert_eq!(snap.history_id, hid);
        assert_eq!(snap.snapshot_type, SnapshotKind::Note);
        assert!(repo.get_snapshot_by_history_id(HistoryId(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dangling_snapshot_is_persistence_error() {
        let repo = SqliteRepository::in_memory().unwrap();
        let err = repo
            .create_snapshot(NewSnapshot {
                history_id: HistoryId(77),
                kind: SnapshotKind::Note,
                data: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::Persistence(_)));
    }
}
