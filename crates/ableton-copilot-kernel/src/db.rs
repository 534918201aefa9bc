//! SQLite persistence for operation history and snapshots.
//!
//! Two tables: one row per tracked tool call, plus the prior-state
//! snapshots that hang off it. Snapshots cascade when their history row is
//! deleted; the kernel itself never deletes anything.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Row, params};
use std::path::Path;

use ableton_copilot_types::{HistoryId, OperationHistory, OperationStatus, Snapshot, SnapshotKind};

/// Database handle for the history store.
pub struct HistoryDb {
    conn: Connection,
}

const SCHEMA: &str = r#"
-- One row per tracked tool call (PENDING=0, SUCCESS=1, FAILED=2).
-- created_at is UTC; ids give the creation order.
CREATE TABLE IF NOT EXISTS operation_histories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tool_name VARCHAR(100) NOT NULL,
    input_params TEXT,
    execution_result TEXT,
    status INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_operation_histories_status ON operation_histories(status);
CREATE INDEX IF NOT EXISTS idx_operation_histories_tool_name ON operation_histories(tool_name);

-- Prior state captured before a tracked call mutates anything
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    history_id INTEGER NOT NULL,
    snapshot_data TEXT,
    snapshot_type VARCHAR(20) NOT NULL,
    created_at DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    FOREIGN KEY (history_id) REFERENCES operation_histories(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_snapshots_history_id ON snapshots(history_id);
"#;

const HISTORY_COLUMNS: &str =
    "id, tool_name, input_params, execution_result, status, created_at";

const SNAPSHOT_COLUMNS: &str = "id, history_id, snapshot_data, snapshot_type, created_at";

fn row_to_history(row: &Row<'_>) -> SqliteResult<OperationHistory> {
    let status_raw: i64 = row.get(4)?;
    let status = OperationStatus::from_i64(status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Integer,
            format!("unknown operation status {status_raw}").into(),
        )
    })?;
    Ok(OperationHistory {
        id: HistoryId(row.get(0)?),
        tool_name: row.get(1)?,
        input_params: row.get(2)?,
        execution_result: row.get(3)?,
        status,
        created_at: row.get(5)?,
    })
}

fn row_to_snapshot(row: &Row<'_>) -> SqliteResult<Snapshot> {
    let kind_raw: String = row.get(3)?;
    let snapshot_type = SnapshotKind::from_str(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown snapshot type {kind_raw}").into(),
        )
    })?;
    Ok(Snapshot {
        id: row.get(0)?,
        history_id: HistoryId(row.get(1)?),
        snapshot_data: row.get(2)?,
        snapshot_type,
        created_at: row.get(4)?,
    })
}

impl HistoryDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // =========================================================================
    // Operation history
    // =========================================================================

    /// Insert a PENDING row and return its id.
    pub fn insert_history(&self, tool_name: &str, input_params: Option<&str>) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO operation_histories (tool_name, input_params, status) VALUES (?1, ?2, ?3)",
            params![tool_name, input_params, OperationStatus::Pending.as_i64()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Apply a partial update. `None` fields keep their current value.
    ///
    /// When `expect` is set the row only changes if its status still matches,
    /// which makes the PENDING -> terminal transition a compare-and-set.
    /// Returns the number of rows changed.
    pub fn update_history(
        &self,
        id: i64,
        status: Option<OperationStatus>,
        execution_result: Option<&str>,
        expect: Option<OperationStatus>,
    ) -> SqliteResult<usize> {
        self.conn.execute(
            "UPDATE operation_histories
             SET status = COALESCE(?1, status),
                 execution_result = COALESCE(?2, execution_result)
             WHERE id = ?3 AND (?4 IS NULL OR status = ?4)",
            params![
                status.map(|s| s.as_i64()),
                execution_result,
                id,
                expect.map(|s| s.as_i64()),
            ],
        )
    }

    pub fn get_history(&self, id: i64) -> SqliteResult<Option<OperationHistory>> {
        self.conn
            .query_row(
                &format!("SELECT {HISTORY_COLUMNS} FROM operation_histories WHERE id = ?1"),
                params![id],
                row_to_history,
            )
            .optional()
    }

    /// Newest first, by id. Wall-clock timestamps can go backwards; ids cannot.
    pub fn list_histories(&self, limit: i64, offset: i64) -> SqliteResult<Vec<OperationHistory>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM operation_histories
             ORDER BY id DESC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], row_to_history)?;
        rows.collect()
    }

    pub fn count_histories(&self) -> SqliteResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM operation_histories", [], |row| row.get(0))
    }

    pub fn pending_history_ids(&self) -> SqliteResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM operation_histories WHERE status = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![OperationStatus::Pending.as_i64()], |row| row.get(0))?;
        rows.collect()
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn insert_snapshot(
        &self,
        history_id: i64,
        kind: SnapshotKind,
        data: Option<&str>,
    ) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO snapshots (history_id, snapshot_data, snapshot_type) VALUES (?1, ?2, ?3)",
            params![history_id, data, kind.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Earliest snapshot for a history row.
    pub fn snapshot_for_history(&self, history_id: i64) -> SqliteResult<Option<Snapshot>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
                     WHERE history_id = ?1 ORDER BY id ASC LIMIT 1"
                ),
                params![history_id],
                row_to_snapshot,
            )
            .optional()
    }

    #[cfg(test)]
    pub fn snapshots_for_history(&self, history_id: i64) -> SqliteResult<Vec<Snapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE history_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![history_id], row_to_snapshot)?;
        rows.collect()
    }

    /// Remove a history row. Its snapshots go with it.
    #[cfg(test)]
    pub fn delete_history(&self, id: i64) -> SqliteResult<usize> {
        self.conn
            .execute("DELETE FROM operation_histories WHERE id = ?1", params![id])
    }
}
