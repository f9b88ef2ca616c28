use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::error::StoreError;
use crate::models::records::{Collection, SyncRecord, SyncStatus};

/// Per-status totals for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub synced: u64,
    pub failed: u64,
}

/// Durable on-device store for records awaiting synchronization.
///
/// Each collection lives in its own table keyed by the client-generated `id`,
/// with a secondary index on `sync_status`. The record body is stored as JSON
/// and never rewritten by status updates; the status column is authoritative.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StoreError::StorageUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Local store opened at {} (journal_mode={})", path.display(), mode);
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts or overwrites a record by id. Overwriting resets retry bookkeeping
    /// but keeps the original creation order.
    pub async fn put<R: SyncRecord>(&self, record: &R) -> Result<(), StoreError> {
        record.validate().map_err(|e| StoreError::InvalidRecord {
            collection: R::COLLECTION,
            reason: e.to_string(),
        })?;

        let id = record.id().to_string();
        let body = serde_json::to_string(record)?;
        let status = record.sync_status();
        let table = R::COLLECTION.table();

        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (id, body, sync_status, retry_count, last_error, updated_at)
                     VALUES (?1, ?2, ?3, 0, NULL, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        body = excluded.body,
                        sync_status = excluded.sync_status,
                        retry_count = 0,
                        last_error = NULL,
                        updated_at = excluded.updated_at"
                ),
                params![id, body, status.as_str(), now()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get<R: SyncRecord>(&self, id: &str) -> Result<Option<R>, StoreError> {
        let table = R::COLLECTION.table();
        let key = id.to_string();

        let row = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT id, body, sync_status FROM {table} WHERE id = ?1"),
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(decode::<R>).transpose()
    }

    /// All records still awaiting delivery (`pending` or `offline`), oldest first.
    pub async fn get_pending<R: SyncRecord>(&self) -> Result<Vec<R>, StoreError> {
        self.select_by_status::<R>(&[SyncStatus::Pending, SyncStatus::Offline])
            .await
    }

    /// Dead-letter bucket: records that exhausted their retry budget.
    pub async fn get_failed<R: SyncRecord>(&self) -> Result<Vec<R>, StoreError> {
        self.select_by_status::<R>(&[SyncStatus::Failed]).await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let table = collection.table();
        let key = id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    pub async fn mark_synced(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let table = collection.table();
        let key = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE {table} SET sync_status = ?2, last_error = NULL, updated_at = ?3
                     WHERE id = ?1"
                ),
                params![key, SyncStatus::Synced.as_str(), now()],
            )?;
            Ok(())
        })
        .await
    }

    /// Counts one more failed delivery. The record moves to `failed` once
    /// `max_attempts` failures have been recorded; otherwise it stays replayable.
    pub async fn record_failure(
        &self,
        collection: Collection,
        id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<SyncStatus, StoreError> {
        let table = collection.table();
        let key = id.to_string();
        let error = error.to_string();

        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let current: Option<(u32, String)> = tx
                .query_row(
                    &format!("SELECT retry_count, sync_status FROM {table} WHERE id = ?1"),
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((retry_count, raw_status)) = current else {
                return Err(StoreError::Corrupted {
                    collection,
                    id: key,
                    reason: "record vanished during sync".to_string(),
                });
            };

            let retry_count = retry_count.saturating_add(1);
            let status = if max_attempts > 0 && retry_count >= max_attempts {
                SyncStatus::Failed
            } else {
                raw_status
                    .parse::<SyncStatus>()
                    .unwrap_or(SyncStatus::Pending)
            };

            tx.execute(
                &format!(
                    "UPDATE {table}
                     SET retry_count = ?2, sync_status = ?3, last_error = ?4, updated_at = ?5
                     WHERE id = ?1"
                ),
                params![key, retry_count, status.as_str(), error, now()],
            )?;
            tx.commit()?;
            Ok(status)
        })
        .await
    }

    /// Moves a dead-lettered record back to `pending` with a fresh retry budget.
    pub async fn requeue(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let table = collection.table();
        let key = id.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE {table}
                     SET sync_status = ?2, retry_count = 0, last_error = NULL, updated_at = ?3
                     WHERE id = ?1 AND sync_status = ?4"
                ),
                params![
                    key,
                    SyncStatus::Pending.as_str(),
                    now(),
                    SyncStatus::Failed.as_str()
                ],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn retry_count(&self, collection: Collection, id: &str) -> Result<Option<u32>, StoreError> {
        let table = collection.table();
        let key = id.to_string();
        self.with_conn(move |conn| {
            let count = conn
                .query_row(
                    &format!("SELECT retry_count FROM {table} WHERE id = ?1"),
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count)
        })
        .await
    }

    pub async fn counts(&self, collection: Collection) -> Result<StatusCounts, StoreError> {
        let table = collection.table();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT sync_status, COUNT(*) FROM {table} GROUP BY sync_status"
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut counts = StatusCounts::default();
            for row in rows {
                let (status, n) = row?;
                let n = n.max(0) as u64;
                match status.parse::<SyncStatus>() {
                    Ok(SyncStatus::Synced) => counts.synced += n,
                    Ok(SyncStatus::Failed) => counts.failed += n,
                    Ok(SyncStatus::Pending) | Ok(SyncStatus::Offline) => counts.pending += n,
                    Err(e) => tracing::warn!("Skipping rows with {} in {}", e, table),
                }
            }
            Ok(counts)
        })
        .await
    }

    /// Saves an unsynced work-in-progress value (quiz answers, essay draft).
    pub async fn save_draft(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = serde_json::to_string(value)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO drafts (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_draft(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let key = key.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                let raw = conn
                    .query_row(
                        "SELECT value FROM drafts WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(raw)
            })
            .await?;

        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    pub async fn delete_draft(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM drafts WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn select_by_status<R: SyncRecord>(
        &self,
        statuses: &[SyncStatus],
    ) -> Result<Vec<R>, StoreError> {
        let table = R::COLLECTION.table();
        let wanted: Vec<&'static str> = statuses.iter().map(|s| s.as_str()).collect();

        let rows = self
            .with_conn(move |conn| {
                let placeholders = (1..=wanted.len())
                    .map(|i| format!("?{}", i))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, body, sync_status FROM {table}
                     WHERE sync_status IN ({placeholders})
                     ORDER BY created_seq ASC"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(wanted.iter()), |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<Result<Vec<(String, String, String)>, _>>()?;
                Ok(rows)
            })
            .await?;

        // A row that no longer decodes must not hide its siblings.
        let records = rows
            .into_iter()
            .filter_map(|row| match decode::<R>(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::error!("Skipping unreadable row: {}", e);
                    None
                }
            })
            .collect();
        Ok(records)
    }

    /// Runs a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::StorageUnavailable("local store lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::StorageUnavailable(format!("store task failed: {}", e)))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    for collection in Collection::ALL {
        let table = collection.table();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                created_seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                body TEXT NOT NULL,
                sync_status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_sync_status ON {table}(sync_status);"
        ))?;
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS drafts (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;

    Ok(())
}

fn decode<R: SyncRecord>((id, body, status): (String, String, String)) -> Result<R, StoreError> {
    let corrupted = |reason: String| StoreError::Corrupted {
        collection: R::COLLECTION,
        id: id.clone(),
        reason,
    };

    let mut record: R = serde_json::from_str(&body).map_err(|e| corrupted(e.to_string()))?;
    let status = status.parse::<SyncStatus>().map_err(corrupted)?;
    record.set_sync_status(status);
    Ok(record)
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::records::{QuizAttemptRecord, SubmissionRecord};
    use serde_json::json;

    fn submission(id: &str) -> SubmissionRecord {
        SubmissionRecord {
            id: id.to_string(),
            assignment_id: "a1".to_string(),
            student_id: "u1".to_string(),
            content: "hello".to_string(),
            file_url: None,
            submitted_at: "2024-01-01T00:00:00Z".to_string(),
            sync_status: SyncStatus::Pending,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_record() {
        let store = LocalStore::open_in_memory().unwrap();
        let record = submission("s1");

        store.put(&record).await.unwrap();

        let loaded = store.get::<SubmissionRecord>("s1").await.unwrap();
        assert_eq!(loaded, Some(record));
        assert!(store.get::<SubmissionRecord>("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&submission("shared")).await.unwrap();

        assert!(store.get::<QuizAttemptRecord>("shared").await.unwrap().is_none());
        assert!(store
            .get_pending::<QuizAttemptRecord>()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn pending_query_includes_offline_in_creation_order() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut offline = submission("s2");
        offline.sync_status = SyncStatus::Offline;
        let mut synced = submission("s3");
        synced.sync_status = SyncStatus::Synced;

        store.put(&submission("s1")).await.unwrap();
        store.put(&offline).await.unwrap();
        store.put(&synced).await.unwrap();
        store.put(&submission("s4")).await.unwrap();

        let ids: Vec<String> = store
            .get_pending::<SubmissionRecord>()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["s1", "s2", "s4"]);
    }

    #[tokio::test]
    async fn overwrite_keeps_creation_order() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&submission("s1")).await.unwrap();
        store.put(&submission("s2")).await.unwrap();

        let mut edited = submission("s1");
        edited.content = "edited".to_string();
        store.put(&edited).await.unwrap();

        let pending = store.get_pending::<SubmissionRecord>().await.unwrap();
        assert_eq!(pending[0].id, "s1");
        assert_eq!(pending[0].content, "edited");
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn put_rejects_missing_required_fields() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut record = submission("s1");
        record.student_id = String::new();

        let err = store.put(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
    }

    #[tokio::test]
    async fn put_rejects_non_finite_score() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut attempt =
            QuizAttemptRecord::new("quiz-1", "u1", vec![], 1.0, "2024-01-01T00:00:00Z");
        attempt.score = f64::NAN;

        let err = store.put(&attempt).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
        assert!(store
            .get_pending::<QuizAttemptRecord>()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unreadable_row_does_not_hide_siblings() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut good = QuizAttemptRecord::new("quiz-1", "u1", vec![], 1.0, "2024-01-01T00:00:00Z");
        good.id = "good".to_string();
        store.put(&good).await.unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO quiz_attempts (id, body, sync_status, updated_at)
                     VALUES ('bad', '{\"id\":\"bad\",\"score\":null}', 'pending', '2024-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let pending = store.get_pending::<QuizAttemptRecord>().await.unwrap();

        assert_eq!(
            pending.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["good"]
        );
    }

    #[tokio::test]
    async fn mark_synced_leaves_body_untouched() {
        let store = LocalStore::open_in_memory().unwrap();
        let record = QuizAttemptRecord {
            id: "q1".to_string(),
            quiz_id: "quiz".to_string(),
            student_id: "u1".to_string(),
            answers: vec![json!("b"), json!({"choice": 2})],
            score: 0.75,
            completed_at: "2024-01-01T00:00:00Z".to_string(),
            sync_status: SyncStatus::Pending,
        };
        store.put(&record).await.unwrap();

        store.mark_synced(Collection::QuizAttempts, "q1").await.unwrap();

        let mut loaded = store.get::<QuizAttemptRecord>("q1").await.unwrap().unwrap();
        assert_eq!(loaded.sync_status, SyncStatus::Synced);
        loaded.sync_status = SyncStatus::Pending;
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn failures_dead_letter_at_ceiling_and_requeue_resets() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&submission("s1")).await.unwrap();

        let first = store
            .record_failure(Collection::Submissions, "s1", "HTTP 500", 2)
            .await
            .unwrap();
        assert_eq!(first, SyncStatus::Pending);

        let second = store
            .record_failure(Collection::Submissions, "s1", "HTTP 500", 2)
            .await
            .unwrap();
        assert_eq!(second, SyncStatus::Failed);

        assert!(store.get_pending::<SubmissionRecord>().await.unwrap().is_empty());
        assert_eq!(store.get_failed::<SubmissionRecord>().await.unwrap().len(), 1);

        assert!(store.requeue(Collection::Submissions, "s1").await.unwrap());
        assert_eq!(
            store.retry_count(Collection::Submissions, "s1").await.unwrap(),
            Some(0)
        );
        assert_eq!(store.get_pending::<SubmissionRecord>().await.unwrap().len(), 1);

        // only failed records can be requeued
        assert!(!store.requeue(Collection::Submissions, "s1").await.unwrap());
    }

    #[tokio::test]
    async fn zero_ceiling_never_dead_letters() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&submission("s1")).await.unwrap();

        for _ in 0..10 {
            let status = store
                .record_failure(Collection::Submissions, "s1", "boom", 0)
                .await
                .unwrap();
            assert_eq!(status, SyncStatus::Pending);
        }
    }

    #[tokio::test]
    async fn counts_group_offline_with_pending() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut offline = submission("s2");
        offline.sync_status = SyncStatus::Offline;

        store.put(&submission("s1")).await.unwrap();
        store.put(&offline).await.unwrap();
        store.put(&submission("s3")).await.unwrap();
        store.mark_synced(Collection::Submissions, "s3").await.unwrap();

        let counts = store.counts(Collection::Submissions).await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 2,
                synced: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = LocalStore::open_in_memory().unwrap();
        store.put(&submission("s1")).await.unwrap();

        assert!(store.delete(Collection::Submissions, "s1").await.unwrap());
        assert!(!store.delete(Collection::Submissions, "s1").await.unwrap());
        assert!(store.get::<SubmissionRecord>("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn drafts_save_load_delete() {
        let store = LocalStore::open_in_memory().unwrap();
        let draft = json!({"quizId": "quiz-1", "answers": ["a", null]});

        store.save_draft("quiz-1:u1", &draft).await.unwrap();
        assert_eq!(store.load_draft("quiz-1:u1").await.unwrap(), Some(draft));

        assert!(store.delete_draft("quiz-1:u1").await.unwrap());
        assert_eq!(store.load_draft("quiz-1:u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");

        {
            let store = LocalStore::open(&path).unwrap();
            store.put(&submission("s1")).await.unwrap();
        }

        let reopened = LocalStore::open(&path).unwrap();
        let pending = reopened.get_pending::<SubmissionRecord>().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "s1");
    }

    #[test]
    fn open_fails_for_unreachable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("offline.db");

        assert!(matches!(
            LocalStore::open(&path),
            Err(StoreError::StorageUnavailable(_))
        ));
    }
}
