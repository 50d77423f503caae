use std::str::FromStr;

use chrono::{DateTime, Utc};
use outpost_core::time::{decode_instant, encode_instant};
use outpost_core::{ChangeKind, FilterKey, PendingChange, Task, TaskPatch};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::errors::{StoreError, StoreResult};
use crate::queries::Queries;

/// App-state keys.
pub mod state_keys {
    pub const ACTIVE_FILTER: &str = "active_filter";
    pub const SELECTED_TASK: &str = "selected_task";
    pub const TEMP_ID_COUNTER: &str = "temp_id_counter";
}

/// SQLite-backed persistence for everything that must survive a restart:
/// cache snapshots per filter, the pending-change queue, the active filter,
/// and the selection pointer.
pub struct ClientDatabase {
    pub pool: SqlitePool,
}

impl ClientDatabase {
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // One connection: the engine is a single logical writer, and it keeps
        // in-memory databases on a single backing store.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(Queries::SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    // ---- app state ----

    pub async fn get_state(&self, key: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query(Queries::GET_APP_STATE)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn set_state(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(Queries::SET_APP_STATE)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_state(&self, key: &str) -> StoreResult<()> {
        sqlx::query(Queries::CLEAR_APP_STATE)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Next value of the persisted temporary-id counter.
    pub async fn next_temp_seq(&self) -> StoreResult<i64> {
        let current = self
            .get_state(state_keys::TEMP_ID_COUNTER)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        self.set_state(state_keys::TEMP_ID_COUNTER, &next.to_string())
            .await?;
        Ok(next)
    }

    // ---- cache entries ----

    pub async fn save_cache_entry(
        &self,
        filter: FilterKey,
        snapshot: &[Task],
        fetched_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(Queries::UPSERT_CACHE_ENTRY)
            .bind(filter.to_string())
            .bind(serde_json::to_string(snapshot)?)
            .bind(encode_instant(fetched_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn load_cache_entries(
        &self,
    ) -> StoreResult<Vec<(FilterKey, Vec<Task>, DateTime<Utc>)>> {
        let rows = sqlx::query(Queries::LOAD_CACHE_ENTRIES)
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_key: String = row.get("filter_key");
            let Ok(filter) = raw_key.parse::<FilterKey>() else {
                tracing::warn!("dropping cache entry with unknown filter key '{raw_key}'");
                continue;
            };
            let snapshot: Vec<Task> = serde_json::from_str(row.get("snapshot"))?;
            let fetched_at = decode_instant(row.get("fetched_at"))?;
            entries.push((filter, snapshot, fetched_at));
        }
        Ok(entries)
    }

    // ---- pending-change queue ----

    pub async fn enqueue_change(
        &self,
        task_id: &str,
        kind: &ChangeKind,
        created_at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let payload = match kind {
            ChangeKind::Update(patch) => Some(serde_json::to_string(patch)?),
            ChangeKind::Delete => None,
        };
        let row = sqlx::query(Queries::INSERT_PENDING_CHANGE)
            .bind(task_id)
            .bind(kind.as_str())
            .bind(payload)
            .bind(encode_instant(created_at))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("seq"))
    }

    pub async fn load_pending_changes(&self) -> StoreResult<Vec<PendingChange>> {
        let rows = sqlx::query(Queries::LOAD_PENDING_CHANGES)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_pending_change).collect()
    }

    pub async fn load_failed_changes(&self) -> StoreResult<Vec<PendingChange>> {
        let rows = sqlx::query(Queries::LOAD_FAILED_CHANGES)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_pending_change).collect()
    }

    pub async fn count_pending_changes(&self) -> StoreResult<i64> {
        let row = sqlx::query(Queries::COUNT_PENDING_CHANGES)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    pub async fn remove_change(&self, seq: i64) -> StoreResult<()> {
        sqlx::query(Queries::DELETE_PENDING_CHANGE)
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_changes_for_task(&self, task_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(Queries::DELETE_CHANGES_FOR_TASK)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn increment_attempts(&self, seq: i64) -> StoreResult<()> {
        sqlx::query(Queries::INCREMENT_ATTEMPTS)
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_change_failed(&self, seq: i64) -> StoreResult<()> {
        sqlx::query(Queries::MARK_CHANGE_FAILED)
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn rewrite_task_id(&self, old_id: &str, new_id: &str) -> StoreResult<()> {
        sqlx::query(Queries::REWRITE_TASK_ID)
            .bind(old_id)
            .bind(new_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn parse_pending_change(row: &SqliteRow) -> StoreResult<PendingChange> {
        let seq: i64 = row.get("seq");
        let task_id: String = row.get("task_id");
        let kind_raw: String = row.get("kind");
        let payload: Option<String> = row.get("payload");
        let created_at = decode_instant(row.get("created_at"))?;
        let attempts: i64 = row.get("attempts");

        let kind = match kind_raw.as_str() {
            "update" => {
                let raw = payload.ok_or(StoreError::CorruptRow(seq))?;
                ChangeKind::Update(serde_json::from_str::<TaskPatch>(&raw)?)
            }
            "delete" => ChangeKind::Delete,
            _ => return Err(StoreError::CorruptRow(seq)),
        };

        Ok(PendingChange {
            seq,
            task_id,
            kind,
            created_at,
            attempts: attempts as u32,
        })
    }
}
