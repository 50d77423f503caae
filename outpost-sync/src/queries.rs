/// SQL for the client-side store. The `pending_changes.seq` AUTOINCREMENT
/// column is the queue's total order key; SQLite never reuses AUTOINCREMENT
/// values, so order survives process restarts.
pub struct Queries;

impl Queries {
    pub const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS app_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cache_entries (
            filter_key TEXT PRIMARY KEY,
            snapshot JSON NOT NULL,
            fetched_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pending_changes (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            payload JSON,
            created_at TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            CHECK (kind IN ('update', 'delete'))
        );

        CREATE INDEX IF NOT EXISTS idx_pending_changes_task ON pending_changes(task_id);
    "#;

    // App state (active filter, selection pointer, temp-id counter).
    pub const GET_APP_STATE: &'static str = "SELECT value FROM app_state WHERE key = ?1";

    pub const SET_APP_STATE: &'static str = r#"
        INSERT INTO app_state (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
    "#;

    pub const CLEAR_APP_STATE: &'static str = "DELETE FROM app_state WHERE key = ?1";

    // Cache entries. A put is always a full replacement for its filter key.
    pub const UPSERT_CACHE_ENTRY: &'static str = r#"
        INSERT INTO cache_entries (filter_key, snapshot, fetched_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(filter_key) DO UPDATE SET
            snapshot = excluded.snapshot,
            fetched_at = excluded.fetched_at
    "#;

    pub const LOAD_CACHE_ENTRIES: &'static str =
        "SELECT filter_key, snapshot, fetched_at FROM cache_entries";

    // Pending-change queue.
    pub const INSERT_PENDING_CHANGE: &'static str = r#"
        INSERT INTO pending_changes (task_id, kind, payload, created_at)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING seq
    "#;

    pub const LOAD_PENDING_CHANGES: &'static str = r#"
        SELECT seq, task_id, kind, payload, created_at, attempts
        FROM pending_changes
        WHERE failed = 0
        ORDER BY seq ASC
    "#;

    pub const LOAD_FAILED_CHANGES: &'static str = r#"
        SELECT seq, task_id, kind, payload, created_at, attempts
        FROM pending_changes
        WHERE failed = 1
        ORDER BY seq ASC
    "#;

    pub const COUNT_PENDING_CHANGES: &'static str =
        "SELECT COUNT(*) AS count FROM pending_changes WHERE failed = 0";

    pub const DELETE_PENDING_CHANGE: &'static str = "DELETE FROM pending_changes WHERE seq = ?1";

    pub const DELETE_CHANGES_FOR_TASK: &'static str =
        "DELETE FROM pending_changes WHERE task_id = ?1";

    pub const INCREMENT_ATTEMPTS: &'static str =
        "UPDATE pending_changes SET attempts = attempts + 1 WHERE seq = ?1";

    pub const MARK_CHANGE_FAILED: &'static str =
        "UPDATE pending_changes SET failed = 1 WHERE seq = ?1";

    pub const REWRITE_TASK_ID: &'static str =
        "UPDATE pending_changes SET task_id = ?2 WHERE task_id = ?1";
}
