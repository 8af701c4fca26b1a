use rusqlite::Connection;

use crate::error::Result;

/// Initialise the taskwheel schema in `conn`.
///
/// Idempotent — `IF NOT EXISTS` throughout, safe to run on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL,
            description TEXT    NOT NULL DEFAULT '',
            recurrence  TEXT    NOT NULL,   -- five-field cron expression
            kind        TEXT    NOT NULL,   -- handler registry key
            owner       TEXT    NOT NULL,   -- opaque principal id
            status      TEXT    NOT NULL DEFAULT 'pending',
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,   -- RFC 3339 UTC
            updated_at  TEXT    NOT NULL    -- doubles as claim time while running
        ) STRICT;

        -- The tick's candidate query filters on (active, status).
        CREATE INDEX IF NOT EXISTS idx_jobs_eligible ON jobs (active, status);

        CREATE TABLE IF NOT EXISTS execution_log (
            id          TEXT NOT NULL PRIMARY KEY,  -- UUIDv7, time-sortable
            job_id      TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            outcome     TEXT NOT NULL,              -- 'success' | 'failure'
            detail      TEXT NOT NULL,
            executed_at TEXT NOT NULL
        ) STRICT;

        -- Newest-first per-job history, and the cron reference-instant lookup.
        CREATE INDEX IF NOT EXISTS idx_execution_log_job
            ON execution_log (job_id, executed_at DESC);

        CREATE TABLE IF NOT EXISTS periodic_schedules (
            job_id       TEXT    NOT NULL PRIMARY KEY
                                 REFERENCES jobs(id) ON DELETE CASCADE,
            minute       TEXT    NOT NULL,
            hour         TEXT    NOT NULL,
            day_of_month TEXT    NOT NULL,
            month        TEXT    NOT NULL,
            day_of_week  TEXT    NOT NULL,
            enabled      INTEGER NOT NULL DEFAULT 1,
            args         TEXT,               -- optional fixed-arguments JSON
            updated_at   TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS system_ops (
            id          TEXT NOT NULL PRIMARY KEY,  -- UUIDv7
            name        TEXT NOT NULL,
            status      TEXT NOT NULL,              -- 'running' | 'completed' | 'failed'
            result      TEXT,
            started_at  TEXT NOT NULL,
            finished_at TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_system_ops_started
            ON system_ops (started_at DESC);
        ",
    )?;
    Ok(())
}
