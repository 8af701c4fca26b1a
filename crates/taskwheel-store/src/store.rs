use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{
    ExecutionRecord, Job, JobStatus, OpStatus, PurgeCounts, ScheduleRecord, SystemOperation,
};

/// Thread-safe store for jobs, execution history, schedule mirrors and
/// system-operation trails.
///
/// Wraps a single SQLite connection in a `Mutex`. SQLite serialises writers,
/// which is exactly what the claim discipline needs: the conditional UPDATE
/// in [`claim`](JobStore::claim) is atomic per job, so concurrent evaluation
/// ticks settle their race inside the database.
pub struct JobStore {
    db: Mutex<Connection>,
}

impl JobStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    // --- jobs --------------------------------------------------------------

    /// Persist a new job row.
    pub fn insert_job(&self, job: &Job) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO jobs
             (id, name, description, recurrence, kind, owner, status, active,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                job.id,
                job.name,
                job.description,
                job.recurrence,
                job.kind,
                job.owner,
                job.status.as_str(),
                job.active,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a job by ID, `None` if absent.
    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{JOB_SELECT} WHERE id = ?1"),
            rusqlite::params![id],
            row_to_job,
        ) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// All jobs, oldest first.
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!("{JOB_SELECT} ORDER BY created_at"))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Rewrite a job's definition fields (name, description, recurrence,
    /// kind, active). Status is deliberately not written here — only the
    /// scheduler loop owns that column.
    pub fn update_job(&self, job: &Job) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs
             SET name = ?2, description = ?3, recurrence = ?4, kind = ?5,
                 active = ?6, updated_at = ?7
             WHERE id = ?1",
            rusqlite::params![
                job.id,
                job.name,
                job.description,
                job.recurrence,
                job.kind,
                job.active,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if n == 0 {
            return Err(StoreError::JobNotFound {
                id: job.id.clone(),
            });
        }
        Ok(())
    }

    /// Flip the active flag.
    pub fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs SET active = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, active, Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(StoreError::JobNotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// External status reset (completed → pending). Refuses to touch a
    /// `running` job — that transition belongs to the claim/finish pair.
    pub fn reset_status(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs SET status = 'pending', updated_at = ?2
             WHERE id = ?1 AND status != 'running'",
            rusqlite::params![id, Utc::now().to_rfc3339()],
        )?;
        if n == 0 {
            return Err(StoreError::JobNotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// Delete a job and its schedule mirror as one transaction.
    ///
    /// The mirror delete is idempotent; the job delete is not — a missing
    /// job is `JobNotFound`.
    pub fn delete_job(&self, id: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM periodic_schedules WHERE job_id = ?1",
            rusqlite::params![id],
        )?;
        let n = tx.execute("DELETE FROM jobs WHERE id = ?1", rusqlite::params![id])?;
        if n == 0 {
            // Roll back by dropping the transaction uncommitted.
            return Err(StoreError::JobNotFound { id: id.to_string() });
        }
        tx.commit()?;
        debug!(job_id = %id, "job deleted with schedule mirror");
        Ok(())
    }

    // --- tick support ------------------------------------------------------

    /// Jobs an evaluation tick should consider: active, and either at rest
    /// in an eligible status or stuck in `running` since before
    /// `stale_cutoff` (crashed claimant, reclaimable).
    pub fn due_candidates(&self, stale_cutoff: &DateTime<Utc>) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(&format!(
            "{JOB_SELECT}
             WHERE active = 1
               AND (status IN ('pending', 'failed')
                    OR (status = 'running' AND updated_at <= ?1))
             ORDER BY created_at"
        ))?;
        let jobs = stmt
            .query_map(
                rusqlite::params![stale_cutoff.to_rfc3339()],
                row_to_job,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// The reference instant for due-ness: most recent execution, if any.
    pub fn last_executed_at(&self, job_id: &str) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT executed_at FROM execution_log
             WHERE job_id = ?1 ORDER BY executed_at DESC LIMIT 1",
            rusqlite::params![job_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(s) => Ok(Some(parse_ts("execution_log", job_id, &s)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Claim a job for execution: one conditional UPDATE to `running`.
    ///
    /// Returns `true` iff this caller won the claim. Eligible prior states
    /// are `pending`, `failed`, and a `running` claim older than
    /// `stale_cutoff`. The row must also still carry `expected_updated_at`,
    /// the value read when the candidate was selected and its due-ness
    /// tested; any intervening write (including another evaluator's finish)
    /// invalidates that read and the claim fails. Exactly one of any number
    /// of concurrent claimants observes a row change.
    pub fn claim(
        &self,
        id: &str,
        now: &DateTime<Utc>,
        stale_cutoff: &DateTime<Utc>,
        expected_updated_at: &DateTime<Utc>,
    ) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs SET status = 'running', updated_at = ?2
             WHERE id = ?1
               AND active = 1
               AND updated_at = ?4
               AND (status IN ('pending', 'failed')
                    OR (status = 'running' AND updated_at <= ?3))",
            rusqlite::params![
                id,
                now.to_rfc3339(),
                stale_cutoff.to_rfc3339(),
                expected_updated_at.to_rfc3339(),
            ],
        )?;
        Ok(n == 1)
    }

    /// Claim for an ad-hoc trigger: any non-`running` status is eligible,
    /// as is a stale `running` claim, regardless of the active flag. Only
    /// a live claim refuses.
    pub fn claim_manual(
        &self,
        id: &str,
        now: &DateTime<Utc>,
        stale_cutoff: &DateTime<Utc>,
    ) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs SET status = 'running', updated_at = ?2
             WHERE id = ?1
               AND (status != 'running' OR updated_at <= ?3)",
            rusqlite::params![id, now.to_rfc3339(), stale_cutoff.to_rfc3339()],
        )?;
        Ok(n == 1)
    }

    /// Terminal transition: running → completed | failed.
    ///
    /// Returns `false` when the job was no longer `running` — e.g. a stale
    /// claim that another instance already reclaimed and finished.
    pub fn finish(&self, id: &str, status: JobStatus) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs SET status = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'running'",
            rusqlite::params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(n == 1)
    }

    // --- execution log -----------------------------------------------------

    /// Append one execution record. Append-only: there is no update path.
    pub fn append_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO execution_log (id, job_id, outcome, detail, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.id,
                record.job_id,
                record.outcome.as_str(),
                record.detail,
                record.executed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Execution history, newest first, optionally filtered to one job.
    pub fn list_executions(
        &self,
        job_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        let db = self.db.lock().unwrap();
        let records = match job_id {
            Some(job_id) => {
                let mut stmt = db.prepare_cached(
                    "SELECT id, job_id, outcome, detail, executed_at
                     FROM execution_log WHERE job_id = ?1
                     ORDER BY executed_at DESC, id DESC LIMIT ?2",
                )?;
                let records = stmt
                    .query_map(rusqlite::params![job_id, limit as i64], row_to_execution)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                records
            }
            None => {
                let mut stmt = db.prepare_cached(
                    "SELECT id, job_id, outcome, detail, executed_at
                     FROM execution_log
                     ORDER BY executed_at DESC, id DESC LIMIT ?1",
                )?;
                let records = stmt
                    .query_map(rusqlite::params![limit as i64], row_to_execution)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                records
            }
        };
        Ok(records)
    }

    // --- schedule mirror ---------------------------------------------------

    /// Create or replace the schedule mirror for a job (one row per job).
    pub fn upsert_schedule(&self, record: &ScheduleRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO periodic_schedules
             (job_id, minute, hour, day_of_month, month, day_of_week,
              enabled, args, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(job_id) DO UPDATE SET
                 minute = excluded.minute,
                 hour = excluded.hour,
                 day_of_month = excluded.day_of_month,
                 month = excluded.month,
                 day_of_week = excluded.day_of_week,
                 enabled = excluded.enabled,
                 args = excluded.args,
                 updated_at = excluded.updated_at",
            rusqlite::params![
                record.job_id,
                record.minute,
                record.hour,
                record.day_of_month,
                record.month,
                record.day_of_week,
                record.enabled,
                record.args,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch the schedule mirror for a job, `None` if absent.
    pub fn get_schedule(&self, job_id: &str) -> Result<Option<ScheduleRecord>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT job_id, minute, hour, day_of_month, month, day_of_week,
                    enabled, args, updated_at
             FROM periodic_schedules WHERE job_id = ?1",
            rusqlite::params![job_id],
            row_to_schedule,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Remove the schedule mirror. Idempotent — a missing row is fine.
    pub fn delete_schedule(&self, job_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM periodic_schedules WHERE job_id = ?1",
            rusqlite::params![job_id],
        )?;
        Ok(())
    }

    // --- system operations -------------------------------------------------

    /// Open a trail entry for a maintenance operation, status `running`.
    pub fn begin_system_op(&self, name: &str, now: &DateTime<Utc>) -> Result<SystemOperation> {
        let op = SystemOperation {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            status: OpStatus::Running,
            result: None,
            started_at: *now,
            finished_at: None,
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO system_ops (id, name, status, started_at)
             VALUES (?1, ?2, 'running', ?3)",
            rusqlite::params![op.id, op.name, op.started_at.to_rfc3339()],
        )?;
        Ok(op)
    }

    /// Close a trail entry with its terminal status and result text.
    pub fn finish_system_op(
        &self,
        id: &str,
        status: OpStatus,
        result: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE system_ops SET status = ?2, result = ?3, finished_at = ?4
             WHERE id = ?1",
            rusqlite::params![id, status.as_str(), result, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Maintenance-operation trail, newest first.
    pub fn list_system_ops(&self, limit: usize) -> Result<Vec<SystemOperation>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, status, result, started_at, finished_at
             FROM system_ops ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let ops = stmt
            .query_map(rusqlite::params![limit as i64], row_to_system_op)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ops)
    }

    /// Delete execution records and finished system-op entries older than
    /// `cutoff`. The only deletion path for either log.
    pub fn purge_older_than(&self, cutoff: &DateTime<Utc>) -> Result<PurgeCounts> {
        let cutoff = cutoff.to_rfc3339();
        let db = self.db.lock().unwrap();
        let executions = db.execute(
            "DELETE FROM execution_log WHERE executed_at < ?1",
            rusqlite::params![cutoff],
        )?;
        let system_ops = db.execute(
            "DELETE FROM system_ops WHERE status != 'running' AND started_at < ?1",
            rusqlite::params![cutoff],
        )?;
        Ok(PurgeCounts {
            executions,
            system_ops,
        })
    }
}

const JOB_SELECT: &str = "SELECT id, name, description, recurrence, kind, owner,
            status, active, created_at, updated_at FROM jobs";

// --- row mappers -----------------------------------------------------------

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        recurrence: row.get(3)?,
        kind: row.get(4)?,
        owner: row.get(5)?,
        status: parse_col(row, 6)?,
        active: row.get(7)?,
        created_at: ts_col(row, 8)?,
        updated_at: ts_col(row, 9)?,
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        outcome: parse_col(row, 2)?,
        detail: row.get(3)?,
        executed_at: ts_col(row, 4)?,
    })
}

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRecord> {
    Ok(ScheduleRecord {
        job_id: row.get(0)?,
        minute: row.get(1)?,
        hour: row.get(2)?,
        day_of_month: row.get(3)?,
        month: row.get(4)?,
        day_of_week: row.get(5)?,
        enabled: row.get(6)?,
        args: row.get(7)?,
        updated_at: ts_col(row, 8)?,
    })
}

fn row_to_system_op(row: &rusqlite::Row<'_>) -> rusqlite::Result<SystemOperation> {
    let finished_at = match row.get::<_, Option<String>>(5)? {
        Some(s) => Some(ts_from_str(5, &s)?),
        None => None,
    };
    Ok(SystemOperation {
        id: row.get(0)?,
        name: row.get(1)?,
        status: parse_col(row, 2)?,
        result: row.get(3)?,
        started_at: ts_col(row, 4)?,
        finished_at,
    })
}

/// Decode an enum column via its `FromStr` impl.
fn parse_col<T: std::str::FromStr<Err = String>>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    ts_from_str(idx, &s)
}

fn ts_from_str(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Decode a timestamp fetched outside a row mapper.
fn parse_ts(entity: &'static str, id: &str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            entity,
            id: id.to_string(),
            reason: e.to_string(),
        })
}
