use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use taskwheel_store::{
    ExecutionRecord, Job, JobStatus, JobStore, OpStatus, PurgeCounts, SystemOperation,
};

use crate::error::{EngineError, Result};
use crate::registry::HandlerRegistry;
use crate::sync::ScheduleSync;

/// Fields for a new job registration.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub description: String,
    pub recurrence: String,
    pub kind: String,
    pub owner: String,
}

/// Partial update: `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub recurrence: Option<String>,
    pub kind: Option<String>,
    pub active: Option<bool>,
}

/// The job lifecycle facade the surrounding application calls.
///
/// All validation happens here, before any write: a malformed recurrence,
/// an unregistered kind or an empty name is rejected with nothing
/// persisted. Every write that changes recurrence or the active flag
/// re-syncs the schedule mirror through [`ScheduleSync`].
pub struct JobService {
    store: Arc<JobStore>,
    registry: Arc<HandlerRegistry>,
    sync: ScheduleSync,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, registry: Arc<HandlerRegistry>) -> Self {
        let sync = ScheduleSync::new(Arc::clone(&store));
        Self {
            store,
            registry,
            sync,
        }
    }

    /// Register a new job. Starts `pending`, `active`, with its creation
    /// time as the cron reference instant until it first executes.
    #[instrument(skip(self, new), fields(name = %new.name, kind = %new.kind))]
    pub fn create_job(&self, new: NewJob) -> Result<Job> {
        if new.name.trim().is_empty() {
            return Err(EngineError::Validation("job name must not be empty".into()));
        }
        ScheduleSync::validate(&new.recurrence)?;
        self.ensure_known_kind(&new.kind)?;

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            recurrence: new.recurrence,
            kind: new.kind,
            owner: new.owner,
            status: JobStatus::Pending,
            active: true,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_job(&job)?;
        self.sync.apply(&job)?;
        info!(job_id = %job.id, recurrence = %job.recurrence, "job created");
        Ok(job)
    }

    /// Apply a partial update, re-validating any changed recurrence or
    /// kind, and re-sync the mirror.
    #[instrument(skip(self, update), fields(job_id = %id))]
    pub fn update_job(&self, id: &str, update: JobUpdate) -> Result<Job> {
        if let Some(recurrence) = &update.recurrence {
            ScheduleSync::validate(recurrence)?;
        }
        if let Some(kind) = &update.kind {
            self.ensure_known_kind(kind)?;
        }
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(EngineError::Validation("job name must not be empty".into()));
            }
        }

        let mut job = self.get_job(id)?;
        if let Some(name) = update.name {
            job.name = name;
        }
        if let Some(description) = update.description {
            job.description = description;
        }
        if let Some(recurrence) = update.recurrence {
            job.recurrence = recurrence;
        }
        if let Some(kind) = update.kind {
            job.kind = kind;
        }
        if let Some(active) = update.active {
            job.active = active;
        }

        self.store.update_job(&job)?;
        self.sync.apply(&job)?;
        info!(job_id = %id, "job updated");
        self.get_job(id)
    }

    /// Delete a job. Its schedule mirror goes in the same transaction;
    /// execution history cascades with the row.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn delete_job(&self, id: &str) -> Result<()> {
        self.store.delete_job(id)?;
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    /// Flip the active flag and propagate it to the mirror's `enabled`.
    /// An inactive job is never selected, regardless of due-ness.
    #[instrument(skip(self), fields(job_id = %id, active))]
    pub fn set_active(&self, id: &str, active: bool) -> Result<Job> {
        self.store.set_active(id, active)?;
        let job = self.get_job(id)?;
        self.sync.apply(&job)?;
        info!(job_id = %id, active, "job active flag changed");
        Ok(job)
    }

    /// External reset: put a `completed` (or `failed`) job back to
    /// `pending`. The core never does this on its own — a completed job
    /// rests until the controlling application decides it should recur.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn reset_job(&self, id: &str) -> Result<Job> {
        self.store.reset_status(id)?;
        self.get_job(id)
    }

    pub fn get_job(&self, id: &str) -> Result<Job> {
        self.store
            .get_job(id)?
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(self.store.list_jobs()?)
    }

    /// Execution history, newest first, optionally for a single job.
    pub fn list_executions(
        &self,
        job_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        Ok(self.store.list_executions(job_id, limit)?)
    }

    /// Maintenance-operation trail, newest first.
    pub fn list_system_ops(&self, limit: usize) -> Result<Vec<SystemOperation>> {
        Ok(self.store.list_system_ops(limit)?)
    }

    /// Purge execution and system-op history older than `retention`.
    /// Explicitly invoked housekeeping — never run inside a tick. The
    /// purge records itself in the system-op trail.
    #[instrument(skip(self))]
    pub fn purge_older_than(&self, retention: Duration) -> Result<PurgeCounts> {
        let now = Utc::now();
        let cutoff: DateTime<Utc> = now - retention;
        let op = self.store.begin_system_op("purge_history", &now)?;

        match self.store.purge_older_than(&cutoff) {
            Ok(counts) => {
                let summary = format!(
                    "purged {} execution records, {} system ops",
                    counts.executions, counts.system_ops
                );
                self.store
                    .finish_system_op(&op.id, OpStatus::Completed, &summary)?;
                info!(
                    executions = counts.executions,
                    system_ops = counts.system_ops,
                    "history purged"
                );
                Ok(counts)
            }
            Err(e) => {
                self.store
                    .finish_system_op(&op.id, OpStatus::Failed, &e.to_string())?;
                Err(e.into())
            }
        }
    }

    fn ensure_known_kind(&self, kind: &str) -> Result<()> {
        if !self.registry.contains(kind) {
            return Err(EngineError::Validation(format!(
                "unknown job kind '{kind}' (registered: {})",
                self.registry.kinds().join(", ")
            )));
        }
        Ok(())
    }
}
