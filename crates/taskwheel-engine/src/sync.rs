use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use taskwheel_cron::CronExpr;
use taskwheel_store::{Job, JobStore, ScheduleRecord};

use crate::error::{EngineError, Result};

/// Sole owner of the `periodic_schedules` mirror rows.
///
/// Keeps the external periodic-schedule representation aligned with each
/// job's recurrence and active flag. Invoked explicitly from the same job
/// lifecycle operations that mutate the job — not from a persistence hook —
/// so the relationship is visible in the call graph. The scheduler loop
/// never reads these rows; a synchronizer failure can degrade the external
/// housekeeping view but never block scheduling.
pub struct ScheduleSync {
    store: Arc<JobStore>,
}

impl ScheduleSync {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Validate a recurrence without touching the store. Used by the
    /// service before any write so a malformed expression leaves no
    /// partial state.
    pub fn validate(recurrence: &str) -> Result<()> {
        CronExpr::parse(recurrence)
            .map(|_| ())
            .map_err(|e| EngineError::Validation(e.to_string()))
    }

    /// Create or update the mirror row for `job` in place. One row per
    /// job — repeated calls never create duplicates.
    pub fn apply(&self, job: &Job) -> Result<()> {
        let record = mirror_of(job)?;
        self.store.upsert_schedule(&record)?;
        debug!(job_id = %job.id, enabled = record.enabled, "schedule mirror synced");
        Ok(())
    }

    /// Remove the mirror row. Idempotent: deleting an absent row is fine.
    /// (Job deletion itself cascades the row in the same transaction; this
    /// path exists for callers that detach a mirror without deleting the
    /// job.)
    pub fn remove(&self, job_id: &str) -> Result<()> {
        self.store.delete_schedule(job_id)?;
        Ok(())
    }
}

/// Split a validated recurrence into the structured five-field form the
/// external facility understands, with `enabled` tracking `Job::active`
/// and the job id as the fixed argument.
fn mirror_of(job: &Job) -> Result<ScheduleRecord> {
    ScheduleSync::validate(&job.recurrence)?;
    let fields: Vec<&str> = job.recurrence.split_whitespace().collect();
    // validate() guarantees exactly five fields.
    Ok(ScheduleRecord {
        job_id: job.id.clone(),
        minute: fields[0].to_string(),
        hour: fields[1].to_string(),
        day_of_month: fields[2].to_string(),
        month: fields[3].to_string(),
        day_of_week: fields[4].to_string(),
        enabled: job.active,
        args: Some(serde_json::json!([job.id]).to_string()),
        updated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use taskwheel_store::JobStatus;

    fn setup() -> (Arc<JobStore>, ScheduleSync) {
        let store = Arc::new(JobStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let sync = ScheduleSync::new(Arc::clone(&store));
        (store, sync)
    }

    fn job(recurrence: &str, active: bool) -> Job {
        let now = Utc::now();
        Job {
            id: "j1".to_string(),
            name: "nightly".to_string(),
            description: String::new(),
            recurrence: recurrence.to_string(),
            kind: "echo".to_string(),
            owner: "alice".to_string(),
            status: JobStatus::Pending,
            active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn apply_creates_structured_mirror() {
        let (store, sync) = setup();
        let j = job("30 4 1 * 2", true);
        store.insert_job(&j).unwrap();
        sync.apply(&j).unwrap();

        let mirror = store.get_schedule("j1").unwrap().unwrap();
        assert_eq!(mirror.minute, "30");
        assert_eq!(mirror.hour, "4");
        assert_eq!(mirror.day_of_month, "1");
        assert_eq!(mirror.month, "*");
        assert_eq!(mirror.day_of_week, "2");
        assert!(mirror.enabled);
        assert_eq!(mirror.args.as_deref(), Some("[\"j1\"]"));
    }

    #[test]
    fn apply_updates_in_place() {
        let (store, sync) = setup();
        let mut j = job("* * * * *", true);
        store.insert_job(&j).unwrap();
        sync.apply(&j).unwrap();

        j.recurrence = "0 0 * * *".to_string();
        j.active = false;
        sync.apply(&j).unwrap();

        let mirror = store.get_schedule("j1").unwrap().unwrap();
        assert_eq!(mirror.minute, "0");
        assert!(!mirror.enabled);
    }

    #[test]
    fn apply_rejects_malformed_recurrence() {
        let (store, sync) = setup();
        let j = job("* * *", true);
        assert!(matches!(
            sync.apply(&j),
            Err(EngineError::Validation(_))
        ));
        assert!(store.get_schedule("j1").unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let (_store, sync) = setup();
        sync.remove("never-existed").unwrap();
    }
}
