use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use taskwheel_core::config::SchedulerConfig;
use taskwheel_cron::CronExpr;
use taskwheel_store::{ExecutionRecord, Job, JobStatus, JobStore, Outcome};

use crate::dispatch::Dispatcher;
use crate::error::{EngineError, Result};
use crate::registry::HandlerRegistry;

/// The scheduler loop: evaluates, claims, dispatches.
///
/// Multiple instances may tick against the same store concurrently; the
/// claim step ([`JobStore::claim`]) guarantees that one due instant
/// produces one dispatch regardless of how many evaluators overlap.
pub struct SchedulerEngine {
    store: Arc<JobStore>,
    dispatcher: Dispatcher,
    config: SchedulerConfig,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<HandlerRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            registry,
            StdDuration::from_secs(config.execution_timeout_secs),
        );
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// One evaluation pass at instant `now`.
    ///
    /// Selects candidates, tests due-ness against each job's last execution
    /// (or creation time), claims each due job with a single conditional
    /// update, then dispatches the claimed set concurrently. Every claimed
    /// job ends the tick in a terminal state with exactly one new execution
    /// record; those records are returned.
    ///
    /// Errors from this function are infrastructure failures (store
    /// unavailability). A single job's handler failing is not an error —
    /// it is a failure record in the result.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<Vec<ExecutionRecord>> {
        let stale_cutoff = now - Duration::seconds(self.stale_claim_secs());

        let mut claimed = Vec::new();
        for job in self.store.due_candidates(&stale_cutoff)? {
            // A stale `running` candidate was already claimed for a due
            // instant that never completed; it re-enters without a due test.
            if job.status != JobStatus::Running && !self.is_due(&job, &now)? {
                continue;
            }
            // The claim is guarded by the `updated_at` value this candidate
            // row was read with, so the due test above and the claim land
            // as one step: any write since the read voids the claim.
            if self.store.claim(&job.id, &now, &stale_cutoff, &job.updated_at)? {
                claimed.push(job);
            }
            // Losing the claim is a normal no-op: another evaluator got
            // there first or the row changed under us.
        }

        if claimed.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = claimed.len(), "claimed due jobs");

        let mut set = JoinSet::new();
        for job in claimed {
            let dispatcher = self.dispatcher.clone();
            let store = Arc::clone(&self.store);
            set.spawn(async move { execute_claimed(&dispatcher, &store, job, now).await });
        }

        let mut records = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                // A panicking execution task loses its record; the job's
                // stale claim makes it eligible again after the timeout.
                Err(e) => error!(err = %e, "execution task panicked"),
            }
        }
        Ok(records)
    }

    /// Ad-hoc trigger: execute a job immediately, bypassing the due-ness
    /// test and the active flag, but not the claim discipline. Any rest
    /// state runs, `completed` included; only a job with a live claim
    /// (running, within the reclaim window) is refused.
    pub async fn execute_now(&self, id: &str, now: DateTime<Utc>) -> Result<ExecutionRecord> {
        let job = self
            .store
            .get_job(id)?
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })?;

        let stale_cutoff = now - Duration::seconds(self.stale_claim_secs());
        if !self.store.claim_manual(id, &now, &stale_cutoff)? {
            return Err(EngineError::AlreadyRunning { id: id.to_string() });
        }

        Ok(execute_claimed(&self.dispatcher, &self.store, job, now).await)
    }

    /// Drive ticks at the configured cadence until `shutdown` broadcasts
    /// `true`. Each cycle retries infrastructure failures with bounded
    /// exponential backoff before abandoning that cycle.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.config.tick_secs,
            "scheduler engine started"
        );
        let mut interval =
            tokio::time::interval(StdDuration::from_secs(self.config.tick_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_tick_with_retry(Utc::now()).await {
                        error!(err = %e, "tick failed after retries; cycle abandoned");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Retry one tick with exponential backoff: base delay doubling per
    /// attempt, up to `max_tick_retries` attempts. Exhaustion returns the
    /// last error for the operator.
    pub async fn run_tick_with_retry(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>> {
        let mut delay = StdDuration::from_millis(self.config.retry_backoff_ms);
        let attempts = self.config.max_tick_retries.max(1);

        for attempt in 1..=attempts {
            match self.run_tick(now).await {
                Ok(records) => return Ok(records),
                Err(e) if attempt == attempts => return Err(e),
                Err(e) => {
                    warn!(attempt, err = %e, delay_ms = delay.as_millis() as u64, "tick failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        unreachable!("retry loop always returns");
    }

    fn is_due(&self, job: &Job, now: &DateTime<Utc>) -> Result<bool> {
        let expr = match CronExpr::parse(&job.recurrence) {
            Ok(expr) => expr,
            Err(e) => {
                // Validated on write, so this indicates store-level
                // tampering; skip the job rather than fail the tick.
                error!(job_id = %job.id, err = %e, "stored recurrence is invalid; skipping");
                return Ok(false);
            }
        };
        let reference = self
            .store
            .last_executed_at(&job.id)?
            .unwrap_or(job.created_at);
        Ok(expr.is_due(&reference, now))
    }

    fn stale_claim_secs(&self) -> i64 {
        (self.config.execution_timeout_secs + self.config.tick_secs) as i64
    }
}

/// Dispatch one already-claimed job and persist the outcome: the execution
/// record is appended and the job moves running → completed | failed.
async fn execute_claimed(
    dispatcher: &Dispatcher,
    store: &JobStore,
    job: Job,
    now: DateTime<Utc>,
) -> ExecutionRecord {
    let record = dispatcher.run(&job, now).await;

    if let Err(e) = store.append_execution(&record) {
        error!(job_id = %job.id, err = %e, "failed to persist execution record");
    }

    let terminal = match record.outcome {
        Outcome::Success => JobStatus::Completed,
        Outcome::Failure => JobStatus::Failed,
    };
    match store.finish(&job.id, terminal) {
        Ok(true) => {}
        // The claim was reclaimed out from under us (stale-claim takeover);
        // the winner owns the terminal transition.
        Ok(false) => warn!(job_id = %job.id, "claim lost before terminal transition"),
        Err(e) => error!(job_id = %job.id, err = %e, "failed to finish job"),
    }

    record
}
