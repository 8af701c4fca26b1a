//! End-to-end scheduler scenarios: create → tick → claim → dispatch →
//! record, including the concurrency and failure paths.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rusqlite::Connection;

use taskwheel_core::config::SchedulerConfig;
use taskwheel_engine::{
    EngineError, HandlerError, HandlerRegistry, JobHandler, JobService, NewJob, SchedulerEngine,
};
use taskwheel_store::{Job, JobStatus, JobStore, Outcome};

struct Echo;

#[async_trait]
impl JobHandler for Echo {
    fn kind(&self) -> &str {
        "echo"
    }
    async fn execute(&self, job: &Job) -> Result<String, HandlerError> {
        Ok(format!("{} executed", job.name))
    }
}

struct Flaky;

#[async_trait]
impl JobHandler for Flaky {
    fn kind(&self) -> &str {
        "flaky"
    }
    async fn execute(&self, _job: &Job) -> Result<String, HandlerError> {
        Err(HandlerError::new("upstream unavailable"))
    }
}

fn registry() -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(Echo));
    registry.register(Arc::new(Flaky));
    Arc::new(registry)
}

fn setup() -> (Arc<JobStore>, JobService, SchedulerEngine) {
    let store = Arc::new(JobStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let registry = registry();
    let service = JobService::new(Arc::clone(&store), Arc::clone(&registry));
    let engine = SchedulerEngine::new(Arc::clone(&store), registry, SchedulerConfig::default());
    (store, service, engine)
}

fn every_minute(name: &str, kind: &str) -> NewJob {
    NewJob {
        name: name.to_string(),
        description: String::new(),
        recurrence: "* * * * *".to_string(),
        kind: kind.to_string(),
        owner: "alice".to_string(),
    }
}

// Scenario A: job created at T0, tick at T0+60s finds it due and runs it
// to completion with exactly one success record.
#[tokio::test]
async fn due_job_completes_with_one_success_record() {
    let (store, service, engine) = setup();
    let job = service.create_job(every_minute("report", "echo")).unwrap();

    let tick_at = Utc::now() + Duration::seconds(61);
    let records = engine.run_tick(tick_at).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Success);
    assert_eq!(records[0].detail, "report executed");
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(store.list_executions(Some(&job.id), 10).unwrap().len(), 1);
}

// Idempotence: an immediate second tick sees no eligible work.
#[tokio::test]
async fn repeated_tick_is_a_no_op() {
    let (store, service, engine) = setup();
    let job = service.create_job(every_minute("report", "echo")).unwrap();

    let tick_at = Utc::now() + Duration::seconds(61);
    assert_eq!(engine.run_tick(tick_at).await.unwrap().len(), 1);
    assert!(engine.run_tick(tick_at).await.unwrap().is_empty());

    assert_eq!(store.list_executions(Some(&job.id), 10).unwrap().len(), 1);
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Completed
    );
}

// A job that is not yet due is left alone entirely. Fixed timeline: the
// hourly job's creation instant is pinned so the next trigger is known.
#[tokio::test]
async fn not_due_job_is_untouched() {
    let (store, _service, engine) = setup();
    let created = Utc.with_ymd_and_hms(2026, 8, 26, 10, 0, 30).unwrap();
    let job = Job {
        id: "hourly".to_string(),
        name: "hourly".to_string(),
        description: String::new(),
        recurrence: "0 * * * *".to_string(),
        kind: "echo".to_string(),
        owner: "alice".to_string(),
        status: JobStatus::Pending,
        active: true,
        created_at: created,
        updated_at: created,
    };
    store.insert_job(&job).unwrap();

    // Ten seconds later, well short of the 11:00 trigger.
    let records = engine
        .run_tick(created + Duration::seconds(10))
        .await
        .unwrap();
    assert!(records.is_empty());
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Pending
    );
}

// Scenario B: handler failure leaves the job `failed` with a failure
// record; `failed` stays eligible, so the next due tick retries it.
#[tokio::test]
async fn failing_handler_records_failure_and_retries() {
    let (store, service, engine) = setup();
    let job = service.create_job(every_minute("sync", "flaky")).unwrap();

    let first = Utc::now() + Duration::seconds(61);
    let records = engine.run_tick(first).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Failure);
    assert!(!records[0].detail.is_empty());
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Failed
    );

    // Two minutes later the failed job is due again and retried.
    let second = first + Duration::seconds(120);
    let records = engine.run_tick(second).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Failure);
    assert_eq!(store.list_executions(Some(&job.id), 10).unwrap().len(), 2);
}

// Scenario C: concurrent ticks race for the same due job; exactly one
// claims it and exactly one record is written.
#[tokio::test]
async fn concurrent_ticks_produce_one_execution() {
    let (store, service, engine) = setup();
    let job = service.create_job(every_minute("race", "echo")).unwrap();
    let engine = Arc::new(engine);

    let tick_at = Utc::now() + Duration::seconds(61);
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move { engine.run_tick(tick_at).await.unwrap().len() });
    }

    let mut total = 0;
    while let Some(n) = tasks.join_next().await {
        total += n.unwrap();
    }

    assert_eq!(total, 1);
    assert_eq!(store.list_executions(Some(&job.id), 10).unwrap().len(), 1);
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Completed
    );
}

// Deactivation: an inactive job is never selected, however overdue.
#[tokio::test]
async fn inactive_job_is_never_selected() {
    let (store, service, engine) = setup();
    let job = service.create_job(every_minute("paused", "echo")).unwrap();
    service.set_active(&job.id, false).unwrap();

    let records = engine
        .run_tick(Utc::now() + Duration::days(1))
        .await
        .unwrap();
    assert!(records.is_empty());
    assert!(!store.get_schedule(&job.id).unwrap().unwrap().enabled);
}

// Ad-hoc trigger: runs immediately regardless of due-ness, rest state or
// the active flag; only a live claim refuses a second trigger.
#[tokio::test]
async fn execute_now_bypasses_dueness_but_not_claims() {
    let (store, service, engine) = setup();
    // Yearly job, nowhere near due.
    let job = service
        .create_job(NewJob {
            recurrence: "0 0 1 1 *".to_string(),
            ..every_minute("yearly", "echo")
        })
        .unwrap();

    let now = Utc::now();
    let record = engine.execute_now(&job.id, now).await.unwrap();
    assert_eq!(record.outcome, Outcome::Success);
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Completed
    );

    // A completed job re-runs manually without any external reset.
    let record = engine.execute_now(&job.id, now).await.unwrap();
    assert_eq!(record.outcome, Outcome::Success);

    // Deactivation does not gate manual runs either.
    service.set_active(&job.id, false).unwrap();
    engine.execute_now(&job.id, now).await.unwrap();

    // Force a live claim, then try again.
    let stale = now - Duration::hours(1);
    assert!(store.claim_manual(&job.id, &now, &stale).unwrap());
    match engine.execute_now(&job.id, now).await {
        Err(EngineError::AlreadyRunning { .. }) => {}
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    match engine.execute_now("ghost", now).await {
        Err(EngineError::NotFound { .. }) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

// Crash recovery: a `running` claim older than the reclaim window is
// picked up by a later tick and driven to a terminal state.
#[tokio::test]
async fn stale_running_claim_is_reclaimed() {
    let (store, service, engine) = setup();
    let job = service.create_job(every_minute("stuck", "echo")).unwrap();

    let claimed_at = Utc::now();
    assert!(store
        .claim(
            &job.id,
            &claimed_at,
            &(claimed_at - Duration::hours(1)),
            &job.updated_at
        )
        .unwrap());

    // Default reclaim window is execution_timeout + tick = 360s.
    let later = claimed_at + Duration::seconds(421);
    let records = engine.run_tick(later).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Completed
    );
}

// The retrying entry point behaves exactly like a plain tick when the
// store is healthy.
#[tokio::test]
async fn retrying_tick_succeeds_on_healthy_store() {
    let (store, service, engine) = setup();
    let job = service.create_job(every_minute("report", "echo")).unwrap();

    let records = engine
        .run_tick_with_retry(Utc::now() + Duration::seconds(61))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Completed
    );
}

// Transient infrastructure failure: the first attempts fail, the store
// comes back during the backoff, and the same cycle completes within the
// attempt budget.
#[tokio::test(start_paused = true)]
async fn tick_recovers_after_transient_store_failure() {
    let path = std::env::temp_dir().join(format!("taskwheel-test-{}.db", uuid::Uuid::new_v4()));
    let path_str = path.to_str().unwrap().to_string();

    let store = Arc::new(JobStore::new(Connection::open(&path_str).unwrap()).unwrap());
    let registry = registry();
    let service = JobService::new(Arc::clone(&store), Arc::clone(&registry));
    let job = service.create_job(every_minute("wobbly", "echo")).unwrap();
    let engine = SchedulerEngine::new(Arc::clone(&store), registry, SchedulerConfig::default());

    // Hide the jobs table so candidate selection fails, then restore it
    // while the second backoff delay (400ms, starting at 200ms) is pending.
    let admin = Connection::open(&path_str).unwrap();
    admin
        .execute_batch("ALTER TABLE jobs RENAME TO jobs_unavailable;")
        .unwrap();
    let repair = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        admin
            .execute_batch("ALTER TABLE jobs_unavailable RENAME TO jobs;")
            .unwrap();
    });

    let records = engine
        .run_tick_with_retry(Utc::now() + Duration::seconds(61))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Success);
    assert_eq!(
        store.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Completed
    );

    repair.await.unwrap();
    let _ = std::fs::remove_file(&path);
}

// Infrastructure failure: a store that cannot be written is retried with
// backoff and surfaces the final error; the job is left unclaimed.
#[tokio::test(start_paused = true)]
async fn tick_retry_exhaustion_surfaces_error() {
    let path = std::env::temp_dir().join(format!("taskwheel-test-{}.db", uuid::Uuid::new_v4()));
    let path_str = path.to_str().unwrap();

    let writable = Arc::new(JobStore::new(Connection::open(path_str).unwrap()).unwrap());
    let registry = registry();
    let service = JobService::new(Arc::clone(&writable), Arc::clone(&registry));
    let job = service.create_job(every_minute("doomed", "echo")).unwrap();

    // Second connection that can read candidates but not write claims.
    let readonly_conn = Connection::open(path_str).unwrap();
    readonly_conn
        .execute_batch("PRAGMA query_only = ON;")
        .unwrap();
    let readonly = Arc::new(JobStore::new(readonly_conn).unwrap());
    let engine = SchedulerEngine::new(readonly, registry, SchedulerConfig::default());

    let result = engine
        .run_tick_with_retry(Utc::now() + Duration::seconds(61))
        .await;
    assert!(matches!(result, Err(EngineError::Store(_))));

    // No partial state: the job was never moved out of pending.
    assert_eq!(
        writable.get_job(&job.id).unwrap().unwrap().status,
        JobStatus::Pending
    );

    let _ = std::fs::remove_file(&path);
}
