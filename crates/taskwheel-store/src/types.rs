use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// Only the scheduler loop moves a job between these states, and only along
/// pending|failed → running → completed|failed. `completed` is a rest state:
/// the core never auto-reverts it, an external reset puts the job back in
/// rotation. `failed` stays eligible, so failed jobs retry at their next
/// due instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next due instant.
    Pending,
    /// Claimed by an evaluation tick; dispatch in flight.
    Running,
    /// Last execution succeeded.
    Completed,
    /// Last execution failed; still eligible.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A registered unit of recurring work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUIDv4 string — primary key.
    pub id: String,
    /// Human label; not a dispatch key.
    pub name: String,
    /// Free text, opaque to the engine (handlers may interpret it).
    pub description: String,
    /// Five-field cron expression; validated on every write.
    pub recurrence: String,
    /// Handler registry key deciding which handler executes this job.
    pub kind: String,
    /// Identity of the owning principal; the engine only compares it.
    pub owner: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Inactive jobs are never selected, regardless of due-ness.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    /// Bumped on every write; while `status == Running` this is the claim time.
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

/// One immutable execution fact. Created by the dispatcher at the end of a
/// run; never updated or deleted except through the retention purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// UUIDv7 string — time-sortable primary key.
    pub id: String,
    pub job_id: String,
    pub outcome: Outcome,
    /// Handler result on success, explanation on failure. Never empty.
    pub detail: String,
    pub executed_at: DateTime<Utc>,
}

/// The generic-scheduler-facing mirror of one job's recurrence: the five
/// cron fields split out, plus the enabled flag tracking `Job::active`.
///
/// Owned by the schedule synchronizer — the scheduler loop never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub job_id: String,
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
    pub enabled: bool,
    /// Optional fixed-arguments JSON forwarded to the external facility.
    pub args: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Status of a coarse maintenance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Running,
    Completed,
    Failed,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Running => "running",
            OpStatus::Completed => "completed",
            OpStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for OpStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(OpStatus::Running),
            "completed" => Ok(OpStatus::Completed),
            "failed" => Ok(OpStatus::Failed),
            other => Err(format!("unknown op status: {other}")),
        }
    }
}

/// Status/result trail entry for a maintenance operation that is not tied
/// to a single job (e.g. the retention purge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemOperation {
    /// UUIDv7 string — time-sortable primary key.
    pub id: String,
    pub name: String,
    pub status: OpStatus,
    pub result: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Rows removed by a retention purge, per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCounts {
    pub executions: usize,
    pub system_ops: usize,
}
