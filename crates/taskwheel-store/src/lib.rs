//! `taskwheel-store` — SQLite persistence for jobs and their history.
//!
//! Owns all SQL in the workspace. Four tables:
//!
//! | Table                | Contents                                     |
//! |----------------------|----------------------------------------------|
//! | `jobs`               | job definitions and lifecycle status         |
//! | `execution_log`      | append-only per-job execution outcomes       |
//! | `periodic_schedules` | external mirror of each job's recurrence     |
//! | `system_ops`         | append-only trail of maintenance operations  |
//!
//! The claim operation ([`JobStore::claim`]) is the concurrency linchpin:
//! a single conditional UPDATE guarded by the expected prior status and by
//! the `updated_at` value the caller read, so overlapping evaluation ticks
//! can never double-dispatch one job, even across a due test made on a
//! row that changed in the meantime.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::JobStore;
pub use types::{
    ExecutionRecord, Job, JobStatus, OpStatus, Outcome, PurgeCounts, ScheduleRecord,
    SystemOperation,
};
