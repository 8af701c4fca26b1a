//! `taskwheel-engine` — the scheduling and execution engine.
//!
//! # Components
//!
//! - [`registry::HandlerRegistry`] — maps a job's `kind` to a
//!   [`registry::JobHandler`]; supplied by the embedding application at
//!   startup, passed in by value (no ambient globals).
//! - [`dispatch::Dispatcher`] — runs one handler under a timeout and turns
//!   every outcome, including panic-free faults and timeouts, into exactly
//!   one execution record.
//! - [`sync::ScheduleSync`] — keeps the `periodic_schedules` mirror rows
//!   aligned with job definitions; never consulted on the hot tick path.
//! - [`service::JobService`] — the CRUD/housekeeping facade the surrounding
//!   application calls.
//! - [`engine::SchedulerEngine`] — the tick loop: select, test due-ness,
//!   claim atomically, dispatch, record.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod registry;
pub mod service;
pub mod sync;

pub use dispatch::Dispatcher;
pub use engine::SchedulerEngine;
pub use error::{EngineError, Result};
pub use registry::{HandlerError, HandlerRegistry, JobHandler};
pub use service::{JobService, JobUpdate, NewJob};
pub use sync::ScheduleSync;
