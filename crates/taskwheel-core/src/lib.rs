//! `taskwheel-core` — shared configuration and constants.
//!
//! Everything here is plain data: the config struct loaded from
//! `taskwheel.toml` plus `TASKWHEEL_*` environment overrides, and the
//! defaults the rest of the workspace builds on.

pub mod config;

pub use config::{DatabaseConfig, SchedulerConfig, TaskwheelConfig};
