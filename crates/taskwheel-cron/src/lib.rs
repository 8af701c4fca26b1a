//! `taskwheel-cron` — five-field cron expression evaluation.
//!
//! Pure and deterministic: parsing, matching and next-trigger computation
//! with no I/O and no clock access. The caller supplies every reference
//! instant.
//!
//! # Format
//!
//! `minute hour day-of-month month day-of-week`
//!
//! | Field        | Range | Notes                         |
//! |--------------|-------|-------------------------------|
//! | minute       | 0-59  |                               |
//! | hour         | 0-23  |                               |
//! | day-of-month | 1-31  | OR-combined with day-of-week  |
//! | month        | 1-12  |                               |
//! | day-of-week  | 0-7   | Sunday is 0; 7 normalises to 0 |
//!
//! Each field accepts `*`, a value, a range `a-b`, a step `*/n` or `a-b/n`,
//! and comma-separated lists of any of those.

pub mod error;
pub mod expr;

pub use error::{CronError, Result};
pub use expr::CronExpr;
