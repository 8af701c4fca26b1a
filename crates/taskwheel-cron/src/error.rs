use thiserror::Error;

/// Errors produced while parsing a cron expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    /// The expression does not have exactly five whitespace-separated fields.
    #[error("expected 5 fields (minute hour day month weekday), found {found}")]
    FieldCount { found: usize },

    /// A single field could not be parsed or is out of range.
    #[error("invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, CronError>;
