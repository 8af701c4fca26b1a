use taskwheel_store::StoreError;
use thiserror::Error;

/// Errors surfaced across the engine's external interface.
///
/// Handler failures are deliberately absent: they are recorded as failure
/// execution records, never raised (see [`crate::dispatch::Dispatcher`]).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed recurrence, unknown kind, or an invalid field value.
    /// Rejected before anything is persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced job does not exist.
    #[error("job not found: {id}")]
    NotFound { id: String },

    /// An ad-hoc trigger lost the claim race: the job is already running.
    #[error("job {id} is already running")]
    AlreadyRunning { id: String },

    /// Store unavailability or corruption — retried at the tick level.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::JobNotFound { id } => EngineError::NotFound { id },
            other => EngineError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
