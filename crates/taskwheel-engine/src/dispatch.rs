use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use taskwheel_store::{ExecutionRecord, Job, Outcome};

use crate::registry::HandlerRegistry;

/// Runs a single job's handler and captures the outcome.
///
/// Every invocation produces exactly one [`ExecutionRecord`] — handler
/// errors, unknown kinds and timeouts all become failure records with an
/// explanatory detail. Nothing a handler does can abort the tick for
/// other jobs.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    /// Upper bound on one handler invocation.
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Execute `job` and return the record of what happened. `now` stamps
    /// the record so one tick's records share a due instant.
    pub async fn run(&self, job: &Job, now: DateTime<Utc>) -> ExecutionRecord {
        let (outcome, detail) = match self.registry.resolve(&job.kind) {
            None => (
                Outcome::Failure,
                format!("no handler registered for kind '{}'", job.kind),
            ),
            Some(handler) => {
                match tokio::time::timeout(self.timeout, handler.execute(job)).await {
                    Ok(Ok(result)) => {
                        let detail = if result.is_empty() {
                            "ok".to_string()
                        } else {
                            result
                        };
                        (Outcome::Success, detail)
                    }
                    Ok(Err(e)) => (Outcome::Failure, format!("handler failed: {e}")),
                    Err(_) => (
                        Outcome::Failure,
                        format!(
                            "handler timed out after {}s",
                            self.timeout.as_secs()
                        ),
                    ),
                }
            }
        };

        match outcome {
            Outcome::Success => {
                debug!(job_id = %job.id, kind = %job.kind, "execution succeeded")
            }
            Outcome::Failure => {
                warn!(job_id = %job.id, kind = %job.kind, %detail, "execution failed")
            }
        }

        ExecutionRecord {
            id: Uuid::now_v7().to_string(),
            job_id: job.id.clone(),
            outcome,
            detail,
            executed_at: now,
        }
    }
}
