use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use taskwheel_engine::{HandlerError, JobHandler};
use taskwheel_store::Job;

/// The generic catch-all handler: records that the job ran and when.
///
/// Useful for heartbeat-style jobs and for verifying a schedule before
/// wiring a real handler behind it.
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    fn kind(&self) -> &str {
        "echo"
    }

    async fn execute(&self, job: &Job) -> Result<String, HandlerError> {
        let at = Utc::now().format("%H:%M:%S");
        info!(job_id = %job.id, name = %job.name, "echo job ran");
        Ok(format!("{} executed at {}", job.name, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwheel_store::JobStatus;

    fn job(name: &str) -> Job {
        Job {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: String::new(),
            recurrence: "* * * * *".to_string(),
            kind: "echo".to_string(),
            owner: "tests".to_string(),
            status: JobStatus::Pending,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reports_name_and_time() {
        let detail = EchoHandler.execute(&job("nightly-report")).await.unwrap();
        assert!(detail.starts_with("nightly-report executed at "));
    }

    #[test]
    fn registers_under_echo() {
        assert_eq!(EchoHandler.kind(), "echo");
    }
}
