use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use taskwheel_engine::{HandlerError, JobHandler};
use taskwheel_store::Job;

/// A message produced by a notification job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Delivery backend for [`NotifyHandler`].
///
/// Implement this to route notifications to mail, chat, webhooks or
/// whatever the deployment uses. Delivery errors become failure records
/// on the job that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), HandlerError>;
}

/// Default backend: emits the notification to the log stream.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), HandlerError> {
        info!(
            subject = %notification.subject,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

/// Handler for `notify` jobs: formats a message from the job's name and
/// description and hands it to the configured [`Notifier`].
pub struct NotifyHandler {
    notifier: Arc<dyn Notifier>,
}

impl NotifyHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl Default for NotifyHandler {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}

#[async_trait]
impl JobHandler for NotifyHandler {
    fn kind(&self) -> &str {
        "notify"
    }

    async fn execute(&self, job: &Job) -> Result<String, HandlerError> {
        let notification = Notification {
            subject: format!("[taskwheel] {}", job.name),
            body: if job.description.is_empty() {
                format!("scheduled notification from job {}", job.id)
            } else {
                job.description.clone()
            },
        };
        self.notifier.deliver(&notification).await?;
        Ok(format!("notified: {}", notification.subject))
    }
}
