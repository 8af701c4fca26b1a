use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use taskwheel_store::Job;

/// A handler's own failure report. The dispatcher converts it into a
/// failure execution record; it never crosses the engine boundary as an
/// error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A unit of executable job logic, selected by [`kind`](JobHandler::kind).
///
/// Implementations must be `Send + Sync` so one handler instance can serve
/// concurrent dispatches across distinct jobs.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Stable lowercase identifier matched against `Job::kind`
    /// (e.g. `"echo"`, `"notify"`). Must be unique within a registry.
    fn kind(&self) -> &str;

    /// Execute the job's work. The returned string becomes the `detail`
    /// of the success record.
    async fn execute(&self, job: &Job) -> Result<String, HandlerError>;
}

/// Maps `Job::kind` to a handler. Built once at startup from the handlers
/// the embedding application registers; resolution is a plain lookup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its `kind`. A duplicate kind replaces the
    /// previous handler.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind().to_string();
        info!(%kind, "registering job handler");
        self.handlers.insert(kind, handler);
    }

    /// Resolve a kind to its handler, `None` for unregistered kinds — the
    /// caller decides whether that is a validation error (job creation) or
    /// a failure record (dispatch time).
    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).map(Arc::clone)
    }

    /// Is any handler registered for `kind`?
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// All registered kinds, sorted for deterministic output.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(&'static str);

    #[async_trait]
    impl JobHandler for Stub {
        fn kind(&self) -> &str {
            self.0
        }
        async fn execute(&self, _job: &Job) -> Result<String, HandlerError> {
            Ok("ok".to_string())
        }
    }

    #[test]
    fn resolve_known_and_unknown_kinds() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Stub("echo")));
        registry.register(Arc::new(Stub("notify")));

        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("missing").is_none());
        assert!(registry.contains("notify"));
        assert_eq!(registry.kinds(), vec!["echo", "notify"]);
    }

    #[test]
    fn duplicate_kind_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Stub("echo")));
        registry.register(Arc::new(Stub("echo")));
        assert_eq!(registry.kinds().len(), 1);
    }
}
