use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default evaluation cadence — once per minute, matching the resolution
/// of a five-field cron expression.
pub const DEFAULT_TICK_SECS: u64 = 60;
/// Default upper bound on a single handler invocation.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 300;
/// Default number of attempts for one tick before the cycle is abandoned.
pub const DEFAULT_MAX_TICK_RETRIES: u32 = 5;
/// Default base backoff delay between tick retries; doubles per attempt.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
/// Default retention window for execution and system-operation history.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Top-level config (taskwheel.toml + TASKWHEEL_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskwheelConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Tunables for the scheduler loop and dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between evaluation ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Seconds a single handler invocation may run before it is treated
    /// as failed and its slot freed.
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    /// Attempts per tick when the store is unavailable.
    #[serde(default = "default_max_tick_retries")]
    pub max_tick_retries: u32,
    /// Base delay between tick retries in milliseconds (doubles per attempt).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Days of execution history kept by the default purge invocation.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: DEFAULT_TICK_SECS,
            execution_timeout_secs: DEFAULT_EXECUTION_TIMEOUT_SECS,
            max_tick_retries: DEFAULT_MAX_TICK_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl TaskwheelConfig {
    /// Load config from `path` (or `taskwheel.toml` in the working directory
    /// when `None`), then apply `TASKWHEEL_*` environment overrides.
    ///
    /// A missing file is fine — figment's Toml provider treats it as empty,
    /// so an env-only or all-defaults deployment needs no file at all.
    /// Nested keys use `__` in the env name, e.g.
    /// `TASKWHEEL_SCHEDULER__TICK_SECS=10`.
    pub fn load(path: Option<&str>) -> Result<Self, figment::Error> {
        let path = path.unwrap_or("taskwheel.toml");
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TASKWHEEL_").split("__"))
            .extract()
    }

    /// The reclaim window for stale `running` jobs: a claim older than
    /// one execution timeout plus one tick is presumed crashed.
    pub fn stale_claim_secs(&self) -> u64 {
        self.scheduler.execution_timeout_secs + self.scheduler.tick_secs
    }
}

fn default_db_path() -> String {
    "taskwheel.db".to_string()
}

fn default_tick_secs() -> u64 {
    DEFAULT_TICK_SECS
}

fn default_execution_timeout_secs() -> u64 {
    DEFAULT_EXECUTION_TIMEOUT_SECS
}

fn default_max_tick_retries() -> u32 {
    DEFAULT_MAX_TICK_RETRIES
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
