//! Worker and broker configuration structures.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::worker_pool::{DEFAULT_MAX_EXEC_COUNT, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT};

/// Broker backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerBackendConfig {
    /// Process-local queues.
    #[default]
    InMemory,
}

/// Settings of one worker type. Absent fields use the broker defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSettings {
    /// Number of execution slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// Attempts per job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_exec_count: Option<u32>,
    /// Budget of one attempt, e.g. `"30s"`.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Base delay between attempts.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<Duration>,
    /// No retry starts after this much time was spent on a job.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_exec_time: Option<Duration>,
    /// Only the stack may push jobs of this type.
    #[serde(default)]
    pub reserved: bool,
}

/// Entry of the `workers` map: `false` disables the type, `true` enables it
/// with defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerEntry {
    /// Enabled with defaults, or disabled.
    Enabled(bool),
    /// Explicit settings.
    Settings(WorkerSettings),
}

impl Default for WorkerEntry {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

/// Effective settings of one worker type once defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorker {
    /// Worker type name.
    pub worker_type: String,
    /// Number of execution slots; zero when disabled.
    pub concurrency: usize,
    /// Attempts per job.
    pub max_exec_count: u32,
    /// Budget of one attempt.
    pub timeout: Duration,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Retry cut-off.
    pub max_exec_time: Option<Duration>,
    /// Reserved for the stack.
    pub reserved: bool,
}

/// Root broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Map of worker type to its settings.
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerEntry>,
    /// Attempt budget applied when a worker does not set one.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Attempts applied when a worker does not set a count.
    #[serde(default = "default_max_exec_count")]
    pub default_max_exec_count: u32,
    /// Slots applied when a worker does not set them; the CPU count when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_concurrency: Option<usize>,
    /// Retry delay applied when a worker does not set one.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub default_retry_delay: Duration,
    /// Backend selection.
    #[serde(default)]
    pub backend: BrokerBackendConfig,
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_max_exec_count() -> u32 {
    DEFAULT_MAX_EXEC_COUNT
}

const fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: BTreeMap::new(),
            default_timeout: default_timeout(),
            default_max_exec_count: default_max_exec_count(),
            default_concurrency: None,
            default_retry_delay: default_retry_delay(),
            backend: BrokerBackendConfig::default(),
        }
    }
}

impl WorkerSettings {
    /// Validate worker settings values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first zero count or duration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_exec_count == Some(0) {
            return Err("max_exec_count must be greater than 0".into());
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err("timeout must be greater than 0".into());
        }
        if self.max_exec_time.is_some_and(|t| t.is_zero()) {
            return Err("max_exec_time must be greater than 0".into());
        }
        Ok(())
    }
}

impl JobsConfig {
    /// Validate defaults and every worker entry.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid default or worker entry.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_max_exec_count == 0 {
            return Err("default_max_exec_count must be greater than 0".into());
        }
        if self.default_timeout.is_zero() {
            return Err("default_timeout must be greater than 0".into());
        }
        for (name, entry) in &self.workers {
            if name.is_empty() {
                return Err("worker type names must not be empty".into());
            }
            if let WorkerEntry::Settings(settings) = entry {
                settings
                    .validate()
                    .map_err(|e| format!("worker `{name}` invalid: {e}"))?;
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a message when the JSON is malformed or fails [`Self::validate`].
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Slots used when neither the worker nor the defaults set any.
    #[must_use]
    pub fn effective_default_concurrency(&self) -> usize {
        self.default_concurrency.unwrap_or_else(num_cpus::get)
    }

    /// Apply defaults to every worker entry, in name order.
    #[must_use]
    pub fn resolve(&self) -> Vec<ResolvedWorker> {
        self.workers
            .iter()
            .map(|(name, entry)| self.resolve_entry(name, entry))
            .collect()
    }

    fn resolve_entry(&self, name: &str, entry: &WorkerEntry) -> ResolvedWorker {
        let settings = match entry {
            WorkerEntry::Enabled(true) => WorkerSettings::default(),
            WorkerEntry::Enabled(false) => WorkerSettings { concurrency: Some(0), ..WorkerSettings::default() },
            WorkerEntry::Settings(settings) => settings.clone(),
        };
        ResolvedWorker {
            worker_type: name.to_owned(),
            concurrency: settings
                .concurrency
                .unwrap_or_else(|| self.effective_default_concurrency()),
            max_exec_count: settings.max_exec_count.unwrap_or(self.default_max_exec_count),
            timeout: settings.timeout.unwrap_or(self.default_timeout),
            retry_delay: settings.retry_delay.unwrap_or(self.default_retry_delay),
            max_exec_time: settings.max_exec_time,
            reserved: settings.reserved,
        }
    }
}
