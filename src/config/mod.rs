//! Configuration models for worker types and the broker backend.

pub mod jobs;

use anyhow::Context;

pub use jobs::{BrokerBackendConfig, JobsConfig, ResolvedWorker, WorkerEntry, WorkerSettings};

use crate::core::AppResult;

/// Environment variable holding the path of the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "JOB_BROKER_CONFIG";

impl JobsConfig {
    /// Load `.env` if present, then read and validate the file named by
    /// `JOB_BROKER_CONFIG`. Defaults are returned when the variable is unset.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is invalid.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        let Ok(path) = std::env::var(CONFIG_PATH_ENV) else {
            tracing::debug!("{CONFIG_PATH_ENV} unset, using default jobs configuration");
            return Ok(Self::default());
        };
        Self::from_file(&path)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is invalid.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let input = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        Self::from_json_str(&input).map_err(|e| anyhow::anyhow!("{path}: {e}"))
    }
}
