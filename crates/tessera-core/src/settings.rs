//! Settings domain types and validation.
//!
//! Pure configuration values with no infrastructure dependencies. The CLI
//! fills them from flags and environment variables; everything below the
//! composition root reads the `effective_*` accessors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on worker processes when nothing else is configured.
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// In-flight tasks per worker when nothing else is configured.
pub const DEFAULT_MAX_TASKS_PER_WORKER: usize = 1;

/// Shutdown grace period before stragglers are killed.
pub const DEFAULT_WORKER_GRACE_MS: u64 = 5_000;

/// Name workers report in logs.
pub const DEFAULT_WORKER_NAME: &str = "tessera-compiler-worker";

/// Environment variable overriding `max_workers`.
pub const ENV_MAX_WORKERS: &str = "TESSERA_MAX_WORKERS";
/// Environment variable overriding `max_tasks_per_worker`.
pub const ENV_TASKS_PER_WORKER: &str = "TESSERA_TASKS_PER_WORKER";
/// Environment variable overriding `worker_grace_period_ms`.
pub const ENV_WORKER_GRACE_MS: &str = "TESSERA_WORKER_GRACE_MS";

/// Errors raised while validating settings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Runtime settings for the system layer and worker pool.
///
/// All fields are optional so partial sources can be layered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on worker processes (1-128).
    pub max_workers: Option<usize>,

    /// Tasks a single worker may run concurrently (1-64).
    pub max_tasks_per_worker: Option<usize>,

    /// Milliseconds shutdown waits before force-terminating workers.
    pub worker_grace_period_ms: Option<u64>,

    /// Name used for worker processes in logs.
    pub worker_name: Option<String>,

    /// Directory whose `node_modules` lazy dependencies are resolved from.
    pub lazy_dependencies_root: Option<String>,
}

impl Settings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            max_workers: Some(DEFAULT_MAX_WORKERS),
            max_tasks_per_worker: Some(DEFAULT_MAX_TASKS_PER_WORKER),
            worker_grace_period_ms: Some(DEFAULT_WORKER_GRACE_MS),
            worker_name: Some(DEFAULT_WORKER_NAME.to_string()),
            lazy_dependencies_root: None,
        }
    }

    /// Read overrides from an environment lookup.
    ///
    /// Unparseable values are reported rather than ignored.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            max_workers: parse_env(&lookup, ENV_MAX_WORKERS, "max_workers")?,
            max_tasks_per_worker: parse_env(&lookup, ENV_TASKS_PER_WORKER, "max_tasks_per_worker")?,
            worker_grace_period_ms: parse_env(&lookup, ENV_WORKER_GRACE_MS, "worker_grace_period_ms")?,
            worker_name: None,
            lazy_dependencies_root: None,
        })
    }

    /// Overlay `other` on top of `self`: fields set in `other` win.
    #[must_use]
    pub fn merged_with(mut self, other: &Self) -> Self {
        if other.max_workers.is_some() {
            self.max_workers = other.max_workers;
        }
        if other.max_tasks_per_worker.is_some() {
            self.max_tasks_per_worker = other.max_tasks_per_worker;
        }
        if other.worker_grace_period_ms.is_some() {
            self.worker_grace_period_ms = other.worker_grace_period_ms;
        }
        if other.worker_name.is_some() {
            self.worker_name.clone_from(&other.worker_name);
        }
        if other.lazy_dependencies_root.is_some() {
            self.lazy_dependencies_root
                .clone_from(&other.lazy_dependencies_root);
        }
        self
    }

    pub fn effective_max_workers(&self) -> usize {
        self.max_workers.unwrap_or(DEFAULT_MAX_WORKERS).max(1)
    }

    pub fn effective_max_tasks_per_worker(&self) -> usize {
        self.max_tasks_per_worker
            .unwrap_or(DEFAULT_MAX_TASKS_PER_WORKER)
            .max(1)
    }

    pub fn effective_grace_period(&self) -> Duration {
        Duration::from_millis(
            self.worker_grace_period_ms
                .unwrap_or(DEFAULT_WORKER_GRACE_MS),
        )
    }

    pub fn effective_worker_name(&self) -> &str {
        self.worker_name.as_deref().unwrap_or(DEFAULT_WORKER_NAME)
    }
}

fn parse_env<F, T>(lookup: &F, key: &str, field: &'static str) -> Result<Option<T>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SettingsError::InvalidValue {
                field,
                reason: format!("{key}={raw:?} is not a number"),
            }),
    }
}

/// Validate settings values.
pub fn validate_settings(settings: &Settings) -> Result<(), SettingsError> {
    if let Some(n) = settings.max_workers
        && !(1..=128).contains(&n)
    {
        return Err(SettingsError::InvalidValue {
            field: "max_workers",
            reason: format!("{n} is outside 1-128"),
        });
    }

    if let Some(n) = settings.max_tasks_per_worker
        && !(1..=64).contains(&n)
    {
        return Err(SettingsError::InvalidValue {
            field: "max_tasks_per_worker",
            reason: format!("{n} is outside 1-64"),
        });
    }

    if let Some(ms) = settings.worker_grace_period_ms
        && ms > 600_000
    {
        return Err(SettingsError::InvalidValue {
            field: "worker_grace_period_ms",
            reason: format!("{ms}ms exceeds the 10 minute ceiling"),
        });
    }

    if let Some(name) = &settings.worker_name
        && name.trim().is_empty()
    {
        return Err(SettingsError::InvalidValue {
            field: "worker_name",
            reason: "must not be empty".to_string(),
        });
    }

    Ok(())
}
