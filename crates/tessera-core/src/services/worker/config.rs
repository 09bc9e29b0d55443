//! Worker pool sizing.

use std::time::Duration;

use crate::domain::SystemDetails;
use crate::settings::Settings;

/// Memory budget assumed per worker when trimming the pool under pressure.
pub const WORKER_MEMORY_BUDGET: u64 = 512 * 1024 * 1024;

/// Resolved pool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker slots, at least 1.
    pub size: usize,
    /// In-flight tasks allowed per worker before tasks queue.
    pub max_tasks_per_worker: usize,
    /// How long shutdown waits for a worker to exit before killing it.
    pub grace_period: Duration,
}

impl WorkerPoolConfig {
    /// Explicit configuration; zero values are raised to 1.
    pub fn new(size: usize, max_tasks_per_worker: usize, grace_period: Duration) -> Self {
        Self {
            size: size.max(1),
            max_tasks_per_worker: max_tasks_per_worker.max(1),
            grace_period,
        }
    }

    /// Derive the pool from the host snapshot and settings.
    ///
    /// One CPU is left for the main process. When free memory cannot cover
    /// `WORKER_MEMORY_BUDGET` per worker the pool shrinks, never below one.
    pub fn from_details(details: &SystemDetails, settings: &Settings) -> Self {
        let mut size = details
            .cpus
            .saturating_sub(1)
            .clamp(1, settings.effective_max_workers());

        let free = details.free_memory();
        while size > 1 && free < WORKER_MEMORY_BUDGET.saturating_mul(size as u64) {
            size -= 1;
        }

        Self::new(
            size,
            settings.effective_max_tasks_per_worker(),
            settings.effective_grace_period(),
        )
    }

    /// Total tasks that can be in flight before queueing starts.
    pub const fn capacity(&self) -> usize {
        self.size * self.max_tasks_per_worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_size_leaves_one_cpu() {
        let details = SystemDetails::fixed(8, 64 * GIB, 32 * GIB);
        let config = WorkerPoolConfig::from_details(&details, &Settings::with_defaults());
        assert_eq!(config.size, 7);
    }

    #[test]
    fn test_size_bounded_by_max_workers() {
        let details = SystemDetails::fixed(64, 256 * GIB, 128 * GIB);
        let settings = Settings {
            max_workers: Some(4),
            ..Settings::default()
        };
        assert_eq!(WorkerPoolConfig::from_details(&details, &settings).size, 4);
    }

    #[test]
    fn test_single_cpu_still_gets_a_worker() {
        let details = SystemDetails::fixed(1, 4 * GIB, 2 * GIB);
        let config = WorkerPoolConfig::from_details(&details, &Settings::with_defaults());
        assert_eq!(config.size, 1);
    }

    #[test]
    fn test_memory_pressure_shrinks_pool() {
        let details = SystemDetails::fixed(16, 8 * GIB, GIB + 1);
        let config = WorkerPoolConfig::from_details(&details, &Settings::with_defaults());
        assert_eq!(config.size, 2);

        let starved = SystemDetails::fixed(16, 8 * GIB, 0);
        assert_eq!(
            WorkerPoolConfig::from_details(&starved, &Settings::with_defaults()).size,
            1
        );
    }

    #[test]
    fn test_zero_values_are_raised() {
        let config = WorkerPoolConfig::new(0, 0, Duration::ZERO);
        assert_eq!(config.size, 1);
        assert_eq!(config.max_tasks_per_worker, 1);
        assert_eq!(config.capacity(), 1);
    }
}
