//! Configuration Module
//!
//! Sizing and timing parameters for the cache and its collaborators, loaded
//! from environment variables.

use std::env;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Total weight the cache may hold
    pub capacity: usize,
    /// Maximum number of resources the opener keeps open at once
    pub open_limit: usize,
    /// Maximum number of queued tasks in the task worker
    pub task_queue_size: usize,
    /// Seconds after which an untouched task is dropped
    pub task_stale_after_secs: u64,
    /// Milliseconds the task worker sleeps when it has nothing to run
    pub worker_idle_ms: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Total cache weight (default: 1000)
    /// - `OPEN_LIMIT` - Concurrently open resources (default: 64)
    /// - `TASK_QUEUE_SIZE` - Queued tasks (default: 1024)
    /// - `TASK_STALE_AFTER_SECS` - Task staleness in seconds (default: 30)
    /// - `WORKER_IDLE_MS` - Idle sleep in milliseconds (default: 100)
    ///
    /// Missing, unparsable or zero values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env_or("CACHE_CAPACITY", defaults.capacity),
            open_limit: env_or("OPEN_LIMIT", defaults.open_limit),
            task_queue_size: env_or("TASK_QUEUE_SIZE", defaults.task_queue_size),
            task_stale_after_secs: env_or("TASK_STALE_AFTER_SECS", defaults.task_stale_after_secs),
            worker_idle_ms: env_or("WORKER_IDLE_MS", defaults.worker_idle_ms),
        }
    }

    pub fn task_stale_after(&self) -> Duration {
        Duration::from_secs(self.task_stale_after_secs)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_millis(self.worker_idle_ms)
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + PartialEq + Default,
{
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|v| *v != T::default())
        .unwrap_or(default)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            open_limit: 64,
            task_queue_size: 1024,
            task_stale_after_secs: 30,
            worker_idle_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.open_limit, 64);
        assert_eq!(config.task_queue_size, 1024);
        assert_eq!(config.task_stale_after(), Duration::from_secs(30));
        assert_eq!(config.worker_idle(), Duration::from_millis(100));
    }

    // Env vars are process-wide, so every case lives in one test.
    #[test]
    fn test_config_from_env() {
        env::remove_var("CACHE_CAPACITY");
        env::remove_var("OPEN_LIMIT");
        env::remove_var("TASK_QUEUE_SIZE");
        env::remove_var("TASK_STALE_AFTER_SECS");
        env::remove_var("WORKER_IDLE_MS");
        assert_eq!(CacheConfig::from_env(), CacheConfig::default());

        env::set_var("CACHE_CAPACITY", "4096");
        env::set_var("OPEN_LIMIT", "0");
        env::set_var("WORKER_IDLE_MS", "soon");
        let config = CacheConfig::from_env();
        assert_eq!(config.capacity, 4096);
        assert_eq!(config.open_limit, 64);
        assert_eq!(config.worker_idle_ms, 100);

        env::remove_var("CACHE_CAPACITY");
        env::remove_var("OPEN_LIMIT");
        env::remove_var("WORKER_IDLE_MS");
    }
}
