use std::time::Duration;

use crate::error::ConfigError;

/// Default number of workers when `FANOUT_WORKER_SIZE` is unset.
const DEFAULT_WORKER_SIZE: usize = 4;

/// Initial capacity of a pooled scratch buffer (32 KB).
const DEFAULT_ARENA_BUFFER_BYTES: usize = 32 * 1024;

/// Scratch buffers that grew past this size are freed instead of pooled.
const DEFAULT_ARENA_MAX_RETAINED_BYTES: usize = 1024 * 1024;

/// Idle connections per host kept by the default HTTP client.
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Dispatcher configuration.
///
/// Use [`DispatcherConfig::new`] for programmatic defaults or
/// [`DispatcherConfig::from_env`] to read overrides from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of workers, and therefore the maximum number of calls in flight.
    pub worker_size: usize,
    /// Capacity of the job intake. `add` suspends once this many jobs wait.
    pub intake_capacity: usize,
    /// Initial capacity of each scratch buffer handed out by the arena.
    pub arena_buffer_bytes: usize,
    /// Maximum number of idle scratch buffers kept for reuse.
    pub arena_max_pooled: usize,
    /// Scratch buffers larger than this are dropped on return.
    pub arena_max_retained_bytes: usize,
    /// Total timeout applied by the default client. Unset means no timeout.
    pub request_timeout: Option<Duration>,
    /// Idle connections per host kept by the default client.
    pub pool_max_idle_per_host: usize,
}

impl DispatcherConfig {
    /// Defaults sized for `worker_size` workers.
    ///
    /// The intake and the arena are sized to the worker count so every
    /// worker can have a job queued behind it and a scratch buffer ready.
    pub fn new(worker_size: usize) -> Self {
        Self {
            worker_size,
            intake_capacity: worker_size.max(1),
            arena_buffer_bytes: DEFAULT_ARENA_BUFFER_BYTES,
            arena_max_pooled: worker_size.max(1),
            arena_max_retained_bytes: DEFAULT_ARENA_MAX_RETAINED_BYTES,
            request_timeout: None,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default         |
    /// |-----------------------------------|-----------------|
    /// | `FANOUT_WORKER_SIZE`              | `4`             |
    /// | `FANOUT_INTAKE_CAPACITY`          | worker size     |
    /// | `FANOUT_ARENA_BUFFER_BYTES`       | `32768`         |
    /// | `FANOUT_ARENA_MAX_POOLED`         | worker size     |
    /// | `FANOUT_ARENA_MAX_RETAINED_BYTES` | `1048576`       |
    /// | `FANOUT_REQUEST_TIMEOUT_MS`       | unset (none)    |
    /// | `FANOUT_POOL_MAX_IDLE_PER_HOST`   | `100`           |
    ///
    /// A capacity of `0` for the intake or the arena pool falls back to
    /// the worker size.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let worker_size = parse_var(&lookup, "FANOUT_WORKER_SIZE")?.unwrap_or(DEFAULT_WORKER_SIZE);
        let mut config = Self::new(worker_size);

        if let Some(capacity) = parse_var(&lookup, "FANOUT_INTAKE_CAPACITY")? {
            if capacity > 0 {
                config.intake_capacity = capacity;
            }
        }
        if let Some(bytes) = parse_var(&lookup, "FANOUT_ARENA_BUFFER_BYTES")? {
            config.arena_buffer_bytes = bytes;
        }
        if let Some(pooled) = parse_var(&lookup, "FANOUT_ARENA_MAX_POOLED")? {
            if pooled > 0 {
                config.arena_max_pooled = pooled;
            }
        }
        if let Some(bytes) = parse_var(&lookup, "FANOUT_ARENA_MAX_RETAINED_BYTES")? {
            config.arena_max_retained_bytes = bytes;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "FANOUT_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(idle) = parse_var(&lookup, "FANOUT_POOL_MAX_IDLE_PER_HOST")? {
            config.pool_max_idle_per_host = idle;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the dispatcher relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_size == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.intake_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "FANOUT_INTAKE_CAPACITY",
                value: "0".into(),
                reason: "capacity must be at least 1".into(),
            });
        }
        if self.arena_max_retained_bytes < self.arena_buffer_bytes {
            return Err(ConfigError::Invalid {
                var: "FANOUT_ARENA_MAX_RETAINED_BYTES",
                value: self.arena_max_retained_bytes.to_string(),
                reason: format!(
                    "must not be smaller than the scratch buffer size ({})",
                    self.arena_buffer_bytes
                ),
            });
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_SIZE)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
