use crate::error::EngineError;
use std::{env, thread};

/// Configuration of an [`crate::engine::Engine`].
///
/// `workers` follows the usual convention for pool sizes:
/// - `0` disables the pool and every unit of work runs in the caller's
///   thread;
/// - a positive value is the exact number of pool threads;
/// - a negative value means "all available cores minus `|workers|`",
///   floored at zero.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Requested number of pool workers.
    pub workers: isize,
    /// Prefix of pool thread names; threads are named `{prefix}-{index}`.
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            thread_name: "cdg-worker".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Environment variable read by [`Self::from_env`].
    pub const WORKERS_ENV: &'static str = "CDG_WORKERS";

    /// Local-only execution: no pool.
    pub fn local() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: isize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Default configuration with `workers` overridden by `CDG_WORKERS` when
    /// that variable is set.
    ///
    /// # Errors
    /// If the variable is set but is not an integer.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();
        if let Ok(raw) = env::var(Self::WORKERS_ENV) {
            config.workers = raw.trim().parse().map_err(|_| EngineError::InvalidWorkerCount {
                variable: Self::WORKERS_ENV,
                value: raw.clone(),
            })?;
        }
        Ok(config)
    }

    /// Number of pool threads this configuration asks for on this machine.
    pub fn resolved_workers(&self) -> usize {
        let available = thread::available_parallelism().map_or(1, |n| n.get());
        resolve_workers(self.workers, available)
    }
}

/// Resolve a requested worker count against the number of available cores.
#[must_use]
pub fn resolve_workers(requested: isize, available: usize) -> usize {
    if requested >= 0 {
        requested.unsigned_abs()
    } else {
        available.saturating_sub(requested.unsigned_abs())
    }
}
