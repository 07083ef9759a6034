//! Simulation configuration.
//!
//! Values come from code (`with_*` builders), JSON (`from_json_str`) or the
//! process environment (`from_env`, which also loads a `.env` file).

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Prefix for environment variables read by [`SimulationConfig::from_env`].
pub const ENV_PREFIX: &str = "RESOURCE_POOL_";

/// Acquisition strategy used by a resource pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Unfair counting semaphore plus a spin lock around the busy table.
    SpinLock,
    /// FIFO-fair semaphore plus compare-and-set claims.
    #[default]
    FairSemaphore,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpinLock => write!(f, "spin_lock"),
            Self::FairSemaphore => write!(f, "fair_semaphore"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "spin_lock" | "spinlock" => Ok(Self::SpinLock),
            "fair_semaphore" | "fair" => Ok(Self::FairSemaphore),
            other => Err(format!("unknown strategy `{other}`")),
        }
    }
}

/// Parameters of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of pooled resources (N).
    pub resource_count: usize,
    /// Number of worker threads (W).
    pub worker_count: usize,
    /// Acquire/use/release cycles per worker.
    pub iterations: u64,
    /// Lower bound of the simulated use time, inclusive.
    pub min_use_ms: u64,
    /// Upper bound of the simulated use time, inclusive.
    pub max_use_ms: u64,
    /// Acquisition strategy.
    pub strategy: StrategyKind,
    /// Upper bound on how long a blocked wait goes without checking for
    /// cancellation.
    pub poll_interval_ms: u64,
    /// Stack size for worker threads in bytes.
    pub thread_stack_size: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            resource_count: 2,
            worker_count: num_cpus::get(),
            iterations: 10,
            min_use_ms: 1,
            max_use_ms: 10,
            strategy: StrategyKind::default(),
            poll_interval_ms: 5,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl SimulationConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of resources.
    #[must_use]
    pub const fn with_resource_count(mut self, count: usize) -> Self {
        self.resource_count = count;
        self
    }

    /// Set the number of workers.
    #[must_use]
    pub const fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the per-worker iteration target.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the simulated use time range in milliseconds.
    #[must_use]
    pub const fn with_use_ms(mut self, min_use_ms: u64, max_use_ms: u64) -> Self {
        self.min_use_ms = min_use_ms;
        self.max_use_ms = max_use_ms;
        self
    }

    /// Set the acquisition strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the cancellation poll interval.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.resource_count == 0 {
            return Err("resource_count must be greater than 0".into());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.min_use_ms > self.max_use_ms {
            return Err(format!(
                "min_use_ms ({}) must not exceed max_use_ms ({})",
                self.min_use_ms, self.max_use_ms
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }

    /// Parse a configuration from JSON and validate it. Missing fields take
    /// their default values.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a configuration from `RESOURCE_POOL_*` environment variables,
    /// reading a `.env` file first if one exists. Unset variables keep their
    /// default values.
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        if let Some(v) = read_var("RESOURCE_COUNT")? {
            cfg.resource_count = v;
        }
        if let Some(v) = read_var("WORKER_COUNT")? {
            cfg.worker_count = v;
        }
        if let Some(v) = read_var("ITERATIONS")? {
            cfg.iterations = v;
        }
        if let Some(v) = read_var("MIN_USE_MS")? {
            cfg.min_use_ms = v;
        }
        if let Some(v) = read_var("MAX_USE_MS")? {
            cfg.max_use_ms = v;
        }
        if let Some(v) = read_var::<StrategyKind>("STRATEGY")? {
            cfg.strategy = v;
        }
        if let Some(v) = read_var("POLL_INTERVAL_MS")? {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = read_var("THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = v;
        }

        cfg.validate()
            .map_err(anyhow::Error::msg)
            .context("invalid simulation configuration from environment")?;
        Ok(cfg)
    }
}

fn read_var<T>(suffix: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let key = format!("{ENV_PREFIX}{suffix}");
    match env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}={raw:?}: {e}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {key}")),
    }
}
