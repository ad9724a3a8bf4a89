//! Dispatch configuration.

use serde::Deserialize;

use crate::error::{ReactorError, ReactorResult};

/// Capacity of each dispatch lane unless configured otherwise.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Settings for a [`DispatchHub`](crate::dispatch::DispatchHub).
///
/// Every field has a default, so a JSON document only needs to name the
/// fields it overrides:
///
/// ```rust
/// use reactor_core::DispatchConfig;
///
/// let config = DispatchConfig::from_json(r#"{ "queue_capacity": 8 }"#).unwrap();
/// assert_eq!(config.queue_capacity, 8);
/// assert_eq!(config.async_workers, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Bounded capacity of the read, write and bind lanes. Producers block
    /// once a lane is full.
    pub queue_capacity: usize,

    /// Worker threads of the runtime that runs async callbacks, when the hub
    /// owns its runtime.
    pub async_workers: usize,

    /// Prefix for the names of lane consumer threads and async workers.
    pub thread_prefix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            async_workers: 2,
            thread_prefix: "reactor".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(input: &str) -> ReactorResult<Self> {
        let config: Self =
            serde_json::from_str(input).map_err(|e| ReactorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_async_workers(mut self, workers: usize) -> Self {
        self.async_workers = workers;
        self
    }

    pub fn validate(&self) -> ReactorResult<()> {
        if self.queue_capacity == 0 {
            return Err(ReactorError::Config("queue_capacity must be at least 1".into()));
        }
        if self.async_workers == 0 {
            return Err(ReactorError::Config("async_workers must be at least 1".into()));
        }
        Ok(())
    }
}
