//! Buffer configuration and tuning constants.
//!
//! These constants define the fundamental parameters of the segmented
//! buffer. They are the single source of truth; everything else derives
//! its defaults from here.

use crate::error::{BufferError, BufferResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of slots per segment.
///
/// New segments are allocated with this capacity unless the caller asked
/// for a specific one. 1024 slots keeps segment turnover low for typical
/// streaming rates without holding large slabs hostage to slow readers.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 1024;

/// Default pruner sweep interval in milliseconds.
pub const DEFAULT_PRUNE_INTERVAL_MS: u64 = 2000;

/// Default number of segments each pruner worker owns per sweep.
pub const DEFAULT_PRUNE_REGION: usize = 64;

/// Default upper bound on pruner worker parallelism.
pub const DEFAULT_MAX_PRUNE_WORKERS: usize = 8;

/// Tuning knobs for a dispatcher instance.
///
/// # TOML Example
///
/// ```toml
/// segment_capacity = 512
/// prune_interval_ms = 500
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Slots per newly allocated segment.
    #[serde(default = "default_segment_capacity")]
    pub segment_capacity: usize,

    /// Milliseconds between pruner sweeps.
    #[serde(default = "default_prune_interval_ms")]
    pub prune_interval_ms: u64,

    /// Segments per pruner worker; worker count grows with the list.
    #[serde(default = "default_prune_region")]
    pub prune_region: usize,

    /// Upper bound on pruner worker parallelism.
    #[serde(default = "default_max_prune_workers")]
    pub max_prune_workers: usize,
}

fn default_segment_capacity() -> usize {
    DEFAULT_SEGMENT_CAPACITY
}

fn default_prune_interval_ms() -> u64 {
    DEFAULT_PRUNE_INTERVAL_MS
}

fn default_prune_region() -> usize {
    DEFAULT_PRUNE_REGION
}

fn default_max_prune_workers() -> usize {
    DEFAULT_MAX_PRUNE_WORKERS
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            prune_interval_ms: DEFAULT_PRUNE_INTERVAL_MS,
            prune_region: DEFAULT_PRUNE_REGION,
            max_prune_workers: DEFAULT_MAX_PRUNE_WORKERS,
        }
    }
}

impl BufferConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidConfig`] if:
    /// - `segment_capacity` is zero
    /// - `prune_region` is zero
    /// - `max_prune_workers` is zero
    pub fn validate(&self) -> BufferResult<()> {
        if self.segment_capacity == 0 {
            return Err(BufferError::InvalidConfig {
                reason: "segment_capacity must be at least 1".to_string(),
            });
        }
        if self.prune_region == 0 {
            return Err(BufferError::InvalidConfig {
                reason: "prune_region must be at least 1".to_string(),
            });
        }
        if self.max_prune_workers == 0 {
            return Err(BufferError::InvalidConfig {
                reason: "max_prune_workers must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The pruner sweep interval as a [`Duration`].
    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }
}
