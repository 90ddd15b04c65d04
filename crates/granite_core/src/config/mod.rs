use std::path::PathBuf;

use granite_error::{DbError, DbErrorKind, Result};

/// Tunables for query execution.
///
/// Built explicitly by the caller and handed to operators at construction.
/// There is no process-global state; tests construct their own configs
/// instead of mutating shared knobs.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Approximate resident bytes a grouping operator may hold before it
    /// spills (or fails, when disk use is disallowed). The estimate is not
    /// byte-exact; treat this as a soft threshold.
    pub memory_limit_bytes: usize,
    /// Probability in (0, 1] that a memory re-estimate runs after an
    /// insert. 1.0 re-checks on every insert and is what deterministic
    /// tests use.
    pub memory_sampling_rate: f64,
    /// Directory spill partitions are written under.
    pub spill_dir: PathBuf,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            memory_limit_bytes: 100 * 1024 * 1024,
            memory_sampling_rate: 0.01,
            spill_dir: std::env::temp_dir(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.memory_sampling_rate > 0.0 && self.memory_sampling_rate <= 1.0) {
            return Err(DbError::with_kind(
                DbErrorKind::InvalidConfiguration,
                "memory sampling rate must be in (0, 1]",
            )
            .with_field("rate", self.memory_sampling_rate));
        }
        Ok(())
    }
}
