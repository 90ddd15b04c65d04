use granite_error::{DbError, DbErrorKind, Result};
use rand::Rng;
use tracing::trace;

use super::group_table::GroupTable;
use crate::config::ExecutionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryVerdict {
    /// Within budget (or the sample was skipped this round).
    Ok,
    /// Budget exceeded, the table should be flushed to disk before the
    /// next record is processed.
    Spill,
}

/// Watches the group table's approximate footprint against a byte budget.
///
/// Re-estimating the table size walks every resident row, so the check is
/// sampled: after each insert the estimate reruns with probability
/// `sampling_rate`. A rate of 1.0 re-checks deterministically on every
/// insert, which tests rely on. Exceeding the budget is an error when disk
/// use is disallowed; otherwise it is a signal to spill.
#[derive(Debug)]
pub struct MemoryChecker {
    limit_bytes: usize,
    sampling_rate: f64,
    allow_disk_use: bool,
}

impl MemoryChecker {
    pub fn new(config: &ExecutionConfig, allow_disk_use: bool) -> Self {
        MemoryChecker {
            limit_bytes: config.memory_limit_bytes,
            sampling_rate: config.memory_sampling_rate,
            allow_disk_use,
        }
    }

    pub fn check(&self, table: &GroupTable) -> Result<MemoryVerdict> {
        if self.sampling_rate < 1.0 && !rand::rng().random_bool(self.sampling_rate) {
            return Ok(MemoryVerdict::Ok);
        }

        let estimated = table.estimated_size();
        trace!(estimated, limit = self.limit_bytes, "sampled group table size");
        if estimated <= self.limit_bytes {
            return Ok(MemoryVerdict::Ok);
        }

        if !self.allow_disk_use {
            return Err(DbError::with_kind(
                DbErrorKind::ResourceExhaustion,
                "group table exceeded memory limit and disk use is disallowed",
            )
            .with_field("estimated_bytes", estimated)
            .with_field("limit_bytes", self.limit_bytes));
        }

        Ok(MemoryVerdict::Spill)
    }
}
