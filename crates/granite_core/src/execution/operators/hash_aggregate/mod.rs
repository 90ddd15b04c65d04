pub mod group_table;
pub mod memory;
pub mod spill;

use std::sync::Arc;
use std::vec;

use granite_error::{DbError, DbErrorKind, Result};
use tracing::debug;

use self::group_table::{GroupRow, GroupTable};
use self::memory::{MemoryChecker, MemoryVerdict};
use self::spill::{SpillManager, SpillPartition};
use super::{Operator, Row};
use crate::collation::Collator;
use crate::config::ExecutionConfig;
use crate::execution::env::{QueryEnv, SlotId};
use crate::functions::aggregate::AggregateKind;
use crate::values::ScalarValue;

/// One accumulator expression: the function, the child row column it
/// folds, and (for the coll-prefixed functions) the collation it always
/// applies regardless of the operator's ambient collation binding.
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub kind: AggregateKind,
    pub input: usize,
    pub collation: Option<Arc<dyn Collator>>,
}

impl AggregateExpr {
    pub fn new(kind: AggregateKind, input: usize) -> Self {
        AggregateExpr {
            kind,
            input,
            collation: None,
        }
    }

    pub fn with_collation(kind: AggregateKind, input: usize, collation: Arc<dyn Collator>) -> Self {
        AggregateExpr {
            kind,
            input,
            collation: Some(collation),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unopened,
    Consuming,
    Outputting,
    Exhausted,
    Closed,
}

/// Hash-based grouping/aggregation operator.
///
/// Blocking: the first `open` pulls the child to exhaustion, folding every
/// record into the group table, then switches to the output phase which
/// emits one finalized row per distinct group. Overflow groups spill to
/// external partitions when `allow_disk_use` is set and the memory budget
/// is exceeded; spilling changes nothing about the emitted groups.
///
/// When seek slots are configured, the output phase is restricted to the
/// single group matching the externally bound key. Reopening re-reads the
/// (possibly rebound) seek key and replays only the output phase against
/// the retained table; seek mode therefore cannot be combined with disk
/// use, which is rejected at construction.
#[derive(Debug)]
pub struct HashAggOperator {
    child: Box<dyn Operator>,
    group_columns: Vec<usize>,
    aggregates: Vec<AggregateExpr>,
    seek_slots: Vec<SlotId>,
    allow_disk_use: bool,
    checker: MemoryChecker,
    spill_manager: SpillManager,

    phase: Phase,
    input_consumed: bool,
    table: GroupTable,
    partitions: Vec<SpillPartition>,
    spill_events: u64,
    /// Ambient collation captured from the environment at open.
    collation: Option<Arc<dyn Collator>>,
    /// Effective collation per aggregate, in declaration order.
    agg_collations: Vec<Option<Arc<dyn Collator>>>,
    output: vec::IntoIter<GroupRow>,
    seek_output: Option<Row>,
}

impl HashAggOperator {
    pub fn try_new(
        child: Box<dyn Operator>,
        group_columns: Vec<usize>,
        aggregates: Vec<AggregateExpr>,
        seek_slots: Vec<SlotId>,
        allow_disk_use: bool,
        config: ExecutionConfig,
    ) -> Result<Self> {
        config.validate()?;

        if !seek_slots.is_empty() {
            if allow_disk_use {
                return Err(DbError::with_kind(
                    DbErrorKind::InvalidConfiguration,
                    "seek mode cannot be combined with disk use for aggregation",
                ));
            }
            if seek_slots.len() != group_columns.len() {
                return Err(DbError::with_kind(
                    DbErrorKind::InvalidConfiguration,
                    "seek key arity does not match group key arity",
                )
                .with_field("seek_slots", seek_slots.len())
                .with_field("group_columns", group_columns.len()));
            }
        }

        for agg in &aggregates {
            if agg.kind.requires_own_collation() && agg.collation.is_none() {
                return Err(DbError::with_kind(
                    DbErrorKind::InvalidConfiguration,
                    "accumulator requires a collation",
                )
                .with_field("accumulator", agg.kind.name()));
            }
        }

        Ok(HashAggOperator {
            child,
            group_columns,
            aggregates,
            seek_slots,
            allow_disk_use,
            checker: MemoryChecker::new(&config, allow_disk_use),
            spill_manager: SpillManager::new(config.spill_dir.clone()),
            phase: Phase::Unopened,
            input_consumed: false,
            table: GroupTable::new(None),
            partitions: Vec::new(),
            spill_events: 0,
            collation: None,
            agg_collations: Vec::new(),
            output: Vec::new().into_iter(),
            seek_output: None,
        })
    }

    /// Number of times the resident table was flushed to a spill partition.
    pub fn spill_events(&self) -> u64 {
        self.spill_events
    }

    fn seek_enabled(&self) -> bool {
        !self.seek_slots.is_empty()
    }

    fn reset(&mut self) {
        self.table = GroupTable::new(None);
        self.partitions.clear();
        self.spill_events = 0;
        self.collation = None;
        self.agg_collations = Vec::new();
        self.output = Vec::new().into_iter();
        self.seek_output = None;
        self.input_consumed = false;
    }

    /// Pull the child to exhaustion, folding every record into the table.
    fn consume_input(&mut self, env: &QueryEnv) -> Result<()> {
        self.child.open(env, false)?;
        while let Some(row) = self.child.next()? {
            let key = self
                .group_columns
                .iter()
                .map(|&col| row.column(col).cloned())
                .collect::<Result<Vec<_>>>()?;

            let aggregates = &self.aggregates;
            let entry = self.table.upsert(&key, || {
                aggregates.iter().map(|agg| agg.kind.init_state()).collect()
            });
            for ((state, agg), collation) in entry
                .states
                .iter_mut()
                .zip(aggregates)
                .zip(&self.agg_collations)
            {
                state.update(row.column(agg.input)?, collation.as_deref());
            }

            match self.checker.check(&self.table)? {
                MemoryVerdict::Ok => {}
                MemoryVerdict::Spill => {
                    let rows = self.table.drain_all();
                    self.partitions.push(self.spill_manager.spill(rows)?);
                    self.spill_events += 1;
                }
            }
        }
        self.child.close();

        debug!(
            groups = self.table.num_groups(),
            spill_events = self.spill_events,
            "hash aggregate consumed input"
        );
        Ok(())
    }

    fn read_seek_key(&self, env: &QueryEnv) -> Result<Vec<ScalarValue>> {
        self.seek_slots
            .iter()
            .map(|&slot| env.slot(slot).cloned())
            .collect()
    }

    fn finalize_group(&self, group: &GroupRow) -> Row {
        let mut values = group.key.clone();
        values.extend(group.states.iter().map(|state| state.finalize()));
        Row::new(values)
    }
}

impl Operator for HashAggOperator {
    fn open(&mut self, env: &QueryEnv, reopen: bool) -> Result<()> {
        // A seek-mode reopen replays only the output phase; everything else
        // aggregates the input from scratch.
        let replay_only = reopen && self.seek_enabled() && self.input_consumed;
        if !replay_only {
            self.reset();
            self.collation = env.collation();
            self.agg_collations = self
                .aggregates
                .iter()
                .map(|agg| {
                    if agg.kind.requires_own_collation() {
                        agg.collation.clone()
                    } else {
                        self.collation.clone()
                    }
                })
                .collect();
            self.table = GroupTable::new(self.collation.clone());

            self.phase = Phase::Consuming;
            self.consume_input(env)?;
            self.input_consumed = true;
        }

        if self.seek_enabled() {
            // Unreachable while construction rejects seek + disk use; kept
            // as a hard error because seeking into unindexed partitions
            // cannot be satisfied.
            if !self.partitions.is_empty() {
                return Err(DbError::with_kind(
                    DbErrorKind::InvalidConfiguration,
                    "cannot seek into spilled aggregation state",
                ));
            }
            let key = self.read_seek_key(env)?;
            self.seek_output = self
                .table
                .lookup_one(&key)
                .map(|group| self.finalize_group(group));
        } else {
            let resident = self.table.drain_all();
            let partitions = std::mem::take(&mut self.partitions);
            let merged = self.spill_manager.merge_all(
                partitions,
                resident,
                self.collation.clone(),
                &self.agg_collations,
            )?;
            self.output = merged.into_iter();
        }

        self.phase = Phase::Outputting;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        match self.phase {
            Phase::Outputting => {
                let row = if self.seek_enabled() {
                    self.seek_output.take()
                } else {
                    self.output.next().map(|group| self.finalize_group(&group))
                };
                match row {
                    Some(row) => Ok(Some(row)),
                    None => {
                        self.phase = Phase::Exhausted;
                        Ok(None)
                    }
                }
            }
            Phase::Exhausted => Ok(None),
            Phase::Consuming => Err(DbError::new("hash aggregate pulled while consuming input")),
            Phase::Unopened | Phase::Closed => Err(DbError::new("hash aggregate not open")),
        }
    }

    fn close(&mut self) {
        self.child.close();
        self.reset();
        self.phase = Phase::Closed;
    }
}
