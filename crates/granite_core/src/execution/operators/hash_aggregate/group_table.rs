use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use hashbrown::raw::RawTable;
use serde::{Deserialize, Serialize};

use crate::collation::Collator;
use crate::functions::aggregate::AggregateState;
use crate::values::compare::{eq_keys, ValueComparator};
use crate::values::ScalarValue;

/// Accounting overhead charged per resident group for the index entry and
/// allocator slack. Deliberately coarse; the memory threshold is a soft
/// limit.
const PER_GROUP_OVERHEAD: usize = 16;

/// One group's key and its accumulator states, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRow {
    pub key: Vec<ScalarValue>,
    pub states: Vec<AggregateState>,
}

impl GroupRow {
    pub fn estimated_size(&self) -> usize {
        let key: usize = self.key.iter().map(|v| v.estimated_size()).sum();
        let states: usize = self.states.iter().map(|s| s.estimated_size()).sum();
        size_of::<GroupRow>() + key + states + PER_GROUP_OVERHEAD
    }
}

/// In-memory associative table from composite group key to accumulator
/// states.
///
/// Linear-probing raw table over a row arena. Key identity goes through
/// the comparator so that an active collation applies to both hashing and
/// equality; two keys equal under the collation land in the same group.
pub struct GroupTable {
    comparator: ValueComparator,
    collation: Option<Arc<dyn Collator>>,
    /// Index from key hash to offset in `rows`.
    index: RawTable<usize>,
    rows: Vec<GroupRow>,
}

impl GroupTable {
    pub fn new(collation: Option<Arc<dyn Collator>>) -> Self {
        GroupTable {
            comparator: ValueComparator::new(),
            collation,
            index: RawTable::new(),
            rows: Vec::new(),
        }
    }

    pub fn num_groups(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the row for `key`, creating it with `init` on first sight.
    pub fn upsert(
        &mut self,
        key: &[ScalarValue],
        init: impl FnOnce() -> Vec<AggregateState>,
    ) -> &mut GroupRow {
        let collation = self.collation.as_deref();
        let hash = self.comparator.hash_key(key, collation);

        let rows = &self.rows;
        let idx = match self.index.get(hash, |&i| eq_keys(&rows[i].key, key, collation)) {
            Some(&i) => i,
            None => {
                let i = self.rows.len();
                self.rows.push(GroupRow {
                    key: key.to_vec(),
                    states: init(),
                });
                let rows = &self.rows;
                let comparator = &self.comparator;
                self.index
                    .insert(hash, i, |&j| comparator.hash_key(&rows[j].key, collation));
                i
            }
        };
        &mut self.rows[idx]
    }

    /// Point lookup, non-destructive. Used by seek mode, which retains the
    /// table across reopens.
    pub fn lookup_one(&self, key: &[ScalarValue]) -> Option<&GroupRow> {
        let collation = self.collation.as_deref();
        let hash = self.comparator.hash_key(key, collation);
        let rows = &self.rows;
        self.index
            .get(hash, |&i| eq_keys(&rows[i].key, key, collation))
            .map(|&i| &rows[i])
    }

    /// Approximate resident bytes of all rows, keys and states included.
    pub fn estimated_size(&self) -> usize {
        self.rows.iter().map(|row| row.estimated_size()).sum()
    }

    /// Remove and return every resident row, leaving the table empty but
    /// reusable. Used for normal output and for flushing into a spill
    /// partition.
    pub fn drain_all(&mut self) -> Vec<GroupRow> {
        self.index.clear();
        std::mem::take(&mut self.rows)
    }
}

impl fmt::Debug for GroupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupTable")
            .field("num_groups", &self.rows.len())
            .field("collation", &self.collation)
            .finish_non_exhaustive()
    }
}
