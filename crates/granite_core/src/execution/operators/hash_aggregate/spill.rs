use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use granite_error::{DbError, DbErrorKind, Result};
use tracing::debug;
use uuid::Uuid;

use super::group_table::{GroupRow, GroupTable};
use crate::collation::Collator;

/// An immutable, append-only external partition of spilled groups.
///
/// Partitions are written once and only ever read back; they are never
/// mutated in place. The backing file is removed when the partition handle
/// drops, so close/cancel paths release disk space without extra
/// bookkeeping.
#[derive(Debug)]
pub struct SpillPartition {
    path: PathBuf,
    num_rows: usize,
}

impl SpillPartition {
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }
}

impl Drop for SpillPartition {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), %err, "failed to remove spill partition");
        }
    }
}

/// Writes overflow groups to external staging and recombines them with
/// resident rows at output time.
///
/// Partition format is one JSON record per line, each a full group row
/// (key plus serialized accumulator states). Spill I/O is synchronous and
/// a write failure aborts the query; there are no retries.
#[derive(Debug)]
pub struct SpillManager {
    dir: PathBuf,
}

impl SpillManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SpillManager { dir: dir.into() }
    }

    /// Write all given rows to a new partition.
    pub fn spill(&self, rows: Vec<GroupRow>) -> Result<SpillPartition> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error("create spill directory", e))?;

        let path = self.dir.join(format!("group-spill-{}.jsonl", Uuid::new_v4()));
        let file = File::create(&path).map_err(|e| io_error("create spill partition", e))?;
        let mut writer = BufWriter::new(file);
        for row in &rows {
            serde_json::to_writer(&mut writer, row)
                .map_err(|e| io_error("encode spill record", e))?;
            writer
                .write_all(b"\n")
                .map_err(|e| io_error("write spill record", e))?;
        }
        writer
            .flush()
            .map_err(|e| io_error("flush spill partition", e))?;

        debug!(rows = rows.len(), path = %path.display(), "spilled group table partition");
        Ok(SpillPartition {
            path,
            num_rows: rows.len(),
        })
    }

    /// Recombine every partition with the residual in-memory rows,
    /// yielding one row per distinct key across the whole input history.
    ///
    /// Partial states for the same key are folded together with each
    /// accumulator's merge; `agg_collations` carries the effective
    /// collation per accumulator, in declaration order. Partitions are
    /// consumed (and their files removed) by the merge.
    pub fn merge_all(
        &self,
        partitions: Vec<SpillPartition>,
        resident: Vec<GroupRow>,
        collation: Option<Arc<dyn Collator>>,
        agg_collations: &[Option<Arc<dyn Collator>>],
    ) -> Result<Vec<GroupRow>> {
        if partitions.is_empty() {
            return Ok(resident);
        }

        debug!(
            partitions = partitions.len(),
            resident = resident.len(),
            "merging spilled partitions with resident groups"
        );

        let mut table = GroupTable::new(collation);
        for row in resident {
            merge_into(&mut table, row, agg_collations)?;
        }
        for partition in &partitions {
            for row in read_partition(partition)? {
                merge_into(&mut table, row?, agg_collations)?;
            }
        }

        Ok(table.drain_all())
    }
}

fn merge_into(
    table: &mut GroupTable,
    row: GroupRow,
    agg_collations: &[Option<Arc<dyn Collator>>],
) -> Result<()> {
    let GroupRow { key, states } = row;
    let mut incoming = Some(states);
    let entry = table.upsert(&key, || incoming.take().unwrap());
    if let Some(states) = incoming {
        // Key already present, fold the partial states together.
        for ((target, other), collation) in entry.states.iter_mut().zip(states).zip(agg_collations)
        {
            target.merge(other, collation.as_deref())?;
        }
    }
    Ok(())
}

fn read_partition(
    partition: &SpillPartition,
) -> Result<impl Iterator<Item = Result<GroupRow>> + use<>> {
    let file = File::open(&partition.path).map_err(|e| io_error("open spill partition", e))?;
    let reader = BufReader::new(file);
    Ok(reader.lines().map(|line| {
        let line = line.map_err(|e| io_error("read spill record", e))?;
        serde_json::from_str(&line).map_err(|e| io_error("decode spill record", e))
    }))
}

fn io_error(msg: &'static str, err: impl std::error::Error + Send + Sync + 'static) -> DbError {
    DbError::with_kind(DbErrorKind::Io, format!("failed to {msg}")).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::aggregate::{AggregateKind, AggregateState};
    use crate::values::ScalarValue;

    fn test_dir() -> PathBuf {
        std::env::temp_dir().join(format!("granite-spill-test-{}", Uuid::new_v4()))
    }

    fn count_row(key: i64, count: i64) -> GroupRow {
        let mut state = AggregateKind::Count.init_state();
        for _ in 0..count {
            state.update(&ScalarValue::Null, None);
        }
        GroupRow {
            key: vec![ScalarValue::Int64(key)],
            states: vec![state],
        }
    }

    fn counts(rows: &[GroupRow]) -> Vec<(ScalarValue, ScalarValue)> {
        let mut out: Vec<_> = rows
            .iter()
            .map(|row| (row.key[0].clone(), row.states[0].finalize()))
            .collect();
        out.sort_by(|a, b| crate::values::compare::cmp_values(&a.0, &b.0, None));
        out
    }

    #[test]
    fn spill_roundtrip() {
        let dir = test_dir();
        let manager = SpillManager::new(&dir);
        let partition = manager.spill(vec![count_row(1, 2), count_row(2, 1)]).unwrap();
        assert_eq!(2, partition.num_rows());

        let rows: Vec<GroupRow> = read_partition(&partition)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            vec![
                (ScalarValue::Int64(1), ScalarValue::Int64(2)),
                (ScalarValue::Int64(2), ScalarValue::Int64(1)),
            ],
            counts(&rows)
        );

        drop(partition);
        let _ = fs::remove_dir(&dir);
    }

    #[test]
    fn merge_combines_states_across_partitions_and_resident() {
        let dir = test_dir();
        let manager = SpillManager::new(&dir);

        let p1 = manager.spill(vec![count_row(1, 2), count_row(2, 1)]).unwrap();
        let p2 = manager.spill(vec![count_row(1, 3), count_row(3, 4)]).unwrap();
        let resident = vec![count_row(2, 5)];

        let merged = manager
            .merge_all(vec![p1, p2], resident, None, &[None])
            .unwrap();
        assert_eq!(
            vec![
                (ScalarValue::Int64(1), ScalarValue::Int64(5)),
                (ScalarValue::Int64(2), ScalarValue::Int64(6)),
                (ScalarValue::Int64(3), ScalarValue::Int64(4)),
            ],
            counts(&merged)
        );
        let _ = fs::remove_dir(&dir);
    }

    #[test]
    fn no_partitions_passes_resident_through() {
        let manager = SpillManager::new(test_dir());
        let merged = manager
            .merge_all(Vec::new(), vec![count_row(7, 1)], None, &[None])
            .unwrap();
        assert_eq!(1, merged.len());
    }

    #[test]
    fn dropping_partition_removes_file() {
        let dir = test_dir();
        let manager = SpillManager::new(&dir);
        let partition = manager.spill(vec![count_row(1, 1)]).unwrap();
        let path = partition.path.clone();
        assert!(path.exists());
        drop(partition);
        assert!(!path.exists());
        let _ = fs::remove_dir(&dir);
    }
}
