pub mod hash_aggregate;
pub mod values;

use std::fmt::Debug;

use granite_error::{DbError, Result};

use crate::execution::env::QueryEnv;
use crate::values::ScalarValue;

/// A single record flowing between operators.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<ScalarValue>,
}

impl Row {
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Row { values }
    }

    pub fn column(&self, idx: usize) -> Result<&ScalarValue> {
        self.values
            .get(idx)
            .ok_or_else(|| DbError::new("row column out of bounds").with_field("column", idx))
    }
}

impl<V: Into<ScalarValue>> FromIterator<V> for Row {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Row::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Pull-model execution operator.
///
/// Lifecycle: `open` prepares the operator (and may consume the entire
/// child input for blocking operators), `next` yields one row per call
/// until it returns `None`, `close` releases all resources. `close` is
/// idempotent and valid in any state, including before the first `open`.
///
/// `open` with `reopen = true` re-runs the operator against already
/// materialized state where the operator supports it, re-reading any
/// correlated bindings from the environment.
///
/// Everything is single-threaded and synchronous: all work, including any
/// spill I/O, happens inside the caller's `open`/`next` invocations.
pub trait Operator: Debug {
    fn open(&mut self, env: &QueryEnv, reopen: bool) -> Result<()>;

    fn next(&mut self) -> Result<Option<Row>>;

    fn close(&mut self);
}

#[cfg(test)]
pub(crate) fn collect_rows(op: &mut dyn Operator) -> Vec<Row> {
    let mut out = Vec::new();
    while let Some(row) = op.next().unwrap() {
        out.push(row);
    }
    out
}
