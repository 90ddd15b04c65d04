use granite_error::{DbError, Result};

use super::{Operator, Row};
use crate::execution::env::QueryEnv;

/// Leaf source yielding a fixed list of rows.
///
/// Reopening rewinds to the first row.
#[derive(Debug)]
pub struct ValuesOperator {
    rows: Vec<Row>,
    /// Position of the next row to yield. None until opened.
    cursor: Option<usize>,
}

impl ValuesOperator {
    pub fn new(rows: Vec<Row>) -> Self {
        ValuesOperator { rows, cursor: None }
    }
}

impl Operator for ValuesOperator {
    fn open(&mut self, _env: &QueryEnv, _reopen: bool) -> Result<()> {
        self.cursor = Some(0);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| DbError::new("values operator not open"))?;
        match self.rows.get(*cursor) {
            Some(row) => {
                *cursor += 1;
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operators::collect_rows;
    use crate::values::ScalarValue;

    #[test]
    fn yields_rows_then_none() {
        let rows = vec![Row::from_iter([1_i64]), Row::from_iter([2_i64])];
        let mut op = ValuesOperator::new(rows.clone());
        op.open(&QueryEnv::new(), false).unwrap();
        assert_eq!(rows, collect_rows(&mut op));
        assert_eq!(None, op.next().unwrap());
    }

    #[test]
    fn next_before_open_errors() {
        let mut op = ValuesOperator::new(Vec::new());
        assert!(op.next().is_err());
    }

    #[test]
    fn reopen_rewinds() {
        let mut op = ValuesOperator::new(vec![Row::from_iter(["x"])]);
        let env = QueryEnv::new();
        op.open(&env, false).unwrap();
        assert_eq!(1, collect_rows(&mut op).len());
        op.open(&env, true).unwrap();
        assert_eq!(
            vec![Row::new(vec![ScalarValue::from("x")])],
            collect_rows(&mut op)
        );
        op.close();
    }
}
