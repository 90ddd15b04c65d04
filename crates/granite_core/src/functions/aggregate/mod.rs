use std::cmp::Ordering;
use std::mem::size_of;

use granite_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::collation::Collator;
use crate::values::compare::cmp_values;
use crate::values::ScalarValue;

/// The closed set of accumulator functions.
///
/// The set is fixed and known at compile time, so dispatch is over this
/// tagged variant rather than an open function registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
    CollMin,
    CollMax,
    AddToSet,
    CollAddToSet,
}

impl AggregateKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::CollMin => "collMin",
            Self::CollMax => "collMax",
            Self::AddToSet => "addToSet",
            Self::CollAddToSet => "collAddToSet",
        }
    }

    /// The coll-prefixed variants always apply their own supplied collation,
    /// regardless of the operator's ambient collation binding.
    pub const fn requires_own_collation(&self) -> bool {
        matches!(self, Self::CollMin | Self::CollMax | Self::CollAddToSet)
    }

    pub fn init_state(&self) -> AggregateState {
        match self {
            Self::Count => AggregateState::Count(0),
            Self::Sum => AggregateState::Sum(SumState::default()),
            Self::Min | Self::CollMin => AggregateState::Min(ExtremumState::default()),
            Self::Max | Self::CollMax => AggregateState::Max(ExtremumState::default()),
            Self::AddToSet | Self::CollAddToSet => AggregateState::Set(SetState::default()),
        }
    }
}

/// Per-group accumulator state.
///
/// Folding inputs in any order, or merging partial states in any order,
/// yields the same finalized value (modulo float associativity for sums).
/// Merging is only exercised when spilled partitions are recombined with
/// resident partial results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AggregateState {
    Count(i64),
    Sum(SumState),
    Min(ExtremumState),
    Max(ExtremumState),
    Set(SetState),
}

impl AggregateState {
    /// Fold one input value into this state.
    pub fn update(&mut self, input: &ScalarValue, collation: Option<&dyn Collator>) {
        match self {
            Self::Count(n) => *n += 1,
            Self::Sum(state) => state.add(input),
            Self::Min(state) => state.keep(input, collation, Ordering::Less),
            Self::Max(state) => state.keep(input, collation, Ordering::Greater),
            Self::Set(state) => state.insert(input, collation),
        }
    }

    /// Combine a partial state for the same key into this one.
    pub fn merge(&mut self, other: AggregateState, collation: Option<&dyn Collator>) -> Result<()> {
        match (self, other) {
            (Self::Count(n), Self::Count(m)) => *n += m,
            (Self::Sum(a), Self::Sum(b)) => a.combine(b),
            (Self::Min(a), Self::Min(b)) => a.combine(b, collation, Ordering::Less),
            (Self::Max(a), Self::Max(b)) => a.combine(b, collation, Ordering::Greater),
            (Self::Set(a), Self::Set(b)) => a.combine(b, collation),
            (this, other) => {
                return Err(DbError::new("mismatched accumulator states in merge")
                    .with_field("left", format!("{this:?}"))
                    .with_field("right", format!("{other:?}")));
            }
        }
        Ok(())
    }

    /// Produce the emitted output value. Non-destructive so seek mode can
    /// re-finalize the same resident group across reopens.
    pub fn finalize(&self) -> ScalarValue {
        match self {
            Self::Count(n) => ScalarValue::Int64(*n),
            Self::Sum(state) => state.total(),
            Self::Min(state) | Self::Max(state) => state
                .best
                .clone()
                .unwrap_or(ScalarValue::Null),
            Self::Set(state) => state.materialize(),
        }
    }

    /// Approximate resident bytes of this state, heap payloads included.
    pub fn estimated_size(&self) -> usize {
        let heap = match self {
            Self::Count(_) | Self::Sum(_) => 0,
            Self::Min(state) | Self::Max(state) => state
                .best
                .as_ref()
                .map(|v| v.estimated_size())
                .unwrap_or(0),
            Self::Set(state) => state.elems.iter().map(|v| v.estimated_size()).sum(),
        };
        size_of::<AggregateState>() + heap
    }
}

/// Running sum with native numeric promotion: integer addition until an
/// overflow or a float input forces promotion to double.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SumState {
    Int(i64),
    Float(f64),
}

impl Default for SumState {
    fn default() -> Self {
        SumState::Int(0)
    }
}

impl SumState {
    fn add(&mut self, input: &ScalarValue) {
        // Non-numeric inputs are ignored rather than poisoning the sum.
        let rhs = match input {
            ScalarValue::Int32(v) => SumState::Int(i64::from(*v)),
            ScalarValue::Int64(v) => SumState::Int(*v),
            ScalarValue::Float64(v) => SumState::Float(*v),
            _ => return,
        };
        self.combine(rhs);
    }

    fn combine(&mut self, other: SumState) {
        *self = match (&*self, other) {
            (SumState::Int(a), SumState::Int(b)) => match a.checked_add(b) {
                Some(total) => SumState::Int(total),
                None => SumState::Float(*a as f64 + b as f64),
            },
            (SumState::Int(a), SumState::Float(b)) => SumState::Float(*a as f64 + b),
            (SumState::Float(a), SumState::Int(b)) => SumState::Float(a + b as f64),
            (SumState::Float(a), SumState::Float(b)) => SumState::Float(a + b),
        };
    }

    fn total(&self) -> ScalarValue {
        match self {
            SumState::Int(v) => ScalarValue::Int64(*v),
            SumState::Float(v) => ScalarValue::Float64(*v),
        }
    }
}

/// Running extremum. Direction comes from the enclosing variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtremumState {
    best: Option<ScalarValue>,
}

impl ExtremumState {
    fn keep(&mut self, input: &ScalarValue, collation: Option<&dyn Collator>, want: Ordering) {
        match &self.best {
            Some(best) if cmp_values(input, best, collation) != want => {}
            _ => self.best = Some(input.clone()),
        }
    }

    fn combine(&mut self, other: ExtremumState, collation: Option<&dyn Collator>, want: Ordering) {
        if let Some(value) = other.best {
            self.keep(&value, collation, want);
        }
    }
}

/// Deduplicated set of inputs, kept sorted under the set's collation so
/// membership checks are logarithmic and output order is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetState {
    elems: Vec<ScalarValue>,
}

impl SetState {
    fn insert(&mut self, input: &ScalarValue, collation: Option<&dyn Collator>) {
        match self
            .elems
            .binary_search_by(|probe| cmp_values(probe, input, collation))
        {
            // Equal under the collation, already represented.
            Ok(_) => {}
            Err(pos) => self.elems.insert(pos, input.clone()),
        }
    }

    fn combine(&mut self, other: SetState, collation: Option<&dyn Collator>) {
        for value in &other.elems {
            self.insert(value, collation);
        }
    }

    fn materialize(&self) -> ScalarValue {
        ScalarValue::List(self.elems.clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.elems.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::CaseInsensitiveCollator;

    fn fold(kind: AggregateKind, inputs: &[ScalarValue], collation: Option<&dyn Collator>) -> AggregateState {
        let mut state = kind.init_state();
        for input in inputs {
            state.update(input, collation);
        }
        state
    }

    #[test]
    fn sum_promotes_on_float_input() {
        let inputs = [
            ScalarValue::Int32(1),
            ScalarValue::Int64(2),
            ScalarValue::Float64(0.5),
        ];
        let state = fold(AggregateKind::Sum, &inputs, None);
        assert_eq!(ScalarValue::Float64(3.5), state.finalize());
    }

    #[test]
    fn sum_promotes_on_overflow() {
        let inputs = [ScalarValue::Int64(i64::MAX), ScalarValue::Int64(1)];
        let state = fold(AggregateKind::Sum, &inputs, None);
        match state.finalize() {
            ScalarValue::Float64(total) => assert!(total > i64::MAX as f64 - 2.0),
            other => panic!("expected float sum, got {other:?}"),
        }
    }

    #[test]
    fn extremums_diverge_under_collation() {
        let inputs: Vec<ScalarValue> = ["D", "a", "F", "e", "B", "c"]
            .iter()
            .map(|s| ScalarValue::from(*s))
            .collect();
        let collator = CaseInsensitiveCollator;

        let min = fold(AggregateKind::Min, &inputs, None);
        let max = fold(AggregateKind::Max, &inputs, None);
        assert_eq!(ScalarValue::from("B"), min.finalize());
        assert_eq!(ScalarValue::from("e"), max.finalize());

        let coll_min = fold(AggregateKind::CollMin, &inputs, Some(&collator));
        let coll_max = fold(AggregateKind::CollMax, &inputs, Some(&collator));
        assert_eq!(ScalarValue::from("a"), coll_min.finalize());
        assert_eq!(ScalarValue::from("F"), coll_max.finalize());
    }

    #[test]
    fn set_dedups_under_collation() {
        let inputs: Vec<ScalarValue> = [
            "cc", "BB", "Aa", "Bb", "dD", "aA", "CC", "AA", "Dd", "cC", "bb", "DD",
        ]
        .iter()
        .map(|s| ScalarValue::from(*s))
        .collect();
        let collator = CaseInsensitiveCollator;

        let state = fold(AggregateKind::CollAddToSet, &inputs, Some(&collator));
        match &state {
            AggregateState::Set(set) => assert_eq!(4, set.len()),
            other => panic!("expected set state, got {other:?}"),
        }

        let uncollated = fold(AggregateKind::AddToSet, &inputs, None);
        match &uncollated {
            AggregateState::Set(set) => assert_eq!(12, set.len()),
            other => panic!("expected set state, got {other:?}"),
        }
    }

    #[test]
    fn merge_matches_direct_fold() {
        // 9 appears on both sides so set merge has to dedup across states.
        let first = [ScalarValue::Int64(5), ScalarValue::Int64(9)];
        let second = [ScalarValue::Int64(2), ScalarValue::Int64(9)];

        let kinds = [
            AggregateKind::Count,
            AggregateKind::Sum,
            AggregateKind::Min,
            AggregateKind::Max,
            AggregateKind::AddToSet,
        ];
        for kind in kinds {
            let mut merged = fold(kind, &first, None);
            merged.merge(fold(kind, &second, None), None).unwrap();

            let all: Vec<_> = first.iter().chain(&second).cloned().collect();
            let direct = fold(kind, &all, None);
            assert_eq!(
                direct.finalize(),
                merged.finalize(),
                "kind {}",
                kind.name()
            );
        }
    }

    #[test]
    fn collated_merge_matches_direct_fold() {
        let collator = CaseInsensitiveCollator;
        let first: Vec<ScalarValue> =
            ["D", "a", "F"].iter().map(|s| ScalarValue::from(*s)).collect();
        // "f" collates equal to "F" on the other side.
        let second: Vec<ScalarValue> =
            ["e", "B", "f"].iter().map(|s| ScalarValue::from(*s)).collect();

        let kinds = [
            AggregateKind::CollMin,
            AggregateKind::CollMax,
            AggregateKind::CollAddToSet,
        ];
        for kind in kinds {
            let mut merged = fold(kind, &first, Some(&collator));
            merged
                .merge(fold(kind, &second, Some(&collator)), Some(&collator))
                .unwrap();

            let all: Vec<_> = first.iter().chain(&second).cloned().collect();
            let direct = fold(kind, &all, Some(&collator));
            assert_eq!(
                direct.finalize(),
                merged.finalize(),
                "kind {}",
                kind.name()
            );
        }
    }

    #[test]
    fn merge_rejects_mismatched_states() {
        let mut count = AggregateKind::Count.init_state();
        let sum = AggregateKind::Sum.init_state();
        assert!(count.merge(sum, None).is_err());
    }

    #[test]
    fn set_output_is_sorted() {
        let inputs = [
            ScalarValue::Int64(3),
            ScalarValue::Int64(1),
            ScalarValue::Int64(2),
            ScalarValue::Int64(1),
        ];
        let state = fold(AggregateKind::AddToSet, &inputs, None);
        assert_eq!(
            ScalarValue::List(vec![
                ScalarValue::Int64(1),
                ScalarValue::Int64(2),
                ScalarValue::Int64(3),
            ]),
            state.finalize()
        );
    }
}
