use std::cmp::Ordering;
use std::hash::{BuildHasher, Hasher};

use crate::collation::Collator;
use crate::values::ScalarValue;

/// Supplies hashing, equality, and three-way comparison for scalar values,
/// optionally under an injected collation.
///
/// The three operations are mutually consistent: if two values compare
/// equal (under the same optional collation) they hash identically. The
/// hash seed is per-instance, so hashes are only comparable when produced
/// by the same comparator.
#[derive(Debug)]
pub struct ValueComparator {
    state: ahash::RandomState,
}

impl Default for ValueComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueComparator {
    pub fn new() -> Self {
        ValueComparator {
            state: ahash::RandomState::new(),
        }
    }

    /// Hash a composite key, component-wise.
    pub fn hash_key(&self, key: &[ScalarValue], collation: Option<&dyn Collator>) -> u64 {
        let mut hasher = self.state.build_hasher();
        for value in key {
            hash_value_into(&mut hasher, value, collation);
        }
        hasher.finish()
    }

    pub fn hash_value(&self, value: &ScalarValue, collation: Option<&dyn Collator>) -> u64 {
        let mut hasher = self.state.build_hasher();
        hash_value_into(&mut hasher, value, collation);
        hasher.finish()
    }
}

/// Compare two composite keys component-wise.
pub fn cmp_keys(a: &[ScalarValue], b: &[ScalarValue], collation: Option<&dyn Collator>) -> Ordering {
    for (left, right) in a.iter().zip(b) {
        match cmp_values(left, right, collation) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

pub fn eq_keys(a: &[ScalarValue], b: &[ScalarValue], collation: Option<&dyn Collator>) -> bool {
    a.len() == b.len() && cmp_keys(a, b, collation) == Ordering::Equal
}

pub fn eq_values(a: &ScalarValue, b: &ScalarValue, collation: Option<&dyn Collator>) -> bool {
    cmp_values(a, b, collation) == Ordering::Equal
}

/// Total order over scalar values.
///
/// Values of different types order by type rank; numerics of any width
/// compare against each other by numeric value; strings compare under the
/// collation when one is supplied.
pub fn cmp_values(a: &ScalarValue, b: &ScalarValue, collation: Option<&dyn Collator>) -> Ordering {
    use ScalarValue as V;
    match (a, b) {
        (V::Null, V::Null) => Ordering::Equal,
        (V::Boolean(l), V::Boolean(r)) => l.cmp(r),
        (V::Utf8(l), V::Utf8(r)) => match collation {
            Some(collator) => collator.compare(l, r),
            None => l.cmp(r),
        },
        (V::List(l), V::List(r)) => {
            for (lv, rv) in l.iter().zip(r) {
                match cmp_values(lv, rv, collation) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            l.len().cmp(&r.len())
        }
        _ => match (numeric_repr(a), numeric_repr(b)) {
            (Some(l), Some(r)) => cmp_numeric(l, r),
            _ => a.type_rank().cmp(&b.type_rank()),
        },
    }
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Float(f64),
}

fn numeric_repr(value: &ScalarValue) -> Option<Numeric> {
    match value {
        ScalarValue::Int32(v) => Some(Numeric::Int(i64::from(*v))),
        ScalarValue::Int64(v) => Some(Numeric::Int(*v)),
        ScalarValue::Float64(v) => Some(Numeric::Float(*v)),
        _ => None,
    }
}

fn cmp_numeric(a: Numeric, b: Numeric) -> Ordering {
    match (a, b) {
        (Numeric::Int(l), Numeric::Int(r)) => l.cmp(&r),
        (Numeric::Int(l), Numeric::Float(r)) => (l as f64).total_cmp(&r),
        (Numeric::Float(l), Numeric::Int(r)) => l.total_cmp(&(r as f64)),
        (Numeric::Float(l), Numeric::Float(r)) => l.total_cmp(&r),
    }
}

/// Feed a single value into `hasher` in a form consistent with
/// [`cmp_values`]: numerics hash through a canonical representation so
/// `Int64(1)` and `Float64(1.0)` collide, and strings hash their collation
/// comparison key when a collation is active.
fn hash_value_into(hasher: &mut impl Hasher, value: &ScalarValue, collation: Option<&dyn Collator>) {
    hasher.write_u8(value.type_rank());
    match value {
        ScalarValue::Null => {}
        ScalarValue::Boolean(v) => hasher.write_u8(*v as u8),
        ScalarValue::Int32(_) | ScalarValue::Int64(_) | ScalarValue::Float64(_) => {
            match canonical_numeric(value) {
                Numeric::Int(v) => {
                    hasher.write_u8(0);
                    hasher.write_i64(v);
                }
                Numeric::Float(v) => {
                    hasher.write_u8(1);
                    hasher.write_u64(v.to_bits());
                }
            }
        }
        ScalarValue::Utf8(s) => match collation {
            Some(collator) => hasher.write(collator.comparison_key(s).as_bytes()),
            None => hasher.write(s.as_bytes()),
        },
        ScalarValue::List(vals) => {
            hasher.write_usize(vals.len());
            for val in vals {
                hash_value_into(hasher, val, collation);
            }
        }
    }
}

/// Collapse a numeric value to its canonical hashable form: integer when
/// exactly representable as i64, raw float bits otherwise.
fn canonical_numeric(value: &ScalarValue) -> Numeric {
    match numeric_repr(value).expect("caller checked value is numeric") {
        Numeric::Int(v) => Numeric::Int(v),
        Numeric::Float(v) => {
            if v.is_finite() && v.fract() == 0.0 && v >= -(2f64.powi(63)) && v < 2f64.powi(63) {
                Numeric::Int(v as i64)
            } else {
                Numeric::Float(v)
            }
        }
    }
}
