use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

/// A single owned scalar value.
///
/// Values are compared, hashed, and ordered through
/// [`compare`](super::compare), never through derived impls, so that an
/// injected collation applies uniformly everywhere a value is used as a
/// group key or inside an ordering-sensitive aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// Materialized collection, produced by the set-building aggregates.
    List(Vec<ScalarValue>),
}

impl ScalarValue {
    /// Rank used for ordering values of different types relative to each
    /// other. Within a rank, values order by their native comparison.
    pub(crate) const fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Int32(_) | Self::Int64(_) | Self::Float64(_) => 2,
            Self::Utf8(_) => 3,
            Self::List(_) => 4,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Approximate resident size of this value in bytes, including heap
    /// payloads. Used for memory accounting, not for anything that needs to
    /// be byte-exact.
    pub fn estimated_size(&self) -> usize {
        let heap = match self {
            Self::Utf8(s) => s.capacity(),
            Self::List(vals) => vals.iter().map(|v| v.estimated_size()).sum(),
            _ => 0,
        };
        size_of::<ScalarValue>() + heap
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (idx, val) in vals.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{val}")?;
                }
                write!(f, "]")
            }
        }
    }
}
