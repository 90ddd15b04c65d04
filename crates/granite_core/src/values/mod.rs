pub mod compare;
pub mod scalar;

pub use scalar::ScalarValue;
