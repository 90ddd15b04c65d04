//! Core execution engine: scalar values, collations, aggregate functions,
//! and the pull-model operators that drive them.

pub mod collation;
pub mod config;
pub mod execution;
pub mod functions;
pub mod values;
