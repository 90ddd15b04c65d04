pub mod env;
pub mod operators;
