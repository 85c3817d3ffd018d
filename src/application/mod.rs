pub mod compile;
pub mod error;
