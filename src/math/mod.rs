//! Mathematical utilities: summary statistics, quantiles and the normal tail.

pub mod stats;

pub use stats::*;
