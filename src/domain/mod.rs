//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input configuration enums (`SourceArg`, `EvalPoint`, `OutputFormat`)
//! - the estimator flag grid (`ForestFlags`, `admissible_grid`)
//! - loaded datasets (`Dataset`) and the run configuration (`BenchConfig`)

pub mod types;

pub use types::*;
