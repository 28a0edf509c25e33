//! `orfbench` library crate.
//!
//! The binary (`orfbench`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the estimator is reusable outside the benchmark loop
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod forest;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
