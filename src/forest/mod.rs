//! The ordered forest estimator and its building blocks.
//!
//! - `tree`: a single regression tree grown on a row subset
//! - `base`: bagged/subsampled forests with out-of-bag prediction
//! - `ordered`: the ordered-outcome wrapper (one forest per threshold)
//! - `margins`: marginal effects with optional weight-based inference

pub mod base;
pub mod margins;
pub mod ordered;
pub mod tree;

pub use base::*;
pub use margins::*;
pub use ordered::*;
pub use tree::*;
