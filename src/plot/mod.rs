//! Diagnostic plotting.
//!
//! - Gaussian kernel density estimation on a probability grid (`density`)
//! - faceted PNG rendering of predicted-probability distributions (`png`)

pub mod density;
pub mod png;

pub use density::*;
pub use png::*;
