#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// back-projection of lookup tables onto images.
pub mod backproject;

/// error types for the equalization pipeline.
pub mod error;

/// compute per-channel image histograms.
pub mod histogram;

/// stage instrumentation and timings.
pub mod instrument;

/// cumulative histograms to lookup tables.
pub mod normalize;

/// module containing parallelization utilities.
pub mod parallel;

/// the equalization pipeline orchestrator.
pub mod pipeline;

/// parallel prefix-sum scans.
pub mod scan;

pub use crate::error::{HistEqError, PipelineError};
pub use crate::pipeline::{equalize, EqualizeConfig, Equalized, Equalizer};
