#![deny(missing_docs)]
//! Image types used by the histogram equalization pipeline.

/// image representation for the equalization pipeline.
pub mod image;

/// Error types for the image module.
pub mod error;

/// pixel sample types and their intensity range.
pub mod intensity;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
pub use crate::intensity::{Intensity, MAX_LEVEL, NUM_LEVELS};
