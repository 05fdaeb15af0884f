use histeq_image::ImageError;

use crate::instrument::Stage;
use crate::pipeline::PipelineState;

/// Errors raised by the equalization stages.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HistEqError {
    /// A sample is outside the `[0, 255]` intensity range.
    #[error("Pixel value {value} at sample {index} is outside [0, 255]")]
    InvalidPixelValue {
        /// The offending sample value.
        value: i64,
        /// Flat index of the sample in the image buffer.
        index: usize,
    },

    /// A channel has no counted samples, so it cannot be normalized.
    #[error("Histogram of channel {channel} is empty")]
    EmptyHistogram {
        /// Index of the empty channel.
        channel: usize,
    },

    /// The normalization divisor was configured as zero.
    #[error("Normalization divisor must be > 0")]
    ZeroDivisor,

    /// A buffer does not have the size implied by the channel count.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected length.
        expected: usize,
        /// The length that was found.
        actual: usize,
    },

    /// The parallel device failed to dispatch work or move data.
    #[error("Device operation failed: {0}")]
    DeviceOperationFailure(String),

    /// The pipeline was asked to skip or repeat a state.
    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition {
        /// The current state.
        from: PipelineState,
        /// The requested state.
        to: PipelineState,
    },

    /// Error from the image container.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// A stage failure reported by the pipeline orchestrator.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    /// The stage that failed.
    pub stage: Stage,
    /// The originating error.
    #[source]
    pub source: HistEqError,
}
