//! Parallel inclusive prefix sums.
//!
//! The cumulative histogram of a channel is the inclusive prefix sum of its
//! bins: `cumulative[i] = hist[0] + hist[1] + ... + hist[i]`, i.e. the number of
//! samples with an intensity `<= i`.
//!
//! # Hillis–Steele scan
//!
//! The scan runs `ceil(log2(n))` rounds. In round `r` every position `i` reads
//! the previous round's buffer and writes
//!
//! ```text
//! next[i] = cur[i] + cur[i - 2^r]   if i >= 2^r
//! next[i] = cur[i]                  otherwise (identity 0)
//! ```
//!
//! into a fresh buffer, so no work-item reads a value written in the same round.
//! A 256-bin histogram takes exactly 8 rounds.
//!
//! # Block scan with carry
//!
//! [`block_scan_inclusive`] splits the input into blocks, scans every block
//! independently, scans the block totals and adds to each block the total of
//! all the blocks before it.

use rayon::prelude::*;

use crate::error::HistEqError;
use crate::histogram::{ChannelHistograms, NUM_BINS};
use crate::parallel::ComputeQueue;

/// Number of Hillis–Steele rounds needed for `n` elements, `ceil(log2(n))`.
///
/// ```
/// use histeq_imgproc::scan::scan_rounds;
///
/// assert_eq!(scan_rounds(256), 8);
/// assert_eq!(scan_rounds(257), 9);
/// assert_eq!(scan_rounds(1), 0);
/// ```
pub fn scan_rounds(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Inclusive Hillis–Steele scan, one work-item per position and round.
///
/// Works for any length, including lengths that are not a power of two.
///
/// # Example
///
/// ```
/// use histeq_imgproc::parallel::ComputeQueue;
/// use histeq_imgproc::scan::hillis_steele_inclusive;
///
/// let cum = hillis_steele_inclusive(&ComputeQueue::default(), &[1, 2, 3, 4, 5]);
/// assert_eq!(cum, vec![1, 3, 6, 10, 15]);
/// ```
pub fn hillis_steele_inclusive(queue: &ComputeQueue, src: &[u64]) -> Vec<u64> {
    let mut current = src.to_vec();
    let mut next = vec![0u64; src.len()];

    for round in 0..scan_rounds(src.len()) {
        let offset = 1usize << round;
        queue.dispatch(|| {
            next.par_iter_mut().enumerate().for_each(|(i, out)| {
                *out = if i >= offset {
                    current[i] + current[i - offset]
                } else {
                    current[i]
                };
            })
        });
        std::mem::swap(&mut current, &mut next);
    }

    current
}

/// Hillis–Steele rounds over one block, as run by a single work-group.
fn scan_block(block: &mut [u64]) {
    let mut previous = block.to_vec();
    for round in 0..scan_rounds(block.len()) {
        let offset = 1usize << round;
        for i in 0..block.len() {
            block[i] = if i >= offset {
                previous[i] + previous[i - offset]
            } else {
                previous[i]
            };
        }
        previous.copy_from_slice(block);
    }
}

/// Inclusive scan of an arbitrary-length input using blocks and carries.
///
/// # Errors
///
/// Returns [`HistEqError::DimensionMismatch`] if `block_size` is zero.
///
/// # Example
///
/// ```
/// use histeq_imgproc::parallel::ComputeQueue;
/// use histeq_imgproc::scan::block_scan_inclusive;
///
/// let cum = block_scan_inclusive(&ComputeQueue::default(), &[1, 1, 1, 1, 1], 2).unwrap();
/// assert_eq!(cum, vec![1, 2, 3, 4, 5]);
/// ```
pub fn block_scan_inclusive(
    queue: &ComputeQueue,
    src: &[u64],
    block_size: usize,
) -> Result<Vec<u64>, HistEqError> {
    if block_size == 0 {
        return Err(HistEqError::DimensionMismatch {
            expected: 1,
            actual: 0,
        });
    }

    let mut out = src.to_vec();
    queue.dispatch(|| out.par_chunks_mut(block_size).for_each(scan_block));

    if out.len() <= block_size {
        return Ok(out);
    }

    let block_totals = out
        .chunks(block_size)
        .filter_map(|block| block.last().copied())
        .collect::<Vec<_>>();
    let carries = hillis_steele_inclusive(queue, &block_totals);

    queue.dispatch(|| {
        out.par_chunks_mut(block_size)
            .enumerate()
            .skip(1)
            .for_each(|(b, block)| {
                let carry = carries[b - 1];
                block.iter_mut().for_each(|v| *v += carry);
            })
    });

    Ok(out)
}

/// The cumulative histograms of every channel, laid out like [`ChannelHistograms`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeHistograms<const C: usize> {
    values: Vec<u64>,
}

impl<const C: usize> CumulativeHistograms<C> {
    /// Wrap a buffer of `C * 256` cumulative counts.
    ///
    /// # Errors
    ///
    /// Returns [`HistEqError::DimensionMismatch`] if the buffer has the wrong length.
    pub fn from_vec(values: Vec<u64>) -> Result<Self, HistEqError> {
        if values.len() != C * NUM_BINS {
            return Err(HistEqError::DimensionMismatch {
                expected: C * NUM_BINS,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    /// The cumulative counts of one channel, or `None` if the channel does not exist.
    pub fn channel(&self, channel: usize) -> Option<&[u64]> {
        (channel < C).then(|| &self.values[channel * NUM_BINS..(channel + 1) * NUM_BINS])
    }

    /// The last cumulative entry of every channel, i.e. its counted samples.
    pub fn totals(&self) -> [u64; C] {
        let mut totals = [0u64; C];
        for (total, values) in totals.iter_mut().zip(self.values.chunks_exact(NUM_BINS)) {
            *total = values[NUM_BINS - 1];
        }
        totals
    }

    /// The whole buffer.
    #[inline]
    pub fn as_slice(&self) -> &[u64] {
        &self.values
    }
}

/// Compute the cumulative histogram of every channel.
///
/// One scan is issued per channel, reading the channel's bins at offset
/// `channel * 256` of the histogram buffer.
pub fn cumulative_histograms<const C: usize>(
    queue: &ComputeQueue,
    hist: &ChannelHistograms<C>,
) -> Result<CumulativeHistograms<C>, HistEqError> {
    let mut values = Vec::with_capacity(C * NUM_BINS);
    for bins in hist.as_slice().chunks_exact(NUM_BINS) {
        let bins = bins.iter().map(|&b| b as u64).collect::<Vec<_>>();
        values.extend(hillis_steele_inclusive(queue, &bins));
    }
    CumulativeHistograms::from_vec(values)
}
