use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use histeq_image::{Image, Intensity, NUM_LEVELS};

use crate::error::HistEqError;
use crate::parallel::ComputeQueue;

/// Number of bins of a channel histogram, one per intensity level.
pub const NUM_BINS: usize = NUM_LEVELS;

/// Minimum number of samples handled by one partition in [`HistogramMethod::PartitionReduce`].
const PARTITION_SAMPLES: usize = 4096;

/// How concurrent work-items accumulate into the shared bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HistogramMethod {
    /// Each partition of rows fills a private histogram; the private histograms
    /// are then summed.
    #[default]
    PartitionReduce,

    /// One work-item per sample, incrementing a shared array of atomic counters.
    Atomic,
}

/// The 256-bin histograms of every channel of an image.
///
/// The bins of channel `c` live at `c * 256..(c + 1) * 256` of one contiguous buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHistograms<const C: usize> {
    bins: Vec<u32>,
}

impl<const C: usize> ChannelHistograms<C> {
    /// All-zero histograms.
    pub fn zeros() -> Self {
        Self {
            bins: vec![0; C * NUM_BINS],
        }
    }

    /// Wrap a buffer of `C * 256` counts.
    ///
    /// # Errors
    ///
    /// Returns [`HistEqError::DimensionMismatch`] if the buffer has the wrong length.
    pub fn from_vec(bins: Vec<u32>) -> Result<Self, HistEqError> {
        if bins.len() != C * NUM_BINS {
            return Err(HistEqError::DimensionMismatch {
                expected: C * NUM_BINS,
                actual: bins.len(),
            });
        }
        Ok(Self { bins })
    }

    /// The bins of one channel, or `None` if the channel does not exist.
    pub fn channel(&self, channel: usize) -> Option<&[u32]> {
        (channel < C).then(|| &self.bins[channel * NUM_BINS..(channel + 1) * NUM_BINS])
    }

    /// Number of counted samples per channel.
    pub fn totals(&self) -> [u64; C] {
        let mut totals = [0u64; C];
        for (total, bins) in totals.iter_mut().zip(self.bins.chunks_exact(NUM_BINS)) {
            *total = bins.iter().map(|&b| b as u64).sum();
        }
        totals
    }

    /// The whole buffer.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.bins
    }
}

/// Compute the 256-bin intensity histogram of every channel of an image.
///
/// Bin `i` of channel `c` counts the samples of channel `c` equal to `i`.
/// When a mask is given, samples whose mask entry is zero are not counted.
///
/// # Arguments
///
/// * `queue` - The queue to dispatch the work-items on.
/// * `src` - The input image.
/// * `mask` - Optional sample mask with the same size as `src`.
/// * `method` - How parallel work-items accumulate into the bins.
///
/// # Errors
///
/// Returns [`HistEqError::InvalidPixelValue`] for a sample outside `[0, 255]`,
/// and [`HistEqError::DimensionMismatch`] if the mask size differs from the image.
///
/// # Example
///
/// ```
/// use histeq_image::Image;
/// use histeq_imgproc::histogram::{compute_histograms, HistogramMethod};
/// use histeq_imgproc::parallel::ComputeQueue;
///
/// let image = Image::<u8, 1>::new([3, 3].into(), vec![0, 2, 4, 128, 130, 132, 254, 255, 255])
///     .unwrap();
///
/// let hist = compute_histograms(&ComputeQueue::default(), &image, None, HistogramMethod::Atomic)
///     .unwrap();
///
/// let bins = hist.channel(0).unwrap();
/// assert_eq!(bins[255], 2);
/// assert_eq!(hist.totals(), [9]);
/// ```
pub fn compute_histograms<T: Intensity, const C: usize>(
    queue: &ComputeQueue,
    src: &Image<T, C>,
    mask: Option<&Image<u8, C>>,
    method: HistogramMethod,
) -> Result<ChannelHistograms<C>, HistEqError> {
    let mask = match mask {
        Some(mask) if mask.size() != src.size() => {
            return Err(HistEqError::DimensionMismatch {
                expected: src.numel(),
                actual: mask.numel(),
            });
        }
        Some(mask) => Some(mask.as_slice()),
        None => None,
    };

    if src.numel() == 0 {
        return Ok(ChannelHistograms::zeros());
    }

    let bins = match method {
        HistogramMethod::Atomic => {
            queue.dispatch(|| histogram_atomic::<T, C>(src.as_slice(), mask))?
        }
        HistogramMethod::PartitionReduce => {
            let row_stride = C * src.cols();
            let rows_per_partition = PARTITION_SAMPLES.div_ceil(row_stride).max(1);
            let partition = row_stride * rows_per_partition;
            queue.dispatch(|| histogram_partitioned::<T, C>(src.as_slice(), mask, partition))?
        }
    };

    ChannelHistograms::from_vec(bins)
}

/// Bin index of the sample at `index`, validating its range.
#[inline]
fn bin_index<T: Intensity, const C: usize>(
    index: usize,
    sample: T,
) -> Result<usize, HistEqError> {
    let level = sample.level().ok_or(HistEqError::InvalidPixelValue {
        value: sample.value(),
        index,
    })?;
    Ok((index % C) * NUM_BINS + level as usize)
}

#[inline]
fn is_counted(mask: Option<&[u8]>, index: usize) -> bool {
    mask.map_or(true, |m| m[index] != 0)
}

fn histogram_atomic<T: Intensity, const C: usize>(
    samples: &[T],
    mask: Option<&[u8]>,
) -> Result<Vec<u32>, HistEqError> {
    let bins = (0..C * NUM_BINS)
        .map(|_| AtomicU32::new(0))
        .collect::<Vec<_>>();

    samples
        .par_iter()
        .enumerate()
        .try_for_each(|(index, &sample)| -> Result<(), HistEqError> {
            let bin = bin_index::<T, C>(index, sample)?;
            if is_counted(mask, index) {
                bins[bin].fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        })?;

    Ok(bins.into_iter().map(AtomicU32::into_inner).collect())
}

fn histogram_partitioned<T: Intensity, const C: usize>(
    samples: &[T],
    mask: Option<&[u8]>,
    partition: usize,
) -> Result<Vec<u32>, HistEqError> {
    samples
        .par_chunks(partition)
        .enumerate()
        .try_fold(
            || vec![0u32; C * NUM_BINS],
            |mut local, (chunk_idx, chunk)| -> Result<Vec<u32>, HistEqError> {
                let offset = chunk_idx * partition;
                for (i, &sample) in chunk.iter().enumerate() {
                    let index = offset + i;
                    let bin = bin_index::<T, C>(index, sample)?;
                    if is_counted(mask, index) {
                        local[bin] += 1;
                    }
                }
                Ok(local)
            },
        )
        .try_reduce(
            || vec![0u32; C * NUM_BINS],
            |mut a, b| {
                a.iter_mut().zip(b.iter()).for_each(|(x, y)| *x += y);
                Ok(a)
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use histeq_image::Image;

    fn methods() -> [HistogramMethod; 2] {
        [HistogramMethod::Atomic, HistogramMethod::PartitionReduce]
    }

    #[test]
    fn test_compute_histogram() -> Result<(), Box<dyn std::error::Error>> {
        let data = vec![0, 2, 4, 128, 130, 132, 254, 255, 255];
        let image = Image::<u8, 1>::new([3, 3].into(), data)?;
        let queue = ComputeQueue::default();

        for method in methods() {
            let hist = compute_histograms(&queue, &image, None, method)?;
            let bins = hist.channel(0).ok_or("missing channel")?;
            assert_eq!(bins[0], 1);
            assert_eq!(bins[128], 1);
            assert_eq!(bins[255], 2);
            assert_eq!(bins[1], 0);
            assert_eq!(hist.totals(), [9]);
        }
        Ok(())
    }

    #[test]
    fn test_histogram_per_channel() -> Result<(), Box<dyn std::error::Error>> {
        #[rustfmt::skip]
        let image = Image::<u8, 3>::new(
            [2, 2].into(),
            vec![
                0, 10, 255,  0, 10, 254,
                1, 10, 255,  0, 11, 253,
            ],
        )?;
        let queue = ComputeQueue::default();

        for method in methods() {
            let hist = compute_histograms(&queue, &image, None, method)?;
            let r = hist.channel(0).ok_or("missing channel")?;
            let g = hist.channel(1).ok_or("missing channel")?;
            let b = hist.channel(2).ok_or("missing channel")?;
            assert_eq!((r[0], r[1]), (3, 1));
            assert_eq!((g[10], g[11]), (3, 1));
            assert_eq!((b[253], b[254], b[255]), (1, 1, 2));
            assert_eq!(hist.totals(), [4, 4, 4]);
            assert!(hist.channel(3).is_none());
        }
        Ok(())
    }

    #[test]
    fn test_histogram_empty_image() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 3>::new([0, 0].into(), vec![])?;
        let hist = compute_histograms(
            &ComputeQueue::default(),
            &image,
            None,
            HistogramMethod::default(),
        )?;
        assert_eq!(hist, ChannelHistograms::zeros());
        assert_eq!(hist.totals(), [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_histogram_invalid_pixel() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u16, 1>::new([2, 2].into(), vec![0, 12, 300, 4])?;
        let queue = ComputeQueue::default();

        for method in methods() {
            let res = compute_histograms(&queue, &image, None, method);
            assert_eq!(
                res,
                Err(HistEqError::InvalidPixelValue {
                    value: 300,
                    index: 2
                })
            );
        }
        Ok(())
    }

    #[test]
    fn test_histogram_mask() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 2>::new([2, 1].into(), vec![5, 6, 7, 8])?;
        let mask = Image::<u8, 2>::new([2, 1].into(), vec![1, 0, 1, 1])?;
        let queue = ComputeQueue::default();

        for method in methods() {
            let hist = compute_histograms(&queue, &image, Some(&mask), method)?;
            assert_eq!(hist.totals(), [2, 1]);
            assert_eq!(hist.channel(1).ok_or("missing channel")?[6], 0);
            assert_eq!(hist.channel(1).ok_or("missing channel")?[8], 1);
        }
        Ok(())
    }

    #[test]
    fn test_histogram_mask_size_mismatch() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 1>::new([2, 2].into(), vec![0; 4])?;
        let mask = Image::<u8, 1>::new([1, 2].into(), vec![1; 2])?;
        let res = compute_histograms(
            &ComputeQueue::default(),
            &image,
            Some(&mask),
            HistogramMethod::default(),
        );
        assert_eq!(
            res,
            Err(HistEqError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        );
        Ok(())
    }

    #[test]
    fn test_histogram_from_vec() {
        assert!(ChannelHistograms::<2>::from_vec(vec![0; 512]).is_ok());
        assert_eq!(
            ChannelHistograms::<2>::from_vec(vec![0; 256]),
            Err(HistEqError::DimensionMismatch {
                expected: 512,
                actual: 256
            })
        );
    }
}
