use histeq_image::{Image, Intensity};

use crate::error::HistEqError;
use crate::histogram::NUM_BINS;
use crate::normalize::ChannelLuts;
use crate::parallel::{self, ComputeQueue};

/// Replace every sample by the lookup table entry of its channel.
///
/// `dst(x, y, c) = luts[c][src(x, y, c)]`
///
/// Every sample is an independent work-item, so the result does not depend on
/// the execution strategy.
///
/// # Arguments
///
/// * `queue` - The queue to dispatch the work-items on.
/// * `src` - The input image.
/// * `luts` - One lookup table per channel.
///
/// # Errors
///
/// Returns [`HistEqError::InvalidPixelValue`] for a sample outside `[0, 255]`.
///
/// # Example
///
/// ```
/// use histeq_image::Image;
/// use histeq_imgproc::backproject::back_project;
/// use histeq_imgproc::normalize::{identity_lut, ChannelLuts};
/// use histeq_imgproc::parallel::ComputeQueue;
///
/// let mut lut = identity_lut();
/// lut[3] = 200;
/// let luts = ChannelLuts::<1>::from_tables(&[lut]).unwrap();
///
/// let image = Image::<u8, 1>::new([2, 1].into(), vec![3, 4]).unwrap();
/// let out = back_project(&ComputeQueue::default(), &image, &luts).unwrap();
/// assert_eq!(out.as_slice(), &[200, 4]);
/// ```
pub fn back_project<T: Intensity, const C: usize>(
    queue: &ComputeQueue,
    src: &Image<T, C>,
    luts: &ChannelLuts<C>,
) -> Result<Image<u8, C>, HistEqError> {
    let mut dst = Image::<u8, C>::from_size_val(src.size(), 0)?;
    let tables = luts.as_slice();

    queue.dispatch(|| {
        parallel::par_iter_rows_try(
            src,
            &mut dst,
            |index, channel, &sample, out| -> Result<(), HistEqError> {
                let level = sample.level().ok_or(HistEqError::InvalidPixelValue {
                    value: sample.value(),
                    index,
                })?;
                *out = tables[channel * NUM_BINS + level as usize];
                Ok(())
            },
        )
    })?;

    Ok(dst)
}
