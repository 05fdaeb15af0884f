//! Cumulative histograms to lookup tables.
//!
//! A lookup table maps an input intensity to its equalized intensity:
//!
//! ```text
//! lut[i] = round(cumulative[i] * target_max / max)
//! ```
//!
//! Rounding is half-up and computed in integer arithmetic as
//! `(cumulative[i] * target_max + max / 2) / max`, so `127.5` becomes `128`.
//! The result is clamped to `target_max`. Since the cumulative histogram is
//! non-decreasing, so is the lookup table.

use crate::error::HistEqError;
use crate::histogram::NUM_BINS;
use crate::scan::CumulativeHistograms;

/// A lookup table from input intensity to output intensity.
pub type Lut = [u8; NUM_BINS];

/// Which divisor each channel is normalized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NormalizationPolicy {
    /// Every channel is divided by its own total.
    #[default]
    PerChannel,

    /// Every channel is divided by the largest total across channels.
    GlobalMax,

    /// Every channel is divided by the given value.
    Fixed(u64),
}

impl NormalizationPolicy {
    /// The divisor of every channel given their totals.
    ///
    /// ```
    /// use histeq_imgproc::normalize::NormalizationPolicy;
    ///
    /// let totals = [4, 2, 3];
    /// assert_eq!(NormalizationPolicy::PerChannel.divisors(&totals), [4, 2, 3]);
    /// assert_eq!(NormalizationPolicy::GlobalMax.divisors(&totals), [4, 4, 4]);
    /// assert_eq!(NormalizationPolicy::Fixed(10).divisors(&totals), [10, 10, 10]);
    /// ```
    pub fn divisors<const C: usize>(&self, totals: &[u64; C]) -> [u64; C] {
        match *self {
            NormalizationPolicy::PerChannel => *totals,
            NormalizationPolicy::GlobalMax => [totals.iter().copied().max().unwrap_or(0); C],
            NormalizationPolicy::Fixed(max) => [max; C],
        }
    }

    /// Check that the policy can normalize a non-empty channel.
    ///
    /// # Errors
    ///
    /// Returns [`HistEqError::ZeroDivisor`] for `Fixed(0)`.
    pub fn validate(&self) -> Result<(), HistEqError> {
        match self {
            NormalizationPolicy::Fixed(0) => Err(HistEqError::ZeroDivisor),
            _ => Ok(()),
        }
    }
}

/// The identity lookup table.
pub fn identity_lut() -> Lut {
    let mut lut = [0u8; NUM_BINS];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = i as u8;
    }
    lut
}

/// Normalize the cumulative histogram of one channel into a lookup table.
///
/// # Arguments
///
/// * `channel` - The channel index, used for error reporting.
/// * `cumulative` - The 256 cumulative counts of the channel.
/// * `max` - The divisor.
/// * `target_max` - The output intensity of the last bin when `max` is the channel total.
///
/// # Errors
///
/// Returns [`HistEqError::EmptyHistogram`] if `max` is zero and
/// [`HistEqError::DimensionMismatch`] if `cumulative` does not have 256 entries.
///
/// # Example
///
/// ```
/// use histeq_imgproc::normalize::normalize_lut;
///
/// let mut cumulative = [2u64; 256];
/// cumulative[255] = 4;
///
/// let lut = normalize_lut(0, &cumulative, 4, 255).unwrap();
/// assert_eq!(lut[0], 128);
/// assert_eq!(lut[255], 255);
/// ```
pub fn normalize_lut(
    channel: usize,
    cumulative: &[u64],
    max: u64,
    target_max: u8,
) -> Result<Lut, HistEqError> {
    if cumulative.len() != NUM_BINS {
        return Err(HistEqError::DimensionMismatch {
            expected: NUM_BINS,
            actual: cumulative.len(),
        });
    }

    if max == 0 {
        return Err(HistEqError::EmptyHistogram { channel });
    }

    let max = max as u128;
    let target = target_max as u128;
    let mut lut = [0u8; NUM_BINS];
    for (out, &cum) in lut.iter_mut().zip(cumulative.iter()) {
        let scaled = (cum as u128 * target + max / 2) / max;
        *out = scaled.min(target) as u8;
    }

    Ok(lut)
}

/// The lookup tables of every channel, channel `c` at offset `c * 256`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLuts<const C: usize> {
    tables: Vec<u8>,
}

impl<const C: usize> ChannelLuts<C> {
    /// Identity tables for every channel.
    pub fn identity() -> Self {
        Self {
            tables: identity_lut().repeat(C),
        }
    }

    /// Build the set from one table per channel.
    ///
    /// # Errors
    ///
    /// Returns [`HistEqError::DimensionMismatch`] if the number of tables is not `C`.
    pub fn from_tables(tables: &[Lut]) -> Result<Self, HistEqError> {
        if tables.len() != C {
            return Err(HistEqError::DimensionMismatch {
                expected: C,
                actual: tables.len(),
            });
        }
        Ok(Self {
            tables: tables.concat(),
        })
    }

    /// The table of one channel, or `None` if the channel does not exist.
    pub fn channel(&self, channel: usize) -> Option<&[u8]> {
        (channel < C).then(|| &self.tables[channel * NUM_BINS..(channel + 1) * NUM_BINS])
    }

    /// The whole buffer.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.tables
    }
}

/// Normalize the cumulative histograms of every channel.
///
/// Unlike the pipeline, this fails on the first empty channel instead of
/// falling back to the identity table. A channel is empty when it has no
/// counted samples, whatever divisor the policy gives it.
///
/// # Errors
///
/// Returns [`HistEqError::ZeroDivisor`] if the policy is `Fixed(0)` and
/// [`HistEqError::EmptyHistogram`] for a channel without counted samples.
pub fn lookup_tables<const C: usize>(
    cumulative: &CumulativeHistograms<C>,
    policy: NormalizationPolicy,
    target_max: u8,
) -> Result<ChannelLuts<C>, HistEqError> {
    policy.validate()?;
    let totals = cumulative.totals();
    let divisors = policy.divisors(&totals);
    let tables = cumulative
        .as_slice()
        .chunks_exact(NUM_BINS)
        .zip(divisors.iter().zip(totals.iter()))
        .enumerate()
        .map(|(c, (cum, (&max, &total)))| {
            if total == 0 {
                return Err(HistEqError::EmptyHistogram { channel: c });
            }
            normalize_lut(c, cum, max, target_max)
        })
        .collect::<Result<Vec<_>, _>>()?;
    ChannelLuts::from_tables(&tables)
}
