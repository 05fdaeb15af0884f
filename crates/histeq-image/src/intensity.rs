use num_traits::PrimInt;

/// Number of discrete intensity levels a channel sample can take.
pub const NUM_LEVELS: usize = 256;

/// Largest valid intensity level.
pub const MAX_LEVEL: u8 = u8::MAX;

/// Integer pixel sample types that can be equalized.
///
/// Only the values in `[0, 255]` are valid intensity levels. Sample types wider
/// than `u8` can hold values outside that range; [`Intensity::level`] returns
/// `None` for them so the caller can reject the input.
///
/// Implemented for every primitive integer type.
pub trait Intensity: PrimInt + Send + Sync {
    /// The raw sample value, widened for error reporting.
    ///
    /// Values above `i64::MAX` saturate.
    #[inline]
    fn value(self) -> i64 {
        self.to_i64().unwrap_or(i64::MAX)
    }

    /// The intensity level of the sample, or `None` if it is out of range.
    #[inline]
    fn level(self) -> Option<u8> {
        self.to_u8()
    }
}

impl<T: PrimInt + Send + Sync> Intensity for T {}

#[cfg(test)]
mod tests {
    use super::Intensity;

    #[test]
    fn test_level_range() {
        assert_eq!(0u8.level(), Some(0));
        assert_eq!(255u8.level(), Some(255));
        assert_eq!(255u16.level(), Some(255));
        assert_eq!(256u16.level(), None);
        assert_eq!(70_000u32.level(), None);
        assert_eq!((-1i32).level(), None);
        assert_eq!((-1i32).value(), -1);
        assert_eq!(200usize.level(), Some(200));
    }

    #[test]
    fn test_value_saturates() {
        assert_eq!(u64::MAX.value(), i64::MAX);
        assert_eq!(u64::MAX.level(), None);
        assert_eq!(i64::MIN.value(), i64::MIN);
    }
}
