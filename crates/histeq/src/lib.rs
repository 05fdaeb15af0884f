//! Data-parallel histogram equalization of 8-bit images.
//!
//! ```
//! use histeq::image::Image;
//!
//! let image = Image::<u8, 1>::new([2, 2].into(), vec![0, 0, 255, 255]).unwrap();
//! let equalized = histeq::equalize(&image).unwrap();
//!
//! assert_eq!(equalized.image.as_slice(), &[128, 128, 255, 255]);
//! ```

#[doc(inline)]
pub use histeq_image as image;

#[doc(inline)]
pub use histeq_imgproc as imgproc;

pub use histeq_imgproc::{equalize, EqualizeConfig, Equalized, Equalizer};
