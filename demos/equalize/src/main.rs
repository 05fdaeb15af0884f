use argh::FromArgs;
use std::path::PathBuf;

use histeq::image::{Image, ImageSize};
use histeq::imgproc::histogram::HistogramMethod;
use histeq::imgproc::normalize::NormalizationPolicy;
use histeq::imgproc::parallel::ExecutionStrategy;
use histeq::{EqualizeConfig, Equalized, Equalizer};

#[derive(FromArgs)]
/// Equalize the histogram of an image.
struct Args {
    /// path to the input image
    #[argh(option, short = 'i')]
    input: PathBuf,

    /// path to write the equalized image to
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// number of worker threads, the global pool is used if not set
    #[argh(option, short = 't')]
    threads: Option<usize>,

    /// divide every channel by the largest channel total
    #[argh(switch)]
    global_max: bool,

    /// output intensity of the brightest level
    #[argh(option, default = "255")]
    target_max: u8,

    /// accumulate the histogram with atomic counters
    #[argh(switch)]
    atomic: bool,

    /// equalize the luminance only, writing a grayscale image
    #[argh(switch)]
    gray: bool,

    /// print the per-stage timings
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = EqualizeConfig::default()
        .with_target_max(args.target_max)
        .with_policy(if args.global_max {
            NormalizationPolicy::GlobalMax
        } else {
            NormalizationPolicy::PerChannel
        })
        .with_histogram_method(if args.atomic {
            HistogramMethod::Atomic
        } else {
            HistogramMethod::PartitionReduce
        })
        .with_strategy(match args.threads {
            Some(n) => ExecutionStrategy::Fixed(n),
            None => ExecutionStrategy::ParallelElements,
        });

    let equalizer = Equalizer::new(config)?;
    let decoded = image::open(&args.input)?;
    log::info!(
        "loaded {} ({}x{})",
        args.input.display(),
        decoded.width(),
        decoded.height()
    );

    if args.gray {
        let gray = decoded.to_luma8();
        let (width, height) = gray.dimensions();
        let src = Image::<u8, 1>::new(image_size(width, height), gray.into_raw())?;
        let out = equalizer.equalize(&src)?;
        report(&out, args.verbose);
        image::GrayImage::from_raw(width, height, out.image.into_vec())
            .ok_or("equalized buffer does not match the image size")?
            .save(&args.output)?;
    } else {
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        let src = Image::<u8, 3>::new(image_size(width, height), rgb.into_raw())?;
        let out = equalizer.equalize(&src)?;
        report(&out, args.verbose);
        image::RgbImage::from_raw(width, height, out.image.into_vec())
            .ok_or("equalized buffer does not match the image size")?
            .save(&args.output)?;
    }

    log::info!("saved {}", args.output.display());

    Ok(())
}

fn image_size(width: u32, height: u32) -> ImageSize {
    ImageSize {
        width: width as usize,
        height: height as usize,
    }
}

fn report<const C: usize>(out: &Equalized<C>, verbose: bool) {
    if !verbose {
        return;
    }
    for timing in &out.timings {
        println!("{:>14}: {:?}", timing.stage.to_string(), timing.elapsed);
    }
}
