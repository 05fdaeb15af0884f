//! The histogram equalization pipeline.
//!
//! A run moves through the states
//!
//! ```text
//! Loaded -> HistogramBuilt -> CumulativeBuilt -> Normalized -> BackProjected -> Done
//! ```
//!
//! Every stage reads the previous stage's output and produces a fresh buffer;
//! nothing is reused across stages or runs. The first failing stage aborts the
//! run and is reported in the returned [`PipelineError`]; no partial image is
//! ever returned.
//!
//! # Example
//!
//! ```
//! use histeq_image::Image;
//! use histeq_imgproc::equalize;
//!
//! let image = Image::<u8, 1>::new([2, 2].into(), vec![0, 0, 255, 255]).unwrap();
//! let equalized = equalize(&image).unwrap();
//!
//! assert_eq!(equalized.image.as_slice(), &[128, 128, 255, 255]);
//! ```

use histeq_image::{Image, Intensity, MAX_LEVEL};

use crate::backproject::back_project;
use crate::error::{HistEqError, PipelineError};
use crate::histogram::{compute_histograms, ChannelHistograms, HistogramMethod, NUM_BINS};
use crate::instrument::{InstrumentedStage, Stage, StageTiming};
use crate::normalize::{identity_lut, normalize_lut, ChannelLuts, NormalizationPolicy};
use crate::parallel::{ComputeQueue, ExecutionStrategy};
use crate::scan::{cumulative_histograms, CumulativeHistograms};

/// The state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// The input image is available.
    Loaded,
    /// The per-channel histograms are built.
    HistogramBuilt,
    /// The per-channel cumulative histograms are built.
    CumulativeBuilt,
    /// The per-channel lookup tables are built.
    Normalized,
    /// The output image is built.
    BackProjected,
    /// The run has finished.
    Done,
}

impl PipelineState {
    /// The state that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            PipelineState::Loaded => Some(PipelineState::HistogramBuilt),
            PipelineState::HistogramBuilt => Some(PipelineState::CumulativeBuilt),
            PipelineState::CumulativeBuilt => Some(PipelineState::Normalized),
            PipelineState::Normalized => Some(PipelineState::BackProjected),
            PipelineState::BackProjected => Some(PipelineState::Done),
            PipelineState::Done => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Tracks the state of a run and refuses out-of-order transitions.
#[derive(Debug)]
struct RunState {
    state: PipelineState,
}

impl RunState {
    fn new() -> Self {
        Self {
            state: PipelineState::Loaded,
        }
    }

    fn advance(&mut self, to: PipelineState) -> Result<(), HistEqError> {
        if self.state.next() != Some(to) {
            return Err(HistEqError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        log::trace!("pipeline state {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }
}

/// Configuration of the equalization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EqualizeConfig {
    /// Output intensity of the brightest populated level.
    pub target_max: u8,
    /// Which divisor each channel is normalized against.
    pub policy: NormalizationPolicy,
    /// How histogram work-items accumulate into the bins.
    pub histogram_method: HistogramMethod,
    /// How work-items are scheduled.
    pub strategy: ExecutionStrategy,
    /// Keep the intermediate buffers of the run in [`Equalized::diagnostics`].
    pub collect_diagnostics: bool,
}

impl Default for EqualizeConfig {
    fn default() -> Self {
        Self {
            target_max: MAX_LEVEL,
            policy: NormalizationPolicy::default(),
            histogram_method: HistogramMethod::default(),
            strategy: ExecutionStrategy::default(),
            collect_diagnostics: false,
        }
    }
}

impl EqualizeConfig {
    /// Set the output intensity of the brightest populated level.
    pub fn with_target_max(mut self, target_max: u8) -> Self {
        self.target_max = target_max;
        self
    }

    /// Set the normalization policy.
    pub fn with_policy(mut self, policy: NormalizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the histogram accumulation method.
    pub fn with_histogram_method(mut self, method: HistogramMethod) -> Self {
        self.histogram_method = method;
        self
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Keep the intermediate buffers of every run.
    pub fn with_diagnostics(mut self, collect: bool) -> Self {
        self.collect_diagnostics = collect;
        self
    }
}

/// Snapshots of the intermediate buffers of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics<const C: usize> {
    /// The per-channel histograms.
    pub histograms: ChannelHistograms<C>,
    /// The per-channel cumulative histograms.
    pub cumulative: CumulativeHistograms<C>,
    /// The per-channel lookup tables.
    pub luts: ChannelLuts<C>,
}

/// The result of a pipeline run.
#[derive(Debug, Clone)]
pub struct Equalized<const C: usize> {
    /// The equalized image.
    pub image: Image<u8, C>,
    /// Wall time of every stage, in execution order.
    pub timings: Vec<StageTiming>,
    /// Intermediate buffers, if requested in the configuration.
    pub diagnostics: Option<Diagnostics<C>>,
}

/// Runs the histogram equalization pipeline.
///
/// The equalizer owns its compute queue, so repeated runs reuse the same
/// thread pool while every run allocates its own buffers.
#[derive(Debug)]
pub struct Equalizer {
    config: EqualizeConfig,
    queue: ComputeQueue,
}

impl Equalizer {
    /// Create an equalizer.
    ///
    /// # Errors
    ///
    /// Returns [`HistEqError::ZeroDivisor`] if the normalization policy is
    /// `Fixed(0)` and [`HistEqError::DeviceOperationFailure`] if the compute
    /// queue cannot be created.
    pub fn new(config: EqualizeConfig) -> Result<Self, HistEqError> {
        config.policy.validate()?;
        let queue = ComputeQueue::new(config.strategy)?;
        log::debug!(
            "equalizer ready: {:?} with {} workers",
            config.strategy,
            queue.num_workers()
        );
        Ok(Self { config, queue })
    }

    /// The configuration of this equalizer.
    #[inline]
    pub fn config(&self) -> &EqualizeConfig {
        &self.config
    }

    /// Equalize an image.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub fn equalize<T: Intensity, const C: usize>(
        &self,
        src: &Image<T, C>,
    ) -> Result<Equalized<C>, PipelineError> {
        self.run(src, None)
    }

    /// Equalize an image, counting only the samples whose mask entry is non-zero.
    ///
    /// Masked-out samples are still remapped in the output image.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub fn equalize_masked<T: Intensity, const C: usize>(
        &self,
        src: &Image<T, C>,
        mask: &Image<u8, C>,
    ) -> Result<Equalized<C>, PipelineError> {
        self.run(src, Some(mask))
    }

    fn run<T: Intensity, const C: usize>(
        &self,
        src: &Image<T, C>,
        mask: Option<&Image<u8, C>>,
    ) -> Result<Equalized<C>, PipelineError> {
        let queue = &self.queue;
        let config = &self.config;
        let mut run = RunState::new();
        let mut instrumented = InstrumentedStage::default();

        log::debug!(
            "equalizing {} with {} channels",
            src.size(),
            src.num_channels()
        );

        let histograms = instrumented.run(Stage::Histogram, || {
            let histograms = compute_histograms(queue, src, mask, config.histogram_method)?;
            run.advance(PipelineState::HistogramBuilt)?;
            Ok(histograms)
        })?;
        log::trace!("histograms: {:?}", histograms.as_slice());

        let cumulative = instrumented.run(Stage::Scan, || {
            let cumulative = cumulative_histograms(queue, &histograms)?;
            run.advance(PipelineState::CumulativeBuilt)?;
            Ok(cumulative)
        })?;
        log::trace!("cumulative histograms: {:?}", cumulative.as_slice());

        let luts = instrumented.run(Stage::Normalize, || {
            // host readback of the channel totals to pick the divisors
            let totals = cumulative.totals();
            let divisors = config.policy.divisors(&totals);
            let mut tables = Vec::with_capacity(C);
            let channels = cumulative.as_slice().chunks_exact(NUM_BINS);
            for (channel, (cum, (&max, &total))) in
                channels.zip(divisors.iter().zip(totals.iter())).enumerate()
            {
                if total == 0 {
                    log::warn!("channel {channel} is empty, using the identity table");
                    tables.push(identity_lut());
                    continue;
                }
                tables.push(normalize_lut(channel, cum, max, config.target_max)?);
            }
            let luts = ChannelLuts::from_tables(&tables)?;
            run.advance(PipelineState::Normalized)?;
            Ok(luts)
        })?;
        log::trace!("lookup tables: {:?}", luts.as_slice());

        let image = instrumented.run(Stage::BackProject, || {
            let image = back_project(queue, src, &luts)?;
            run.advance(PipelineState::BackProjected)?;
            Ok(image)
        })?;

        run.advance(PipelineState::Done).map_err(|source| PipelineError {
            stage: Stage::BackProject,
            source,
        })?;

        let timings = instrumented.into_timings();
        log::info!(
            "equalized {} in {:?}",
            image.size(),
            timings.iter().map(|t| t.elapsed).sum::<std::time::Duration>()
        );

        let diagnostics = config.collect_diagnostics.then_some(Diagnostics {
            histograms,
            cumulative,
            luts,
        });

        Ok(Equalized {
            image,
            timings,
            diagnostics,
        })
    }
}

/// Equalize an image with the default configuration.
///
/// # Errors
///
/// Returns the error of the first failing stage.
pub fn equalize<T: Intensity, const C: usize>(
    src: &Image<T, C>,
) -> Result<Equalized<C>, PipelineError> {
    Equalizer {
        config: EqualizeConfig::default(),
        queue: ComputeQueue::default(),
    }
    .equalize(src)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        let mut run = RunState::new();
        assert_eq!(
            run.advance(PipelineState::Normalized),
            Err(HistEqError::InvalidTransition {
                from: PipelineState::Loaded,
                to: PipelineState::Normalized,
            })
        );
        for state in [
            PipelineState::HistogramBuilt,
            PipelineState::CumulativeBuilt,
            PipelineState::Normalized,
            PipelineState::BackProjected,
            PipelineState::Done,
        ] {
            assert_eq!(run.advance(state), Ok(()));
        }
        assert_eq!(run.state.next(), None);
        assert!(run.advance(PipelineState::Done).is_err());
    }

    #[test]
    fn test_two_by_two() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 1>::new([2, 2].into(), vec![0, 0, 255, 255])?;
        let equalizer = Equalizer::new(EqualizeConfig::default().with_diagnostics(true))?;
        let out = equalizer.equalize(&image)?;

        assert_eq!(out.image.as_slice(), &[128, 128, 255, 255]);

        let diagnostics = out.diagnostics.ok_or("missing diagnostics")?;
        let hist = diagnostics.histograms.channel(0).ok_or("missing channel")?;
        assert_eq!((hist[0], hist[255]), (2, 2));
        assert_eq!(hist.iter().map(|&b| b as u64).sum::<u64>(), 4);

        let cum = diagnostics.cumulative.channel(0).ok_or("missing channel")?;
        assert!(cum[..255].iter().all(|&v| v == 2));
        assert_eq!(cum[255], 4);

        let lut = diagnostics.luts.channel(0).ok_or("missing channel")?;
        assert_eq!((lut[0], lut[255]), (128, 255));
        Ok(())
    }

    #[test]
    fn test_timings_cover_all_stages() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 3>::from_size_val([4, 4].into(), 7)?;
        let out = equalize(&image)?;
        let stages = out.timings.iter().map(|t| t.stage).collect::<Vec<_>>();
        assert_eq!(
            stages,
            vec![
                Stage::Histogram,
                Stage::Scan,
                Stage::Normalize,
                Stage::BackProject
            ]
        );
        assert!(out.diagnostics.is_none());
        Ok(())
    }

    #[test]
    fn test_all_black() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 1>::from_size_val([5, 3].into(), 0)?;
        let equalizer = Equalizer::new(
            EqualizeConfig::default()
                .with_diagnostics(true)
                .with_target_max(200),
        )?;
        let out = equalizer.equalize(&image)?;
        let diagnostics = out.diagnostics.ok_or("missing diagnostics")?;

        let hist = diagnostics.histograms.channel(0).ok_or("missing channel")?;
        assert_eq!(hist[0], 15);
        assert!(hist[1..].iter().all(|&b| b == 0));

        let cum = diagnostics.cumulative.channel(0).ok_or("missing channel")?;
        assert!(cum.iter().all(|&v| v == 15));

        let lut = diagnostics.luts.channel(0).ok_or("missing channel")?;
        assert!(lut.iter().all(|&v| v == 200));
        assert!(out.image.as_slice().iter().all(|&v| v == 200));
        Ok(())
    }

    #[test]
    fn test_invalid_pixel_aborts() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u16, 1>::new([2, 1].into(), vec![3, 256])?;
        let err = equalize(&image).err().ok_or("expected an error")?;
        assert_eq!(err.stage, Stage::Histogram);
        assert_eq!(
            err.source,
            HistEqError::InvalidPixelValue {
                value: 256,
                index: 1
            }
        );
        Ok(())
    }

    #[test]
    fn test_empty_image() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 3>::new([0, 0].into(), vec![])?;
        let out = equalize(&image)?;
        assert_eq!(out.image.numel(), 0);
        assert_eq!(out.timings.len(), 4);
        Ok(())
    }

    #[test]
    fn test_masked_channel_falls_back_to_identity() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 2>::new([2, 1].into(), vec![10, 20, 30, 40])?;
        let mask = Image::<u8, 2>::new([2, 1].into(), vec![1, 0, 1, 0])?;
        let equalizer = Equalizer::new(EqualizeConfig::default())?;
        let out = equalizer.equalize_masked(&image, &mask)?;
        // channel 0: 10 -> 128, 30 -> 255; channel 1 has no counted samples
        assert_eq!(out.image.as_slice(), &[128, 20, 255, 40]);
        Ok(())
    }

    #[test]
    fn test_fixed_policy() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 1>::new([2, 2].into(), vec![0, 0, 255, 255])?;
        let equalizer = Equalizer::new(
            EqualizeConfig::default().with_policy(NormalizationPolicy::Fixed(8)),
        )?;
        let out = equalizer.equalize(&image)?;
        // 2 * 255 / 8 = 63.75, 4 * 255 / 8 = 127.5
        assert_eq!(out.image.as_slice(), &[64, 64, 128, 128]);
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_serde() -> Result<(), Box<dyn std::error::Error>> {
        let config = EqualizeConfig::default()
            .with_policy(NormalizationPolicy::Fixed(1000))
            .with_strategy(ExecutionStrategy::Fixed(4))
            .with_histogram_method(HistogramMethod::Atomic);
        let json = serde_json::to_string(&config)?;
        let back: EqualizeConfig = serde_json::from_str(&json)?;
        assert_eq!(back, config);
        Ok(())
    }

    #[test]
    fn test_queue_failure() {
        let config = EqualizeConfig::default().with_strategy(ExecutionStrategy::Fixed(0));
        let res = Equalizer::new(config);
        assert!(matches!(res, Err(HistEqError::DeviceOperationFailure(_))));
    }

    #[test]
    fn test_zero_fixed_divisor_rejected() {
        let config = EqualizeConfig::default().with_policy(NormalizationPolicy::Fixed(0));
        assert!(matches!(Equalizer::new(config), Err(HistEqError::ZeroDivisor)));
    }

}
