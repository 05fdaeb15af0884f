use std::time::{Duration, Instant};

use crate::error::{HistEqError, PipelineError};

/// A stage of the equalization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Per-channel histograms.
    Histogram,
    /// Per-channel cumulative histograms.
    Scan,
    /// Per-channel lookup tables.
    Normalize,
    /// Whole-image lookup.
    BackProject,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Stage::Histogram => "histogram",
            Stage::Scan => "scan",
            Stage::Normalize => "normalize",
            Stage::BackProject => "back-project",
        };
        f.write_str(name)
    }
}

/// Wall time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    /// The stage.
    pub stage: Stage,
    /// Time between dispatching the stage and its results being available.
    pub elapsed: Duration,
}

/// Runs stages and records how long each of them took.
///
/// # Examples
///
/// ```
/// use histeq_imgproc::instrument::{InstrumentedStage, Stage};
///
/// let mut instrumented = InstrumentedStage::default();
/// let value = instrumented.run(Stage::Scan, || Ok(42)).unwrap();
///
/// assert_eq!(value, 42);
/// assert_eq!(instrumented.timings()[0].stage, Stage::Scan);
/// ```
#[derive(Debug, Default)]
pub struct InstrumentedStage {
    timings: Vec<StageTiming>,
}

impl InstrumentedStage {
    /// Run `op` as `stage`.
    ///
    /// A failure of `op` is reported as a [`PipelineError`] naming the stage, and
    /// no timing is recorded for it.
    pub fn run<R>(
        &mut self,
        stage: Stage,
        op: impl FnOnce() -> Result<R, HistEqError>,
    ) -> Result<R, PipelineError> {
        log::debug!("{stage} stage started");
        let start = Instant::now();

        let result = op().map_err(|source| {
            log::debug!("{stage} stage failed: {source}");
            PipelineError { stage, source }
        })?;

        let elapsed = start.elapsed();
        log::debug!("{stage} stage finished in {elapsed:?}");
        self.timings.push(StageTiming { stage, elapsed });

        Ok(result)
    }

    /// The timings recorded so far, in execution order.
    #[inline]
    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    /// Consume the recorder and return its timings.
    pub fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}
