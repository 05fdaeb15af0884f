use rayon::prelude::*;

use histeq_image::Image;

use crate::error::HistEqError;

/// Controls how the work-items of a stage are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool to process every work-item in parallel.
    #[default]
    ParallelElements,

    /// Run on a local thread pool with a single worker.
    ///
    /// Useful for small images, debugging, or when the overhead of parallelization
    /// outweighs the benefits.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// The pool is built once per [`ComputeQueue`] and reused by every stage.
    Fixed(usize),
}

/// An ordered queue dispatching data-parallel work onto a thread pool.
///
/// Every call to [`ComputeQueue::dispatch`] returns only once all of its
/// work-items have finished, so stages issued one after the other on the same
/// queue observe each other's writes.
///
/// # Examples
///
/// ```
/// use histeq_imgproc::parallel::{ComputeQueue, ExecutionStrategy};
/// use rayon::prelude::*;
///
/// let queue = ComputeQueue::new(ExecutionStrategy::Fixed(2)).unwrap();
/// let sum: u32 = queue.dispatch(|| (1..=4u32).into_par_iter().sum());
/// assert_eq!(sum, 10);
/// ```
#[derive(Debug, Default)]
pub struct ComputeQueue {
    strategy: ExecutionStrategy,
    pool: Option<rayon::ThreadPool>,
}

impl ComputeQueue {
    /// Create a queue for the given strategy.
    ///
    /// # Errors
    ///
    /// Returns [`HistEqError::DeviceOperationFailure`] if the thread count is zero
    /// or the thread pool cannot be built.
    pub fn new(strategy: ExecutionStrategy) -> Result<Self, HistEqError> {
        let pool = match strategy {
            ExecutionStrategy::ParallelElements => None,
            ExecutionStrategy::Serial => Some(build_pool(1)?),
            ExecutionStrategy::Fixed(n) => Some(build_pool(n)?),
        };

        Ok(Self { strategy, pool })
    }

    /// The strategy this queue was built with.
    #[inline]
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Number of workers available to the queue.
    pub fn num_workers(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `op` on the queue's thread pool and wait for it to finish.
    pub fn dispatch<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

fn build_pool(num_threads: usize) -> Result<rayon::ThreadPool, HistEqError> {
    if num_threads == 0 {
        return Err(HistEqError::DeviceOperationFailure(
            "thread count must be > 0".to_string(),
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| {
            HistEqError::DeviceOperationFailure(format!("failed to build thread pool: {e}"))
        })
}

/// Apply a fallible function to each sample of the image in parallel, row by row.
///
/// The closure receives the flat sample index, the channel of the sample, the
/// source sample and the destination sample. The first error stops the iteration.
pub fn par_iter_rows_try<T1, T2, E, const C: usize>(
    src: &Image<T1, C>,
    dst: &mut Image<T2, C>,
    f: impl Fn(usize, usize, &T1, &mut T2) -> Result<(), E> + Send + Sync,
) -> Result<(), E>
where
    T1: Sync,
    T2: Send,
    E: Send,
{
    let stride = C * src.cols();
    if stride == 0 || src.numel() == 0 {
        return Ok(());
    }

    src.as_slice()
        .par_chunks_exact(stride)
        .zip(dst.as_slice_mut().par_chunks_exact_mut(stride))
        .enumerate()
        .try_for_each(|(row, (src_row, dst_row))| {
            src_row
                .iter()
                .zip(dst_row.iter_mut())
                .enumerate()
                .try_for_each(|(i, (src_sample, dst_sample))| {
                    f(row * stride + i, i % C, src_sample, dst_sample)
                })
        })
}
