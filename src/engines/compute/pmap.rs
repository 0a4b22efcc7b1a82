//! Chunked parallel map
//!
//! Inputs are drained into a vector, split into contiguous chunks and
//! dispatched to a call-scoped rayon pool. Each worker runs its chunk
//! sequentially; chunk results are collected in submission order and
//! flattened, so `output[i] == f(input[i])` regardless of scheduling.

use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use super::{ChunkPlan, MapError, MapOptions, MapResult};
use crate::engines::core::{chunking, parallel};

/// Lowest index of a chunk that has failed so far.
///
/// Chunks after it stop early; chunks before it keep running so the
/// lowest-index failure is always the one reported.
struct EarliestFailure(AtomicUsize);

impl EarliestFailure {
    fn new() -> Self {
        Self(AtomicUsize::new(usize::MAX))
    }

    fn record(&self, chunk_index: usize) {
        self.0.fetch_min(chunk_index, Ordering::AcqRel);
    }

    fn precedes(&self, chunk_index: usize) -> bool {
        self.0.load(Ordering::Acquire) < chunk_index
    }
}

/// Result slot for one chunk
enum ChunkOutcome<R, E> {
    Done(R),
    Failed(MapError<E>),
    Abandoned,
}

/// Reusable, configured chunked parallel map
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkedParallelMap {
    options: MapOptions,
}

impl ChunkedParallelMap {
    /// Create a map with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map from existing options
    pub fn with_options(options: MapOptions) -> Self {
        Self { options }
    }

    /// Bound the number of concurrent workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.options = self.options.workers(workers);
        self
    }

    /// Fix the number of items per chunk
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.options = self.options.chunk_size(chunk_size);
        self
    }

    /// Inject the hardware parallelism estimate used when no worker count is set
    pub fn hardware_threads(mut self, threads: usize) -> Self {
        self.options = self.options.hardware_threads(threads);
        self
    }

    /// Options this map was configured with
    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    /// Plan a call over `len` items without running it
    pub fn plan(&self, len: usize) -> MapResult<ChunkPlan> {
        self.options.resolve(len)
    }

    /// Apply `f` to every item in parallel, preserving input order.
    ///
    /// A panic in `f` fails the whole call with [`MapError::Panicked`].
    pub fn map<T, U, F, I>(&self, f: F, items: I) -> MapResult<Vec<U>>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        U: Send,
        F: Fn(T) -> U + Sync,
    {
        self.try_map(|item| Ok::<U, Infallible>(f(item)), items)
    }

    /// Apply a fallible `f` to every item in parallel, preserving input order.
    ///
    /// If any item fails, the error for the lowest failing index is returned
    /// and no partial output is produced.
    pub fn try_map<T, U, E, F, I>(&self, f: F, items: I) -> MapResult<Vec<U>, E>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        U: Send,
        E: Send,
        F: Fn(T) -> Result<U, E> + Sync,
    {
        self.options.validate().map_err(|err| err.widen())?;
        let items: Vec<T> = items.into_iter().collect();
        let plan = self.options.resolve(items.len()).map_err(|err| err.widen())?;

        let chunk_results = dispatch(&plan, items, |chunk_index, chunk, earliest| {
            map_chunk_items(&f, chunk_index, plan.chunk_offset(chunk_index), chunk, earliest)
        })?;

        let mut output = Vec::with_capacity(plan.len);
        for chunk in chunk_results {
            output.extend(chunk);
        }
        Ok(output)
    }

    /// Apply a chunk-level function, returning one result per chunk in chunk order.
    ///
    /// Useful for reductions: count or fold each chunk in parallel, then merge
    /// the per-chunk results on the calling thread.
    pub fn map_chunks<T, R, F, I>(&self, f: F, items: I) -> MapResult<Vec<R>>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(Vec<T>) -> R + Sync,
    {
        self.options.validate()?;
        let items: Vec<T> = items.into_iter().collect();
        let plan = self.options.resolve(items.len())?;
        let f = &f;

        dispatch(&plan, items, |chunk_index, chunk, earliest| {
            if earliest.precedes(chunk_index) {
                return ChunkOutcome::Abandoned;
            }
            match panic::catch_unwind(AssertUnwindSafe(move || f(chunk))) {
                Ok(result) => ChunkOutcome::Done(result),
                Err(payload) => {
                    earliest.record(chunk_index);
                    let index = plan.chunk_offset(chunk_index);
                    let message = panic_message(payload);
                    log::warn!(
                        "Chunk {} (starting at item {}) panicked: {}",
                        chunk_index,
                        index,
                        message
                    );
                    ChunkOutcome::Failed(MapError::Panicked { index, message })
                }
            }
        })
    }
}

/// Partition `items` per `plan`, run `work` on every chunk inside a scoped
/// pool and gather the chunk results in submission order.
fn dispatch<T, R, E, W>(plan: &ChunkPlan, items: Vec<T>, work: W) -> MapResult<Vec<R>, E>
where
    T: Send,
    R: Send,
    E: Send,
    W: Fn(usize, Vec<T>, &EarliestFailure) -> ChunkOutcome<R, E> + Sync,
{
    if plan.is_empty() {
        return Ok(Vec::new());
    }

    log::debug!(
        "Mapping {} items in {} chunks of {} on {} workers",
        plan.len,
        plan.chunk_count,
        plan.chunk_size,
        plan.pool_threads()
    );

    let chunks = chunking::partition(items, plan.chunk_size);
    let earliest = EarliestFailure::new();

    let outcomes: Vec<ChunkOutcome<R, E>> = parallel::with_scoped_pool(plan.pool_threads(), |pool| {
        pool.install(|| {
            chunks
                .into_par_iter()
                .enumerate()
                .map(|(chunk_index, chunk)| work(chunk_index, chunk, &earliest))
                .collect()
        })
    })?;

    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            ChunkOutcome::Done(result) => results.push(result),
            ChunkOutcome::Failed(err) => return Err(err),
            // A chunk is only abandoned after an earlier chunk failed, and
            // that failure is returned above first.
            ChunkOutcome::Abandoned => unreachable!("chunk abandoned without an earlier failure"),
        }
    }
    Ok(results)
}

/// Run `f` over one chunk, item by item, in order
fn map_chunk_items<T, U, E, F>(
    f: &F,
    chunk_index: usize,
    offset: usize,
    chunk: Vec<T>,
    earliest: &EarliestFailure,
) -> ChunkOutcome<Vec<U>, E>
where
    F: Fn(T) -> Result<U, E>,
{
    let mut mapped = Vec::with_capacity(chunk.len());

    for (position, item) in chunk.into_iter().enumerate() {
        if earliest.precedes(chunk_index) {
            return ChunkOutcome::Abandoned;
        }

        let index = offset + position;
        match panic::catch_unwind(AssertUnwindSafe(move || f(item))) {
            Ok(Ok(value)) => mapped.push(value),
            Ok(Err(source)) => {
                earliest.record(chunk_index);
                log::warn!("Item {} failed in chunk {}", index, chunk_index);
                return ChunkOutcome::Failed(MapError::Item { index, source });
            }
            Err(payload) => {
                earliest.record(chunk_index);
                let message = panic_message(payload);
                log::warn!("Item {} panicked in chunk {}: {}", index, chunk_index, message);
                return ChunkOutcome::Failed(MapError::Panicked { index, message });
            }
        }
    }

    ChunkOutcome::Done(mapped)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Map `f` over `items` on a scoped pool of `workers` threads.
///
/// `workers` defaults to the detected CPU count; `chunk_size` defaults to
/// `max(1, len / (workers * 4))`.
pub fn pmap<T, U, F, I>(
    f: F,
    items: I,
    workers: Option<usize>,
    chunk_size: Option<usize>,
) -> MapResult<Vec<U>>
where
    I: IntoIterator<Item = T>,
    T: Send,
    U: Send,
    F: Fn(T) -> U + Sync,
{
    engine(workers, chunk_size).map(f, items)
}

/// Fallible form of [`pmap`]
pub fn try_pmap<T, U, E, F, I>(
    f: F,
    items: I,
    workers: Option<usize>,
    chunk_size: Option<usize>,
) -> MapResult<Vec<U>, E>
where
    I: IntoIterator<Item = T>,
    T: Send,
    U: Send,
    E: Send,
    F: Fn(T) -> Result<U, E> + Sync,
{
    engine(workers, chunk_size).try_map(f, items)
}

/// Chunk-level form of [`pmap`]: one result per chunk, in chunk order
pub fn map_chunks<T, R, F, I>(
    f: F,
    items: I,
    workers: Option<usize>,
    chunk_size: Option<usize>,
) -> MapResult<Vec<R>>
where
    I: IntoIterator<Item = T>,
    T: Send,
    R: Send,
    F: Fn(Vec<T>) -> R + Sync,
{
    engine(workers, chunk_size).map_chunks(f, items)
}

fn engine(workers: Option<usize>, chunk_size: Option<usize>) -> ChunkedParallelMap {
    ChunkedParallelMap::with_options(MapOptions {
        workers,
        chunk_size,
        hardware_threads: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn test_squares_two_workers() {
        let result = pmap(|x: i32| x * x, vec![1, 2, 3, 4, 5, 6, 7, 8], Some(2), None).unwrap();
        assert_eq!(result, vec![1, 4, 9, 16, 25, 36, 49, 64]);
    }

    #[test]
    fn test_empty_input() {
        let result = pmap(|x: i32| x + 1, Vec::new(), Some(4), None).unwrap();
        assert!(result.is_empty());

        let result = pmap(|x: i32| x + 1, Vec::new(), None, Some(3)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_input_never_calls_function() {
        let calls = AtomicUsize::new(0);
        let result: Vec<()> = ChunkedParallelMap::new()
            .workers(4)
            .map(
                |_: u8| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
                std::iter::empty(),
            )
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lazy_input_is_drained() {
        let evens = (0..100).filter(|x| x % 2 == 0);
        let result = pmap(|x: u64| x * 3, evens, Some(3), Some(7)).unwrap();
        let expected: Vec<u64> = (0..100).filter(|x| x % 2 == 0).map(|x| x * 3).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_worker_counts_agree() {
        let items: Vec<u64> = (0..5_000).collect();
        let scramble = |x: u64| x.wrapping_mul(2_654_435_761) % 1_000;
        let expected: Vec<u64> = items.iter().map(|&x| scramble(x)).collect();

        for workers in [1, 2, num_cpus::get()] {
            let result = pmap(scramble, items.clone(), Some(workers), None).unwrap();
            assert_eq!(result, expected, "workers = {}", workers);
        }
    }

    #[test]
    fn test_each_item_processed_once() {
        let calls = AtomicUsize::new(0);
        let result = ChunkedParallelMap::new()
            .workers(4)
            .chunk_size(13)
            .map(
                |x: usize| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    x
                },
                0..1000,
            )
            .unwrap();
        assert_eq!(result, (0..1000).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_parallelism_bounded_by_workers() {
        let threads = Mutex::new(HashSet::new());
        ChunkedParallelMap::new()
            .workers(2)
            .chunk_size(1)
            .map(
                |_: u32| {
                    threads.lock().unwrap().insert(std::thread::current().id());
                },
                0..200,
            )
            .unwrap();
        let seen = threads.into_inner().unwrap().len();
        assert!(seen >= 1 && seen <= 2, "saw {} threads", seen);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let calls = AtomicUsize::new(0);
        let count = |x: i32| {
            calls.fetch_add(1, Ordering::SeqCst);
            x
        };

        let err = pmap(count, vec![1, 2, 3], Some(0), None).unwrap_err();
        assert!(matches!(err, MapError::InvalidWorkers(0)));

        let err = pmap(count, vec![1, 2, 3], Some(2), Some(0)).unwrap_err();
        assert!(matches!(err, MapError::InvalidChunkSize(0)));

        // Rejected even when there is nothing to map
        let err = pmap(count, Vec::new(), Some(0), None).unwrap_err();
        assert!(err.is_config_error());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_item_error_fails_call() {
        let result = try_pmap(
            |x: i32| if x == 5 { Err(format!("bad item {}", x)) } else { Ok(x * 10) },
            1..=20,
            Some(3),
            Some(2),
        );
        match result {
            Err(MapError::Item { index, source }) => {
                assert_eq!(index, 4);
                assert_eq!(source, "bad item 5");
            }
            other => panic!("Expected Item error, got {:?}", other),
        }
    }

    #[test]
    fn test_lowest_failing_index_reported() {
        for _ in 0..20 {
            let result = try_pmap(
                |x: usize| if x % 97 == 96 { Err(x) } else { Ok(x) },
                0..2_000,
                Some(4),
                Some(10),
            );
            let err = result.unwrap_err();
            assert_eq!(err.index(), Some(96));
            assert!(matches!(err, MapError::Item { source: 96, .. }));
        }
    }

    #[test]
    fn test_panic_becomes_error() {
        let result = pmap(
            |x: i32| {
                if x == 3 {
                    panic!("cannot handle {}", x);
                }
                x
            },
            vec![1, 2, 3, 4],
            Some(2),
            Some(1),
        );
        match result {
            Err(MapError::Panicked { index, message }) => {
                assert_eq!(index, 2);
                assert_eq!(message, "cannot handle 3");
            }
            other => panic!("Expected Panicked error, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_abandons_later_chunks() {
        let calls = AtomicUsize::new(0);
        let result = ChunkedParallelMap::new().workers(1).chunk_size(10).try_map(
            |x: usize| {
                calls.fetch_add(1, Ordering::SeqCst);
                if x == 0 {
                    Err("first item")
                } else {
                    Ok(x)
                }
            },
            0..1_000,
        );
        assert_eq!(result.unwrap_err().index(), Some(0));
        // A single worker sees the failure before any later chunk starts
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_map_chunks_order() {
        let sums =
            map_chunks(|chunk: Vec<u32>| chunk.iter().sum::<u32>(), 1..=12, Some(3), Some(3))
                .unwrap();
        assert_eq!(sums, vec![6, 15, 24, 33]);
    }

    #[test]
    fn test_map_chunks_panic_reports_chunk_start() {
        let result = map_chunks(
            |chunk: Vec<u32>| {
                if chunk.contains(&7) {
                    panic!("seven");
                }
                chunk.len()
            },
            0..10,
            Some(2),
            Some(4),
        );
        match result {
            Err(MapError::Panicked { index, message }) => {
                assert_eq!(index, 4);
                assert_eq!(message, "seven");
            }
            other => panic!("Expected Panicked error, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_matches_engine() {
        let engine = ChunkedParallelMap::new().hardware_threads(2);
        let plan = engine.plan(80).unwrap();
        assert_eq!(plan.workers, 2);
        assert_eq!(plan.chunk_size, 10);
        assert_eq!(engine.options().hardware_threads, Some(2));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn proptest_matches_sequential_map(
            items in proptest::collection::vec(any::<i64>(), 0..400),
            workers in 1usize..6,
        ) {
            let affine = |x: i64| x.wrapping_mul(31).wrapping_add(7);
            let expected: Vec<i64> = items.iter().map(|&x| affine(x)).collect();
            let result = pmap(affine, items, Some(workers), None).unwrap();
            prop_assert_eq!(result, expected);
        }

        #[test]
        fn proptest_chunk_size_does_not_change_output(
            items in proptest::collection::vec(any::<u32>(), 1..300),
            chunk_size in 1usize..50,
        ) {
            let expected: Vec<u64> = items.iter().map(|&x| u64::from(x) * 2).collect();
            let result = pmap(|x: u32| u64::from(x) * 2, items, Some(3), Some(chunk_size)).unwrap();
            prop_assert_eq!(result, expected);
        }
    }
}
