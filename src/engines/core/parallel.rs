//! Call-scoped worker pool
//!
//! Every parallel map builds its own rayon pool, runs on it, and joins all of
//! its threads before returning. No pool outlives the call that created it.

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Name prefix given to every worker thread
pub const WORKER_THREAD_PREFIX: &str = "chunkmap-worker";

/// Get the default number of threads to use
pub fn default_num_threads() -> usize {
    num_cpus::get()
}

/// Resolve the effective worker count.
///
/// An explicit count wins. Otherwise the injected hardware estimate is used,
/// falling back to the detected CPU count. The result is never below 1.
pub fn resolve_worker_count(explicit: Option<usize>, hardware: Option<usize>) -> usize {
    explicit
        .or(hardware)
        .unwrap_or_else(default_num_threads)
        .max(1)
}

/// Run `op` on a freshly built pool of `num_threads` workers.
///
/// The pool threads are scoped to this call: they are all joined before this
/// function returns, whether `op` returns normally or unwinds.
pub fn with_scoped_pool<R, F>(num_threads: usize, op: F) -> Result<R, ThreadPoolBuildError>
where
    F: FnOnce(&ThreadPool) -> R,
{
    let num_threads = num_threads.max(1);
    log::debug!("Starting scoped pool with {} threads", num_threads);

    let result = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|idx| format!("{}-{}", WORKER_THREAD_PREFIX, idx))
        .build_scoped(|thread| thread.run(), op);

    if let Err(err) = &result {
        log::error!("Failed to build worker pool of {} threads: {}", num_threads, err);
    } else {
        log::debug!("Scoped pool with {} threads joined", num_threads);
    }

    result
}
