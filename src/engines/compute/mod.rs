//! Order-preserving chunked parallel map
//!
//! This module provides the error model, the options type and the
//! [`ChunkedParallelMap`] engine built on the scoped pool in
//! [`crate::engines::core::parallel`].

pub mod options;
pub mod pmap;

use std::convert::Infallible;

pub use options::{ChunkPlan, MapOptions};
pub use pmap::{map_chunks, pmap, try_pmap, ChunkedParallelMap};

/// Map operation result type
pub type MapResult<T, E = Infallible> = Result<T, MapError<E>>;

/// Error types for map operations
///
/// `E` is the error type of the item function. Infallible maps use the
/// default.
#[derive(Debug, thiserror::Error)]
pub enum MapError<E = Infallible> {
    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkers(usize),

    #[error("chunk size must be at least 1, got {0}")]
    InvalidChunkSize(usize),

    #[error("item {index} failed: {source}")]
    Item {
        index: usize,
        #[source]
        source: E,
    },

    #[error("item {index} panicked: {message}")]
    Panicked { index: usize, message: String },

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl<E> MapError<E> {
    /// Index of the failing input item, if the error came from one
    pub fn index(&self) -> Option<usize> {
        match self {
            MapError::Item { index, .. } | MapError::Panicked { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Whether the call was rejected before any work was dispatched
    pub fn is_config_error(&self) -> bool {
        matches!(self, MapError::InvalidWorkers(_) | MapError::InvalidChunkSize(_))
    }
}

impl MapError<Infallible> {
    /// Re-type an error that cannot carry an item failure.
    pub fn widen<E>(self) -> MapError<E> {
        match self {
            MapError::InvalidWorkers(n) => MapError::InvalidWorkers(n),
            MapError::InvalidChunkSize(n) => MapError::InvalidChunkSize(n),
            MapError::Item { source, .. } => match source {},
            MapError::Panicked { index, message } => MapError::Panicked { index, message },
            MapError::Pool(err) => MapError::Pool(err),
        }
    }
}

/// Trait for function values that can be mapped over a collection in parallel
pub trait ParallelCompute<T, R, E> {
    /// Apply the function to every item, preserving input order
    fn execute_parallel(&self, items: Vec<T>, options: &MapOptions) -> Result<Vec<R>, MapError<E>>;
}

impl<T, R, E, F> ParallelCompute<T, R, E> for F
where
    T: Send,
    R: Send,
    E: Send,
    F: Fn(T) -> Result<R, E> + Sync,
{
    fn execute_parallel(&self, items: Vec<T>, options: &MapOptions) -> Result<Vec<R>, MapError<E>> {
        ChunkedParallelMap::with_options(*options).try_map(self, items)
    }
}
