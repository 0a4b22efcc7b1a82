//! Map configuration and per-call planning

use serde::{Deserialize, Serialize};

use super::{MapError, MapResult};
use crate::engines::core::{chunking, parallel};

/// Options controlling one parallel map.
///
/// Every field is optional. Omitted values are derived when the call is
/// planned: `workers` from `hardware_threads` (or the detected CPU count),
/// `chunk_size` from the input length and worker count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    /// Upper bound on concurrently running workers
    #[serde(alias = "max_workers", alias = "num_workers")]
    pub workers: Option<usize>,
    /// Items per dispatched chunk
    pub chunk_size: Option<usize>,
    /// Hardware parallelism estimate used when `workers` is omitted
    pub hardware_threads: Option<usize>,
}

impl MapOptions {
    /// Options with every value derived at planning time
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the number of items per chunk
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Set the hardware parallelism estimate
    pub fn hardware_threads(mut self, threads: usize) -> Self {
        self.hardware_threads = Some(threads);
        self
    }

    /// Reject explicit zero worker counts and chunk sizes
    pub fn validate(&self) -> MapResult<()> {
        if let Some(0) = self.workers {
            return Err(MapError::InvalidWorkers(0));
        }
        if let Some(0) = self.chunk_size {
            return Err(MapError::InvalidChunkSize(0));
        }
        Ok(())
    }

    /// Effective worker count for a call
    pub fn resolved_workers(&self) -> usize {
        parallel::resolve_worker_count(self.workers, self.hardware_threads)
    }

    /// Plan a call over `len` items
    pub fn resolve(&self, len: usize) -> MapResult<ChunkPlan> {
        self.validate()?;

        let workers = self.resolved_workers();
        let chunk_size = self
            .chunk_size
            .unwrap_or_else(|| chunking::calculate_chunk_size(len, workers));

        Ok(ChunkPlan {
            len,
            workers,
            chunk_size,
            chunk_count: chunking::chunk_count(len, chunk_size),
        })
    }
}

/// Resolved layout of a single map call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Number of input items
    pub len: usize,
    /// Resolved worker count
    pub workers: usize,
    /// Items per chunk; the last chunk may be shorter
    pub chunk_size: usize,
    /// Number of chunks covering the input
    pub chunk_count: usize,
}

impl ChunkPlan {
    /// Threads actually spawned: never more than there are chunks to run
    pub fn pool_threads(&self) -> usize {
        self.workers.min(self.chunk_count)
    }

    /// Whether there is nothing to dispatch
    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    /// Global index of the first item in chunk `chunk_index`
    pub fn chunk_offset(&self, chunk_index: usize) -> usize {
        chunk_index * self.chunk_size
    }
}
