//! Order-preserving chunked parallel map-reduce.
//!
//! The input is split into contiguous chunks. Each chunk runs sequentially on
//! a worker from a call-scoped thread pool, and the chunk results are
//! flattened back into input order:
//!
//! ```
//! use chunkmap::pmap;
//!
//! let squares = pmap(|x: u64| x * x, 1..=8, Some(2), None).unwrap();
//! assert_eq!(squares, vec![1, 4, 9, 16, 25, 36, 49, 64]);
//! ```

pub mod engines;
pub mod modules;

pub use engines::compute::{
    map_chunks, pmap, try_pmap, ChunkPlan, ChunkedParallelMap, MapError, MapOptions, MapResult,
    ParallelCompute,
};
pub use modules::text::{count_words, merge_counts, parallel_word_count, WordCounts};
