//! Text module
//!
//! Word-count reductions built on the chunked parallel map.

pub mod wordcount;

/// Convenience re-exports
pub use wordcount::{count_words, merge_counts, parallel_word_count, WordCounts};
