//! Core execution primitives: the scoped worker pool and chunk partitioning

pub mod chunking;
pub mod parallel;
