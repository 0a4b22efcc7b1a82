//! Parallel execution engine
//!
//! `core` owns the worker pool and the chunking policy, `compute` builds the
//! order-preserving map on top of them.

pub mod compute;
pub mod core;
