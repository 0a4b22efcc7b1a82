//! Callers of the parallel engine

pub mod text;
