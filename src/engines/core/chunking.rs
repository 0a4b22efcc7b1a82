//! Chunk sizing and partitioning
//!
//! Inputs are split into contiguous, non-overlapping chunks. Every item lands
//! in exactly one chunk and chunk order follows input order.

use itertools::Itertools;

/// Target number of chunks handed to each worker
pub const CHUNKS_PER_WORKER: usize = 4;

/// Calculate the chunk size used when the caller does not pick one.
///
/// Aims for [`CHUNKS_PER_WORKER`] chunks per worker, never going below one
/// item per chunk.
pub fn calculate_chunk_size(total_len: usize, workers: usize) -> usize {
    let total_chunks = workers.max(1).saturating_mul(CHUNKS_PER_WORKER);
    (total_len / total_chunks).max(1)
}

/// Number of chunks needed to cover `total_len` items
pub fn chunk_count(total_len: usize, chunk_size: usize) -> usize {
    total_len.div_ceil(chunk_size.max(1))
}

/// Split owned items into consecutive chunks of `chunk_size`.
///
/// The last chunk may be shorter.
pub fn partition<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(chunk_count(items.len(), chunk_size));

    for chunk in &items.into_iter().chunks(chunk_size) {
        chunks.push(chunk.collect());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_calculation() {
        // 4 workers -> 16 chunks
        assert_eq!(calculate_chunk_size(160, 4), 10);
        assert_eq!(calculate_chunk_size(170, 4), 10);
        assert_eq!(calculate_chunk_size(8, 2), 1);
        assert_eq!(calculate_chunk_size(0, 8), 1);
        assert_eq!(calculate_chunk_size(100, 0), 25);
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 3), 0);
        assert_eq!(chunk_count(9, 3), 3);
        assert_eq!(chunk_count(10, 3), 4);
        assert_eq!(chunk_count(1, 100), 1);
    }

    #[test]
    fn test_partition_shapes() {
        let chunks = partition((1..=7).collect::<Vec<i32>>(), 3);
        assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);

        let chunks = partition(Vec::<i32>::new(), 3);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_partition_covers_input_once() {
        let items: Vec<usize> = (0..1000).collect();
        for size in [1, 2, 7, 64, 999, 1000, 5000] {
            let chunks = partition(items.clone(), size);
            assert_eq!(chunks.len(), chunk_count(items.len(), size));
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));

            let rejoined: Vec<usize> = chunks.into_iter().flatten().collect();
            assert_eq!(rejoined, items);
        }
    }
}
