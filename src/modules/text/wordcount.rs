//! Sharded word counting
//!
//! Words are counted per chunk on the worker pool and the per-chunk shards
//! are merged on the calling thread. Merging is associative and commutative,
//! so the totals never depend on where chunk boundaries fall.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::engines::compute::{ChunkedParallelMap, MapOptions, MapResult};

/// Occurrence counts keyed by word
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordCounts {
    counts: HashMap<String, usize>,
}

impl WordCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct words
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count for `word`, zero when absent
    pub fn get(&self, word: &str) -> usize {
        self.counts.get(word).copied().unwrap_or(0)
    }

    /// Total number of words counted
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Add one occurrence of `word`
    pub fn add(&mut self, word: &str) {
        match self.counts.get_mut(word) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(word.to_owned(), 1);
            }
        }
    }

    /// Fold another shard into this one
    pub fn merge(&mut self, other: WordCounts) {
        if self.counts.is_empty() {
            self.counts = other.counts;
            return;
        }
        for (word, count) in other.counts {
            *self.counts.entry(word).or_insert(0) += count;
        }
    }

    /// The most frequent word; ties go to the lexicographically smallest word
    pub fn most_common(&self) -> Option<(&str, usize)> {
        self.counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(word, &count)| (word.as_str(), count))
    }

    /// Entries ordered by word
    pub fn sorted(&self) -> Vec<(&str, usize)> {
        self.counts
            .iter()
            .map(|(word, &count)| (word.as_str(), count))
            .sorted_by(|a, b| a.0.cmp(b.0))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.counts.iter().map(|(word, &count)| (word.as_str(), count))
    }
}

impl From<HashMap<String, usize>> for WordCounts {
    fn from(counts: HashMap<String, usize>) -> Self {
        Self { counts }
    }
}

impl<S: AsRef<str>> FromIterator<S> for WordCounts {
    fn from_iter<I: IntoIterator<Item = S>>(words: I) -> Self {
        count_words(words)
    }
}

/// Count every word in `words` sequentially
pub fn count_words<I, S>(words: I) -> WordCounts
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = WordCounts::new();
    for word in words {
        counts.add(word.as_ref());
    }
    counts
}

/// Merge any number of shards into one
pub fn merge_counts<I>(shards: I) -> WordCounts
where
    I: IntoIterator<Item = WordCounts>,
{
    shards.into_iter().fold(WordCounts::new(), |mut acc, shard| {
        acc.merge(shard);
        acc
    })
}

/// Count words in parallel: one shard per chunk, merged in chunk order
pub fn parallel_word_count<S>(words: Vec<S>, options: &MapOptions) -> MapResult<WordCounts>
where
    S: AsRef<str> + Send,
{
    let shards = ChunkedParallelMap::with_options(*options)
        .map_chunks(|chunk: Vec<S>| count_words(chunk), words)?;
    log::debug!("Merging {} word count shards", shards.len());
    Ok(merge_counts(shards))
}
