//! Step 2: content deduplication.
//!
//! Computes a content hash over the normalized text and flags repeats
//! within one execution. Duplicates are flagged, never dropped — the
//! aggregator decides whether to exclude them.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Hashing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Hash the full normalized text.
    Exact,
    /// Hash three evenly-spaced chunks — a cheaper near-duplicate signal
    /// for long answers that differ only in boilerplate.
    Chunked,
}

/// Per-execution index of content hashes seen so far.
#[derive(Debug)]
pub struct DedupIndex {
    mode: HashMode,
    seen: HashSet<String>,
}

impl DedupIndex {
    #[must_use]
    pub fn new(mode: HashMode) -> Self {
        Self {
            mode,
            seen: HashSet::new(),
        }
    }

    /// Hash `text` and record it. Returns `(hash, is_duplicate)`.
    pub fn observe(&mut self, text: &str) -> (String, bool) {
        let hash = content_hash(text, self.mode);
        let is_duplicate = !self.seen.insert(hash.clone());
        (hash, is_duplicate)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupIndex {
    fn default() -> Self {
        Self::new(HashMode::Exact)
    }
}

const CHUNK_LEN: usize = 64;

fn content_hash(text: &str, mode: HashMode) -> String {
    let mut hasher = Sha256::new();
    match mode {
        HashMode::Exact => hasher.update(text.as_bytes()),
        HashMode::Chunked => {
            let chars: Vec<char> = text.chars().collect();
            if chars.len() <= 3 * CHUNK_LEN {
                hasher.update(text.as_bytes());
            } else {
                let mid = chars.len() / 2;
                for range in [
                    0..CHUNK_LEN,
                    mid - CHUNK_LEN / 2..mid + CHUNK_LEN / 2,
                    chars.len() - CHUNK_LEN..chars.len(),
                ] {
                    let chunk: String = chars[range].iter().collect();
                    hasher.update(chunk.as_bytes());
                }
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_not_a_duplicate() {
        let mut index = DedupIndex::default();
        let (_, dup) = index.observe("Acme is a water brand");
        assert!(!dup);
    }

    #[test]
    fn identical_text_is_flagged_as_duplicate() {
        let mut index = DedupIndex::default();
        index.observe("Acme is a water brand");
        let (_, dup) = index.observe("Acme is a water brand");
        assert!(dup);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn different_text_is_not_flagged() {
        let mut index = DedupIndex::default();
        index.observe("Acme is a water brand");
        let (_, dup) = index.observe("Rival Springs is a water brand");
        assert!(!dup);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn chunked_mode_ignores_mid_text_noise_outside_sampled_chunks() {
        let head = "h".repeat(200);
        let tail = "t".repeat(200);
        let a = format!("{head}{}{tail}", "x".repeat(400));
        // Differ only in a region none of the three chunks sample.
        let mut b_chars: Vec<char> = a.chars().collect();
        b_chars[250] = 'y';
        let b: String = b_chars.into_iter().collect();

        let mut index = DedupIndex::new(HashMode::Chunked);
        index.observe(&a);
        let (_, dup) = index.observe(&b);
        assert!(dup, "chunked hash should treat near-identical text as duplicate");
    }

    #[test]
    fn chunked_mode_hashes_short_text_exactly() {
        let mut index = DedupIndex::new(HashMode::Chunked);
        index.observe("short text");
        let (_, dup) = index.observe("short text");
        assert!(dup);
        let (_, dup2) = index.observe("short texX");
        assert!(!dup2);
    }
}
