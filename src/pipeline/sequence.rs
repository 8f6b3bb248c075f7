use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// Hands out strictly increasing sequence numbers, safe to share across threads.
#[derive(Debug, Default)]
pub struct SequenceTagger {
    next: CachePadded<AtomicU64>,
}

impl SequenceTagger {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: CachePadded::new(AtomicU64::new(first)),
        }
    }

    /// Claim the next number. Each value is returned exactly once.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number that the next call to [`SequenceTagger::next`] would return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn sequential_values() {
        let tagger = SequenceTagger::starting_at(5);
        assert_eq!(tagger.next(), 5);
        assert_eq!(tagger.next(), 6);
        assert_eq!(tagger.peek(), 7);
    }

    #[test]
    fn unique_under_concurrency() {
        let tagger = Arc::new(SequenceTagger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tagger = Arc::clone(&tagger);
                thread::spawn(move || (0..1000).map(|_| tagger.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(seen.insert(v), "duplicate sequence {v}");
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(tagger.peek(), 8000);
    }
}
