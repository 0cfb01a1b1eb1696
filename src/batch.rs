//! Batch bookkeeping shared between a block and its callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Tracks how many items a block has accepted and whether the producer has
/// declared submission finished.
///
/// One `BatchInfo` instance is shared (via `Arc`) between a block and the
/// [`Callback`](crate::callback::Callback) supervising its job; the
/// callback proxy reads it to detect when the last accepted item has been
/// processed.
///
/// Invariant: once [`is_complete`](BatchInfo::is_complete) returns true the
/// batch size is final. All operations use sequentially consistent
/// ordering so the "complete then check count" and "count then check
/// complete" paths racing on different workers cannot both miss the
/// terminal condition.
#[derive(Debug, Default)]
pub struct BatchInfo {
    batch_size: AtomicU64,
    is_complete: AtomicBool,
}

impl BatchInfo {
    /// Create an empty, open batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items accepted so far. Monotonically non-decreasing while
    /// the batch is open, final once the batch is complete.
    pub fn batch_size(&self) -> u64 {
        self.batch_size.load(Ordering::SeqCst)
    }

    /// Whether the producer has declared submission finished.
    pub fn is_complete(&self) -> bool {
        self.is_complete.load(Ordering::SeqCst)
    }

    /// Record `count` newly accepted items and return the new batch size.
    ///
    /// Called by the owning block for every accepted `post`. Not valid
    /// once the batch is complete.
    pub fn add(&self, count: u64) -> u64 {
        self.batch_size.fetch_add(count, Ordering::SeqCst) + count
    }

    /// Close the batch and return its final size.
    pub fn complete(&self) -> u64 {
        self.is_complete.store(true, Ordering::SeqCst);
        self.batch_size.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_counts_accepted_items() {
        let batch = BatchInfo::new();
        assert_eq!(batch.batch_size(), 0);
        assert!(!batch.is_complete());

        assert_eq!(batch.add(1), 1);
        assert_eq!(batch.add(1), 2);
        assert_eq!(batch.batch_size(), 2);
    }

    #[test]
    fn test_complete_freezes_size() {
        let batch = BatchInfo::new();
        batch.add(3);

        assert_eq!(batch.complete(), 3);
        assert!(batch.is_complete());
        assert_eq!(batch.batch_size(), 3);
    }

    #[test]
    fn test_complete_without_items() {
        let batch = BatchInfo::new();
        assert_eq!(batch.complete(), 0);
        assert!(batch.is_complete());
    }
}
