//! Per-block configuration, fixed at construction time.

use tokio_util::sync::CancellationToken;

/// Configuration for a [`BufferBlock`](crate::block::BufferBlock).
#[derive(Debug, Clone, Default)]
pub struct BufferBlockOptions {
    /// Maximum queued items before `post` suspends. `None` means the
    /// queue grows without bound.
    pub bounded_capacity: Option<usize>,
    /// External cancellation signal. The block derives its own scope from
    /// it, so cancelling the block never affects siblings sharing the
    /// token.
    pub cancellation: Option<CancellationToken>,
}

impl BufferBlockOptions {
    /// Options with an unbounded queue and no external cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the queue to `capacity` items.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.bounded_capacity = Some(capacity);
        self
    }

    /// Attach an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Configuration for a [`TransformBlock`](crate::block::TransformBlock).
#[derive(Debug, Clone)]
pub struct TransformBlockOptions {
    /// Maximum queued items before `post` suspends. `None` means the
    /// queue grows without bound.
    pub bounded_capacity: Option<usize>,
    /// External cancellation signal, as in [`BufferBlockOptions`].
    pub cancellation: Option<CancellationToken>,
    /// Number of worker tasks draining the queue concurrently. Clamped to
    /// at least 1.
    pub max_parallelism: usize,
}

impl TransformBlockOptions {
    /// Options with an unbounded queue, no external cancellation and one
    /// worker per available CPU.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the queue to `capacity` items.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.bounded_capacity = Some(capacity);
        self
    }

    /// Attach an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Use `workers` concurrent worker tasks.
    pub fn with_parallelism(mut self, workers: usize) -> Self {
        self.max_parallelism = workers.max(1);
        self
    }
}

impl Default for TransformBlockOptions {
    fn default() -> Self {
        Self {
            bounded_capacity: None,
            cancellation: None,
            max_parallelism: std::thread::available_parallelism()
                .map(|workers| workers.get())
                .unwrap_or(1),
        }
    }
}
