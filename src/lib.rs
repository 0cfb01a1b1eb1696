//! # Conveyor
//!
//! An in-process dataflow pipeline framework: composable blocks that
//! accept items, transform them concurrently with bounded or unbounded
//! queuing, and forward results downstream, with end-to-end completion and
//! failure tracking per batch of submitted work.
//!
//! ## Features
//!
//! - **Two block types**: [`BufferBlock`] (single worker, strict FIFO) and
//!   [`TransformBlock`] (N workers, unordered, higher throughput)
//! - **Backpressure**: bounded queues suspend producers end-to-end through
//!   linked stages
//! - **Batch completion tracking**: every job settles exactly once as
//!   success, error or cancelled, even under concurrent completions
//! - **Cancellation**: each block derives its scope from an external
//!   token and can self-cancel without affecting siblings
//! - **Lock-free dispatch path**: completion detection uses atomic
//!   compare-and-swap, not locks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conveyor::prelude::*;
//!
//! let double = BufferBlock::new(
//!     |value: u64| async move { Ok(value * 2) },
//!     BufferBlockOptions::new().with_capacity(16),
//! );
//! let print = BufferBlock::new(
//!     |value: u64| async move {
//!         println!("{value}");
//!         Ok(value)
//!     },
//!     BufferBlockOptions::new(),
//! );
//!
//! let tail = double.link_to(print);
//! for value in 1..=3 {
//!     double.post(value).await?;
//! }
//! double.complete(None).await;
//! tail.completion().wait().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod block;
pub mod callback;
pub mod completion;
pub mod error;
pub mod proxy;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::batch::BatchInfo;
    pub use crate::block::{
        BufferBlock, BufferBlockOptions, DataflowBlock, SourceBlock, TargetBlock, TransformBlock,
        TransformBlockOptions, TransformingBlock,
    };
    pub use crate::callback::{Callback, CallbackState, LoggingCallback};
    pub use crate::completion::{BlockResult, Completion};
    pub use crate::error::{Error, Result};
    pub use crate::proxy::{CallbackProxy, JobStatus};
}

pub use batch::BatchInfo;
pub use block::{
    BufferBlock, BufferBlockOptions, DataflowBlock, SourceBlock, TargetBlock, TransformBlock,
    TransformBlockOptions, TransformingBlock,
};
pub use callback::{Callback, CallbackState, LoggingCallback};
pub use completion::{BlockResult, Completion, CompletionCell};
pub use error::{Error, Result};
pub use proxy::{CallbackProxy, JobStatus};
