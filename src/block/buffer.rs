//! Single-worker buffering block.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::batch::BatchInfo;
use crate::block::core::BlockCore;
use crate::block::options::BufferBlockOptions;
use crate::block::traits::{DataflowBlock, SourceBlock, TargetBlock};
use crate::callback::{Callback, LoggingCallback};
use crate::completion::Completion;
use crate::error::{Error, Result};

/// A pipeline stage with exactly one background worker draining its queue.
///
/// The worker dispatches each item to completion before dequeuing the
/// next, so processing (and emission) order equals submission order. The
/// queue may still buffer ahead of the transform, bounded by
/// [`BufferBlockOptions::bounded_capacity`].
///
/// The block is a cheap clonable handle; the stage is torn down when the
/// last handle is dropped (a never-completed job settles as cancelled).
///
/// # Example
///
/// ```rust,ignore
/// use conveyor::{BufferBlock, BufferBlockOptions, DataflowBlock, TargetBlock};
///
/// let block = BufferBlock::new(
///     |value: u32| async move { Ok(value * 2) },
///     BufferBlockOptions::new().with_capacity(16),
/// );
/// block.post(21).await?;
/// block.complete(None).await;
/// block.completion().wait().await?;
/// ```
#[derive(Clone)]
pub struct BufferBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    core: Arc<BlockCore<I, O>>,
}

impl<I, O> BufferBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    /// Create a block running `body` on one worker, supervised by the
    /// baseline [`LoggingCallback`]. Must be called inside a Tokio
    /// runtime.
    pub fn new<F, Fut>(body: F, options: BufferBlockOptions) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self::with_callback(body, Arc::new(LoggingCallback::new()), options)
    }

    /// Create a block whose job is supervised by a caller-supplied
    /// callback.
    pub fn with_callback<F, Fut>(
        body: F,
        callback: Arc<dyn Callback<I>>,
        options: BufferBlockOptions,
    ) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let body = Arc::new(move |message: I| -> BoxFuture<'static, Result<O>> {
            Box::pin(body(message))
        });
        Self {
            core: BlockCore::new(
                body,
                callback,
                options.bounded_capacity,
                options.cancellation,
                1,
            ),
        }
    }
}

impl<I, O> DataflowBlock for BufferBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    fn batch_info(&self) -> &BatchInfo {
        self.core.batch_info()
    }

    fn completion(&self) -> Completion {
        self.core.completion()
    }

    async fn complete(&self, error: Option<Error>) -> u64 {
        self.core.complete(error).await
    }
}

impl<I, O> TargetBlock<I> for BufferBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    async fn post(&self, message: I) -> Result<bool> {
        self.core.post(message).await
    }
}

impl<I, O> SourceBlock<O> for BufferBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    fn subscribe<F, Fut>(&self, sink: F)
    where
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.core
            .subscribe(Arc::new(move |output: O| -> BoxFuture<'static, Result<()>> {
                Box::pin(sink(output))
            }));
    }
}
