//! Parallel-worker transforming block.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::batch::BatchInfo;
use crate::block::core::BlockCore;
use crate::block::options::TransformBlockOptions;
use crate::block::traits::{DataflowBlock, SourceBlock, TargetBlock};
use crate::callback::{Callback, LoggingCallback};
use crate::completion::Completion;
use crate::error::{Error, Result};

/// A pipeline stage with N background workers draining a shared queue
/// concurrently.
///
/// Higher throughput than a [`BufferBlock`](crate::block::BufferBlock) at
/// the cost of ordering: two items submitted as A,B may emit as B,A. Each
/// worker still dispatches an item fully (transform, then emission) before
/// dequeuing its next one.
///
/// The block is a cheap clonable handle; the stage is torn down when the
/// last handle is dropped (a never-completed job settles as cancelled).
///
/// # Example
///
/// ```rust,ignore
/// use conveyor::{DataflowBlock, TargetBlock, TransformBlock, TransformBlockOptions};
///
/// let block = TransformBlock::new(
///     |line: String| async move { Ok(line.to_uppercase()) },
///     TransformBlockOptions::new().with_parallelism(4),
/// );
/// block.post("hello".to_string()).await?;
/// block.complete(None).await;
/// block.completion().wait().await?;
/// ```
#[derive(Clone)]
pub struct TransformBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    core: Arc<BlockCore<I, O>>,
}

impl<I, O> TransformBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    /// Create a block running `body` on
    /// [`max_parallelism`](TransformBlockOptions::max_parallelism)
    /// workers, supervised by the baseline [`LoggingCallback`]. Must be
    /// called inside a Tokio runtime.
    pub fn new<F, Fut>(body: F, options: TransformBlockOptions) -> Self
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
        options: TransformBlockOptions,
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
                options.max_parallelism,
            ),
        }
    }
}

impl<I, O> DataflowBlock for TransformBlock<I, O>
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

impl<I, O> TargetBlock<I> for TransformBlock<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    async fn post(&self, message: I) -> Result<bool> {
        self.core.post(message).await
    }
}

impl<I, O> SourceBlock<O> for TransformBlock<I, O>
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
