//! Core block traits.
//!
//! The traits split a pipeline stage into its two halves: a
//! [`TargetBlock`] accepts input, a [`SourceBlock`] emits output.
//! [`SourceBlock::link_to`] joins the two across stages, forming a
//! pipeline graph with propagated backpressure and completion.

use std::future::Future;

use crate::batch::BatchInfo;
use crate::completion::Completion;
use crate::error::{Error, Result};

/// Behavior common to every pipeline stage.
pub trait DataflowBlock {
    /// Batch bookkeeping: items accepted so far and whether submission is
    /// closed.
    fn batch_info(&self) -> &BatchInfo;

    /// Handle resolving once the stage's job reaches a terminal state.
    fn completion(&self) -> Completion;

    /// Declare submission finished and return the number of items ever
    /// accepted.
    ///
    /// With an error, the cause is recorded as the stage-level failure and
    /// surfaces through [`completion`](DataflowBlock::completion) without
    /// waiting for the queue to drain.
    fn complete(&self, error: Option<Error>) -> impl Future<Output = u64> + Send;
}

/// A stage that accepts input items.
pub trait TargetBlock<I>: DataflowBlock
where
    I: Send + 'static,
{
    /// Offer one item to the stage.
    ///
    /// Suspends while a bounded queue is full (backpressure). Returns
    /// `Ok(false)` if the stage is already closed for input,
    /// `Err(Error::Cancelled)` if its scope is cancelled.
    fn post(&self, message: I) -> impl Future<Output = Result<bool>> + Send;
}

/// A stage that emits output items to subscribers.
pub trait SourceBlock<O>: DataflowBlock
where
    O: Clone + Send + 'static,
{
    /// Subscribe to the stage's output emission.
    ///
    /// Subscribers are invoked in registration order; emission awaits all
    /// of them, so a slow subscriber throttles the whole stage.
    fn subscribe<F, Fut>(&self, sink: F)
    where
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static;

    /// Feed this stage's output into `target`, returning `target` for
    /// fluent chaining (`a.link_to(b).link_to(c)`).
    ///
    /// Every emitted item is posted to `target`, so a bounded target
    /// backpressures this stage's workers. When this stage's job settles,
    /// its outcome is forwarded into `target.complete(..)`: the pipeline
    /// owner completes the head block and awaits the tail block's
    /// completion.
    fn link_to<B>(&self, target: B) -> B
    where
        B: TargetBlock<O> + Clone + Send + Sync + 'static,
        Self: Sized,
    {
        let forward = target.clone();
        self.subscribe(move |message| {
            let target = forward.clone();
            async move {
                if target.post(message).await? {
                    Ok(())
                } else {
                    Err(Error::Closed("linked target rejected item".into()))
                }
            }
        });

        let completion = self.completion();
        let downstream = target.clone();
        tokio::spawn(async move {
            let outcome = completion.wait().await;
            downstream.complete(outcome.err()).await;
        });

        target
    }
}

/// A full transforming stage: accepts `I`, emits `O`.
pub trait TransformingBlock<I, O>: TargetBlock<I> + SourceBlock<O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
}

impl<B, I, O> TransformingBlock<I, O> for B
where
    B: TargetBlock<I> + SourceBlock<O>,
    I: Send + 'static,
    O: Clone + Send + 'static,
{
}
