//! Shared block engine: queue, lazy worker startup, dispatch and draining.
//!
//! Both [`BufferBlock`](crate::block::BufferBlock) and
//! [`TransformBlock`](crate::block::TransformBlock) are thin handles over a
//! [`BlockCore`]; the only behavioral difference between them is the number
//! of worker tasks draining the shared queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use futures::future::{join_all, BoxFuture};
use kanal::{bounded_async, unbounded_async, AsyncReceiver, AsyncSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::callback::Callback;
use crate::completion::Completion;
use crate::error::{Error, Result};
use crate::proxy::CallbackProxy;

/// Type-erased user transform function.
pub(crate) type TransformFn<I, O> =
    Arc<dyn Fn(I) -> BoxFuture<'static, Result<O>> + Send + Sync>;

/// Type-erased output-emission subscriber.
pub(crate) type EmitFn<O> = Arc<dyn Fn(O) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Queue, workers and job supervision shared by the concrete blocks.
///
/// The core owns the queue exclusively; workers reach it through cloned
/// kanal handles and hold only a weak reference back to the core, so
/// dropping the last block handle tears the stage down instead of leaking
/// a cycle.
pub(crate) struct BlockCore<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    body: TransformFn<I, O>,
    /// Self-reference handed to worker tasks, so they never keep the
    /// stage alive on their own.
    this: Weak<BlockCore<I, O>>,
    subscribers: RwLock<Vec<EmitFn<O>>>,
    proxy: Arc<CallbackProxy<I>>,
    /// Working scope: child of the externally supplied token, so the block
    /// can self-cancel without affecting sibling blocks sharing it.
    scope: CancellationToken,
    started: AtomicBool,
    worker_count: usize,
    sender: tokio::sync::RwLock<Option<AsyncSender<I>>>,
    receiver: AsyncReceiver<I>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<I, O> BlockCore<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    pub(crate) fn new(
        body: TransformFn<I, O>,
        callback: Arc<dyn Callback<I>>,
        capacity: Option<usize>,
        cancellation: Option<CancellationToken>,
        worker_count: usize,
    ) -> Arc<Self> {
        let scope = cancellation.unwrap_or_default().child_token();
        let (sender, receiver) = match capacity {
            Some(bound) => bounded_async(bound),
            None => unbounded_async(),
        };

        Arc::new_cyclic(|this| Self {
            body,
            this: this.clone(),
            subscribers: RwLock::new(Vec::new()),
            proxy: CallbackProxy::new(callback, scope.clone()),
            scope,
            started: AtomicBool::new(false),
            worker_count: worker_count.max(1),
            sender: tokio::sync::RwLock::new(Some(sender)),
            receiver,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Batch bookkeeping shared with the callback.
    pub(crate) fn batch_info(&self) -> &crate::batch::BatchInfo {
        self.proxy.batch_info()
    }

    /// Handle resolving with the job outcome.
    pub(crate) fn completion(&self) -> Completion {
        self.proxy.completion()
    }

    /// Accept one item into the queue.
    ///
    /// Lazily starts the workers on the first call. Suspends while a
    /// bounded queue is full (backpressure). Returns `Ok(false)` if the
    /// block is already closed for input, `Err(Error::Cancelled)` if the
    /// scope is cancelled before or while waiting for queue space.
    pub(crate) async fn post(&self, message: I) -> Result<bool> {
        if self.scope.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.batch_info().is_complete() {
            return Ok(false);
        }
        if !self.started.swap(true, Ordering::SeqCst) {
            self.start_workers();
        }

        // The read guard is held across the send so `complete` (which
        // takes the write side) cannot close the batch between a
        // successful enqueue and its bookkeeping.
        let guard = self.sender.read().await;
        let Some(sender) = guard.as_ref() else {
            return Ok(false);
        };

        tokio::select! {
            _ = self.scope.cancelled() => Err(Error::Cancelled),
            sent = sender.send(message) => match sent {
                Ok(()) => {
                    self.batch_info().add(1);
                    Ok(true)
                }
                Err(_) => Ok(false),
            },
        }
    }

    /// Close the batch and return the number of items ever accepted.
    ///
    /// Dropping the queue's sender lets the workers finish everything
    /// already accepted, then exit on empty+closed. With an error, the
    /// cause is recorded immediately as the block-level failure; without
    /// one, the job settles once the last accepted item is processed
    /// (immediately, for an already-drained or empty batch).
    pub(crate) async fn complete(&self, error: Option<Error>) -> u64 {
        if let Some(cause) = &error {
            // Record the failure before closing the batch so a
            // concurrently finishing last item cannot settle the job as
            // success first.
            self.proxy.job_completed(Some(cause));
        }

        let accepted = {
            let mut guard = self.sender.write().await;
            let accepted = self.batch_info().complete();
            guard.take();
            accepted
        };

        if error.is_none() {
            self.proxy.try_finish_batch();
        }
        accepted
    }

    /// Register an output-emission subscriber. Subscribers are invoked in
    /// registration order and all of them are awaited per emitted item.
    pub(crate) fn subscribe(&self, sink: EmitFn<O>) {
        self.subscribers.write().unwrap().push(sink);
    }

    fn start_workers(&self) {
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 1..=self.worker_count {
            let receiver = self.receiver.clone();
            let scope = self.scope.clone();
            let core = self.this.clone();
            workers.push(tokio::spawn(worker_loop(receiver, scope, core, worker_id)));
        }
        tracing::debug!(workers = self.worker_count, "block workers started");
    }

    /// Run one item through the transform and route its outcome.
    ///
    /// On success the output is emitted to every subscriber and all of
    /// them are awaited before the item counts as done; subscriber faults
    /// and transform faults alike are reported to the proxy.
    async fn dispatch(&self, message: I, worker_id: usize) {
        tracing::trace!(worker = worker_id, "dispatching item");
        let unit = message.clone();
        match (*self.body)(message).await {
            Ok(output) => {
                let faults = self.emit(output).await;
                self.proxy.task_completed(unit, Error::collect(faults)).await;
            }
            Err(fault) => self.proxy.task_completed(unit, Some(fault)).await,
        }
    }

    /// Fan the output out to every subscriber and join them, collecting
    /// the faults.
    async fn emit(&self, output: O) -> Vec<Error> {
        let sinks: Vec<EmitFn<O>> = self.subscribers.read().unwrap().clone();
        if sinks.is_empty() {
            return Vec::new();
        }
        let futures: Vec<_> = sinks
            .iter()
            .map(|sink| (**sink)(output.clone()))
            .collect();
        join_all(futures)
            .await
            .into_iter()
            .filter_map(|result| result.err())
            .collect()
    }
}

impl<I, O> Drop for BlockCore<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    /// Force-stop: cancel the scope, close the queue for writing, settle a
    /// never-completed job as cancelled and abort the workers.
    fn drop(&mut self) {
        self.scope.cancel();
        if let Ok(mut guard) = self.sender.try_write() {
            guard.take();
        }
        self.receiver.close();
        self.proxy.dispose();
        for handle in self.workers.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

/// Worker loop shared by both block types: dequeue one item, dispatch it
/// to completion, repeat. Exits silently when the queue is closed and
/// drained or the scope is cancelled while waiting.
async fn worker_loop<I, O>(
    receiver: AsyncReceiver<I>,
    scope: CancellationToken,
    core: Weak<BlockCore<I, O>>,
    worker_id: usize,
) where
    I: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    tracing::trace!(worker = worker_id, "block worker started");
    loop {
        let message = tokio::select! {
            _ = scope.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(message) => message,
                Err(_) => break,
            },
        };
        let Some(core) = core.upgrade() else { break };
        core.dispatch(message, worker_id).await;
    }
    tracing::trace!(worker = worker_id, "block worker stopped");
}
