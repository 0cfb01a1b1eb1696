//! Per-job callback contract consumed by the callback proxy.
//!
//! A [`Callback`] supplies the per-item success/error handling and the
//! job-wide completion signal for one batch of work submitted to a block.
//! The block does not invoke it directly; every call goes through the
//! [`CallbackProxy`](crate::proxy::CallbackProxy), which enforces the
//! exactly-once terminal transition.

use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::BatchInfo;
use crate::completion::{Completion, CompletionCell};
use crate::error::{Error, Result};

/// Per-job collaborator driven by the callback proxy.
///
/// Implementers normally embed a [`CallbackState`] and delegate
/// `batch_info`/`completion`/`job_cancelled`/`job_completed` to it, so the
/// completion handle resolves whenever the job reaches a terminal state.
#[async_trait]
pub trait Callback<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Batch bookkeeping shared with the owning block.
    fn batch_info(&self) -> &BatchInfo;

    /// Job-wide completion signal.
    ///
    /// The proxy observes this handle: a callback that settles it
    /// out-of-band (independent of per-item flow) still drives the job to
    /// the matching terminal state.
    fn completion(&self) -> Completion;

    /// One item finished successfully.
    fn task_success(&self, message: T);

    /// One item faulted. Return `true` if the batch survives this single
    /// item's failure, `false` to fail the whole job with `error`.
    async fn task_error(&self, message: T, error: &Error) -> bool;

    /// The job was cancelled. Returns whether the hook took effect.
    fn job_cancelled(&self) -> Result<bool>;

    /// The job finished: successfully when `error` is `None`, otherwise
    /// with the given cause. Returns whether the hook took effect.
    fn job_completed(&self, error: Option<&Error>) -> Result<bool>;
}

/// Bookkeeping every callback carries: the shared batch counters and the
/// completion cell the job hooks resolve.
#[derive(Debug, Default)]
pub struct CallbackState {
    batch: Arc<BatchInfo>,
    completion: CompletionCell,
}

impl CallbackState {
    /// Create state with a fresh, open batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared batch bookkeeping.
    pub fn batch_info(&self) -> &BatchInfo {
        &self.batch
    }

    /// The shared batch bookkeeping, for handing to the owning block.
    pub fn batch_handle(&self) -> Arc<BatchInfo> {
        Arc::clone(&self.batch)
    }

    /// A handle observing the job outcome.
    pub fn completion(&self) -> Completion {
        self.completion.subscribe()
    }

    /// Resolve the job as cancelled. Returns false if already settled.
    pub fn resolve_cancelled(&self) -> bool {
        self.completion.resolve(Err(Error::Cancelled))
    }

    /// Resolve the job: success without an error, failure with one.
    /// Returns false if already settled.
    pub fn resolve(&self, error: Option<&Error>) -> bool {
        match error {
            None => self.completion.resolve(Ok(())),
            Some(cause) => self.completion.resolve(Err(cause.clone())),
        }
    }
}

/// Baseline callback: success is a no-op, an item fault is logged and
/// fails the batch.
///
/// This is the collaborator a block installs when its owner supplies no
/// callback of their own.
#[derive(Debug, Default)]
pub struct LoggingCallback {
    state: CallbackState,
}

impl LoggingCallback {
    /// Create a baseline callback with a fresh batch.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T> Callback<T> for LoggingCallback
where
    T: Send + 'static,
{
    fn batch_info(&self) -> &BatchInfo {
        self.state.batch_info()
    }

    fn completion(&self) -> Completion {
        self.state.completion()
    }

    fn task_success(&self, _message: T) {}

    async fn task_error(&self, _message: T, error: &Error) -> bool {
        tracing::error!(error = %error, "task failed");
        false
    }

    fn job_cancelled(&self) -> Result<bool> {
        Ok(self.state.resolve_cancelled())
    }

    fn job_completed(&self, error: Option<&Error>) -> Result<bool> {
        Ok(self.state.resolve(error))
    }
}
