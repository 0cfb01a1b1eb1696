//! The per-job state machine enforcing an exactly-once terminal outcome.
//!
//! A [`CallbackProxy`] wraps one [`Callback`] and supervises a single job:
//! it counts processed items against the shared
//! [`BatchInfo`](crate::batch::BatchInfo), and guarantees that exactly one
//! of the success/error/cancel terminal hooks fires, no matter how many
//! workers, cancellation signals and completion paths race for it.
//!
//! All terminal transitions go through one compare-and-swap on an atomic
//! status word; the hot dispatch path takes no locks.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::batch::BatchInfo;
use crate::callback::Callback;
use crate::completion::{BlockResult, Completion};
use crate::error::Error;

/// Job lifecycle states.
///
/// `Running` is initial; the other three are terminal and mutually
/// exclusive. Under concurrent completions only one transition wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    /// The job is still accepting item outcomes.
    Running = 0,
    /// Every accepted item was processed successfully.
    Success = 1,
    /// The job failed with an unrecovered cause.
    Error = 2,
    /// The job was cancelled.
    Cancelled = 3,
}

impl JobStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl From<u8> for JobStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => JobStatus::Running,
            1 => JobStatus::Success,
            2 => JobStatus::Error,
            3 => JobStatus::Cancelled,
            _ => JobStatus::Running, // Safe default
        }
    }
}

/// Supervises one job on behalf of a wrapped [`Callback`].
///
/// Created once per batch of work submitted to a block. Must be created
/// inside a Tokio runtime: the proxy registers two watcher tasks, one
/// driving [`job_cancelled`](CallbackProxy::job_cancelled) when the
/// cancellation scope fires and one observing the callback's own
/// out-of-band completion signal.
///
/// The cancellation subscription is released exactly once, on the first
/// terminal transition, regardless of which path fires it.
pub struct CallbackProxy<T>
where
    T: Send + 'static,
{
    callback: Arc<dyn Callback<T>>,
    status: AtomicU8,
    processed: AtomicU64,
    token: CancellationToken,
    subscription: Mutex<Option<JoinHandle<()>>>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl<T> CallbackProxy<T>
where
    T: Send + 'static,
{
    /// Wrap `callback` and supervise it under `token`.
    pub fn new(callback: Arc<dyn Callback<T>>, token: CancellationToken) -> Arc<Self> {
        let proxy = Arc::new(Self {
            callback: Arc::clone(&callback),
            status: AtomicU8::new(JobStatus::Running as u8),
            processed: AtomicU64::new(0),
            token: token.clone(),
            subscription: Mutex::new(None),
            observer: Mutex::new(None),
        });

        let subscription = tokio::spawn({
            let weak = Arc::downgrade(&proxy);
            async move {
                token.cancelled().await;
                if let Some(proxy) = weak.upgrade() {
                    proxy.job_cancelled();
                }
            }
        });
        proxy.store_watcher(&proxy.subscription, subscription);

        let observer = tokio::spawn({
            let weak = Arc::downgrade(&proxy);
            let signal = callback.completion();
            async move {
                let outcome = signal.wait().await;
                if let Some(proxy) = weak.upgrade() {
                    proxy.settle_from_signal(outcome);
                }
            }
        });
        proxy.store_watcher(&proxy.observer, observer);

        proxy
    }

    /// Current job status.
    pub fn status(&self) -> JobStatus {
        JobStatus::from(self.status.load(Ordering::SeqCst))
    }

    /// Number of successfully processed items so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Batch bookkeeping of the wrapped callback.
    pub fn batch_info(&self) -> &BatchInfo {
        self.callback.batch_info()
    }

    /// The wrapped callback's completion handle.
    pub fn completion(&self) -> Completion {
        self.callback.completion()
    }

    /// Record the outcome of one dispatched item.
    ///
    /// No-op unless the job is still running. A missing error invokes the
    /// success hook and may finish the batch; a cancellation cancels the
    /// job; any other fault is offered to the error hook and fails the job
    /// unless the hook recovers it.
    pub async fn task_completed(&self, message: T, error: Option<Error>) {
        if self.status().is_terminal() {
            return;
        }

        match error {
            None => {
                self.task_success(message);
                let count = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
                let batch = self.callback.batch_info();
                if batch.is_complete() && count == batch.batch_size() {
                    self.job_completed(None);
                }
            }
            Some(Error::Aggregate(faults)) => {
                let aggregate = Error::Aggregate(faults);
                match aggregate.first_fault().cloned() {
                    Some(fault) => self.task_error(message, &fault).await,
                    None => {
                        self.job_cancelled();
                    }
                }
            }
            Some(fault) if fault.is_cancellation() => {
                self.job_cancelled();
            }
            Some(fault) => self.task_error(message, &fault).await,
        }
    }

    /// Atomic transition to `Cancelled`. Returns the cancel hook's result
    /// if this call won the transition, false otherwise.
    pub fn job_cancelled(&self) -> bool {
        if self.transition(JobStatus::Cancelled).is_terminal() {
            return false;
        }

        let result = match self.callback.job_cancelled() {
            Ok(effective) => effective,
            Err(fault) => {
                if !fault.is_cancellation() {
                    tracing::error!(error = %fault, "job_cancelled hook failed");
                }
                false
            }
        };
        self.release_watchers();
        result
    }

    /// Atomic transition to `Success` (no error) or `Error`. Returns the
    /// completion hook's result if this call won the transition, false
    /// otherwise.
    ///
    /// A cancellation-classified error routes to
    /// [`job_cancelled`](CallbackProxy::job_cancelled): cancellation is
    /// acknowledged, never reported as a failure.
    pub fn job_completed(&self, error: Option<&Error>) -> bool {
        let target = match error {
            None => JobStatus::Success,
            Some(cause) if cause.is_cancellation() => return self.job_cancelled(),
            Some(_) => JobStatus::Error,
        };

        if self.transition(target).is_terminal() {
            return false;
        }

        let result = match self.callback.job_completed(error) {
            Ok(effective) => effective,
            Err(fault) => {
                if !fault.is_cancellation() {
                    tracing::error!(error = %fault, "job_completed hook failed");
                }
                false
            }
        };
        self.release_watchers();
        result
    }

    /// Finish the batch if submission is closed and every accepted item
    /// has been processed. Covers batches whose last item was processed
    /// before the producer called complete, including empty batches.
    pub fn try_finish_batch(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        let batch = self.callback.batch_info();
        if batch.is_complete() && self.processed() == batch.batch_size() {
            self.job_completed(None)
        } else {
            false
        }
    }

    /// Force a terminal state on a proxy that never completed.
    ///
    /// The first disposal of a still-running proxy cancels the job;
    /// disposing a settled proxy is a no-op.
    pub fn dispose(&self) {
        self.job_cancelled();
    }

    fn task_success(&self, message: T) {
        if !self.status().is_terminal() {
            self.callback.task_success(message);
        }
    }

    async fn task_error(&self, message: T, error: &Error) {
        if self.status().is_terminal() {
            return;
        }
        let recovered = self.callback.task_error(message, error).await;
        if !recovered {
            self.job_completed(Some(error));
        }
    }

    /// Re-derive the terminal transition from an out-of-band completion
    /// signal, for callbacks that settle independently of item dispatch.
    fn settle_from_signal(&self, outcome: BlockResult) {
        if self.status().is_terminal() {
            return;
        }
        match outcome {
            Err(cause) if cause.is_cancellation() => {
                self.job_cancelled();
            }
            Err(cause) => {
                self.job_completed(Some(&cause));
            }
            Ok(()) => {
                if self.token.is_cancelled() {
                    self.job_cancelled();
                } else {
                    self.try_finish_batch();
                }
            }
        }
    }

    /// Single CAS shared by every path that can terminate the job.
    /// Returns the prior status; the caller won iff it was `Running`.
    fn transition(&self, to: JobStatus) -> JobStatus {
        let old = self
            .status
            .compare_exchange(
                JobStatus::Running as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .unwrap_or_else(|old| old);
        JobStatus::from(old)
    }

    fn store_watcher(&self, slot: &Mutex<Option<JoinHandle<()>>>, handle: JoinHandle<()>) {
        let mut slot = slot.lock().unwrap();
        if self.status().is_terminal() {
            // The job settled before the watcher was registered.
            handle.abort();
        } else {
            *slot = Some(handle);
        }
    }

    fn release_watchers(&self) {
        if let Some(handle) = self.subscription.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.observer.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl<T> Drop for CallbackProxy<T>
where
    T: Send + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> std::fmt::Debug for CallbackProxy<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackProxy")
            .field("status", &self.status())
            .field("processed", &self.processed())
            .finish()
    }
}
