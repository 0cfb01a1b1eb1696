//! Awaitable completion handles.
//!
//! A [`CompletionCell`] is the resolving side owned by whoever settles the
//! job (normally a callback driven by the
//! [`CallbackProxy`](crate::proxy::CallbackProxy)); a [`Completion`] is a
//! clonable handle any number of observers can await. The cell resolves at
//! most once; every handle sees the same outcome.

use tokio::sync::watch;

use crate::error::{Error, Result};

/// Terminal outcome of a job or block.
///
/// `Ok(())` means every accepted item succeeded; `Err(Error::Cancelled)`
/// means the job was cancelled; any other error is the first unrecovered
/// cause. Callers must inspect which before trusting output completeness.
pub type BlockResult = Result<()>;

/// Clonable awaitable that resolves exactly once with the job outcome.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<BlockResult>>,
}

impl Completion {
    /// Wait until the job reaches a terminal state and return its outcome.
    ///
    /// Safe to call from multiple clones concurrently; all of them resolve
    /// with the same value. If the resolving side is dropped without ever
    /// settling, the outcome is reported as cancelled.
    pub async fn wait(&self) -> BlockResult {
        let mut rx = self.rx.clone();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone().unwrap_or(Err(Error::Cancelled)),
            Err(_) => Err(Error::Cancelled),
        };
        result
    }

    /// The outcome, if the job already reached a terminal state.
    pub fn try_result(&self) -> Option<BlockResult> {
        self.rx.borrow().clone()
    }

    /// Whether the job already reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Resolving side of a [`Completion`]. Set-once.
#[derive(Debug)]
pub struct CompletionCell {
    tx: watch::Sender<Option<BlockResult>>,
}

impl CompletionCell {
    /// Create an unresolved cell.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Get a handle observing this cell.
    pub fn subscribe(&self) -> Completion {
        Completion {
            rx: self.tx.subscribe(),
        }
    }

    /// Resolve the cell. Returns false if it was already resolved; the
    /// first writer wins and later outcomes are discarded.
    pub fn resolve(&self, result: BlockResult) -> bool {
        self.tx.send_if_modified(|value| {
            if value.is_none() {
                *value = Some(result);
                true
            } else {
                false
            }
        })
    }
}

impl Default for CompletionCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let cell = CompletionCell::new();
        let completion = cell.subscribe();

        assert!(!completion.is_terminal());
        assert!(cell.resolve(Ok(())));
        assert!(!cell.resolve(Err(Error::Cancelled)));

        assert_eq!(completion.wait().await, Ok(()));
        assert_eq!(completion.try_result(), Some(Ok(())));
    }

    #[tokio::test]
    async fn test_all_clones_observe_the_outcome() {
        let cell = CompletionCell::new();
        let a = cell.subscribe();
        let b = a.clone();

        let waiter = tokio::spawn(async move { b.wait().await });
        cell.resolve(Err(Error::Transform("boom".into())));

        assert_eq!(a.wait().await, Err(Error::Transform("boom".into())));
        assert_eq!(
            waiter.await.unwrap(),
            Err(Error::Transform("boom".into()))
        );
    }

    #[tokio::test]
    async fn test_dropped_cell_reads_as_cancelled() {
        let cell = CompletionCell::new();
        let completion = cell.subscribe();
        drop(cell);

        assert_eq!(completion.wait().await, Err(Error::Cancelled));
    }
}
