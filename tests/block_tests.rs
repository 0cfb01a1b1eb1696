//! Integration tests for blocks, linking and backpressure.
//!
//! These tests verify that:
//! - BufferBlock emission order equals submission order
//! - TransformBlock processes every item, order unconstrained
//! - Bounded queues suspend producers until a worker drains a slot
//! - Linked pipelines complete end-to-end from the head block
//! - Cancellation unblocks suspended posts and settles jobs as cancelled

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conveyor::prelude::*;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn collecting_sink<T>(
    into: &Arc<Mutex<Vec<T>>>,
) -> impl Fn(T) -> std::future::Ready<Result<()>> + Send + Sync + 'static
where
    T: Send + 'static,
{
    let into = Arc::clone(into);
    move |value| {
        into.lock().unwrap().push(value);
        std::future::ready(Ok(()))
    }
}

#[tokio::test]
async fn test_buffer_block_preserves_submission_order() {
    let block = BufferBlock::new(
        |value: u64| async move { Ok(value * 2) },
        BufferBlockOptions::new().with_capacity(2),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    block.subscribe(collecting_sink(&seen));

    for value in [1, 2, 3] {
        assert!(block.post(value).await.unwrap());
    }
    assert_eq!(block.complete(None).await, 3);

    assert_eq!(block.completion().wait().await, Ok(()));
    assert_eq!(*seen.lock().unwrap(), vec![2, 4, 6]);
}

#[tokio::test]
async fn test_transform_block_processes_every_item() {
    let block = TransformBlock::new(
        |value: u64| async move { Ok(value * 2) },
        TransformBlockOptions::new().with_parallelism(3),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    block.subscribe(collecting_sink(&seen));

    for value in 0..100 {
        assert!(block.post(value).await.unwrap());
    }
    assert_eq!(block.complete(None).await, 100);
    assert_eq!(block.completion().wait().await, Ok(()));

    let mut emitted = seen.lock().unwrap().clone();
    emitted.sort_unstable();
    let expected: Vec<u64> = (0..100).map(|value| value * 2).collect();
    assert_eq!(emitted, expected);
}

#[tokio::test]
async fn test_unrecovered_fault_fails_the_batch() {
    let block = TransformBlock::new(
        |value: u64| async move {
            if value == 2 {
                Err(Error::Transform("item 2 failed".into()))
            } else {
                Ok(value)
            }
        },
        TransformBlockOptions::new().with_parallelism(3),
    );

    for value in [1, 2, 3] {
        assert!(block.post(value).await.unwrap());
    }
    block.complete(None).await;

    // Items 1 and 3 may or may not have emitted, but the job must fail
    // with the fault from item 2.
    assert_eq!(
        block.completion().wait().await,
        Err(Error::Transform("item 2 failed".into()))
    );
}

#[tokio::test]
async fn test_bounded_post_blocks_until_drained() {
    let entered = Arc::new(Semaphore::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let block = {
        let entered = Arc::clone(&entered);
        let gate = Arc::clone(&gate);
        BufferBlock::new(
            move |value: u64| {
                let entered = Arc::clone(&entered);
                let gate = Arc::clone(&gate);
                async move {
                    entered.add_permits(1);
                    gate.acquire().await.unwrap().forget();
                    Ok(value)
                }
            },
            BufferBlockOptions::new().with_capacity(1),
        )
    };

    assert!(block.post(1).await.unwrap());
    // The worker now holds item 1 inside the transform and the queue is
    // empty again.
    entered.acquire().await.unwrap().forget();
    assert!(block.post(2).await.unwrap());

    // Queue full: the third post must suspend.
    let suspended = timeout(Duration::from_millis(100), block.post(3)).await;
    assert!(suspended.is_err());

    gate.add_permits(16);
    assert!(block.post(3).await.unwrap());
    block.complete(None).await;
    assert_eq!(block.completion().wait().await, Ok(()));
    assert_eq!(block.batch_info().batch_size(), 3);
}

#[tokio::test]
async fn test_linked_pipeline_completes_end_to_end() {
    let head = BufferBlock::new(
        |value: u64| async move { Ok(value * 2) },
        BufferBlockOptions::new().with_capacity(4),
    );
    let tail = head.link_to(BufferBlock::new(
        |value: u64| async move { Ok(value + 1) },
        BufferBlockOptions::new().with_capacity(4),
    ));

    let seen = Arc::new(Mutex::new(Vec::new()));
    tail.subscribe(collecting_sink(&seen));

    for value in [1, 2, 3] {
        assert!(head.post(value).await.unwrap());
    }
    head.complete(None).await;

    // Only the tail block's completion is awaited; the head's outcome
    // propagates through the link.
    assert_eq!(tail.completion().wait().await, Ok(()));
    assert_eq!(*seen.lock().unwrap(), vec![3, 5, 7]);
    assert_eq!(tail.batch_info().batch_size(), 3);
}

#[tokio::test]
async fn test_linked_pipeline_propagates_failure() {
    let head = BufferBlock::new(
        |value: u64| async move {
            if value == 2 {
                Err(Error::Transform("boom".into()))
            } else {
                Ok(value)
            }
        },
        BufferBlockOptions::new(),
    );
    let tail = head.link_to(BufferBlock::new(
        |value: u64| async move { Ok(value) },
        BufferBlockOptions::new(),
    ));

    for value in [1, 2, 3] {
        assert!(head.post(value).await.unwrap());
    }
    head.complete(None).await;

    assert_eq!(
        tail.completion().wait().await,
        Err(Error::Transform("boom".into()))
    );
}

#[tokio::test]
async fn test_zero_item_complete_resolves_success() {
    let block = BufferBlock::new(
        |value: u64| async move { Ok(value) },
        BufferBlockOptions::new(),
    );
    assert_eq!(block.complete(None).await, 0);
    assert_eq!(block.completion().wait().await, Ok(()));
}

#[tokio::test]
async fn test_complete_with_error_surfaces_cause() {
    let block = BufferBlock::new(
        |value: u64| async move { Ok(value) },
        BufferBlockOptions::new(),
    );
    assert!(block.post(1).await.unwrap());
    block.complete(Some(Error::Closed("upstream gone".into()))).await;

    assert_eq!(
        block.completion().wait().await,
        Err(Error::Closed("upstream gone".into()))
    );
}

#[tokio::test]
async fn test_post_after_complete_is_rejected() {
    let block = BufferBlock::new(
        |value: u64| async move { Ok(value) },
        BufferBlockOptions::new(),
    );
    block.complete(None).await;

    assert_eq!(block.post(1).await, Ok(false));
    assert_eq!(block.batch_info().batch_size(), 0);
}

#[tokio::test]
async fn test_cancellation_unblocks_suspended_post() {
    let token = CancellationToken::new();
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(Semaphore::new(0));
    let block = {
        let gate = Arc::clone(&gate);
        let entered = Arc::clone(&entered);
        BufferBlock::new(
            move |value: u64| {
                let gate = Arc::clone(&gate);
                let entered = Arc::clone(&entered);
                async move {
                    entered.add_permits(1);
                    gate.acquire().await.unwrap().forget();
                    Ok(value)
                }
            },
            BufferBlockOptions::new()
                .with_capacity(1)
                .with_cancellation(token.clone()),
        )
    };

    assert!(block.post(1).await.unwrap());
    entered.acquire().await.unwrap().forget();
    assert!(block.post(2).await.unwrap());

    // Queue full again; this post suspends until the token fires.
    let suspended = {
        let block = block.clone();
        tokio::spawn(async move { block.post(3).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    assert_eq!(suspended.await.unwrap(), Err(Error::Cancelled));
    assert_eq!(block.completion().wait().await, Err(Error::Cancelled));
}

#[tokio::test]
async fn test_emission_awaits_every_subscriber() {
    let block = BufferBlock::new(
        |value: u64| async move { Ok(value * 2) },
        BufferBlockOptions::new(),
    );
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(AtomicU64::new(0));
    block.subscribe(collecting_sink(&first));
    {
        let second = Arc::clone(&second);
        block.subscribe(move |value: u64| {
            let second = Arc::clone(&second);
            async move {
                // A slow subscriber throttles the stage but never loses
                // an item.
                tokio::time::sleep(Duration::from_millis(5)).await;
                second.fetch_add(value, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    for value in [1, 2, 3] {
        assert!(block.post(value).await.unwrap());
    }
    block.complete(None).await;
    assert_eq!(block.completion().wait().await, Ok(()));

    assert_eq!(*first.lock().unwrap(), vec![2, 4, 6]);
    assert_eq!(second.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn test_dropping_every_handle_settles_the_job_as_cancelled() {
    let block = BufferBlock::new(
        |value: u64| async move { Ok(value) },
        BufferBlockOptions::new(),
    );
    let completion = block.completion();

    assert!(block.post(1).await.unwrap());
    drop(block);

    assert_eq!(completion.wait().await, Err(Error::Cancelled));
}
