//! PostgreSQL work queue against a real database.
//!
//! Run with: `cargo test -p strata-tests --features integration`

#![cfg(feature = "integration")]

use futures::future::join_all;
use std::sync::Arc;
use strata_core::Error;
use strata_core::ports::TaskQueue;
use strata_core::task::{CancelOutcome, TaskResult, TaskStatus};
use strata_core::PipelineId;
use strata_tests::{TaskFixture, TestContext};

fn result() -> TaskResult {
    TaskResult {
        location: None,
        steps_executed: 1,
        context_keys: vec!["a".into()],
    }
}

#[tokio::test]
async fn test_claim_follows_priority_then_age() {
    let ctx = TestContext::start().await.expect("Failed to create context");
    let queue = ctx.db.task_queue();

    let low = queue
        .enqueue(TaskFixture::for_pipeline(PipelineId::new()))
        .await
        .unwrap();
    let high = queue
        .enqueue(TaskFixture::for_pipeline(PipelineId::new()).with_priority(5))
        .await
        .unwrap();

    assert_eq!(queue.claim().await.unwrap().unwrap().id, high);
    assert_eq!(queue.claim().await.unwrap().unwrap().id, low);
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_claims_on_one_task_have_one_winner() {
    let ctx = TestContext::start().await.expect("Failed to create context");
    let queue = Arc::new(ctx.db.task_queue());
    let id = queue
        .enqueue(TaskFixture::for_pipeline(PipelineId::new()))
        .await
        .unwrap();

    let attempts = (0..8).map(|_| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.claim_task(id).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(Error::is_claim_conflict)
    );
}

#[tokio::test]
async fn test_concurrent_claim_next_never_duplicates() {
    let ctx = TestContext::start().await.expect("Failed to create context");
    let queue = Arc::new(ctx.db.task_queue());
    for _ in 0..10 {
        queue
            .enqueue(TaskFixture::for_pipeline(PipelineId::new()))
            .await
            .unwrap();
    }

    let workers = (0..20).map(|_| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.claim().await.unwrap().map(|t| t.id) })
    });
    let mut claimed: Vec<_> = join_all(workers)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap())
        .collect();

    assert_eq!(claimed.len(), 10);
    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), 10);
}

#[tokio::test]
async fn test_second_completion_is_rejected() {
    let ctx = TestContext::start().await.expect("Failed to create context");
    let queue = ctx.db.task_queue();
    let id = queue
        .enqueue(TaskFixture::for_pipeline(PipelineId::new()))
        .await
        .unwrap();

    assert!(matches!(
        queue.complete(id, result()).await,
        Err(Error::InvalidTransition { .. })
    ));

    queue.claim_task(id).await.unwrap();
    queue.complete(id, result()).await.unwrap();
    assert!(matches!(
        queue.complete(id, result()).await,
        Err(Error::TaskTerminal { .. })
    ));
    assert!(matches!(
        queue.fail(id, "late".into()).await,
        Err(Error::TaskTerminal { .. })
    ));

    let stored = queue.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.result, Some(result()));
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn test_cancel_queued_and_running() {
    let ctx = TestContext::start().await.expect("Failed to create context");
    let queue = ctx.db.task_queue();

    let queued = queue
        .enqueue(TaskFixture::for_pipeline(PipelineId::new()))
        .await
        .unwrap();
    assert_eq!(
        queue.cancel(queued, None).await.unwrap(),
        CancelOutcome::Cancelled
    );
    assert_eq!(
        queue.get(queued).await.unwrap().unwrap().status,
        TaskStatus::Cancelled
    );
    assert!(queue.claim().await.unwrap().is_none());

    let running = queue
        .enqueue(TaskFixture::for_pipeline(PipelineId::new()))
        .await
        .unwrap();
    queue.claim_task(running).await.unwrap();
    assert_eq!(
        queue.cancel(running, Some("operator".into())).await.unwrap(),
        CancelOutcome::Requested
    );
    let task = queue.get(running).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.cancel_requested);

    queue.mark_cancelled(running, Some("stopped".into())).await.unwrap();
    assert!(matches!(
        queue.cancel(running, None).await,
        Err(Error::TaskTerminal { .. })
    ));
}
