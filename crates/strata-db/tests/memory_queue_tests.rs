//! Claim exclusivity of the in-memory queue under real concurrency.

use futures::future::join_all;
use std::sync::Arc;
use strata_core::ports::TaskQueue;
use strata_core::task::{TaskStatus, WorkTask};
use strata_core::{PipelineId, ProjectId};
use strata_db::MemoryTaskQueue;

fn task() -> WorkTask {
    WorkTask::pipeline_execution(PipelineId::new(), ProjectId::new("acme"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_on_one_task_have_one_winner() {
    for claimants in [2usize, 8, 32] {
        let queue = Arc::new(MemoryTaskQueue::new());
        let id = queue.enqueue(task()).await.unwrap();

        let attempts = (0..claimants).map(|_| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.claim_task(id).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| r.as_ref().is_err_and(|e| e.is_claim_conflict()))
            .count();
        assert_eq!(winners, 1, "{claimants} claimants");
        assert_eq!(conflicts, claimants - 1);

        let stored = queue.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claim_next_never_duplicates() {
    let queue = Arc::new(MemoryTaskQueue::new());
    for _ in 0..20 {
        queue.enqueue(task()).await.unwrap();
    }

    let workers = (0..40).map(|_| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.claim().await.unwrap().map(|t| t.id) })
    });
    let mut claimed: Vec<_> = join_all(workers)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap())
        .collect();

    assert_eq!(claimed.len(), 20);
    claimed.sort();
    claimed.dedup();
    assert_eq!(claimed.len(), 20);
}
