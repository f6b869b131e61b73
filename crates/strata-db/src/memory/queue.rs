//! In-memory work queue.

use crate::transition::{check_finish, claim_conflict};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use strata_core::ports::TaskQueue;
use strata_core::task::{CancelOutcome, TaskResult, TaskStatus, WorkTask, meta};
use strata_core::{Error, Result, TaskId};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Heap entry for a queued task.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Ready {
    id: TaskId,
    priority: i32,
    submitted_at: DateTime<Utc>,
    seq: u64,
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier submission, then insertion order
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Terminal tasks kept by [`MemoryTaskQueue::new`].
pub const DEFAULT_RETAINED_TERMINAL: usize = 10_000;

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, WorkTask>,
    ready: BinaryHeap<Ready>,
    seq: u64,
    /// Terminal task ids, oldest first.
    finished: VecDeque<TaskId>,
}

impl State {
    fn task_mut(&mut self, id: TaskId) -> Result<&mut WorkTask> {
        self.tasks
            .get_mut(&id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Record a terminal transition and evict the oldest terminal tasks
    /// beyond `retain`.
    fn retire(&mut self, id: TaskId, retain: usize) {
        self.finished.push_back(id);
        while self.finished.len() > retain {
            let Some(evicted) = self.finished.pop_front() else {
                break;
            };
            self.tasks.remove(&evicted);
            debug!(task_id = %evicted, "Terminal task evicted");
        }
    }
}

/// Work queue held in process memory, for tests and single-process runs.
///
/// Status transitions happen under a single lock, so concurrent claims on
/// one task are linearized and exactly one wins. Entries for tasks that are
/// no longer queued are dropped lazily when they reach the top of the heap.
/// Only the most recent terminal tasks are kept; queued and running tasks
/// are never evicted.
pub struct MemoryTaskQueue {
    state: Mutex<State>,
    retain_terminal: usize,
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_TERMINAL)
    }
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retain_terminal` finished tasks.
    pub fn with_retention(retain_terminal: usize) -> Self {
        Self {
            state: Mutex::default(),
            retain_terminal,
        }
    }

    /// Number of tasks still waiting to be claimed.
    pub async fn queued_len(&self) -> usize {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .count()
    }
}

fn start(task: &mut WorkTask) {
    task.status = TaskStatus::Running;
    task.started_at = Some(Utc::now());
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, mut task: WorkTask) -> Result<TaskId> {
        task.validate()?;
        task.status = TaskStatus::Queued;
        task.cancel_requested = false;
        task.started_at = None;
        task.finished_at = None;
        task.result = None;
        task.error = None;

        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&task.id) {
            return Err(Error::Validation(format!("task {} already exists", task.id)));
        }

        state.seq += 1;
        let entry = Ready {
            id: task.id,
            priority: task.priority,
            submitted_at: task.submitted_at,
            seq: state.seq,
        };
        let id = task.id;
        state.ready.push(entry);
        state.tasks.insert(id, task);

        debug!(task_id = %id, "Task enqueued");
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<WorkTask>> {
        let mut state = self.state.lock().await;
        while let Some(next) = state.ready.pop() {
            let Some(task) = state.tasks.get_mut(&next.id) else {
                continue;
            };
            if task.status != TaskStatus::Queued {
                continue;
            }
            start(task);
            debug!(task_id = %next.id, "Task claimed");
            return Ok(Some(task.clone()));
        }
        Ok(None)
    }

    async fn claim_task(&self, id: TaskId) -> Result<WorkTask> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        if task.status != TaskStatus::Queued {
            return Err(claim_conflict(id, task.status));
        }
        start(task);
        Ok(task.clone())
    }

    async fn complete(&self, id: TaskId, result: TaskResult) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        check_finish(id, task.status, TaskStatus::Completed)?;
        task.status = TaskStatus::Completed;
        task.finished_at = Some(Utc::now());
        task.result = Some(result);
        state.retire(id, self.retain_terminal);
        Ok(())
    }

    async fn fail(&self, id: TaskId, error: String) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        check_finish(id, task.status, TaskStatus::Failed)?;
        task.status = TaskStatus::Failed;
        task.finished_at = Some(Utc::now());
        task.error = Some(error);
        state.retire(id, self.retain_terminal);
        Ok(())
    }

    async fn cancel(&self, id: TaskId, reason: Option<String>) -> Result<CancelOutcome> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        if !task.status.is_terminal()
            && let Some(reason) = reason
        {
            task.metadata.insert(meta::CANCEL_REASON.to_string(), reason);
        }
        match task.status {
            TaskStatus::Queued => {
                task.status = TaskStatus::Cancelled;
                task.finished_at = Some(Utc::now());
                state.retire(id, self.retain_terminal);
                info!(task_id = %id, "Queued task cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            TaskStatus::Running => {
                task.cancel_requested = true;
                info!(task_id = %id, "Cancellation requested for running task");
                Ok(CancelOutcome::Requested)
            }
            status => Err(Error::TaskTerminal {
                id: id.to_string(),
                status: status.to_string(),
            }),
        }
    }

    async fn mark_cancelled(&self, id: TaskId, detail: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        check_finish(id, task.status, TaskStatus::Cancelled)?;
        task.status = TaskStatus::Cancelled;
        task.finished_at = Some(Utc::now());
        task.error = detail;
        state.retire(id, self.retain_terminal);
        Ok(())
    }

    async fn annotate(&self, id: TaskId, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .task_mut(id)?
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<WorkTask>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn list(&self, status: Option<TaskStatus>, limit: usize) -> Result<Vec<WorkTask>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<WorkTask> = state
            .tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        tasks.truncate(limit);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use strata_core::{PipelineId, ProjectId};

    fn task(priority: i32) -> WorkTask {
        WorkTask::pipeline_execution(PipelineId::new(), ProjectId::new("acme")).with_priority(priority)
    }

    fn result() -> TaskResult {
        TaskResult {
            location: None,
            steps_executed: 1,
            context_keys: vec![],
        }
    }

    #[tokio::test]
    async fn test_claim_order() {
        let queue = MemoryTaskQueue::new();
        let now = Utc::now();

        let mut early_low = task(0);
        early_low.submitted_at = now - Duration::seconds(30);
        let mut late_high = task(5);
        late_high.submitted_at = now;
        let mut early_high = task(5);
        early_high.submitted_at = now - Duration::seconds(10);

        let early_low_id = queue.enqueue(early_low).await.unwrap();
        let late_high_id = queue.enqueue(late_high).await.unwrap();
        let early_high_id = queue.enqueue(early_high).await.unwrap();

        let order: Vec<TaskId> = [
            queue.claim().await.unwrap(),
            queue.claim().await.unwrap(),
            queue.claim().await.unwrap(),
        ]
        .into_iter()
        .flatten()
        .map(|t| t.id)
        .collect();

        assert_eq!(order, vec![early_high_id, late_high_id, early_low_id]);
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_twice_is_rejected() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue(task(0)).await.unwrap();
        queue.claim_task(id).await.unwrap();

        queue.complete(id, result()).await.unwrap();
        let second = queue.complete(id, result()).await;
        assert!(matches!(second, Err(Error::TaskTerminal { .. })));

        let stored = queue.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.result, Some(result()));
    }

    #[tokio::test]
    async fn test_complete_requires_running() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue(task(0)).await.unwrap();
        assert!(matches!(
            queue.complete(id, result()).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert!(queue.fail(TaskId::new(), "x".into()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cancel_queued_is_never_claimed() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue(task(0)).await.unwrap();
        assert_eq!(
            queue.cancel(id, Some("obsolete".into())).await.unwrap(),
            CancelOutcome::Cancelled
        );
        assert!(queue.claim().await.unwrap().is_none());
        assert!(queue.claim_task(id).await.unwrap_err().is_claim_conflict());

        let stored = queue.get(id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.get(meta::CANCEL_REASON).unwrap(), "obsolete");
    }

    #[tokio::test]
    async fn test_cancel_running_sets_flag() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue(task(0)).await.unwrap();
        queue.claim().await.unwrap();

        assert_eq!(queue.cancel(id, None).await.unwrap(), CancelOutcome::Requested);
        assert!(queue.get(id).await.unwrap().unwrap().cancel_requested);

        queue.mark_cancelled(id, Some("stopped at step 'b'".into())).await.unwrap();
        let stored = queue.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
        assert!(queue.cancel(id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_annotate_terminal_task() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue(task(0)).await.unwrap();
        queue.claim().await.unwrap();
        queue.fail(id, "boom".into()).await.unwrap();

        queue.annotate(id, "reviewed_by", "ops").await.unwrap();
        let stored = queue.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.metadata.get("reviewed_by").unwrap(), "ops");
    }

    #[tokio::test]
    async fn test_enqueue_validates() {
        let queue = MemoryTaskQueue::new();
        let mut bad = task(0);
        bad.project_id = ProjectId::new("");
        assert!(matches!(queue.enqueue(bad).await, Err(Error::Validation(_))));

        let t = task(0);
        queue.enqueue(t.clone()).await.unwrap();
        assert!(queue.enqueue(t).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let queue = MemoryTaskQueue::new();
        let a = queue.enqueue(task(0)).await.unwrap();
        queue.enqueue(task(0)).await.unwrap();
        queue.claim_task(a).await.unwrap();

        assert_eq!(queue.list(None, 10).await.unwrap().len(), 2);
        let running = queue.list(Some(TaskStatus::Running), 10).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a);
        assert_eq!(queue.list(None, 1).await.unwrap().len(), 1);
        assert_eq!(queue.queued_len().await, 1);
    }

    #[tokio::test]
    async fn test_oldest_terminal_tasks_are_evicted() {
        let queue = MemoryTaskQueue::with_retention(2);
        let waiting = queue.enqueue(task(-1)).await.unwrap();
        let running = queue.enqueue(task(0)).await.unwrap();
        queue.claim_task(running).await.unwrap();

        let mut finished = Vec::new();
        for _ in 0..3 {
            let id = queue.enqueue(task(0)).await.unwrap();
            queue.claim_task(id).await.unwrap();
            queue.complete(id, result()).await.unwrap();
            finished.push(id);
        }
        let cancelled = queue.enqueue(task(0)).await.unwrap();
        queue.cancel(cancelled, None).await.unwrap();

        assert!(queue.get(finished[0]).await.unwrap().is_none());
        assert!(queue.get(finished[1]).await.unwrap().is_none());
        assert!(queue.get(finished[2]).await.unwrap().is_some());
        assert!(queue.get(cancelled).await.unwrap().is_some());
        assert_eq!(
            queue.get(waiting).await.unwrap().map(|t| t.status),
            Some(TaskStatus::Queued)
        );
        assert_eq!(
            queue.get(running).await.unwrap().map(|t| t.status),
            Some(TaskStatus::Running)
        );
        assert_eq!(queue.list(None, 10).await.unwrap().len(), 4);
    }
}
