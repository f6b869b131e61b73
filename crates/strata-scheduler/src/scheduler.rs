//! Trigger coordination loop.
//!
//! Live triggers sit in a min-heap of `(next fire time, schedule id)` polled
//! by one loop. Removing a trigger only drops it from the active map; stale
//! heap entries are recognized by their generation and skipped.

use crate::trigger::TriggerExpression;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use strata_core::ports::{ScheduleRepository, TaskQueue};
use strata_core::schedule::Schedule;
use strata_core::task::{WorkTask, meta};
use strata_core::{Error, PipelineId, Result, ScheduleId, TaskId};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest the loop sleeps without re-checking the heap.
    pub max_idle: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_idle: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }
}

/// Outcome of one firing.
#[derive(Debug, Clone, Default)]
pub struct FireReport {
    pub schedule_id: Option<ScheduleId>,
    pub enqueued: Vec<TaskId>,
    pub failed: Vec<(PipelineId, String)>,
    pub next_run: Option<DateTime<Utc>>,
}

struct ActiveTrigger {
    expression: TriggerExpression,
    next_fire: DateTime<Utc>,
    generation: u64,
}

#[derive(Default)]
struct Triggers {
    active: HashMap<ScheduleId, ActiveTrigger>,
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64, ScheduleId)>>,
    generation: u64,
}

impl Triggers {
    fn insert(&mut self, id: ScheduleId, expression: TriggerExpression, next_fire: DateTime<Utc>) {
        self.generation += 1;
        let generation = self.generation;
        self.heap.push(Reverse((next_fire, generation, id)));
        self.active.insert(
            id,
            ActiveTrigger {
                expression,
                next_fire,
                generation,
            },
        );
    }

    /// Pop every due trigger, advancing each live one to its next fire time.
    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduleId> {
        let mut due = Vec::new();
        while let Some(Reverse((at, generation, id))) = self.heap.peek().copied() {
            if at > now {
                break;
            }
            self.heap.pop();

            let Some(trigger) = self.active.get(&id) else {
                continue;
            };
            if trigger.generation != generation {
                continue;
            }
            due.push(id);

            match trigger.expression.next_after(now) {
                Some(next) => {
                    let expression = trigger.expression.clone();
                    self.insert(id, expression, next);
                }
                None => {
                    self.active.remove(&id);
                }
            }
        }
        due
    }

    fn sleep_for(&self, now: DateTime<Utc>, max_idle: Duration) -> Duration {
        self.heap
            .peek()
            .map(|Reverse((at, _, _))| (*at - now).to_std().unwrap_or(Duration::ZERO))
            .map_or(max_idle, |d| d.min(max_idle))
    }
}

/// Owns every live trigger. Created at service start, torn down at shutdown.
pub struct Scheduler {
    schedules: Arc<dyn ScheduleRepository>,
    queue: Arc<dyn TaskQueue>,
    config: SchedulerConfig,
    triggers: Mutex<Triggers>,
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        queue: Arc<dyn TaskQueue>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            schedules,
            queue,
            config,
            triggers: Mutex::new(Triggers::default()),
            wake: Notify::new(),
            shutdown_tx,
        })
    }

    /// Restore triggers from the repository and spawn the coordination loop.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        self.recover().await?;
        let scheduler = Arc::clone(self);
        Ok(tokio::spawn(async move { scheduler.run().await }))
    }

    /// Register a trigger for every enabled schedule.
    ///
    /// A schedule whose `next_run` has already passed fires once right away;
    /// older missed firings are not replayed.
    pub async fn recover(&self) -> Result<usize> {
        let now = Utc::now();
        let mut registered = 0;

        for schedule in self.schedules.list().await? {
            if !schedule.enabled {
                continue;
            }
            if schedule.next_run.is_some_and(|at| at <= now) {
                info!(schedule_id = %schedule.id, "Catching up missed firing");
                if let Err(e) = self.fire_now(schedule.id).await {
                    warn!(schedule_id = %schedule.id, error = %e, "Catch-up firing failed");
                }
            }
            match self.register(&schedule).await {
                Ok(()) => registered += 1,
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "Skipping schedule with invalid trigger")
                }
            }
        }

        info!(registered, "Recovered schedule triggers");
        Ok(registered)
    }

    /// Register or replace the live trigger for a schedule.
    ///
    /// Disabled schedules are unregistered instead.
    pub async fn register(&self, schedule: &Schedule) -> Result<()> {
        if !schedule.enabled {
            self.unregister(schedule.id).await;
            return Ok(());
        }

        let expression = TriggerExpression::parse(&schedule.cron_schedule)?;
        let now = Utc::now();
        let next_fire = match schedule.next_run {
            Some(at) if at > now => Some(at),
            _ => expression.next_after(now),
        };
        let Some(next_fire) = next_fire else {
            warn!(schedule_id = %schedule.id, "Trigger expression has no future firing");
            return Ok(());
        };

        self.triggers
            .lock()
            .await
            .insert(schedule.id, expression, next_fire);
        self.wake.notify_one();

        debug!(schedule_id = %schedule.id, %next_fire, "Trigger registered");
        Ok(())
    }

    /// Remove a live trigger. Returns whether one existed.
    pub async fn unregister(&self, id: ScheduleId) -> bool {
        let removed = self.triggers.lock().await.active.remove(&id).is_some();
        if removed {
            self.wake.notify_one();
            debug!(schedule_id = %id, "Trigger unregistered");
        }
        removed
    }

    pub async fn is_registered(&self, id: ScheduleId) -> bool {
        self.triggers.lock().await.active.contains_key(&id)
    }

    pub async fn next_fire(&self, id: ScheduleId) -> Option<DateTime<Utc>> {
        self.triggers.lock().await.active.get(&id).map(|t| t.next_fire)
    }

    pub async fn active_count(&self) -> usize {
        self.triggers.lock().await.active.len()
    }

    /// Fire a schedule: one task per pipeline, then record run times.
    ///
    /// A disabled schedule enqueues nothing. An enqueue failure for one
    /// pipeline is logged and does not stop the others. Run times go through
    /// `record_run`, so an update that lands during the fan-out is kept.
    pub async fn fire_now(&self, id: ScheduleId) -> Result<FireReport> {
        let schedule = self
            .schedules
            .get(id)
            .await?
            .ok_or_else(|| Error::ScheduleNotFound(id.to_string()))?;

        let mut report = FireReport {
            schedule_id: Some(id),
            ..FireReport::default()
        };

        if !schedule.enabled {
            self.unregister(id).await;
            debug!(schedule_id = %id, "Schedule disabled, firing skipped");
            return Ok(report);
        }

        for &pipeline_id in &schedule.pipelines {
            let task = WorkTask::pipeline_execution(pipeline_id, schedule.project_id.clone())
                .with_metadata(meta::TRIGGER_TYPE, meta::TRIGGER_SCHEDULED)
                .with_metadata(meta::TRIGGERED_BY, id.to_string());

            match self.queue.enqueue(task).await {
                Ok(task_id) => {
                    debug!(schedule_id = %id, %pipeline_id, %task_id, "Scheduled task enqueued");
                    report.enqueued.push(task_id);
                }
                Err(e) => {
                    warn!(schedule_id = %id, %pipeline_id, error = %e, "Failed to enqueue scheduled task");
                    report.failed.push((pipeline_id, e.to_string()));
                }
            }
        }

        let now = Utc::now();
        let next_run = TriggerExpression::parse(&schedule.cron_schedule)?.next_after(now);
        match self
            .schedules
            .record_run(id, &schedule.cron_schedule, now, next_run)
            .await?
        {
            Some(stored) => report.next_run = stored.next_run,
            None => warn!(schedule_id = %id, "Schedule deleted while firing"),
        }

        info!(
            schedule_id = %id,
            enqueued = report.enqueued.len(),
            failed = report.failed.len(),
            "Schedule fired"
        );
        Ok(report)
    }

    /// Drive triggers until shutdown. Firings run on their own tasks so the
    /// loop never waits on the queue or the repository.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        info!("Scheduler loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            let (due, wait) = {
                let mut triggers = self.triggers.lock().await;
                let due = triggers.take_due(now);
                (due, triggers.sleep_for(now, self.config.max_idle))
            };

            for id in due {
                let scheduler = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(e) = scheduler.fire_now(id).await {
                        error!(schedule_id = %id, error = %e, "Schedule firing failed");
                    }
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Scheduler loop stopped");
    }

    /// Stop the coordination loop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}
