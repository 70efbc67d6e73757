use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use quantopt_core::{
    EventBus, EventType, ExecutionConfig, FnObjective, Objective, OptimizationTask,
    OptimizerConfig, ParameterSpec, Parameters, QueueAction, TaskCommand, TaskConfig, TaskQueue,
    TaskStatus,
};

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn finish(task: &OptimizationTask) {
    tokio::time::timeout(Duration::from_secs(20), task.wait())
        .await
        .expect("task did not reach a terminal state");
}

fn config(name: &str, budget: usize) -> TaskConfig {
    TaskConfig::new(name)
        .with_parameter("x", ParameterSpec::linear(-1.0, 1.0))
        .with_optimizer(OptimizerConfig {
            budget,
            seed: Some(2),
            ..OptimizerConfig::default()
        })
}

fn instant() -> Arc<dyn Objective> {
    Arc::new(FnObjective::new(|p| p["x"].abs()))
}

struct Slow(Duration);

#[async_trait]
impl Objective for Slow {
    async fn evaluate(&self, params: &Parameters) -> anyhow::Result<f64> {
        tokio::time::sleep(self.0).await;
        Ok(params["x"].abs())
    }
}

fn slow() -> Arc<dyn Objective> {
    Arc::new(Slow(Duration::from_millis(10)))
}

#[tokio::test]
async fn queue_advances_to_next_pending_task() {
    let queue = TaskQueue::new(EventBus::default());
    let a = queue.create_task(config("a", 1), instant()).unwrap();
    let b = queue.create_task(config("b", 20), slow()).unwrap();

    queue.control(QueueAction::Start);
    finish(&a).await;
    assert_eq!(a.status(), TaskStatus::Completed);

    let b_id = b.id().to_string();
    eventually("b to become active", || {
        queue.status().active_task_id.as_deref() == Some(b_id.as_str())
    })
    .await;
    assert!(b.status().is_active() || b.status() == TaskStatus::Completed);
}

#[tokio::test]
async fn queue_drains_after_last_task() {
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let queue = TaskQueue::new(bus);
    let a = queue.create_task(config("a", 2), instant()).unwrap();
    let b = queue.create_task(config("b", 2), instant()).unwrap();

    queue.control(QueueAction::Start);
    finish(&a).await;
    finish(&b).await;
    eventually("queue to go idle", || !queue.status().is_processing).await;

    let status = queue.status();
    assert_eq!(status.active_task_id, None);
    assert_eq!(status.task_count, 2);

    let mut saw_drained = false;
    while let Some(Ok(event)) = events.try_recv() {
        if event.event_type == EventType::QueueDrained {
            saw_drained = true;
        }
    }
    assert!(saw_drained);
}

#[tokio::test]
async fn failed_task_does_not_stop_the_queue() {
    let queue = TaskQueue::new(EventBus::default());
    let failing = Arc::new(FnObjective::fallible(|_| anyhow::bail!("always broken")));
    let a = queue
        .create_task(
            config("a", 5).with_execution(ExecutionConfig {
                max_retries: 0,
                ..ExecutionConfig::default()
            }),
            failing,
        )
        .unwrap();
    let b = queue.create_task(config("b", 3), instant()).unwrap();

    queue.control(QueueAction::Start);
    finish(&a).await;
    finish(&b).await;
    assert_eq!(a.status(), TaskStatus::Failed);
    assert_eq!(b.status(), TaskStatus::Completed);
}

#[tokio::test]
async fn enqueue_into_idle_processing_queue_starts_immediately() {
    let queue = TaskQueue::new(EventBus::default());
    queue.control(QueueAction::Start);

    let task = queue.create_task(config("late", 50), slow()).unwrap();
    assert!(task.status().is_active());
    assert_eq!(queue.status().active_task_id.as_deref(), Some(task.id()));
    queue.control(QueueAction::Stop);
}

#[tokio::test]
async fn queue_pause_and_resume_drive_the_active_task() {
    let queue = TaskQueue::new(EventBus::default());
    let a = queue.create_task(config("a", 200), slow()).unwrap();
    let b = queue.create_task(config("b", 1), instant()).unwrap();

    queue.control(QueueAction::Start);
    let status = queue.control(QueueAction::Pause);
    assert!(status.is_paused);
    assert_eq!(a.status(), TaskStatus::Paused);
    assert_eq!(status.active_task_id.as_deref(), Some(a.id()));

    // Stopping the active task while the queue is paused does not advance.
    queue.control_task(a.id(), TaskCommand::Stop).unwrap();
    assert_eq!(queue.status().active_task_id, None);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(b.status(), TaskStatus::Pending);

    queue.control(QueueAction::Resume);
    finish(&b).await;
    assert_eq!(b.status(), TaskStatus::Completed);
}

#[tokio::test]
async fn resume_with_nothing_pending_drains_the_queue() {
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let queue = TaskQueue::new(bus);
    let a = queue.create_task(config("a", 200), slow()).unwrap();

    queue.control(QueueAction::Start);
    queue.control(QueueAction::Pause);
    queue.control_task(a.id(), TaskCommand::Stop).unwrap();
    assert!(queue.status().is_processing);

    let status = queue.control(QueueAction::Resume);
    assert_eq!(status.active_task_id, None);
    assert!(!status.is_processing);
    assert!(!status.is_paused);

    let mut types = Vec::new();
    while let Some(Ok(event)) = events.try_recv() {
        types.push(event.event_type);
    }
    let resumed = types.iter().position(|t| *t == EventType::QueueResumed);
    let drained = types.iter().position(|t| *t == EventType::QueueDrained);
    assert!(resumed.is_some() && drained > resumed);
}

#[tokio::test]
async fn queue_stop_halts_auto_advance() {
    let queue = TaskQueue::new(EventBus::default());
    let a = queue.create_task(config("a", 200), slow()).unwrap();
    let b = queue.create_task(config("b", 1), instant()).unwrap();

    queue.control(QueueAction::Start);
    let status = queue.control(QueueAction::Stop);

    assert_eq!(a.status(), TaskStatus::Stopped);
    assert!(!status.is_processing);
    assert_eq!(status.active_task_id, None);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(b.status(), TaskStatus::Pending);

    // Stopping again is a no-op.
    assert_eq!(queue.control(QueueAction::Stop), status);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_task_runs_at_a_time() {
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let queue = TaskQueue::new(bus);
    let tasks: Vec<_> = (0..4)
        .map(|i| {
            queue
                .create_task(config(&format!("t{i}"), 5), slow())
                .unwrap()
        })
        .collect();

    queue.control(QueueAction::Start);
    for task in &tasks {
        finish(task).await;
    }
    assert!(tasks.iter().all(|t| t.status() == TaskStatus::Completed));

    // Publish order is global, so replaying lifecycle events shows overlap.
    let mut running = 0i32;
    let mut started = 0;
    while let Some(Ok(event)) = events.try_recv() {
        match event.event_type {
            EventType::TaskStarted | EventType::TaskResumed => {
                running += 1;
                started += 1;
            }
            EventType::TaskPaused
            | EventType::TaskCompleted
            | EventType::TaskFailed
            | EventType::TaskStopped => running -= 1,
            _ => {}
        }
        assert!(running <= 1, "{running} tasks running at once");
    }
    assert_eq!(started, 4);
}
