//! Consumer pipeline: decode -> coordinate -> execute -> drain.
//!
//! Per-message state machine:
//! RECEIVED -> DECODING -> (ACQUIRING -> RUNNING | WAITING) -> COMPLETED|FAILED
//!
//! Design:
//! - Coordination and execution errors never escape `on_message`; the
//!   broker adapter only ever sees "message handled". Retry/redelivery is
//!   the adapter's concern.
//! - Draining runs on the worker that just finished a key's task. There is
//!   no per-key poller; the trade-off is that one worker's call path owns a
//!   hot key's entire backlog.

use std::sync::Arc;
use std::time::Instant;

use crate::coordinator::KeyCoordinator;
use crate::domain::{StrandKey, TaskEvent};
use crate::ports::{EventSink, NoopEventSink};
use crate::registry::{DecodedTask, TaskRegistry};

/// What `on_message` did with a delivery. Coordination with the broker
/// adapter never needs more than this: all three mean "consumed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Ran to completion (or failure) on this call, including any drain.
    Executed,

    /// Parked in the wait queue behind the current holder of its key; it
    /// will run later via some drain, not via redelivery.
    Deferred,

    /// Consumed without execution: undecodable, or the wait queue was
    /// unreachable.
    Rejected,
}

pub struct ConsumerPipeline {
    registry: Arc<TaskRegistry>,
    coordinator: Arc<KeyCoordinator>,
    events: Arc<dyn EventSink>,
}

impl ConsumerPipeline {
    pub fn new(registry: Arc<TaskRegistry>, coordinator: Arc<KeyCoordinator>) -> Self {
        Self {
            registry,
            coordinator,
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Operator/diagnostic access to the coordination surface.
    pub fn coordinator(&self) -> &KeyCoordinator {
        &self.coordinator
    }

    /// Entry point, invoked once per broker delivery.
    pub async fn on_message(&self, raw: &[u8]) -> Disposition {
        let decoded = match self.registry.decode(raw) {
            Ok(decoded) => decoded,
            Err(error) => {
                tracing::error!(error = %error, "dropping undecodable message");
                self.events.emit(TaskEvent::Rejected {
                    error: error.to_string(),
                });
                return Disposition::Rejected;
            }
        };

        let Some(key) = decoded.envelope().key().cloned() else {
            // No ordering constraint: run immediately, no coordination.
            self.execute(decoded).await;
            return Disposition::Executed;
        };

        if self.coordinator.try_acquire(&key).await {
            self.execute(decoded).await;
            self.drain(&key).await;
            return Disposition::Executed;
        }

        let task_id = decoded.envelope().task_id();
        match self.coordinator.enqueue(&key, raw.to_vec()).await {
            Ok(()) => {
                tracing::debug!(task_id = %task_id, key = %key, "deferred behind current holder");
                self.events.emit(TaskEvent::Deferred { task_id, key });
                Disposition::Deferred
            }
            Err(error) => {
                tracing::error!(
                    task_id = %task_id,
                    key = %key,
                    error = %error,
                    "enqueue failed; message dropped",
                );
                self.events.emit(TaskEvent::Rejected {
                    error: error.to_string(),
                });
                Disposition::Rejected
            }
        }
    }

    /// Run one decoded task through the hook pipeline. Never propagates.
    async fn execute(&self, decoded: DecodedTask) {
        let DecodedTask { mut envelope, task } = decoded;
        let task_id = envelope.task_id();
        let key = envelope.key().cloned();
        let started = Instant::now();

        envelope.mark_processing();
        self.events.emit(TaskEvent::Started {
            task_id,
            key: key.clone(),
        });

        task.before(&envelope).await;
        match task.run().await {
            Ok(()) => {
                task.after(&envelope).await;
                envelope.mark_completed();
                let elapsed = started.elapsed();
                tracing::info!(
                    task_id = %task_id,
                    key = key.as_ref().map(|k| k.as_str()),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "task completed",
                );
                self.events.emit(TaskEvent::Completed {
                    task_id,
                    key,
                    elapsed,
                });
            }
            Err(error) => {
                envelope.mark_failed();
                task.on_error(&envelope, &error).await;
                self.events.emit(TaskEvent::Failed {
                    task_id,
                    key,
                    error: error.to_string(),
                });
            }
        }
    }

    /// Release the key and keep executing whatever is queued behind it.
    /// Nothing else polls the wait queue; this loop is what turns FIFO
    /// parking into forward progress. Runs after success *and* failure so
    /// one bad task cannot block its key.
    async fn drain(&self, key: &StrandKey) {
        while let Some(raw) = self.coordinator.release(key).await {
            match self.registry.decode(&raw) {
                Ok(decoded) => self.execute(decoded).await,
                Err(error) => {
                    tracing::error!(key = %key, error = %error, "dropping undecodable queued task");
                    self.events.emit(TaskEvent::Rejected {
                        error: error.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::error::StrandError;
    use crate::impls::InMemoryStore;
    use crate::ports::{Clock, ManualClock};
    use crate::registry::{Handler, Task};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Step {
        label: String,
        #[serde(default)]
        millis: u64,
        #[serde(default)]
        fail: bool,
        #[serde(default)]
        gated: bool,
    }

    impl Task for Step {
        const TYPE: &'static str = "test.step.v1";
    }

    /// Records execution order and the maximum number of concurrently
    /// Processing bodies; optionally blocks on a gate so tests can hold a
    /// key occupied deterministically.
    struct Probe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        completed: Mutex<Vec<String>>,
        gate: Notify,
        gate_open: AtomicUsize,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                completed: Mutex::new(Vec::new()),
                gate: Notify::new(),
                gate_open: AtomicUsize::new(0),
            })
        }

        fn open_gate(&self) {
            self.gate_open.store(1, Ordering::SeqCst);
            self.gate.notify_waiters();
        }

        fn completed(&self) -> Vec<String> {
            self.completed.lock().unwrap().clone()
        }

        fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    struct ProbeHandler {
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl Handler<Step> for ProbeHandler {
        async fn process(&self, task: &Step) -> Result<(), StrandError> {
            let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_active.fetch_max(now, Ordering::SeqCst);

            if task.gated {
                while self.probe.gate_open.load(Ordering::SeqCst) == 0 {
                    self.probe.gate.notified().await;
                }
            }
            if task.millis > 0 {
                tokio::time::sleep(Duration::from_millis(task.millis)).await;
            }

            self.probe.active.fetch_sub(1, Ordering::SeqCst);
            if task.fail {
                return Err(StrandError::ExecutionFailed(format!("{} failed", task.label)));
            }
            self.probe.completed.lock().unwrap().push(task.label.clone());
            Ok(())
        }
    }

    fn pipeline_with_probe() -> (Arc<ConsumerPipeline>, Arc<Probe>) {
        let probe = Probe::new();
        let registry = Arc::new(TaskRegistry::new());
        registry.register::<Step, _>(ProbeHandler {
            probe: Arc::clone(&probe),
        });
        let coordinator = Arc::new(KeyCoordinator::new(
            Arc::new(InMemoryStore::new()),
            CoordinatorConfig::default(),
        ));
        (
            Arc::new(ConsumerPipeline::new(registry, coordinator)),
            probe,
        )
    }

    fn step(label: &str) -> Step {
        Step {
            label: label.to_string(),
            millis: 0,
            fail: false,
            gated: false,
        }
    }

    fn raw(task: &Step, key: Option<&str>) -> Vec<u8> {
        let mut env = task.envelope().unwrap();
        if let Some(key) = key {
            env = env.with_key(key);
        }
        env.to_bytes().unwrap()
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<&'static str>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: TaskEvent) {
            let tag = match event {
                TaskEvent::Started { .. } => "started",
                TaskEvent::Completed { .. } => "completed",
                TaskEvent::Failed { .. } => "failed",
                TaskEvent::Deferred { .. } => "deferred",
                TaskEvent::Rejected { .. } => "rejected",
            };
            self.seen.lock().unwrap().push(tag);
        }
    }

    #[tokio::test]
    async fn event_sink_observes_every_transition() {
        let probe = Probe::new();
        let registry = Arc::new(TaskRegistry::new());
        registry.register::<Step, _>(ProbeHandler {
            probe: Arc::clone(&probe),
        });
        let coordinator = Arc::new(KeyCoordinator::new(
            Arc::new(InMemoryStore::new()),
            CoordinatorConfig::default(),
        ));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = ConsumerPipeline::new(registry, Arc::clone(&coordinator))
            .with_event_sink(Arc::clone(&sink) as Arc<dyn EventSink>);

        pipeline.on_message(&raw(&step("ok"), None)).await;
        let failing = Step {
            fail: true,
            ..step("bad")
        };
        pipeline.on_message(&raw(&failing, None)).await;
        pipeline.on_message(b"garbage").await;
        // Hold the key so the last message parks.
        assert!(coordinator.try_acquire(&StrandKey::new("u1")).await);
        pipeline.on_message(&raw(&step("parked"), Some("u1"))).await;

        assert_eq!(
            sink.seen.lock().unwrap().clone(),
            vec![
                "started", "completed", "started", "failed", "rejected", "deferred"
            ]
        );
    }

    #[tokio::test]
    async fn keyless_task_executes_immediately() {
        let (pipeline, probe) = pipeline_with_probe();
        let disposition = pipeline.on_message(&raw(&step("free"), None)).await;
        assert_eq!(disposition, Disposition::Executed);
        assert_eq!(probe.completed(), vec!["free"]);
        assert!(pipeline.coordinator().occupied_keys().await.is_empty());
    }

    #[tokio::test]
    async fn undecodable_message_is_rejected_without_crashing() {
        let (pipeline, probe) = pipeline_with_probe();
        assert_eq!(pipeline.on_message(b"garbage").await, Disposition::Rejected);
        assert!(probe.completed().is_empty());
        // The pipeline keeps working afterwards.
        assert_eq!(
            pipeline.on_message(&raw(&step("next"), None)).await,
            Disposition::Executed
        );
    }

    #[tokio::test]
    async fn registering_after_startup_makes_the_type_decodable() {
        let registry = Arc::new(TaskRegistry::new());
        let coordinator = Arc::new(KeyCoordinator::new(
            Arc::new(InMemoryStore::new()),
            CoordinatorConfig::default(),
        ));
        let pipeline = ConsumerPipeline::new(Arc::clone(&registry), coordinator);

        let probe = Probe::new();
        let message = raw(&step("late"), None);

        assert_eq!(pipeline.on_message(&message).await, Disposition::Rejected);

        registry.register::<Step, _>(ProbeHandler {
            probe: Arc::clone(&probe),
        });
        assert_eq!(pipeline.on_message(&message).await, Disposition::Executed);
        assert_eq!(probe.completed(), vec!["late"]);
    }

    /// FIFO within a key: t1..t3 parked behind an occupied key drain in
    /// arrival order on the holder's call path.
    #[tokio::test]
    async fn same_key_tasks_drain_in_fifo_order() {
        let (pipeline, probe) = pipeline_with_probe();

        let gated = Step {
            gated: true,
            ..step("t0")
        };
        let holder = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let message = raw(&gated, Some("u1"));
            async move { pipeline.on_message(&message).await }
        });

        // Wait until t0 actually holds the key.
        while !pipeline.coordinator().is_occupied(&StrandKey::new("u1")).await {
            tokio::task::yield_now().await;
        }

        for label in ["t1", "t2", "t3"] {
            let disposition = pipeline.on_message(&raw(&step(label), Some("u1"))).await;
            assert_eq!(disposition, Disposition::Deferred);
        }
        assert_eq!(pipeline.coordinator().queue_size(&StrandKey::new("u1")).await, 3);

        probe.open_gate();
        assert_eq!(holder.await.unwrap(), Disposition::Executed);

        assert_eq!(probe.completed(), vec!["t0", "t1", "t2", "t3"]);
        assert_eq!(probe.max_active(), 1);
        assert!(!pipeline.coordinator().is_occupied(&StrandKey::new("u1")).await);
    }

    /// Mutual exclusion under genuinely concurrent submission. Stragglers
    /// caught by the two-step race window are picked up by a trailing
    /// "nudge" message, the way normal consumer traffic would.
    #[tokio::test]
    async fn concurrent_same_key_tasks_never_overlap() {
        let (pipeline, probe) = pipeline_with_probe();

        let mut joins = Vec::new();
        for i in 0..6 {
            let mut task = step(&format!("c{i}"));
            task.millis = 10;
            let message = raw(&task, Some("u1"));
            let pipeline = Arc::clone(&pipeline);
            joins.push(tokio::spawn(async move { pipeline.on_message(&message).await }));
        }
        for join in joins {
            join.await.unwrap();
        }

        pipeline.on_message(&raw(&step("nudge"), Some("u1"))).await;

        assert_eq!(probe.completed().len(), 7);
        assert_eq!(probe.max_active(), 1, "same-key bodies overlapped");
    }

    /// Independence: tasks on distinct keys can overlap. Both handlers must
    /// be inside their bodies at the same time to get past the rendezvous.
    #[tokio::test]
    async fn distinct_keys_run_in_parallel() {
        let registry = Arc::new(TaskRegistry::new());

        struct Rendezvous {
            barrier: tokio::sync::Barrier,
        }

        #[derive(Debug, Serialize, Deserialize)]
        struct Meet;

        impl Task for Meet {
            const TYPE: &'static str = "test.meet.v1";
        }

        #[async_trait]
        impl Handler<Meet> for Rendezvous {
            async fn process(&self, _task: &Meet) -> Result<(), StrandError> {
                self.barrier.wait().await;
                Ok(())
            }
        }

        registry.register::<Meet, _>(Rendezvous {
            barrier: tokio::sync::Barrier::new(2),
        });

        let coordinator = Arc::new(KeyCoordinator::new(
            Arc::new(InMemoryStore::new()),
            CoordinatorConfig::default(),
        ));
        let pipeline = Arc::new(ConsumerPipeline::new(registry, coordinator));

        let a = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let message = Meet.envelope().unwrap().with_key("u1").to_bytes().unwrap();
            async move { pipeline.on_message(&message).await }
        });
        let b = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let message = Meet.envelope().unwrap().with_key("u2").to_bytes().unwrap();
            async move { pipeline.on_message(&message).await }
        });

        // Would deadlock if u1 and u2 were serialized against each other.
        let both = async move {
            assert_eq!(a.await.unwrap(), Disposition::Executed);
            assert_eq!(b.await.unwrap(), Disposition::Executed);
        };
        tokio::time::timeout(Duration::from_secs(5), both)
            .await
            .expect("distinct keys were serialized");
    }

    /// A failing task still drains its successors: the key is never blocked
    /// by one failure.
    #[tokio::test]
    async fn failure_still_drains_the_queue() {
        let (pipeline, probe) = pipeline_with_probe();

        let failing = Step {
            gated: true,
            fail: true,
            ..step("bad")
        };
        let holder = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let message = raw(&failing, Some("u1"));
            async move { pipeline.on_message(&message).await }
        });
        while !pipeline.coordinator().is_occupied(&StrandKey::new("u1")).await {
            tokio::task::yield_now().await;
        }

        pipeline.on_message(&raw(&step("good"), Some("u1"))).await;
        probe.open_gate();
        holder.await.unwrap();

        assert_eq!(probe.completed(), vec!["good"]);
        assert!(!pipeline.coordinator().is_occupied(&StrandKey::new("u1")).await);
    }

    /// An undecodable envelope parked in the wait queue is skipped and the
    /// drain keeps going.
    #[tokio::test]
    async fn undecodable_queued_task_does_not_stop_the_drain() {
        let (pipeline, probe) = pipeline_with_probe();
        let key = StrandKey::new("u1");

        let gated = Step {
            gated: true,
            ..step("t0")
        };
        let holder = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let message = raw(&gated, Some("u1"));
            async move { pipeline.on_message(&message).await }
        });
        while !pipeline.coordinator().is_occupied(&key).await {
            tokio::task::yield_now().await;
        }

        pipeline
            .coordinator()
            .enqueue(&key, b"garbage".to_vec())
            .await
            .unwrap();
        pipeline.on_message(&raw(&step("t1"), Some("u1"))).await;

        probe.open_gate();
        holder.await.unwrap();

        assert_eq!(probe.completed(), vec!["t0", "t1"]);
        assert!(!pipeline.coordinator().is_occupied(&key).await);
    }

    /// TTL bound: with no release, the key frees itself on a fast clock and
    /// the next keyed task runs.
    #[tokio::test]
    async fn ttl_expiry_unblocks_the_key() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryStore::with_clock(Arc::clone(&clock) as Arc<dyn Clock>));
        let coordinator = Arc::new(KeyCoordinator::new(
            store,
            CoordinatorConfig {
                occupancy_ttl: Duration::from_secs(60),
                ..CoordinatorConfig::default()
            },
        ));

        let probe = Probe::new();
        let registry = Arc::new(TaskRegistry::new());
        registry.register::<Step, _>(ProbeHandler {
            probe: Arc::clone(&probe),
        });
        let pipeline = ConsumerPipeline::new(registry, Arc::clone(&coordinator));

        // Simulate a crashed holder: occupancy with no one draining.
        let key = StrandKey::new("u1");
        assert!(coordinator.try_acquire(&key).await);

        assert_eq!(
            pipeline.on_message(&raw(&step("stuck"), Some("u1"))).await,
            Disposition::Deferred
        );

        clock.advance(Duration::from_secs(61));
        assert_eq!(
            pipeline.on_message(&raw(&step("after-ttl"), Some("u1"))).await,
            Disposition::Executed
        );

        // The wait queue is TTL-bounded too: "stuck" expired with the
        // crashed holder's bookkeeping. Best-effort, not durable.
        assert_eq!(probe.completed(), vec!["after-ttl"]);
        assert!(!coordinator.is_occupied(&key).await);
    }
}
