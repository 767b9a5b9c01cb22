//! Demo: three users, nine tasks, four workers. Same-user tasks run one at
//! a time in submission order; different users interleave freely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use strand_core::coordinator::{CoordinatorConfig, KeyCoordinator};
use strand_core::impls::{InMemoryBroker, InMemoryStore};
use strand_core::pipeline::ConsumerPipeline;
use strand_core::ports::{Broker, Producer};
use strand_core::registry::{Handler, Task, TaskRegistry};
use strand_core::worker::WorkerGroup;
use strand_core::{StrandError, TaskEnvelope};

#[derive(Debug, Serialize, Deserialize)]
struct ApplyCredit {
    user_id: String,
    amount: i64,
    seq: u32,
}

impl Task for ApplyCredit {
    const TYPE: &'static str = "demo.credit.apply.v1";
}

struct ApplyCreditHandler;

#[async_trait]
impl Handler<ApplyCredit> for ApplyCreditHandler {
    async fn process(&self, task: &ApplyCredit) -> Result<(), StrandError> {
        // Pretend this hits a balance that must never see two writers.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracing::info!(
            user_id = %task.user_id,
            seq = task.seq,
            amount = task.amount,
            "credit applied",
        );
        Ok(())
    }

    async fn before_process(&self, envelope: &TaskEnvelope) {
        tracing::debug!(task_id = %envelope.task_id(), "starting credit application");
    }
}

#[tokio::main]
async fn main() -> Result<(), StrandError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let registry = Arc::new(TaskRegistry::new());
    registry.register::<ApplyCredit, _>(ApplyCreditHandler);

    let coordinator = Arc::new(KeyCoordinator::new(
        Arc::new(InMemoryStore::new()),
        CoordinatorConfig::default(),
    ));
    let pipeline = Arc::new(ConsumerPipeline::new(registry, coordinator));

    let broker = Arc::new(InMemoryBroker::new());
    let producer = Producer::new(Arc::clone(&broker) as Arc<dyn Broker>);
    let workers = WorkerGroup::spawn(
        4,
        Arc::clone(&broker) as Arc<dyn Broker>,
        Arc::clone(&pipeline),
    );

    for seq in 0..3 {
        for user in ["alice", "bob", "carol"] {
            let task = ApplyCredit {
                user_id: user.to_string(),
                amount: 100 + i64::from(seq),
                seq,
            };
            let envelope = task.envelope()?.with_key(user);
            producer.submit(&envelope).await?;
        }
    }

    broker.close();
    workers.join().await;

    let occupied = pipeline.coordinator().occupied_keys().await;
    tracing::info!(?occupied, "drained; no keys should remain occupied");

    Ok(())
}
